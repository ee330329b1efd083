//! `unicam info`: current value of every property.

use unicam_core::Camera;

/// One line per property: ` RO | name | value`.
///
/// Write-only properties have no readable value and show `-`.
pub fn render(camera: &Camera) -> String {
    let width = camera
        .enumerate()
        .iter()
        .map(|d| d.name.len())
        .max()
        .unwrap_or(0)
        .max(26);

    let mut out = String::new();
    for descriptor in camera.enumerate() {
        let value = match camera.get(&descriptor.name) {
            Ok(value) => descriptor.render(&value),
            Err(_) => "-".to_string(),
        };
        out.push_str(&format!(
            " {} | {:<width$} | {}\n",
            descriptor.access.short(),
            descriptor.name,
            value,
            width = width
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use unicam_core::AcquisitionConfig;
    use unicam_driver_mock::MockCamera;

    #[test]
    fn test_rows_follow_registration_order() {
        let driver = MockCamera::builder(64, 32).build().unwrap();
        let camera = Camera::new("mock", Box::new(driver), AcquisitionConfig::default()).unwrap();

        let text = render(&camera);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), camera.enumerate().len());
        assert!(lines[0].starts_with(" RO | name "));
        assert!(lines[0].ends_with("| mock camera"));
        assert!(text.contains(" RW | trigger_source             | auto\n"));
        assert!(text.contains(" RO | sensor_width               | 64\n"));
    }
}
