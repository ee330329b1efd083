//! Registry behaviour through the public API.

use futures::future::BoxFuture;
use std::sync::Arc;
use unicam_core::config::UnicamConfig;
use unicam_core::error::Lookup;
use unicam_core::property::names;
use unicam_core::{
    CameraDriver, CameraError, CameraFactory, DescriptorTable, DriverError, DriverErrorKind,
    PropertyValue,
};
use unicam_registry::{CameraRegistry, Origin};

/// Factory that accepts anything and never comes online.
struct Offline(&'static str);

impl CameraFactory for Offline {
    fn description(&self) -> &str {
        self.0
    }

    fn descriptors(&self) -> unicam_core::Result<Arc<DescriptorTable>> {
        DescriptorTable::builder().with_base().build()
    }

    fn validate(&self, _args: &toml::Value) -> anyhow::Result<()> {
        Ok(())
    }

    fn build(&self, _args: toml::Value) -> BoxFuture<'static, Result<Box<dyn CameraDriver>, DriverError>> {
        let name = self.0;
        Box::pin(async move {
            Err(DriverError::new(
                name,
                DriverErrorKind::Communication,
                "no device on the bus",
            ))
        })
    }
}

fn table(text: &str) -> toml::Value {
    toml::Value::Table(text.parse::<toml::Table>().unwrap())
}

#[test]
fn names_are_listed_in_registration_order() {
    let registry = CameraRegistry::default();
    registry.register("alpha", Arc::new(Offline("alpha"))).unwrap();
    registry.register("beta", Arc::new(Offline("beta"))).unwrap();

    assert_eq!(registry.list(), ["alpha", "beta"]);
    assert!(registry.contains("beta"));
    assert_eq!(registry.entry("alpha").unwrap().origin, Origin::Builtin);
}

#[tokio::test]
async fn unknown_backend_is_not_found() {
    let registry = CameraRegistry::default();
    registry.register("alpha", Arc::new(Offline("alpha"))).unwrap();
    registry.register("beta", Arc::new(Offline("beta"))).unwrap();

    let err = registry.create("gamma", table("")).await.unwrap_err();
    assert!(matches!(
        err,
        CameraError::NotFound { kind: Lookup::Backend, ref name } if name == "gamma"
    ));
}

#[test]
fn duplicate_names_are_rejected() {
    let registry = CameraRegistry::default();
    registry.register("alpha", Arc::new(Offline("first"))).unwrap();

    let err = registry.register("alpha", Arc::new(Offline("second"))).unwrap_err();
    assert!(matches!(err, CameraError::DuplicateName(ref n) if n == "alpha"));
    assert_eq!(registry.entry("alpha").unwrap().factory.description(), "first");
}

#[test]
fn builtins_are_mock_then_file() {
    let registry = CameraRegistry::with_builtin_backends().unwrap();
    assert_eq!(registry.list(), ["mock", "file"]);
    assert!(registry
        .entries()
        .iter()
        .all(|entry| entry.origin == Origin::Builtin));
}

#[tokio::test]
async fn invalid_arguments_are_backend_init_errors() {
    let registry = CameraRegistry::with_builtin_backends().unwrap();

    let err = registry.create("mock", table("width = 0")).await.unwrap_err();
    match err {
        CameraError::BackendInit { backend, cause } => {
            assert_eq!(backend, "mock");
            assert_eq!(cause.kind, DriverErrorKind::Configuration);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn build_failures_keep_their_cause() {
    let registry = CameraRegistry::default();
    registry.register("alpha", Arc::new(Offline("alpha"))).unwrap();

    let err = registry.create("alpha", table("")).await.unwrap_err();
    assert!(matches!(
        err,
        CameraError::BackendInit { ref cause, .. } if cause.kind == DriverErrorKind::Communication
    ));
}

#[tokio::test]
async fn created_cameras_use_registry_acquisition_settings() {
    let config = UnicamConfig::from_toml_str(
        r#"
        [acquisition]
        queue_depth = 2
        buffer_count = 3
        "#,
    )
    .unwrap();
    let registry = CameraRegistry::from_config(&config).unwrap();

    let camera = registry.create("mock", table("width = 32\nheight = 16")).await.unwrap();
    assert_eq!(camera.backend(), "mock");
    assert_eq!(camera.acquisition_config().queue_depth, 2);
    assert_eq!(camera.geometry().unwrap().width, 32);
}

#[tokio::test]
async fn presets_apply_their_properties() {
    let config = UnicamConfig::from_toml_str(
        r#"
        [[cameras]]
        id = "bench"
        backend = "mock"
        args = { width = 64, height = 32 }
        properties = { exposure_time = 0.002, trigger_source = "software" }
        "#,
    )
    .unwrap();
    let registry = CameraRegistry::from_config(&config).unwrap();
    assert_eq!(registry.preset_ids(), ["bench"]);

    let camera = registry.open("bench").await.unwrap();
    assert_eq!(camera.get(names::EXPOSURE_TIME).unwrap(), PropertyValue::Double(0.002));
    assert_eq!(camera.get(names::TRIGGER_SOURCE).unwrap(), PropertyValue::Enum(1));
    assert_eq!(camera.geometry().unwrap().height, 32);

    let plain = registry.open("mock").await.unwrap();
    assert_eq!(plain.get(names::EXPOSURE_TIME).unwrap(), PropertyValue::Double(0.01));
}

#[tokio::test]
async fn rejected_preset_property_fails_open() {
    let config = UnicamConfig::from_toml_str(
        r#"
        [[cameras]]
        id = "too-long"
        backend = "mock"
        properties = { exposure_time = 20.0 }
        "#,
    )
    .unwrap();
    let registry = CameraRegistry::from_config(&config).unwrap();

    let err = registry.open("too-long").await.unwrap_err();
    assert!(matches!(err, CameraError::OutOfRange { .. }));
}

#[tokio::test]
async fn example_configuration_opens_its_mock_presets() {
    let config = UnicamConfig::from_toml_str(include_str!("../../../unicam.example.toml")).unwrap();
    let registry = CameraRegistry::from_config(&config).unwrap();
    assert_eq!(registry.preset_ids(), ["bench", "flaky", "replay"]);

    let bench = registry.open("bench").await.unwrap();
    assert_eq!(bench.geometry().unwrap().width, 1024);
    assert_eq!(bench.get(names::EXPOSURE_TIME).unwrap(), PropertyValue::Double(0.002));

    let flaky = registry.open("flaky").await.unwrap();
    assert_eq!(flaky.geometry().unwrap().height, 256);
}
