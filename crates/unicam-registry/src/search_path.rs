//! Where camera plugins are looked for.

use std::path::PathBuf;
use unicam_core::config::PluginSettings;

/// Colon-separated (semicolon on Windows) list of plugin directories searched first.
pub const CAMERA_PATH_ENV: &str = "UNICAM_CAMERA_PATH";

/// System directories scanned unless `plugins.include_default_paths = false`.
pub const SYSTEM_PLUGIN_DIRS: &[&str] = &[
    "/usr/lib/unicam",
    "/usr/lib64/unicam",
    "/usr/local/lib/unicam",
    "/usr/local/lib64/unicam",
];

/// Per-user plugin directory, `$XDG_DATA_HOME/unicam/plugins` on Linux.
pub fn user_plugin_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("unicam").join("plugins"))
}

/// Ordered, de-duplicated plugin search path.
///
/// `UNICAM_CAMERA_PATH` entries come first, then the configured paths, then
/// the system and user directories. Directories are not checked for
/// existence here; discovery skips missing ones.
pub fn plugin_search_paths(settings: &PluginSettings) -> Vec<PathBuf> {
    let mut candidates: Vec<PathBuf> = Vec::new();

    if let Some(value) = std::env::var_os(CAMERA_PATH_ENV) {
        candidates.extend(std::env::split_paths(&value).filter(|p| !p.as_os_str().is_empty()));
    }
    candidates.extend(settings.search_paths.iter().cloned());
    if settings.include_default_paths {
        candidates.extend(SYSTEM_PLUGIN_DIRS.iter().map(PathBuf::from));
        candidates.extend(user_plugin_dir());
    }

    let mut paths = Vec::with_capacity(candidates.len());
    for path in candidates {
        if !paths.contains(&path) {
            paths.push(path);
        }
    }
    paths
}
