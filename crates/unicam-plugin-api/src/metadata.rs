//! Plugin metadata with StableAbi derives.

use abi_stable::std_types::{RString, RVec};
use abi_stable::StableAbi;

/// ABI-stable plugin metadata.
///
/// Read once at load time to identify the plugin; the camera types it offers
/// come from `list_camera_types`.
#[repr(C)]
#[derive(Debug, Clone, StableAbi)]
pub struct PluginMetadata {
    /// Unique plugin identifier (e.g., "org.example.ramp")
    pub plugin_id: RString,

    /// Human-readable plugin name
    pub name: RString,

    /// Plugin version (semver format)
    pub version: RString,

    /// Plugin author
    pub author: RString,

    /// Plugin description
    pub description: RString,

    /// Camera type names this plugin provides
    pub camera_types: RVec<RString>,
}

impl PluginMetadata {
    /// Create new plugin metadata with required fields
    pub fn new(plugin_id: &str, name: &str, version: &str) -> Self {
        Self {
            plugin_id: RString::from(plugin_id),
            name: RString::from(name),
            version: RString::from(version),
            author: RString::new(),
            description: RString::new(),
            camera_types: RVec::new(),
        }
    }

    /// Builder method to set author
    pub fn with_author(mut self, author: &str) -> Self {
        self.author = RString::from(author);
        self
    }

    /// Builder method to set description
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = RString::from(description);
        self
    }

    /// Builder method to add a camera type
    pub fn with_camera_type(mut self, type_name: &str) -> Self {
        self.camera_types.push(RString::from(type_name));
        self
    }
}

/// Version information for ABI compatibility checking
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, StableAbi)]
pub struct AbiVersion {
    /// Major version - breaking changes
    pub major: u32,
    /// Minor version - backwards-compatible additions
    pub minor: u32,
    /// Patch version - bug fixes
    pub patch: u32,
}

impl AbiVersion {
    /// Current ABI version
    pub const CURRENT: Self = Self {
        major: 0,
        minor: 1,
        patch: 0,
    };

    /// Whether a plugin built against `self` can be loaded by a host at `host`.
    ///
    /// Majors must match and the plugin must be at least as new as the host.
    pub fn is_compatible_with(&self, host: &Self) -> bool {
        self.major == host.major && self.minor >= host.minor
    }
}

impl std::fmt::Display for AbiVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(major: u32, minor: u32) -> AbiVersion {
        AbiVersion {
            major,
            minor,
            patch: 7,
        }
    }

    #[test]
    fn test_abi_compatibility() {
        let host = v(1, 2);
        assert!(v(1, 2).is_compatible_with(&host));
        assert!(v(1, 3).is_compatible_with(&host));
        assert!(!v(1, 1).is_compatible_with(&host));
        assert!(!v(2, 2).is_compatible_with(&host));
        assert!(!v(0, 9).is_compatible_with(&host));
    }

    #[test]
    fn test_metadata_builder() {
        let meta = PluginMetadata::new("org.example.ramp", "Ramp", "0.1.0")
            .with_author("unicam")
            .with_camera_type("ramp");
        assert_eq!(meta.camera_types.len(), 1);
        assert_eq!(meta.camera_types[0].as_str(), "ramp");
        assert_eq!(AbiVersion::CURRENT.to_string(), "0.1.0");
    }
}
