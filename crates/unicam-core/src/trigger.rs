//! Trigger sources.

use crate::property::EnumValue;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// What initiates each frame capture.
///
/// Stored in the `trigger_source` enum property with the numeric values below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerSource {
    /// Free-running: the backend emits frames continuously
    #[default]
    Auto = 0,
    /// One frame per `trigger()` call
    Software = 1,
    /// One frame per external hardware signal
    External = 2,
}

impl TriggerSource {
    /// All sources in enum order.
    pub const ALL: [TriggerSource; 3] = [
        TriggerSource::Auto,
        TriggerSource::Software,
        TriggerSource::External,
    ];

    /// Label used in the property enum table.
    pub fn label(self) -> &'static str {
        match self {
            TriggerSource::Auto => "auto",
            TriggerSource::Software => "software",
            TriggerSource::External => "external",
        }
    }

    /// Numeric enum value.
    pub fn value(self) -> i32 {
        self as i32
    }

    /// Inverse of [`TriggerSource::value`].
    pub fn from_value(value: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.value() == value)
    }

    /// Enum table for the `trigger_source` descriptor.
    pub fn enum_values() -> Vec<EnumValue> {
        Self::ALL
            .iter()
            .map(|s| EnumValue::new(s.value(), s.label()))
            .collect()
    }
}

impl std::fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TriggerSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(TriggerSource::Auto),
            "software" => Ok(TriggerSource::Software),
            "external" => Ok(TriggerSource::External),
            other => Err(format!(
                "unknown trigger source '{}', expected auto, software or external",
                other
            )),
        }
    }
}
