//! Error injection for the mock camera.
//!
//! Scripted scenarios and per-operation failure rates, checked by the camera
//! at the top of each hardware operation. Operation names used by
//! [`MockCamera`](crate::MockCamera): `"arm"`, `"capture"`, `"apply_property"`,
//! `"trigger_line"`.

use super::rng::MockRng;
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use unicam_core::error::{DriverError, DriverErrorKind};

/// Error injection configuration.
#[derive(Clone, Debug)]
pub struct ErrorConfig {
    /// Per-operation failure rate (0.0 to 1.0); `"*"` matches every operation
    failure_rates: Arc<HashMap<String, f64>>,
    /// Scripted failures
    scenarios: Arc<Vec<ErrorScenario>>,
    /// RNG for failure decisions
    rng: Arc<MockRng>,
    /// Scenario progress
    state: Arc<Mutex<ErrorState>>,
}

/// A scripted failure.
///
/// Deserializes from camera arguments:
///
/// ```toml
/// errors = [
///     { scenario = "fail_after_n", operation = "capture", count = 10 },
///     { scenario = "corrupt_frame", every = 5 },
/// ]
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "scenario", rename_all = "snake_case")]
pub enum ErrorScenario {
    /// Fail every call after N successful ones
    FailAfterN {
        /// Operation name
        operation: String,
        /// Successful calls before failures begin
        count: u32,
    },
    /// Operation always times out
    Timeout {
        /// Operation name
        operation: String,
    },
    /// The link drops on the first call; every later call fails
    CommunicationLoss,
    /// The device faults on the first call; every later call fails
    HardwareFault {
        /// Vendor fault code
        code: u32,
    },
    /// Every Nth capture fails its transfer; the device stays healthy
    CorruptFrame {
        /// Period in captures
        every: u32,
    },
}

#[derive(Default, Debug)]
struct ErrorState {
    /// Calls seen per operation
    operation_counts: HashMap<String, u32>,
    /// Whether communication is lost
    communication_lost: bool,
    /// Latched hardware fault code (0 = no fault)
    hardware_fault_code: u32,
}

impl ErrorConfig {
    /// No errors (default).
    pub fn none() -> Self {
        Self::new(HashMap::new(), Vec::new(), None)
    }

    /// Uniform random failures on every operation.
    pub fn random_failures(rate: f64) -> Self {
        Self::random_failures_seeded(rate, None)
    }

    /// Uniform random failures with a fixed seed.
    pub fn random_failures_seeded(rate: f64, seed: Option<u64>) -> Self {
        let mut rates = HashMap::new();
        rates.insert("*".to_string(), rate);
        Self::new(rates, Vec::new(), seed)
    }

    /// A single scenario.
    pub fn scenario(scenario: ErrorScenario) -> Self {
        Self::scenarios(vec![scenario])
    }

    /// Several scenarios, checked in order.
    pub fn scenarios(scenarios: Vec<ErrorScenario>) -> Self {
        Self::new(HashMap::new(), scenarios, None)
    }

    /// Custom failure rates per operation.
    pub fn with_rates(rates: HashMap<String, f64>) -> Self {
        Self::new(rates, Vec::new(), None)
    }

    /// Rates and scenarios together.
    pub fn new(rates: HashMap<String, f64>, scenarios: Vec<ErrorScenario>, seed: Option<u64>) -> Self {
        Self {
            failure_rates: Arc::new(rates),
            scenarios: Arc::new(scenarios),
            rng: Arc::new(MockRng::new(seed)),
            state: Arc::new(Mutex::new(ErrorState::default())),
        }
    }

    /// Whether anything can ever fail.
    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty() && self.failure_rates.values().all(|rate| *rate <= 0.0)
    }

    /// Decide whether `operation` fails this time.
    ///
    /// Random failures are transfer errors: they cost one frame, not the device.
    pub fn check_operation(&self, driver_type: &str, operation: &str) -> Result<(), DriverError> {
        let mut state = self.state.lock();

        if state.communication_lost {
            return Err(DriverError::new(
                driver_type,
                DriverErrorKind::Communication,
                "Communication lost",
            ));
        }
        if state.hardware_fault_code != 0 {
            return Err(DriverError::new(
                driver_type,
                DriverErrorKind::Hardware,
                format!("Hardware fault: {}", state.hardware_fault_code),
            ));
        }

        let calls = {
            let count = state.operation_counts.entry(operation.to_string()).or_insert(0);
            *count += 1;
            *count
        };

        for scenario in self.scenarios.iter() {
            match scenario {
                ErrorScenario::FailAfterN { operation: op, count } if op == operation => {
                    if calls > *count {
                        return Err(DriverError::new(
                            driver_type,
                            DriverErrorKind::Hardware,
                            format!("Injected failure after {} operations", count),
                        ));
                    }
                }
                ErrorScenario::Timeout { operation: op } if op == operation => {
                    return Err(DriverError::new(
                        driver_type,
                        DriverErrorKind::Timeout,
                        format!("Operation '{}' timed out", operation),
                    ));
                }
                ErrorScenario::CommunicationLoss => {
                    state.communication_lost = true;
                    return Err(DriverError::new(
                        driver_type,
                        DriverErrorKind::Communication,
                        "Communication lost",
                    ));
                }
                ErrorScenario::HardwareFault { code } => {
                    state.hardware_fault_code = *code;
                    return Err(DriverError::new(
                        driver_type,
                        DriverErrorKind::Hardware,
                        format!("Hardware fault: {}", code),
                    ));
                }
                ErrorScenario::CorruptFrame { every } if operation == "capture" => {
                    if *every > 0 && calls % every == 0 {
                        return Err(DriverError::new(
                            driver_type,
                            DriverErrorKind::Transfer,
                            format!("Corrupted transfer on capture {}", calls),
                        ));
                    }
                }
                _ => {}
            }
        }

        let rate = self
            .failure_rates
            .get(operation)
            .or_else(|| self.failure_rates.get("*"))
            .copied()
            .unwrap_or(0.0);
        if self.rng.should_fail(rate) {
            return Err(DriverError::new(
                driver_type,
                DriverErrorKind::Transfer,
                format!("Random failure on operation '{}'", operation),
            ));
        }

        Ok(())
    }

    /// Clear counters and latched faults.
    pub fn reset(&self) {
        *self.state.lock() = ErrorState::default();
    }
}

impl Default for ErrorConfig {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_errors() {
        let config = ErrorConfig::none();
        assert!(config.is_empty());
        for _ in 0..100 {
            assert!(config.check_operation("mock", "capture").is_ok());
        }
    }

    #[test]
    fn test_random_failures() {
        let config = ErrorConfig::random_failures_seeded(0.5, Some(42));
        let failures = (0..1000)
            .filter(|_| config.check_operation("mock", "capture").is_err())
            .count();
        assert!(failures > 400 && failures < 600, "Got {} failures", failures);
    }

    #[test]
    fn test_random_failures_are_transient() {
        let config = ErrorConfig::random_failures_seeded(1.0, Some(1));
        let err = config.check_operation("mock", "capture").unwrap_err();
        assert_eq!(err.kind, DriverErrorKind::Transfer);
        assert!(err.is_transient());
    }

    #[test]
    fn test_fail_after_n() {
        let config = ErrorConfig::scenario(ErrorScenario::FailAfterN {
            operation: "capture".into(),
            count: 5,
        });

        for i in 0..5 {
            assert!(
                config.check_operation("mock", "capture").is_ok(),
                "Operation {} should succeed",
                i + 1
            );
        }
        for i in 5..10 {
            assert!(
                config.check_operation("mock", "capture").is_err(),
                "Operation {} should fail",
                i + 1
            );
        }
        // Other operations are unaffected
        assert!(config.check_operation("mock", "arm").is_ok());
    }

    #[test]
    fn test_timeout_scenario() {
        let config = ErrorConfig::scenario(ErrorScenario::Timeout {
            operation: "arm".into(),
        });

        let err = config.check_operation("mock", "arm").unwrap_err();
        assert_eq!(err.kind, DriverErrorKind::Timeout);
        assert!(err.message.contains("timed out"));
    }

    #[test]
    fn test_communication_loss_latches() {
        let config = ErrorConfig::scenario(ErrorScenario::CommunicationLoss);

        let err = config.check_operation("mock", "capture").unwrap_err();
        assert_eq!(err.kind, DriverErrorKind::Communication);
        assert!(config.check_operation("mock", "arm").is_err());
    }

    #[test]
    fn test_hardware_fault() {
        let config = ErrorConfig::scenario(ErrorScenario::HardwareFault { code: 0x42 });

        let err = config.check_operation("mock", "capture").unwrap_err();
        assert_eq!(err.kind, DriverErrorKind::Hardware);
        assert!(err.message.contains("66"));
    }

    #[test]
    fn test_corrupt_frame_period() {
        let config = ErrorConfig::scenario(ErrorScenario::CorruptFrame { every: 3 });

        let outcomes: Vec<bool> = (0..6)
            .map(|_| config.check_operation("mock", "capture").is_ok())
            .collect();
        assert_eq!(outcomes, [true, true, false, true, true, false]);
        assert!(config.check_operation("mock", "arm").is_ok());
    }

    #[test]
    fn test_reset() {
        let config = ErrorConfig::scenario(ErrorScenario::FailAfterN {
            operation: "capture".into(),
            count: 2,
        });

        assert!(config.check_operation("mock", "capture").is_ok());
        assert!(config.check_operation("mock", "capture").is_ok());
        assert!(config.check_operation("mock", "capture").is_err());

        config.reset();

        assert!(config.check_operation("mock", "capture").is_ok());
        assert!(config.check_operation("mock", "capture").is_ok());
        assert!(config.check_operation("mock", "capture").is_err());
    }

    #[test]
    fn test_custom_rates() {
        let mut rates = HashMap::new();
        rates.insert("capture".to_string(), 1.0);
        rates.insert("arm".to_string(), 0.0);
        let config = ErrorConfig::with_rates(rates);

        for _ in 0..10 {
            assert!(config.check_operation("mock", "capture").is_err());
            assert!(config.check_operation("mock", "arm").is_ok());
        }
    }

    #[test]
    fn test_scenarios_deserialize() {
        #[derive(Deserialize)]
        struct Args {
            errors: Vec<ErrorScenario>,
        }

        let args: Args = toml::from_str(
            r#"
            errors = [
                { scenario = "fail_after_n", operation = "capture", count = 10 },
                { scenario = "corrupt_frame", every = 5 },
                { scenario = "communication_loss" },
            ]
            "#,
        )
        .unwrap();
        assert_eq!(
            args.errors,
            vec![
                ErrorScenario::FailAfterN {
                    operation: "capture".into(),
                    count: 10
                },
                ErrorScenario::CorruptFrame { every: 5 },
                ErrorScenario::CommunicationLoss,
            ]
        );
    }
}
