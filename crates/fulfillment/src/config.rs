//! Workflow configuration.

use std::time::Duration;

/// Tunable parameters for the fulfillment workflows.
///
/// The defaults are deliberate choices, not inherited constants:
/// - 15 minute reservation TTL: long enough to finish a payment form,
///   short enough that abandoned carts return stock quickly
/// - 60 second sweep interval: an expired hold lingers at most one minute
/// - 3 contention attempts with 25ms linear backoff before surfacing
///   `Contention`
/// - 10 second payment deadline before the checkout fails with
///   `ExternalTimeout`
///
/// Environment overrides use whole seconds (`RESERVATION_TTL_SECS`,
/// `SWEEP_INTERVAL_SECS`, `PAYMENT_TIMEOUT_SECS`) and plain integers
/// (`CONTENTION_RETRIES`).
#[derive(Debug, Clone)]
pub struct FulfillmentConfig {
    /// How long a reservation holds stock before the sweep reclaims it.
    pub reservation_ttl: chrono::Duration,

    /// How often the expiry sweep runs.
    pub sweep_interval: Duration,

    /// How many attempts a contended inventory write gets.
    pub contention_retries: u32,

    /// Base backoff between contention retries (multiplied by the attempt
    /// number).
    pub contention_backoff: Duration,

    /// Deadline for external payment calls.
    pub payment_timeout: Duration,
}

impl Default for FulfillmentConfig {
    fn default() -> Self {
        Self {
            reservation_ttl: chrono::Duration::minutes(15),
            sweep_interval: Duration::from_secs(60),
            contention_retries: 3,
            contention_backoff: Duration::from_millis(25),
            payment_timeout: Duration::from_secs(10),
        }
    }
}

impl FulfillmentConfig {
    /// Loads configuration from environment variables, falling back to the
    /// defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let secs = |name: &str| std::env::var(name).ok().and_then(|v| v.parse::<u64>().ok());

        Self {
            reservation_ttl: secs("RESERVATION_TTL_SECS")
                .map(|s| chrono::Duration::seconds(s as i64))
                .unwrap_or(defaults.reservation_ttl),
            sweep_interval: secs("SWEEP_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
            contention_retries: std::env::var("CONTENTION_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.contention_retries),
            contention_backoff: defaults.contention_backoff,
            payment_timeout: secs("PAYMENT_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.payment_timeout),
        }
    }

    /// A configuration tuned for tests: short TTLs, no backoff waits.
    pub fn for_tests() -> Self {
        Self {
            reservation_ttl: chrono::Duration::minutes(15),
            sweep_interval: Duration::from_millis(50),
            contention_retries: 3,
            contention_backoff: Duration::from_millis(1),
            payment_timeout: Duration::from_millis(250),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = FulfillmentConfig::default();
        assert_eq!(config.reservation_ttl, chrono::Duration::minutes(15));
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
        assert_eq!(config.contention_retries, 3);
        assert_eq!(config.payment_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_profile_keeps_retry_budget() {
        let config = FulfillmentConfig::for_tests();
        assert_eq!(config.contention_retries, 3);
        assert!(config.payment_timeout < Duration::from_secs(1));
    }
}
