//! Timeouts and retry policy for channel service calls

pub mod timeout {
    //! Timeout configuration for broker calls

    use std::time::Duration;

    /// Default timeout for a single Redis operation (connect, subscribe, publish)
    pub const REDIS_OPERATION_TIMEOUT: Duration = Duration::from_secs(5);
}

pub mod retry {
    //! Fixed-backoff retry policy
    //!
    //! Connection failures are never fatal: callers retry forever, sleeping
    //! a constant delay between attempts, until they are cancelled.

    use std::time::Duration;

    /// Default delay between connection attempts
    pub const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RetryPolicy {
        pub backoff: Duration,
    }

    impl Default for RetryPolicy {
        fn default() -> Self {
            Self {
                backoff: RECONNECT_BACKOFF,
            }
        }
    }

    impl RetryPolicy {
        #[must_use]
        pub const fn fixed(backoff: Duration) -> Self {
            Self { backoff }
        }

        /// Delay before the given (1-based) retry; constant for this policy.
        #[must_use]
        pub const fn delay(&self, _attempt: u32) -> Duration {
            self.backoff
        }
    }

    impl From<&crate::config::BrokerConfig> for RetryPolicy {
        fn from(config: &crate::config::BrokerConfig) -> Self {
            Self::fixed(config.reconnect_backoff())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::retry::RetryPolicy;
    use crate::config::BrokerConfig;
    use std::time::Duration;

    #[test]
    fn test_default_policy_is_one_second() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(1), Duration::from_secs(1));
        assert_eq!(policy.delay(50), Duration::from_secs(1));
    }

    #[test]
    fn test_policy_from_broker_config() {
        let config = BrokerConfig {
            reconnect_backoff_ms: 20,
            ..BrokerConfig::default()
        };
        assert_eq!(RetryPolicy::from(&config).backoff, Duration::from_millis(20));
    }
}
