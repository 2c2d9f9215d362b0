use std::time::Duration;

/// Default delay between two state queries.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Controls how long the client waits for an approver.
///
/// The request is polled while the server reports it as pending. Any other
/// state ends the loop. Without `max_attempts` the loop only ends through a
/// state change or cancellation.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use unlocked_common::PollPolicy;
///
/// let policy = PollPolicy::default()
///     .with_interval(Duration::from_secs(5))
///     .with_max_attempts(120);
///
/// assert_eq!(policy.max_attempts, Some(120));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay between two consecutive queries while pending.
    pub interval: Duration,
    /// Maximum number of state queries, unbounded when `None`.
    pub max_attempts: Option<u32>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: None,
        }
    }
}

impl PollPolicy {
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Whether another query is allowed after `attempts` queries.
    #[must_use]
    pub fn allows(&self, attempts: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempts < max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_unbounded() {
        let policy = PollPolicy::default();
        assert_eq!(policy.interval, Duration::from_secs(1));
        assert!(policy.allows(0));
        assert!(policy.allows(u32::MAX));
    }

    #[test]
    fn test_max_attempts() {
        let policy = PollPolicy::default().with_max_attempts(2);
        assert!(policy.allows(0));
        assert!(policy.allows(1));
        assert!(!policy.allows(2));
    }
}
