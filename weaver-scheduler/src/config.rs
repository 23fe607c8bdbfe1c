use serde::Deserialize;

/// Tunables for one master's scheduling components. Constructed by the
/// embedding service and injected explicitly; nothing here is a
/// process-wide singleton.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Base unit for the failed-dispatch backoff table, in seconds.
    pub dispatch_retry_base_secs: u64,
    /// Sleep between dependency re-polls, in seconds.
    pub dependency_poll_interval_secs: u64,
    /// Host string stamped onto instances this master owns.
    pub master_host: String,
}

impl SchedulerConfig {
    /// Base unit for the failed-dispatch backoff table.
    pub fn dispatch_retry_base(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.dispatch_retry_base_secs as i64)
    }

    /// Sleep between dependency re-polls.
    pub fn dependency_poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.dependency_poll_interval_secs)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            dispatch_retry_base_secs: 1,
            dependency_poll_interval_secs: 10,
            master_host: "127.0.0.1:5678".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_helpers_reflect_the_configured_seconds() {
        let config = SchedulerConfig {
            dispatch_retry_base_secs: 4,
            dependency_poll_interval_secs: 3,
            ..SchedulerConfig::default()
        };
        assert_eq!(config.dispatch_retry_base(), chrono::Duration::seconds(4));
        assert_eq!(
            config.dependency_poll_interval(),
            std::time::Duration::from_secs(3)
        );
    }
}
