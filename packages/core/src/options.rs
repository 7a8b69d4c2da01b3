//! Execution limits for job queues.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Job;

/// Concurrency and time limits applied to one job type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueLimits {
    /// Maximum number of executions of the same job type running at once.
    pub max_concurrency: usize,
    /// Per-execution time limit in milliseconds. `None` means unbounded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_limit_ms: Option<u64>,
}

impl QueueLimits {
    pub fn new(max_concurrency: usize, execution_time_limit: Option<Duration>) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
            execution_time_limit_ms: execution_time_limit.map(duration_millis),
        }
    }

    pub fn execution_time_limit(&self) -> Option<Duration> {
        self.execution_time_limit_ms.map(Duration::from_millis)
    }
}

/// Options for all job queues, with per job type overrides.
///
/// Resolved once at startup; dispatchers never see later changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueOptions {
    /// Default max concurrency per job type. Defaults to the number of
    /// logical processors.
    pub max_concurrency: usize,
    /// Default per-execution time limit in milliseconds. `None` means unbounded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_limit_ms: Option<u64>,
    /// Overrides keyed by job type name.
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub overrides: HashMap<String, QueueLimits>,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            max_concurrency: logical_processors(),
            execution_time_limit_ms: None,
            overrides: HashMap::new(),
        }
    }
}

impl QueueOptions {
    /// Create options from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `JOB_QUEUE_MAX_CONCURRENCY` | logical CPUs | Default max concurrency per job type |
    /// | `JOB_QUEUE_EXECUTION_TIME_LIMIT_MS` | unbounded | Default per-execution time limit |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let max_concurrency = std::env::var("JOB_QUEUE_MAX_CONCURRENCY")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults.max_concurrency)
            .max(1);

        let execution_time_limit_ms = std::env::var("JOB_QUEUE_EXECUTION_TIME_LIMIT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|ms| *ms > 0);

        Self {
            max_concurrency,
            execution_time_limit_ms,
            overrides: HashMap::new(),
        }
    }

    /// Set the default max concurrency.
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    /// Set the default per-execution time limit.
    pub fn with_execution_time_limit(mut self, limit: Duration) -> Self {
        self.execution_time_limit_ms = Some(duration_millis(limit));
        self
    }

    /// Override the limits for one job type.
    ///
    /// When an execution outlives `time_limit` the handler's cancellation token
    /// fires and the record is routed to the storage failure hook.
    pub fn limits_for<J: Job>(&mut self, max_concurrency: usize, time_limit: Option<Duration>) -> &mut Self {
        self.overrides
            .insert(J::job_type().to_string(), QueueLimits::new(max_concurrency, time_limit));
        self
    }

    /// Default limits, used for job types without an override.
    pub fn defaults(&self) -> QueueLimits {
        QueueLimits {
            max_concurrency: self.max_concurrency.max(1),
            execution_time_limit_ms: self.execution_time_limit_ms,
        }
    }

    /// Limits that apply to the given job type.
    pub fn resolve(&self, job_type: &str) -> QueueLimits {
        match self.overrides.get(job_type) {
            Some(limits) => QueueLimits {
                max_concurrency: limits.max_concurrency.max(1),
                ..*limits
            },
            None => self.defaults(),
        }
    }
}

/// Milliseconds in `d`, saturating at `u64::MAX`.
fn duration_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn logical_processors() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct Resize;

    impl Job for Resize {
        fn job_type() -> &'static str {
            "media.resize"
        }
    }

    #[test]
    fn defaults_use_logical_processors_and_no_time_limit() {
        let opts = QueueOptions::default();
        assert!(opts.max_concurrency >= 1);
        assert_eq!(opts.resolve("anything").execution_time_limit(), None);
    }

    #[test]
    fn overrides_win_over_defaults() {
        let mut opts = QueueOptions::default()
            .with_max_concurrency(8)
            .with_execution_time_limit(Duration::from_secs(30));
        opts.limits_for::<Resize>(2, Some(Duration::from_millis(500)));

        let resize = opts.resolve("media.resize");
        assert_eq!(resize.max_concurrency, 2);
        assert_eq!(resize.execution_time_limit(), Some(Duration::from_millis(500)));

        let other = opts.resolve("media.other");
        assert_eq!(other.max_concurrency, 8);
        assert_eq!(other.execution_time_limit(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn zero_concurrency_is_clamped() {
        let opts = QueueOptions::default().with_max_concurrency(0);
        assert_eq!(opts.resolve("x").max_concurrency, 1);
    }

    #[test]
    fn huge_time_limits_saturate() {
        let opts = QueueOptions::default().with_execution_time_limit(Duration::MAX);
        assert_eq!(opts.execution_time_limit_ms, Some(u64::MAX));

        let limits = QueueLimits::new(1, Some(Duration::MAX));
        assert_eq!(limits.execution_time_limit_ms, Some(u64::MAX));
    }

    #[test]
    fn deserializes_partial_config() {
        let opts: QueueOptions = serde_json::from_str(
            r#"{ "max_concurrency": 3, "overrides": { "media.resize": { "max_concurrency": 1, "execution_time_limit_ms": 250 } } }"#,
        )
        .unwrap();
        assert_eq!(opts.max_concurrency, 3);
        assert_eq!(opts.execution_time_limit_ms, None);
        assert_eq!(
            opts.resolve("media.resize").execution_time_limit(),
            Some(Duration::from_millis(250))
        );
    }
}
