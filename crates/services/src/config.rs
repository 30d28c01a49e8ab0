use serde::{Deserialize, Serialize};

pub const DEFAULT_BATCH_SIZE: u32 = 100;
pub const DEFAULT_MAX_CONCURRENCY: usize = 16;

/// Tuning for batch recalculation and fan-out syncs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Enrollments loaded (and synced concurrently) per page.
    pub batch_size: u32,
    /// Upper bound on spawned sync tasks running at once in a fan-out.
    pub max_concurrency: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }
}

impl SyncConfig {
    /// Zero values are raised to 1.
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            batch_size: self.batch_size.max(1),
            max_concurrency: self.max_concurrency.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let config: SyncConfig = serde_json::from_str(r#"{ "batch_size": 25 }"#).unwrap();
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.max_concurrency, DEFAULT_MAX_CONCURRENCY);
    }

    #[test]
    fn zero_limits_are_normalized() {
        let config = SyncConfig {
            batch_size: 0,
            max_concurrency: 0,
        }
        .normalized();
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.max_concurrency, 1);
    }
}
