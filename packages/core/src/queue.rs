//! Queue identifiers that partition records by job type.

use serde::{Deserialize, Serialize};

/// Stable identifier for the queue of one job type.
///
/// Lowercase hex MD5 digest of the job type name, so several job types can
/// share one storage table and still be told apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueId(String);

impl QueueId {
    /// Derive the queue identifier for a job type name.
    pub fn from_job_type(job_type: &str) -> Self {
        Self(format!("{:x}", md5::compute(job_type.as_bytes())))
    }

    /// Wrap an identifier that was read back from storage.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for QueueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_md5_hex_of_type_name() {
        let id = QueueId::from_job_type("hello");
        assert_eq!(id.as_str(), "5d41402abc4b2a76b9719d911017c592");
    }

    #[test]
    fn same_name_gives_same_id() {
        assert_eq!(
            QueueId::from_job_type("billing::Invoice"),
            QueueId::from_job_type("billing::Invoice")
        );
        assert_ne!(
            QueueId::from_job_type("billing::Invoice"),
            QueueId::from_job_type("billing::Refund")
        );
    }
}
