//! Units of work flowing through the pool and their outcomes

use crate::booru::{Metadata, Post};

/// One discovered post waiting to be downloaded
#[derive(Debug)]
pub struct Job {
    post: Box<dyn Post>,
}

impl Job {
    pub fn new(post: Box<dyn Post>) -> Self {
        Self { post }
    }

    pub fn into_post(self) -> Box<dyn Post> {
        self.post
    }
}

/// Outcome of processing one job
///
/// A result is exactly one of success, skip or failure; the constructors are
/// the only way to build one.
#[derive(Debug, Clone, PartialEq)]
pub struct JobResult {
    success: bool,
    skip: bool,
    info: Option<Metadata>,
}

impl JobResult {
    /// Media (and metadata, if enabled) saved
    pub fn success(info: Metadata) -> Self {
        Self {
            success: true,
            skip: false,
            info: Some(info),
        }
    }

    /// Filtered out before any network I/O
    pub fn skipped(info: Metadata) -> Self {
        Self {
            success: false,
            skip: true,
            info: Some(info),
        }
    }

    /// Processing failed after admission
    pub fn failed(info: Option<Metadata>) -> Self {
        Self {
            success: false,
            skip: false,
            info,
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn is_skip(&self) -> bool {
        self.skip
    }

    pub fn is_failure(&self) -> bool {
        !self.success && !self.skip
    }

    pub fn info(&self) -> Option<&Metadata> {
        self.info.as_ref()
    }

    /// Bytes attributed to this result, zero unless it succeeded
    pub fn size(&self) -> u64 {
        match (&self.info, self.success) {
            (Some(info), true) => info.size,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(size: u64) -> Metadata {
        Metadata {
            hash: "abc".to_string(),
            url: "https://example.com/abc.png".to_string(),
            size,
            ..Default::default()
        }
    }

    #[test]
    fn test_outcomes_are_exclusive() {
        let results = [
            JobResult::success(info(10)),
            JobResult::skipped(info(10)),
            JobResult::failed(Some(info(10))),
            JobResult::failed(None),
        ];

        for result in &results {
            assert!(!(result.is_success() && result.is_skip()));
            let outcomes = [result.is_success(), result.is_skip(), result.is_failure()];
            assert_eq!(outcomes.iter().filter(|o| **o).count(), 1);
        }
    }

    #[test]
    fn test_only_successes_carry_size() {
        assert_eq!(JobResult::success(info(42)).size(), 42);
        assert_eq!(JobResult::skipped(info(42)).size(), 0);
        assert_eq!(JobResult::failed(Some(info(42))).size(), 0);
        assert_eq!(JobResult::failed(None).size(), 0);
    }
}
