use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Bookkeeping for one chunk's passes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassOutcome {
    pub model_calls: usize,
    pub collapse_retries: usize,
    /// Passes that produced no usable response
    pub failed_passes: usize,
    pub candidates_seen: usize,
    pub candidates_rejected: usize,
}

/// Counters for a whole document, reported in the result metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub chunks_total: usize,
    pub chunks_processed: usize,
    pub model_calls: usize,
    pub collapse_retries: usize,
    pub failed_passes: usize,
    pub candidates_seen: usize,
    pub candidates_rejected: usize,
    pub duplicates_removed: usize,
    pub elapsed_ms: u64,
}

impl PipelineStats {
    pub fn record_chunk(&mut self, outcome: &PassOutcome) {
        self.chunks_processed += 1;
        self.model_calls += outcome.model_calls;
        self.collapse_retries += outcome.collapse_retries;
        self.failed_passes += outcome.failed_passes;
        self.candidates_seen += outcome.candidates_seen;
        self.candidates_rejected += outcome.candidates_rejected;
    }

    pub fn record_elapsed(&mut self, duration: Duration) {
        self.elapsed_ms = duration.as_millis() as u64;
    }
}

pub struct TimedOperation {
    start: Instant,
}

impl TimedOperation {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_chunk_accumulates() {
        let mut stats = PipelineStats::default();
        let outcome = PassOutcome {
            model_calls: 2,
            collapse_retries: 1,
            failed_passes: 0,
            candidates_seen: 4,
            candidates_rejected: 1,
        };

        stats.record_chunk(&outcome);
        stats.record_chunk(&outcome);

        assert_eq!(stats.chunks_processed, 2);
        assert_eq!(stats.model_calls, 4);
        assert_eq!(stats.collapse_retries, 2);
        assert_eq!(stats.candidates_rejected, 2);
    }
}
