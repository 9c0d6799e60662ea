//! Structured job logging utilities.

use tracing::{error, info, warn};
use vgen_models::JobId;

/// Job logger for structured logging with consistent formatting.
///
/// Provides a simple interface for logging job lifecycle events with
/// automatic contextual information (job ID, phase).
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    phase: String,
}

impl JobLogger {
    /// Create a new job logger for a specific job and phase.
    pub fn new(job_id: &JobId, phase: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            phase: phase.to_string(),
        }
    }

    /// Log the start of a phase.
    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            phase = %self.phase,
            "Job started: {}", message
        );
    }

    /// Log a progress update.
    pub fn log_progress(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            phase = %self.phase,
            "Job progress: {}", message
        );
    }

    /// Log a warning.
    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            phase = %self.phase,
            "Job warning: {}", message
        );
    }

    /// Log an error.
    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            phase = %self.phase,
            "Job error: {}", message
        );
    }

    /// Log completion of a phase.
    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            phase = %self.phase,
            "Job completed: {}", message
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn phase(&self) -> &str {
        &self.phase
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vgen_models::BatchId;

    #[test]
    fn logger_carries_job_context() {
        let job_id = JobId::derive(&BatchId::from_string("b1"), 0);
        let logger = JobLogger::new(&job_id, "generation");

        assert_eq!(logger.job_id(), "b1_0");
        assert_eq!(logger.phase(), "generation");
    }
}
