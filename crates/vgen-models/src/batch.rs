//! Batch-level aggregation: per-job outcomes and the batch report.

use serde::{Deserialize, Serialize};

use crate::job::{BatchId, JobId};

/// Terminal outcome of a single job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOutcome {
    /// Job ID
    pub job_id: JobId,
    /// Output filename stem (human-readable)
    pub filename: String,
    /// Storage URL on success, error text on failure
    pub result: Result<String, String>,
}

impl JobOutcome {
    /// Successful outcome with the durable storage URL.
    pub fn succeeded(job_id: JobId, filename: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            job_id,
            filename: filename.into(),
            result: Ok(url.into()),
        }
    }

    /// Failed outcome with diagnostic text.
    pub fn failed(job_id: JobId, filename: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            job_id,
            filename: filename.into(),
            result: Err(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Aggregate result of a batch.
///
/// Composed only after every member job has reached a terminal status;
/// partial aggregation is never exposed to the notification step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    /// Batch ID
    pub batch_id: BatchId,
    /// One outcome per job, in submission order
    pub outcomes: Vec<JobOutcome>,
}

impl BatchReport {
    pub fn new(batch_id: BatchId, outcomes: Vec<JobOutcome>) -> Self {
        Self { batch_id, outcomes }
    }

    /// Number of successful jobs.
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    /// Number of failed jobs.
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// Plain-text summary for the batch notification: one line per job,
    /// success lines carry the URL, failure lines the error text.
    pub fn summary_text(&self) -> String {
        let mut lines = Vec::with_capacity(self.outcomes.len() + 2);
        lines.push(format!(
            "Batch {}: {} succeeded, {} failed",
            self.batch_id,
            self.succeeded(),
            self.failed()
        ));
        lines.push(String::new());
        for outcome in &self.outcomes {
            match &outcome.result {
                Ok(url) => lines.push(format!("{}: ready at {}", outcome.filename, url)),
                Err(error) => lines.push(format!("{}: FAILED - {}", outcome.filename, error)),
            }
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_has_one_line_per_job() {
        let batch_id = BatchId::from_string("b1");
        let report = BatchReport::new(
            batch_id.clone(),
            vec![
                JobOutcome::succeeded(JobId::derive(&batch_id, 0), "sunset", "https://s/0.mp4"),
                JobOutcome::failed(JobId::derive(&batch_id, 1), "dawn", "provider exploded"),
                JobOutcome::succeeded(JobId::derive(&batch_id, 2), "dusk", "https://s/2.mp4"),
            ],
        );

        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 1);

        let text = report.summary_text();
        let job_lines: Vec<&str> = text.lines().skip(2).collect();
        assert_eq!(job_lines.len(), 3);
        assert!(job_lines[0].contains("https://s/0.mp4"));
        assert!(job_lines[1].contains("provider exploded"));
        assert!(job_lines[2].contains("https://s/2.mp4"));
    }
}
