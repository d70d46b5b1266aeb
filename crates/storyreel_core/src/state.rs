use std::time::Duration;

use crate::view_model::TrackerView;
use crate::{
    Effect, GenerationProgress, GenerationPrompt, JobOutcome, JobSeq, Notice, ProgressReport,
    SubmitReceipt, TaskStatus,
};

/// Fixed interval between progress queries.
pub const POLL_INTERVAL: Duration = Duration::from_millis(1000);
/// How long a terminal status stays visible before the tracker resets.
pub const TERMINAL_RESET_DELAY: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TrackerState {
    generating: bool,
    polling: bool,
    job: JobSeq,
    submitted: Vec<GenerationPrompt>,
    progress: GenerationProgress,
    terminal: Option<JobOutcome>,
    dirty: bool,
}

impl TrackerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_generating(&self) -> bool {
        self.generating
    }

    pub fn is_polling(&self) -> bool {
        self.polling
    }

    /// Sequence number of the most recently accepted job.
    pub fn current_job(&self) -> JobSeq {
        self.job
    }

    pub fn progress(&self) -> &GenerationProgress {
        &self.progress
    }

    pub fn submitted(&self) -> &[GenerationPrompt] {
        &self.submitted
    }

    pub fn view(&self) -> TrackerView {
        TrackerView::new(self.generating, self.progress.clone(), self.dirty)
    }

    /// Returns whether anything changed since the last call, clearing the flag.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub(crate) fn begin_job(&mut self, prompts: Vec<GenerationPrompt>) -> JobSeq {
        self.job += 1;
        self.generating = true;
        self.submitted = prompts;
        self.progress.completed_ids.clear();
        self.terminal = None;
        self.dirty = true;
        self.job
    }

    pub(crate) fn record_submission(&mut self, receipt: SubmitReceipt) {
        self.progress.task_id = receipt.task_id;
        self.progress.total = receipt.total;
        self.progress.current = 0;
        self.progress.status = TaskStatus::Running;
        self.polling = true;
        self.dirty = true;
    }

    /// Applies a poll result. Returns the terminal notice when the job is over.
    pub(crate) fn apply_report(&mut self, report: ProgressReport) -> Option<Notice> {
        if let Some(current) = report.current {
            // Positional attribution: the backend is assumed to finish prompts in order.
            let known = self.progress.completed_ids.len();
            let reached = (current as usize).min(self.submitted.len());
            if reached > known {
                self.progress
                    .completed_ids
                    .extend(self.submitted[known..reached].iter().map(|p| p.id.clone()));
            }
            self.progress.current = current;
        }
        if let Some(total) = report.total {
            self.progress.total = total;
        }
        self.progress.status = report.status;
        self.progress.errors = report.errors;
        self.dirty = true;

        let (outcome, notice) = match &self.progress.status {
            TaskStatus::Completed => (JobOutcome::Completed, Notice::Completed),
            TaskStatus::Cancelled => (JobOutcome::Cancelled, Notice::Cancelled),
            TaskStatus::NotFound => (JobOutcome::NotFound, Notice::NotFound),
            TaskStatus::Error => {
                let errors = self.progress.errors.clone();
                (
                    JobOutcome::Failed {
                        errors: errors.clone(),
                    },
                    Notice::JobFailed { errors },
                )
            }
            _ => return None,
        };
        self.polling = false;
        self.terminal = Some(outcome);
        Some(notice)
    }

    /// Returns the tracker to its initial form.
    ///
    /// Always disarms polling; reports the job outcome when a job was active.
    pub(crate) fn full_reset(&mut self, reason: &str) -> Vec<Effect> {
        let mut effects = vec![Effect::DisarmPolling];
        if self.generating {
            let outcome = self.terminal.take().unwrap_or_else(|| JobOutcome::Aborted {
                reason: reason.to_string(),
            });
            effects.push(Effect::JobFinished {
                job: self.job,
                outcome,
            });
        }
        self.generating = false;
        self.polling = false;
        self.submitted.clear();
        self.progress = GenerationProgress::default();
        self.terminal = None;
        self.dirty = true;
        effects
    }
}
