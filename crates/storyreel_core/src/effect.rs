use std::time::Duration;

use crate::{JobOutcome, JobSeq, Notice};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Invoke the caller's submission function for `job`.
    Submit { job: JobSeq },
    /// Start the repeating progress timer.
    ArmPolling { interval: Duration },
    /// Stop the progress timer. Safe to repeat.
    DisarmPolling,
    /// Ask the backend for progress. The reply carries `job` back.
    QueryProgress { job: JobSeq, task_id: String },
    RequestCancel { job: JobSeq, task_id: String },
    /// Deliver `Msg::ResetDue { job }` after `delay`.
    ScheduleReset { job: JobSeq, delay: Duration },
    Notify(Notice),
    /// Job is over and the tracker is idle again.
    JobFinished { job: JobSeq, outcome: JobOutcome },
}
