use crate::{GenerationPrompt, JobSeq, ProgressReport, SubmitReceipt};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// Caller asked to start a batch.
    StartRequested { prompts: Vec<GenerationPrompt> },
    /// Backend accepted the batch for `job`.
    SubmitSucceeded { job: JobSeq, receipt: SubmitReceipt },
    /// Submission for `job` failed before a task id was assigned.
    SubmitFailed { job: JobSeq, message: String },
    /// Polling timer fired.
    PollTick,
    /// Backend answered a progress query issued for `job`.
    ProgressReported { job: JobSeq, report: ProgressReport },
    /// Progress query for `job` failed at the transport or protocol level.
    PollFailed { job: JobSeq, message: String },
    /// Caller asked to cancel the running job.
    StopRequested,
    /// Backend accepted the cancel request for `job`.
    CancelAcknowledged { job: JobSeq },
    /// Cancel request for `job` failed.
    CancelFailed { job: JobSeq, message: String },
    /// Caller asked for an explicit reset.
    ResetRequested,
    /// Deferred reset after a terminal status is due.
    ResetDue { job: JobSeq },
    /// Owner is discarding the tracker.
    Teardown,
    NoOp,
}
