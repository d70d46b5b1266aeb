use std::fmt;

/// Per-tracker job counter. Increments on every accepted start.
pub type JobSeq = u64;

/// One unit of work submitted to a generation job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationPrompt {
    pub id: String,
    pub prompt: String,
}

impl GenerationPrompt {
    pub fn new(id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into(),
        }
    }
}

/// Job status as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TaskStatus {
    /// No job has been submitted yet.
    #[default]
    Idle,
    Running,
    /// Cancel was requested but the worker has not stopped yet.
    Cancelling,
    Completed,
    Error,
    Cancelled,
    NotFound,
    Other(String),
}

impl TaskStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "" => TaskStatus::Idle,
            "running" => TaskStatus::Running,
            "cancelling" => TaskStatus::Cancelling,
            "completed" => TaskStatus::Completed,
            "error" => TaskStatus::Error,
            "cancelled" => TaskStatus::Cancelled,
            "not_found" => TaskStatus::NotFound,
            other => TaskStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TaskStatus::Idle => "",
            TaskStatus::Running => "running",
            TaskStatus::Cancelling => "cancelling",
            TaskStatus::Completed => "completed",
            TaskStatus::Error => "error",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::NotFound => "not_found",
            TaskStatus::Other(raw) => raw,
        }
    }

    /// No further progress will be reported after a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Error | TaskStatus::Cancelled | TaskStatus::NotFound
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress record owned by a tracker.
///
/// Holds `completed_ids.len() <= current <= total` for well-formed backend
/// reports. `completed_ids` is a positional prefix of the submitted batch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GenerationProgress {
    pub current: u32,
    pub total: u32,
    pub status: TaskStatus,
    pub task_id: String,
    pub errors: Vec<String>,
    pub completed_ids: Vec<String>,
}

/// Receipt returned by the backend when a batch job is accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitReceipt {
    pub task_id: String,
    pub total: u32,
}

/// One progress poll result. Absent counters keep their previous value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProgressReport {
    pub status: TaskStatus,
    pub current: Option<u32>,
    pub total: Option<u32>,
    pub errors: Vec<String>,
}

/// How a job ended, delivered once per job after the tracker is idle again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Failed { errors: Vec<String> },
    Cancelled,
    NotFound,
    /// The job was dropped client-side without a terminal status.
    Aborted { reason: String },
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Completed)
    }
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobOutcome::Completed => write!(f, "completed"),
            JobOutcome::Failed { errors } => write!(f, "failed ({} errors)", errors.len()),
            JobOutcome::Cancelled => write!(f, "cancelled"),
            JobOutcome::NotFound => write!(f, "task not found"),
            JobOutcome::Aborted { reason } => write!(f, "aborted: {reason}"),
        }
    }
}
