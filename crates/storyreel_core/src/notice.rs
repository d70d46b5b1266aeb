use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Info,
    Warning,
    Error,
}

/// User-facing notification produced by the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    NoPrompts,
    AlreadyGenerating,
    SubmitFailed(String),
    Completed,
    Cancelled,
    JobFailed { errors: Vec<String> },
    NotFound,
    PollFailed(String),
    CancelRequested,
    CancelFailed(String),
}

impl Notice {
    pub fn level(&self) -> NoticeLevel {
        match self {
            Notice::NoPrompts | Notice::AlreadyGenerating => NoticeLevel::Warning,
            Notice::Completed | Notice::CancelRequested => NoticeLevel::Success,
            Notice::Cancelled => NoticeLevel::Info,
            Notice::SubmitFailed(_)
            | Notice::JobFailed { .. }
            | Notice::NotFound
            | Notice::PollFailed(_)
            | Notice::CancelFailed(_) => NoticeLevel::Error,
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::NoPrompts => write!(f, "no prompts to generate"),
            Notice::AlreadyGenerating => write!(f, "generation already in progress"),
            Notice::SubmitFailed(reason) => write!(f, "operation failed: {reason}"),
            Notice::Completed => write!(f, "generation completed"),
            Notice::Cancelled => write!(f, "generation cancelled"),
            Notice::JobFailed { errors } => f.write_str(&errors.join("\n")),
            Notice::NotFound => write!(f, "generation task not found"),
            Notice::PollFailed(reason) => write!(f, "failed to query progress: {reason}"),
            Notice::CancelRequested => write!(f, "cancellation requested"),
            Notice::CancelFailed(reason) => write!(f, "failed to cancel generation: {reason}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Notice, NoticeLevel};

    #[test]
    fn job_failure_message_joins_backend_errors() {
        let notice = Notice::JobFailed {
            errors: vec!["first".to_string(), "second".to_string()],
        };
        assert_eq!(notice.to_string(), "first\nsecond");
        assert_eq!(notice.level(), NoticeLevel::Error);
    }

    #[test]
    fn guard_rejections_are_warnings() {
        assert_eq!(Notice::NoPrompts.level(), NoticeLevel::Warning);
        assert_eq!(Notice::AlreadyGenerating.level(), NoticeLevel::Warning);
        assert_eq!(Notice::Cancelled.level(), NoticeLevel::Info);
    }
}
