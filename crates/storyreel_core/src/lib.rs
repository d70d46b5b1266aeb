//! Storyreel core: pure generation-task state machine and view-model helpers.
mod effect;
mod model;
mod msg;
mod notice;
mod state;
mod update;
mod view_model;

pub use effect::Effect;
pub use model::{
    GenerationProgress, GenerationPrompt, JobOutcome, JobSeq, ProgressReport, SubmitReceipt,
    TaskStatus,
};
pub use msg::Msg;
pub use notice::{Notice, NoticeLevel};
pub use state::{TrackerState, POLL_INTERVAL, TERMINAL_RESET_DELAY};
pub use update::update;
pub use view_model::TrackerView;
