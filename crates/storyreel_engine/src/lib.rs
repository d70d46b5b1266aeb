//! Storyreel engine: backend client, chapter stream decoding and the async
//! generation-task tracker.
mod client;
mod event_stream;
mod notify;
mod tracker;
mod types;

pub use client::{ChapterStream, ClientSettings, MediaApi, ReqwestApiClient};
pub use event_stream::{
    pump_event_stream, unescape, ChapterText, EventStreamDecoder, StreamEnd, DATA_MARKER,
    DONE_SENTINEL,
};
pub use notify::{ChannelNoticeSink, LogNoticeSink, NoticeSink};
pub use tracker::{JobCompletion, TaskTracker};
pub use types::{
    ApiError, AudioBatchRequest, ChapterRequest, FailureKind, ImageBatchRequest, SceneInfo,
    VideoReceipt, VideoSettings, WorkflowInfo,
};
