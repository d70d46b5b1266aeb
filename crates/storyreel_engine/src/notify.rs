use std::sync::mpsc;

use reel_logging::{reel_debug, reel_error, reel_info, reel_warn};
use storyreel_core::{Notice, NoticeLevel};

/// Receives user-facing notifications from a tracker.
pub trait NoticeSink: Send + Sync {
    fn notify(&self, source: &str, notice: Notice);
}

/// Writes notices to the log at a level matching their severity.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNoticeSink;

impl NoticeSink for LogNoticeSink {
    fn notify(&self, source: &str, notice: Notice) {
        match notice.level() {
            NoticeLevel::Success | NoticeLevel::Info => reel_info!("[{}] {}", source, notice),
            NoticeLevel::Warning => reel_warn!("[{}] {}", source, notice),
            NoticeLevel::Error => reel_error!("[{}] {}", source, notice),
        }
    }
}

/// Forwards notices to a channel, tagged with the tracker label.
pub struct ChannelNoticeSink {
    tx: mpsc::Sender<(String, Notice)>,
}

impl ChannelNoticeSink {
    pub fn new(tx: mpsc::Sender<(String, Notice)>) -> Self {
        Self { tx }
    }
}

impl NoticeSink for ChannelNoticeSink {
    fn notify(&self, source: &str, notice: Notice) {
        if let Err(mpsc::SendError((_, notice))) = self.tx.send((source.to_string(), notice)) {
            reel_debug!("[{}] Notice dropped, receiver gone: {}", source, notice);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_sink_tags_notices_and_survives_closed_receiver() {
        let (tx, rx) = mpsc::channel();
        let sink = ChannelNoticeSink::new(tx);
        sink.notify("audio", Notice::Completed);
        assert_eq!(rx.recv().unwrap(), ("audio".to_string(), Notice::Completed));

        drop(rx);
        sink.notify("audio", Notice::Cancelled);
    }
}
