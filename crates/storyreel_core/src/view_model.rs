use crate::GenerationProgress;

/// Snapshot of a tracker for rendering a progress bar.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TrackerView {
    pub is_generating: bool,
    pub progress: GenerationProgress,
    /// `current / total` as a whole percentage, clamped to 100.
    pub percent: u8,
    pub dirty: bool,
}

impl TrackerView {
    pub(crate) fn new(is_generating: bool, progress: GenerationProgress, dirty: bool) -> Self {
        let percent = percent_of(progress.current, progress.total);
        Self {
            is_generating,
            progress,
            percent,
            dirty,
        }
    }
}

fn percent_of(current: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = u64::from(current) * 100 / u64::from(total);
    pct.min(100) as u8
}

#[cfg(test)]
mod tests {
    use super::percent_of;

    #[test]
    fn percent_handles_empty_and_overshoot() {
        assert_eq!(percent_of(0, 0), 0);
        assert_eq!(percent_of(1, 3), 33);
        assert_eq!(percent_of(5, 4), 100);
    }
}
