//! Per-attempt download state.

/// Progress of one download attempt.
///
/// Created when an attempt starts and dropped when it ends. The only state
/// that survives an attempt is the staged artifact itself; a later attempt
/// recovers `bytes_written` from its length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadState {
    /// Bytes durably staged so far.
    pub bytes_written: u64,
    /// Advertised artifact size, if known.
    pub expected_total: Option<u64>,
}

impl DownloadState {
    /// Create state for an attempt resuming at `offset`.
    pub fn resume_at(offset: u64, expected_total: Option<u64>) -> Self {
        Self {
            bytes_written: offset,
            expected_total,
        }
    }

    /// Record a durably written chunk.
    pub fn record_chunk(&mut self, len: usize) {
        self.bytes_written += len as u64;
    }

    /// Forget everything staged so far.
    pub fn restart(&mut self) {
        self.bytes_written = 0;
    }

    /// Whether the staged length equals the advertised size.
    pub fn is_complete(&self) -> bool {
        self.expected_total == Some(self.bytes_written)
    }

    /// Progress as a percentage, or `None` when the size is unknown.
    pub fn progress_percent(&self) -> Option<f64> {
        match self.expected_total {
            Some(0) => Some(100.0),
            Some(total) => Some((self.bytes_written as f64 / total as f64) * 100.0),
            None => None,
        }
    }
}

/// Integer percentage of `bytes` out of `total`, capped at 100.
pub fn percent_of(bytes: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    ((bytes.min(total) as u128 * 100) / total as u128) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resume_at_offset() {
        let state = DownloadState::resume_at(512, Some(1024));
        assert_eq!(state.bytes_written, 512);
        assert!(!state.is_complete());
        assert_eq!(state.progress_percent(), Some(50.0));
    }

    #[test]
    fn test_record_and_complete() {
        let mut state = DownloadState::resume_at(0, Some(10));
        state.record_chunk(4);
        state.record_chunk(6);
        assert!(state.is_complete());
        assert_eq!(state.progress_percent(), Some(100.0));
    }

    #[test]
    fn test_restart() {
        let mut state = DownloadState::resume_at(700, Some(1000));
        state.restart();
        assert_eq!(state.bytes_written, 0);
    }

    #[test]
    fn test_unknown_size() {
        let state = DownloadState::resume_at(10, None);
        assert_eq!(state.progress_percent(), None);
        assert!(!state.is_complete());
    }

    #[test]
    fn test_percent_of() {
        assert_eq!(percent_of(0, 1024), 0);
        assert_eq!(percent_of(512, 1024), 50);
        assert_eq!(percent_of(1023, 1024), 99);
        assert_eq!(percent_of(2048, 1024), 100);
        assert_eq!(percent_of(0, 0), 100);
    }
}
