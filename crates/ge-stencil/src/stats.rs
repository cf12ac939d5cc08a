use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for the stencil upload path.
///
/// Updated from the GPU thread; safe to read from elsewhere for telemetry.
#[derive(Debug, Default)]
pub struct StencilStats {
    notifications: AtomicU64,
    untracked: AtomicU64,
    unsupported_format: AtomicU64,
    unreadable: AtomicU64,
    zero_skips: AtomicU64,
    clears: AtomicU64,
    replays: AtomicU64,
    aborted_replays: AtomicU64,
    upload_failures: AtomicU64,
    passes: AtomicU64,
    missing_attachments: AtomicU64,
}

impl StencilStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_notifications(&self) {
        self.notifications.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_untracked(&self) {
        self.untracked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_unsupported_format(&self) {
        self.unsupported_format.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_unreadable(&self) {
        self.unreadable.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_zero_skips(&self) {
        self.zero_skips.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_clears(&self) {
        self.clears.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_aborted_replays(&self) {
        self.aborted_replays.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_upload_failures(&self) {
        self.upload_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_missing_attachments(&self) {
        self.missing_attachments.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one completed replay of `passes` draws.
    pub fn record_replay(&self, passes: u32) {
        self.replays.fetch_add(1, Ordering::Relaxed);
        self.passes.fetch_add(u64::from(passes), Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StencilStatsSnapshot {
        StencilStatsSnapshot {
            notifications: self.notifications.load(Ordering::Relaxed),
            untracked: self.untracked.load(Ordering::Relaxed),
            unsupported_format: self.unsupported_format.load(Ordering::Relaxed),
            unreadable: self.unreadable.load(Ordering::Relaxed),
            zero_skips: self.zero_skips.load(Ordering::Relaxed),
            clears: self.clears.load(Ordering::Relaxed),
            replays: self.replays.load(Ordering::Relaxed),
            aborted_replays: self.aborted_replays.load(Ordering::Relaxed),
            upload_failures: self.upload_failures.load(Ordering::Relaxed),
            passes: self.passes.load(Ordering::Relaxed),
            missing_attachments: self.missing_attachments.load(Ordering::Relaxed),
        }
    }

    /// Returns a JSON object as a string.
    pub fn to_json(&self) -> String {
        self.snapshot().to_json()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StencilStatsSnapshot {
    pub notifications: u64,
    pub untracked: u64,
    pub unsupported_format: u64,
    pub unreadable: u64,
    pub zero_skips: u64,
    pub clears: u64,
    pub replays: u64,
    pub aborted_replays: u64,
    pub upload_failures: u64,
    pub passes: u64,
    pub missing_attachments: u64,
}

impl StencilStatsSnapshot {
    pub fn to_json(self) -> String {
        // Hand-built to keep the GPU thread allocation-light.
        format!(
            "{{\"notifications\":{},\"untracked\":{},\"unsupported_format\":{},\"unreadable\":{},\"zero_skips\":{},\"clears\":{},\"replays\":{},\"aborted_replays\":{},\"upload_failures\":{},\"passes\":{},\"missing_attachments\":{}}}",
            self.notifications,
            self.untracked,
            self.unsupported_format,
            self.unreadable,
            self.zero_skips,
            self.clears,
            self.replays,
            self.aborted_replays,
            self.upload_failures,
            self.passes,
            self.missing_attachments,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_json_contains_counters() {
        let stats = StencilStats::new();
        stats.inc_notifications();
        stats.inc_notifications();
        stats.inc_zero_skips();
        stats.record_replay(3);
        stats.record_replay(2);

        let snap = stats.snapshot();
        assert_eq!(snap.notifications, 2);
        assert_eq!(snap.replays, 2);
        assert_eq!(snap.passes, 5);

        let json = stats.to_json();
        assert!(json.starts_with('{') && json.ends_with('}'));
        assert!(json.contains("\"notifications\":2"));
        assert!(json.contains("\"zero_skips\":1"));
        assert!(json.contains("\"passes\":5"));
        assert!(json.contains("\"untracked\":0"));
    }
}
