//! Background polling: a live-sync loop that re-reads config every cycle so
//! interval and on/off changes take effect without a restart, and a debouncer
//! that keeps keystroke bursts from triggering a re-rank per character.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::load_config;
use crate::dashboard::refresh;
use crate::feed::FeedClient;
use crate::state::DashboardState;
use crate::text::fold;

/// Delay between the last keystroke and the re-rank it triggers.
pub const DEBOUNCE_MS: u64 = 160;

/// Poll the feeds forever. Each cycle reloads config, so toggling
/// `liveSync` or changing `pollIntervalSecs` in the file is picked up on
/// the next tick. Refresh failures are logged and the loop keeps going.
pub async fn run_live_sync(state: Arc<DashboardState>, client: FeedClient) {
    log::info!("Poller: live sync loop started");
    loop {
        let config = match load_config() {
            Ok(c) => c,
            Err(e) => {
                log::warn!("Poller: config reload failed: {}", e);
                tokio::time::sleep(Duration::from_secs(25)).await;
                continue;
            }
        };
        tokio::time::sleep(Duration::from_secs(config.poll_interval_secs.max(1))).await;
        if !config.live_sync {
            continue;
        }
        match refresh(&state, &client, &config, true).await {
            Ok(summary) => {
                log::info!(
                    "Poller: synced {} rows ({} dropped)",
                    summary.row_count,
                    summary.dropped
                );
            }
            Err(e) => {
                log::warn!("Poller: refresh failed: {}", e);
            }
        }
    }
}

/// Trailing-edge debouncer for search input. Each call bumps a sequence
/// number; after the window has elapsed, only the call that still holds the
/// latest number wins, and it returns the folded query.
#[derive(Default)]
pub struct SearchDebouncer {
    seq: AtomicU64,
}

impl SearchDebouncer {
    pub fn new() -> Self {
        SearchDebouncer::default()
    }

    /// Wait out the debounce window. Returns `Some(folded_input)` if no newer
    /// keystroke arrived while waiting, `None` if this call was superseded.
    pub async fn settle(&self, input: &str) -> Option<String> {
        let my_seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(Duration::from_millis(DEBOUNCE_MS)).await;
        if self.seq.load(Ordering::SeqCst) == my_seq {
            Some(fold(input))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_debouncer_passes_lone_input() {
        let debouncer = SearchDebouncer::new();
        let settled = debouncer.settle("  Ana  GOMEZ ").await;
        assert_eq!(settled.as_deref(), Some("ana gomez"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_debouncer_drops_superseded_input() {
        let debouncer = Arc::new(SearchDebouncer::new());

        let first = {
            let d = Arc::clone(&debouncer);
            tokio::spawn(async move { d.settle("an").await })
        };
        // Second keystroke lands inside the first call's window.
        tokio::time::sleep(Duration::from_millis(DEBOUNCE_MS / 2)).await;
        let second = {
            let d = Arc::clone(&debouncer);
            tokio::spawn(async move { d.settle("ana").await })
        };

        assert_eq!(first.await.unwrap(), None);
        assert_eq!(second.await.unwrap().as_deref(), Some("ana"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_debouncer_sequential_inputs_both_pass() {
        let debouncer = SearchDebouncer::new();
        assert!(debouncer.settle("first").await.is_some());
        assert!(debouncer.settle("second").await.is_some());
    }
}
