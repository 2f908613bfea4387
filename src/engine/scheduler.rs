//! Background sleep cycle.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::consolidate::{CancelToken, ConsolidationScope};
use super::EngineInner;
use crate::config::ConsolidationPolicy;
use crate::types::{MemxError, MemxResult};

const TICK: Duration = Duration::from_millis(100);

/// Periodically consolidates every conversation until stopped.
pub(crate) struct Scheduler {
    cancel: CancelToken,
    handle: Option<JoinHandle<()>>,
}

impl Scheduler {
    pub(crate) fn start(
        inner: Arc<EngineInner>,
        policy: ConsolidationPolicy,
        interval: Duration,
    ) -> MemxResult<Self> {
        let cancel = CancelToken::new();
        let token = cancel.clone();
        let handle = std::thread::Builder::new()
            .name("memx-consolidation".to_string())
            .spawn(move || run_loop(&inner, policy, interval, &token))?;
        log::info!("Background consolidation every {}s", interval.as_secs());
        Ok(Self {
            cancel,
            handle: Some(handle),
        })
    }

    /// Cancel any in-flight batch and wait for the thread to exit.
    pub(crate) fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("Background consolidation thread panicked");
            }
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop(
    inner: &EngineInner,
    policy: ConsolidationPolicy,
    interval: Duration,
    cancel: &CancelToken,
) {
    loop {
        let started = Instant::now();
        while started.elapsed() < interval {
            if cancel.is_cancelled() {
                return;
            }
            std::thread::sleep(TICK.min(interval));
        }

        match inner.consolidate(&ConsolidationScope::All, policy, cancel) {
            Ok(report) if !report.is_empty() || !report.failed.is_empty() => {
                log::info!(
                    "Scheduled consolidation: promoted={} summarized={} pruned={} failed={}",
                    report.promoted,
                    report.summarized,
                    report.pruned,
                    report.failed.len()
                );
            }
            Ok(_) => {}
            Err(MemxError::Cancelled) => return,
            Err(MemxError::ConcurrencyConflict(msg)) => {
                log::debug!("Scheduled consolidation skipped: {msg}");
            }
            Err(e) => log::warn!("Scheduled consolidation failed, will retry: {e}"),
        }
    }
}
