//! Progress-callback trait for per-provider ensemble events.
//!
//! Inject an [`Arc<dyn EnsembleProgressCallback>`] via
//! [`crate::config::EnsembleConfigBuilder::progress_callback`] to receive
//! events as each extraction backend and then the judge are called.
//!
//! # Example
//!
//! ```rust
//! use receipt2latex::{EnsembleConfig, EnsembleProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: Arc<AtomicUsize>,
//! }
//!
//! impl EnsembleProgressCallback for CountingCallback {
//!     fn on_extraction_complete(&self, index: usize, provider_id: &str, text_len: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("#{index} {provider_id}: {text_len} chars");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     completed: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = EnsembleConfig::builder()
//!     .progress_callback(counter as Arc<dyn EnsembleProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the orchestrator as the run progresses.
///
/// Implementations must be `Send + Sync`: extraction calls run concurrently
/// unless the config asks for sequential mode, so the extraction events may
/// arrive from different tasks and out of order. All methods default to
/// no-ops.
pub trait EnsembleProgressCallback: Send + Sync {
    /// Called once, before any provider is contacted.
    fn on_run_start(&self, total_providers: usize) {
        let _ = total_providers;
    }

    /// Called just before the request for backend `index` (1-based) is sent.
    fn on_extraction_start(&self, index: usize, provider_id: &str) {
        let _ = (index, provider_id);
    }

    /// Called when backend `index` returned a candidate.
    fn on_extraction_complete(&self, index: usize, provider_id: &str, text_len: usize) {
        let _ = (index, provider_id, text_len);
    }

    /// Called when backend `index` failed.
    fn on_extraction_error(&self, index: usize, provider_id: &str, error: &str) {
        let _ = (index, provider_id, error);
    }

    /// Called before the judge request, with the number of options shown.
    fn on_judge_start(&self, candidates: usize) {
        let _ = candidates;
    }

    /// Called once at the end. `winner` is the 1-based configured index of
    /// the backend the judge's answer was attributed to, if any.
    fn on_run_complete(&self, successful: usize, total: usize, winner: Option<usize>) {
        let _ = (successful, total, winner);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl EnsembleProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::EnsembleConfig`].
pub type ProgressCallback = Arc<dyn EnsembleProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        winner: AtomicUsize,
    }

    impl EnsembleProgressCallback for TrackingCallback {
        fn on_extraction_start(&self, _index: usize, _provider_id: &str) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_extraction_complete(&self, _index: usize, _provider_id: &str, _len: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_extraction_error(&self, _index: usize, _provider_id: &str, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_run_complete(&self, _successful: usize, _total: usize, winner: Option<usize>) {
            self.winner.store(winner.unwrap_or(0), Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_run_start(3);
        cb.on_extraction_start(1, "a");
        cb.on_extraction_complete(1, "a", 42);
        cb.on_extraction_error(2, "b", "timeout");
        cb.on_judge_start(3);
        cb.on_run_complete(2, 3, None);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_extraction_start(1, "a");
        tracker.on_extraction_complete(1, "a", 100);
        tracker.on_extraction_start(2, "b");
        tracker.on_extraction_error(2, "b", "HTTP 500");
        tracker.on_run_complete(1, 2, Some(1));

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.winner.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_run_start(1);
        cb.on_judge_start(1);
    }
}
