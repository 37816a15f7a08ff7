//! Demo loop controller.
//!
//! Runs the workload on a fixed interval and forces a telemetry flush after
//! every iteration, so each iteration's spans, metrics and logs reach the
//! backend before the next one starts.
//!
//! ```text
//! Running ──> Sleeping ──> Running ──> ... ──> Draining
//!    │                                            ^
//!    └── max_iterations reached / shutdown ───────┘
//! ```

use std::future::Future;
use std::time::Duration;

use otel_demo_telemetry::TelemetryProviders;
use tokio::sync::watch;
use tracing::{Instrument, error, info, info_span, warn};

use crate::config::LoopConfig;
use crate::workload::Workload;

/// Forces buffered telemetry out.
pub trait TelemetryFlush {
    /// Returns `true` when everything was flushed. Never fails.
    fn flush(&self) -> impl Future<Output = bool> + Send;
}

impl TelemetryFlush for TelemetryProviders {
    fn flush(&self) -> impl Future<Output = bool> + Send {
        TelemetryProviders::flush(self)
    }
}

/// Phase of the demo loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Sleeping,
    Draining,
}

/// Iteration bookkeeping, owned by the loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoLoopState {
    iteration: u64,
    max_iterations: u64,
    interval: Duration,
    state: LoopState,
}

impl DemoLoopState {
    pub fn new(config: &LoopConfig) -> Self {
        Self {
            iteration: 0,
            max_iterations: config.max_iterations,
            interval: config.interval(),
            state: LoopState::Running,
        }
    }

    /// Iterations started so far.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Whether the configured bound has been reached. Unbounded loops never
    /// finish on their own.
    pub fn finished(&self) -> bool {
        self.max_iterations > 0 && self.iteration >= self.max_iterations
    }

    fn begin_iteration(&mut self) -> u64 {
        self.state = LoopState::Running;
        self.iteration += 1;
        self.iteration
    }
}

/// Outcome of a demo run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopSummary {
    pub iterations: u64,
    pub failures: u64,
    pub flushes: u64,
    pub failed_flushes: u64,
    pub stopped_by_signal: bool,
}

/// Sequential workload driver.
#[derive(Debug)]
pub struct DemoLoop {
    state: DemoLoopState,
}

impl DemoLoop {
    pub fn new(config: &LoopConfig) -> Self {
        Self {
            state: DemoLoopState::new(config),
        }
    }

    pub fn state(&self) -> &DemoLoopState {
        &self.state
    }

    /// Drive `workload` until the iteration bound is reached or `shutdown`
    /// turns `true`, then flush one last time.
    ///
    /// A failed iteration is logged and counted; the loop carries on.
    /// Shutdown is observed between iterations and while sleeping; an
    /// iteration already in flight is allowed to finish.
    pub async fn run<W, F>(
        &mut self,
        workload: &mut W,
        flusher: &F,
        mut shutdown: watch::Receiver<bool>,
    ) -> LoopSummary
    where
        W: Workload,
        F: TelemetryFlush,
    {
        let mut summary = LoopSummary::default();

        info!(
            interval_ms = self.state.interval.as_millis() as u64,
            max_iterations = self.state.max_iterations,
            "Starting demo loop"
        );

        loop {
            if *shutdown.borrow() {
                info!("Shutdown signal received, stopping demo loop");
                summary.stopped_by_signal = true;
                break;
            }

            let iteration = self.state.begin_iteration();
            let span = info_span!("demo.iteration", iteration);

            match workload.run_once().instrument(span).await {
                Ok(()) => info!(iteration, "Iteration complete"),
                Err(e) => {
                    summary.failures += 1;
                    error!(iteration, error = %e, "Iteration failed");
                }
            }
            summary.iterations += 1;

            Self::flush(flusher, &mut summary).await;

            if self.state.finished() {
                break;
            }

            self.state.state = LoopState::Sleeping;
            let sleep = tokio::time::sleep(self.state.interval);
            tokio::pin!(sleep);

            tokio::select! {
                _ = &mut sleep => {}
                changed = shutdown.changed() => {
                    // Sender gone: no signal can arrive any more.
                    if changed.is_err() {
                        sleep.await;
                    }
                }
            }
        }

        self.state.state = LoopState::Draining;
        info!(
            iterations = summary.iterations,
            failures = summary.failures,
            "Demo loop finished, flushing telemetry"
        );
        Self::flush(flusher, &mut summary).await;

        summary
    }

    async fn flush<F: TelemetryFlush>(flusher: &F, summary: &mut LoopSummary) {
        summary.flushes += 1;
        if !flusher.flush().await {
            summary.failed_flushes += 1;
            warn!("Telemetry flush incomplete");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DemoError, Result};
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Workload that fails on the listed iterations (1-based).
    struct ScriptedWorkload {
        runs: u64,
        fail_on: Vec<u64>,
    }

    impl Workload for ScriptedWorkload {
        async fn run_once(&mut self) -> Result<()> {
            self.runs += 1;
            if self.fail_on.contains(&self.runs) {
                Err(DemoError::validation("scripted failure"))
            } else {
                Ok(())
            }
        }
    }

    #[derive(Default)]
    struct CountingFlush {
        calls: AtomicU64,
        fail: bool,
    }

    impl TelemetryFlush for CountingFlush {
        async fn flush(&self) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            !self.fail
        }
    }

    fn loop_config(interval_ms: u64, max_iterations: u64) -> LoopConfig {
        LoopConfig {
            interval_ms,
            max_iterations,
        }
    }

    #[tokio::test]
    async fn test_bounded_loop_flushes_each_iteration_and_on_drain() {
        let (_tx, rx) = watch::channel(false);
        let mut workload = ScriptedWorkload {
            runs: 0,
            fail_on: vec![],
        };
        let flush = CountingFlush::default();
        let mut demo = DemoLoop::new(&loop_config(1, 3));

        let summary = demo.run(&mut workload, &flush, rx).await;

        assert_eq!(workload.runs, 3);
        assert_eq!(flush.calls.load(Ordering::SeqCst), 4);
        assert_eq!(
            summary,
            LoopSummary {
                iterations: 3,
                failures: 0,
                flushes: 4,
                failed_flushes: 0,
                stopped_by_signal: false,
            }
        );
        assert_eq!(demo.state().state(), LoopState::Draining);
        assert!(demo.state().finished());
    }

    #[tokio::test]
    async fn test_failed_iteration_does_not_stop_the_loop() {
        let (_tx, rx) = watch::channel(false);
        let mut workload = ScriptedWorkload {
            runs: 0,
            fail_on: vec![2],
        };
        let flush = CountingFlush::default();

        let summary = DemoLoop::new(&loop_config(1, 3))
            .run(&mut workload, &flush, rx)
            .await;

        assert_eq!(workload.runs, 3);
        assert_eq!(summary.failures, 1);
        assert_eq!(summary.flushes, 4);
    }

    #[tokio::test]
    async fn test_failed_flush_is_counted_not_fatal() {
        let (_tx, rx) = watch::channel(false);
        let mut workload = ScriptedWorkload {
            runs: 0,
            fail_on: vec![],
        };
        let flush = CountingFlush {
            fail: true,
            ..Default::default()
        };

        let summary = DemoLoop::new(&loop_config(1, 2))
            .run(&mut workload, &flush, rx)
            .await;

        assert_eq!(summary.iterations, 2);
        assert_eq!(summary.failed_flushes, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_sleep_after_last_iteration() {
        let (_tx, rx) = watch::channel(false);
        let mut workload = ScriptedWorkload {
            runs: 0,
            fail_on: vec![],
        };
        let flush = CountingFlush::default();
        let start = tokio::time::Instant::now();

        DemoLoop::new(&loop_config(60_000, 2))
            .run(&mut workload, &flush, rx)
            .await;

        // One pause between two iterations, none after the last.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(60));
        assert!(elapsed < Duration::from_secs(120));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_while_sleeping_still_drains() {
        struct SignallingWorkload {
            runs: Arc<Mutex<u64>>,
            tx: watch::Sender<bool>,
        }

        impl Workload for SignallingWorkload {
            async fn run_once(&mut self) -> Result<()> {
                *self.runs.lock() += 1;
                let _ = self.tx.send(true);
                Ok(())
            }
        }

        let (tx, rx) = watch::channel(false);
        let runs = Arc::new(Mutex::new(0));
        let mut workload = SignallingWorkload {
            runs: runs.clone(),
            tx,
        };
        let flush = CountingFlush::default();

        let summary = DemoLoop::new(&loop_config(3_600_000, 0))
            .run(&mut workload, &flush, rx)
            .await;

        assert_eq!(*runs.lock(), 1);
        assert!(summary.stopped_by_signal);
        assert_eq!(summary.flushes, 2);
    }

    #[tokio::test]
    async fn test_shutdown_before_start_only_drains() {
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();
        let mut workload = ScriptedWorkload {
            runs: 0,
            fail_on: vec![],
        };
        let flush = CountingFlush::default();

        let summary = DemoLoop::new(&loop_config(1, 0))
            .run(&mut workload, &flush, rx)
            .await;

        assert_eq!(workload.runs, 0);
        assert_eq!(summary.flushes, 1);
        assert!(summary.stopped_by_signal);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_sender_keeps_pacing() {
        let (tx, rx) = watch::channel(false);
        drop(tx);
        let mut workload = ScriptedWorkload {
            runs: 0,
            fail_on: vec![],
        };
        let flush = CountingFlush::default();
        let start = tokio::time::Instant::now();

        let summary = DemoLoop::new(&loop_config(1_000, 3))
            .run(&mut workload, &flush, rx)
            .await;

        assert_eq!(summary.iterations, 3);
        assert!(!summary.stopped_by_signal);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(2));
        assert!(elapsed < Duration::from_secs(3));
    }
}
