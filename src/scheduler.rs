//! Drives ingestion cycles at a fixed interval, or once.
//!
//! Cancellation is cooperative: a stop request never interrupts a cycle in
//! flight, it only prevents the next one. The inter-cycle sleep is taken in
//! one-second ticks so a request is honored within about a second.
//!
//! A cycle that panics is logged and counted like a failed cycle; the loop
//! carries on to the next one.

use crate::monitor::HealthMonitor;
use crate::pipeline::{IngestionPipeline, RunResult};
use crate::reporter;
use crate::storage::ReviewStore;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn, Instrument, Span};

const SLEEP_TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Running,
    Stopped,
}

/// Cloneable, thread-safe stop flag shared with signal listeners.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct Scheduler {
    pipeline: Arc<IngestionPipeline>,
    monitor: HealthMonitor,
    store: Arc<dyn ReviewStore>,
    target_apps: Vec<String>,
    interval: Duration,
    one_shot: bool,
    stop: StopHandle,
    state: SchedulerState,
    run_count: u64,
    span: Span,
}

impl Scheduler {
    pub fn new(
        pipeline: IngestionPipeline,
        monitor: HealthMonitor,
        store: Arc<dyn ReviewStore>,
        target_apps: Vec<String>,
        interval: Duration,
    ) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            monitor,
            store,
            target_apps,
            interval,
            one_shot: false,
            stop: StopHandle::new(),
            state: SchedulerState::Stopped,
            run_count: 0,
            span: Span::none(),
        }
    }

    /// Exit after the first cycle.
    pub fn one_shot(mut self, one_shot: bool) -> Self {
        self.one_shot = one_shot;
        self
    }

    /// Log every event of this scheduler inside `span`.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn run_count(&self) -> u64 {
        self.run_count
    }

    /// Install SIGINT/SIGTERM listeners, then run until stopped or, in
    /// one-shot mode, until the first cycle completes.
    pub async fn start(&mut self) {
        let listeners = spawn_signal_listeners(self.stop.clone(), self.span.clone());
        self.run_loop().await;
        for listener in listeners {
            listener.abort();
        }
    }

    /// The scheduling loop without signal handling.
    pub async fn run_loop(&mut self) {
        let span = self.span.clone();
        self.run_loop_inner().instrument(span).await
    }

    async fn run_loop_inner(&mut self) {
        self.state = SchedulerState::Running;
        info!(
            interval_secs = self.interval.as_secs(),
            apps = self.target_apps.len(),
            reviews_per_app = self.pipeline.options().count,
            one_shot = self.one_shot,
            "Scheduler starting"
        );

        while !self.stop.is_stop_requested() {
            self.run_count += 1;
            info!("--- Ingestion run #{} ---", self.run_count);

            self.run_cycle().await;

            if self.one_shot {
                info!("One-shot mode: exiting after first run.");
                break;
            }

            info!(
                "Next run in {}s. Press Ctrl+C to stop.",
                self.interval.as_secs()
            );
            self.interruptible_sleep().await;
        }

        self.state = SchedulerState::Stopped;
        info!("Scheduler stopped.");
    }

    /// One pipeline run plus its report. Errors and panics stop here.
    async fn run_cycle(&self) {
        let pipeline = self.pipeline.clone();
        let target_apps = self.target_apps.clone();
        let outcome = tokio::spawn(async move { pipeline.run(&target_apps).await }).await;

        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                error!("Run #{} failed: {}", self.run_count, e);
                return;
            }
            Err(e) if e.is_panic() => {
                error!(
                    "Run #{} panicked: {}",
                    self.run_count,
                    panic_message(e.into_panic().as_ref())
                );
                return;
            }
            Err(e) => {
                error!("Run #{} was cancelled: {}", self.run_count, e);
                return;
            }
        };

        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| self.report(&result))) {
            error!(
                "Reporting run #{} panicked: {}",
                self.run_count,
                panic_message(panic.as_ref())
            );
        }
    }

    /// Run summary, database snapshot, then health evaluation and alerts.
    fn report(&self, result: &RunResult) {
        let run_text = reporter::format_run(result);
        println!("{run_text}");
        info!("{}", run_text);

        match self.store.stats() {
            Ok(stats) => {
                let stats_text = reporter::format_db_stats(&stats);
                println!("{stats_text}");
                info!("{}", stats_text);
            }
            Err(e) => warn!("Database snapshot unavailable: {}", e),
        }

        let health = self.monitor.evaluate_run(result);
        // Failure is already logged by the monitor.
        let _ = self.monitor.store_report(&health);

        let alert_text = reporter::format_alerts(&health);
        println!("{alert_text}");
        if health.is_healthy() {
            info!("{}", alert_text);
        } else {
            warn!("{}", alert_text);
        }
    }

    async fn interruptible_sleep(&self) {
        let deadline = Instant::now() + self.interval;
        while !self.stop.is_stop_requested() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            tokio::time::sleep((deadline - now).min(SLEEP_TICK)).await;
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn spawn_signal_listeners(stop: StopHandle, span: Span) -> Vec<JoinHandle<()>> {
    let mut listeners = Vec::new();

    let ctrl_c_stop = stop.clone();
    listeners.push(tokio::spawn(
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received. Will stop after current operation completes.");
                ctrl_c_stop.request_stop();
            }
        }
        .instrument(span.clone()),
    ));

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => listeners.push(tokio::spawn(
                async move {
                    if sigterm.recv().await.is_some() {
                        info!("SIGTERM received. Will stop after current operation completes.");
                        stop.request_stop();
                    }
                }
                .instrument(span),
            )),
            Err(e) => warn!("Could not install SIGTERM handler: {}", e),
        }
    }

    listeners
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_handle_is_shared_between_clones() {
        let handle = StopHandle::new();
        let clone = handle.clone();
        assert!(!clone.is_stop_requested());
        handle.request_stop();
        assert!(clone.is_stop_requested());
    }

    #[test]
    fn test_panic_message_reads_str_and_string_payloads() {
        let from_str = std::panic::catch_unwind(|| panic!("plain")).unwrap_err();
        assert_eq!(panic_message(from_str.as_ref()), "plain");

        let from_string = std::panic::catch_unwind(|| panic!("run {}", 7)).unwrap_err();
        assert_eq!(panic_message(from_string.as_ref()), "run 7");

        let other = std::panic::catch_unwind(|| std::panic::panic_any(42u8)).unwrap_err();
        assert_eq!(panic_message(other.as_ref()), "non-string panic payload");
    }
}
