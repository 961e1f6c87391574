//! Running the packager on a background thread.
//!
//! The worker owns a snapshot of the project and talks to the controller
//! only through channels: an unbounded event channel for progress and log
//! lines, and a one-shot channel for the outcome. The live project is never
//! shared; the controller applies the returned updates itself.

use super::{LogSink, PackageOutcome, Packager, PackagingServices, ProgressSink};
use crate::config::PackageOptions;
use crate::error::{PackError, Result};
use crate::project::Project;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, WeakUnboundedSender};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkerEvent {
    Progress(u8),
    Log(String),
}

struct ChannelSink {
    events: UnboundedSender<WorkerEvent>,
}

impl LogSink for ChannelSink {
    fn log(&self, line: &str) {
        // The controller may already be gone after a detached cancel.
        let _ = self.events.send(WorkerEvent::Log(line.to_string()));
    }
}

impl ProgressSink for ChannelSink {
    fn progress(&self, percent: u8) {
        let _ = self.events.send(WorkerEvent::Progress(percent));
    }
}

/// Handle on a running packaging worker.
pub struct PackagingTask {
    events: UnboundedReceiver<WorkerEvent>,
    outcome: oneshot::Receiver<Result<PackageOutcome>>,
    cancel: CancellationToken,
    canceler: CancelHandle,
    handle: JoinHandle<()>,
}

/// Cancels a worker from another thread, e.g. a signal handler.
///
/// Canceling also posts a log line so that a controller blocked in
/// [`PackagingTask::next_event`] wakes up while a write is still running.
#[derive(Clone)]
pub struct CancelHandle {
    token: CancellationToken,
    events: WeakUnboundedSender<WorkerEvent>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.token.cancel();
        if let Some(events) = self.events.upgrade() {
            let _ = events.send(WorkerEvent::Log("Canceling...".to_string()));
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Start packaging `project` on a dedicated thread.
pub fn spawn(
    project: Project,
    options: PackageOptions,
    services: PackagingServices,
) -> Result<PackagingTask> {
    let (events_tx, events) = mpsc::unbounded_channel();
    let (outcome_tx, outcome) = oneshot::channel();
    let cancel = CancellationToken::new();
    let worker_cancel = cancel.clone();
    let canceler = CancelHandle {
        token: cancel.clone(),
        events: events_tx.downgrade(),
    };

    let handle = thread::Builder::new()
        .name("gpkg-packager".to_string())
        .spawn(move || {
            let sink = ChannelSink { events: events_tx };
            let result = Packager::new(services).run(&project, &options, &worker_cancel, &sink);
            if let Err(err) = &result {
                tracing::error!(error = %err, "packaging failed");
            }
            let _ = outcome_tx.send(result);
        })?;

    Ok(PackagingTask {
        events,
        outcome,
        cancel,
        canceler,
        handle,
    })
}

impl PackagingTask {
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.canceler.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Block until the next event. `None` once the worker has stopped and
    /// every event has been taken.
    pub fn next_event(&mut self) -> Option<WorkerEvent> {
        self.events.blocking_recv()
    }

    /// Wait for the worker, feeding every event to `on_event` as it arrives.
    pub fn pump(mut self, mut on_event: impl FnMut(WorkerEvent)) -> Result<PackageOutcome> {
        while let Some(event) = self.next_event() {
            on_event(event);
        }
        self.finish()
    }

    /// Join the worker and take its outcome.
    pub fn finish(mut self) -> Result<PackageOutcome> {
        if self.handle.join().is_err() {
            return Err(PackError::WorkerPanicked);
        }
        self.outcome.try_recv().map_err(|_| PackError::WorkerPanicked)?
    }

    /// Cancel and wait at most `timeout` for the worker to stop. A worker
    /// still busy after that is detached and `None` is returned.
    pub fn cancel_and_wait(self, timeout: Duration) -> Option<Result<PackageOutcome>> {
        self.cancel.cancel();
        let deadline = Instant::now() + timeout;
        while !self.is_finished() {
            if Instant::now() >= deadline {
                tracing::warn!("packaging worker did not stop in time, detaching it");
                return None;
            }
            thread::sleep(POLL_INTERVAL);
        }
        Some(self.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::{LayerType, MapLayer, TransformContext};
    use crate::provider::{ProviderInfo, ProviderOptions, ProviderRegistry};
    use crate::writer::LayerWriter;
    use std::path::Path;
    use std::sync::mpsc as std_mpsc;
    use std::sync::{Arc, Mutex};

    struct AlwaysValid;

    impl ProviderRegistry for AlwaysValid {
        fn probe(
            &self,
            _provider: &str,
            _layer_type: LayerType,
            _source: &str,
            _options: &ProviderOptions,
        ) -> Result<ProviderInfo> {
            Ok(ProviderInfo {
                valid: true,
                raster_size: None,
                extent: None,
            })
        }
    }

    enum Behavior {
        Immediate,
        /// Signals `started`, then blocks until `release` fires.
        Gate {
            started: std_mpsc::Sender<()>,
            release: Mutex<std_mpsc::Receiver<()>>,
        },
        Panic,
    }

    struct TestWriter(Behavior);

    impl LayerWriter for TestWriter {
        fn write_vector(
            &self,
            _: &MapLayer,
            _: &Path,
            _: &str,
            _: &TransformContext,
        ) -> Result<()> {
            match &self.0 {
                Behavior::Immediate => Ok(()),
                Behavior::Gate { started, release } => {
                    started.send(()).unwrap();
                    release.lock().unwrap().recv().unwrap();
                    Ok(())
                }
                Behavior::Panic => panic!("writer exploded"),
            }
        }

        fn write_raster(
            &self,
            layer: &MapLayer,
            container: &Path,
            table: &str,
            tc: &TransformContext,
        ) -> Result<()> {
            self.write_vector(layer, container, table, tc)
        }
    }

    /// A writer that holds its first write open, with the ends to drive it.
    fn gate() -> (Behavior, std_mpsc::Receiver<()>, std_mpsc::Sender<()>) {
        let (started_tx, started_rx) = std_mpsc::channel();
        let (release_tx, release_rx) = std_mpsc::channel();
        let behavior = Behavior::Gate {
            started: started_tx,
            release: Mutex::new(release_rx),
        };
        (behavior, started_rx, release_tx)
    }

    fn start(behavior: Behavior, dir: &Path) -> PackagingTask {
        let mut project = Project::new("p");
        project.add_map_layer(
            MapLayer::open("Roads", LayerType::Vector, "ogr", "roads.gpkg", &AlwaysValid),
            true,
        );
        let options = PackageOptions {
            container: dir.join("out.gpkg"),
            embed_project: false,
            project_name: None,
        };
        let services = PackagingServices {
            writer: Arc::new(TestWriter(behavior)),
            registry: Arc::new(AlwaysValid),
            ..PackagingServices::default()
        };
        spawn(project, options, services).unwrap()
    }

    #[test]
    fn pump_forwards_events_and_returns_the_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let task = start(Behavior::Immediate, dir.path());

        let mut events = Vec::new();
        let outcome = task.pump(|event| events.push(event)).unwrap();

        let PackageOutcome::Completed { updates, report } = outcome else {
            panic!("packaging was canceled");
        };
        assert_eq!(report.processed, vec!["Roads".to_string()]);
        assert_eq!(updates.len(), 1);
        assert_eq!(events.last(), Some(&WorkerEvent::Progress(100)));
        assert!(events.contains(&WorkerEvent::Log("Successfully packaged Roads".to_string())));
    }

    #[test]
    fn cancel_during_a_write_yields_canceled() {
        let dir = tempfile::tempdir().unwrap();
        let (behavior, started, release) = gate();
        let mut task = start(behavior, dir.path());

        started.recv().unwrap();
        task.cancel_handle().cancel();
        release.send(()).unwrap();

        let mut events = Vec::new();
        while let Some(event) = task.next_event() {
            events.push(event);
        }
        assert!(events.contains(&WorkerEvent::Log("Successfully packaged Roads".to_string())));
        assert!(events.contains(&WorkerEvent::Log("Canceling...".to_string())));
        assert!(!events.contains(&WorkerEvent::Progress(100)));
        assert_eq!(task.finish().unwrap(), PackageOutcome::Canceled);
    }

    #[test]
    fn slow_workers_are_detached() {
        let dir = tempfile::tempdir().unwrap();
        let (behavior, started, release) = gate();
        let task = start(behavior, dir.path());

        started.recv().unwrap();
        assert!(task.cancel_and_wait(Duration::from_millis(10)).is_none());
        release.send(()).unwrap();
    }

    #[test]
    fn worker_panics_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let task = start(Behavior::Panic, dir.path());
        assert!(matches!(task.pump(|_| {}), Err(PackError::WorkerPanicked)));
    }
}
