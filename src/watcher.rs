// watcher.rs - Folder watch mode: one directory, one filename

use crate::compression::{Compressor, Outcome};
use crate::dispatch::UiDispatcher;
use crossbeam_channel::{select, Receiver, Sender};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::io;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Pause before reading a file that was just written.
pub const SETTLE_DELAY: Duration = Duration::from_millis(500);
/// Minimum spacing between two watch-triggered runs.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("watch folder is not set or does not exist: {0}")]
    MissingDirectory(PathBuf),
    #[error("target filename is empty")]
    EmptyFilename,
    #[error("a watch session is already active")]
    AlreadyActive,
    #[error("failed to start watcher: {0}")]
    Notify(#[from] notify::Error),
    #[error("failed to spawn watch worker: {0}")]
    Spawn(io::Error),
}

/// Sent from the watcher thread for every processed file.
#[derive(Debug, Clone)]
pub struct WatchReport {
    pub path: PathBuf,
    pub outcome: Outcome,
}

/// Drops events arriving within `window` of the last accepted one, or of
/// the last [`mark`](Self::mark) if that came later.
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    last: Option<Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    pub fn try_fire(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last {
            if now.saturating_duration_since(last) < self.window {
                return false;
            }
        }
        self.last = Some(now);
        true
    }

    /// Restarts the window at `at`.
    pub fn mark(&mut self, at: Instant) {
        self.last = Some(at);
    }
}

/// Path in `event` whose file name is exactly `target`, for create and
/// overwrite events only.
pub fn matching_path<'a>(event: &'a Event, target: &str) -> Option<&'a Path> {
    let candidates: &[PathBuf] = match event.kind {
        EventKind::Create(_)
        | EventKind::Modify(ModifyKind::Data(_))
        | EventKind::Modify(ModifyKind::Any)
        | EventKind::Modify(ModifyKind::Other)
        | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => &event.paths,
        // Renamed over the target: paths are [from, to].
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => event.paths.get(1..).unwrap_or(&[]),
        _ => return None,
    };

    candidates
        .iter()
        .find(|path| path.file_name().is_some_and(|name| name == target))
        .map(PathBuf::as_path)
}

/// A matching event, stamped when notify delivered it.
#[derive(Debug, Clone)]
struct Trigger {
    path: PathBuf,
    arrived: Instant,
}

/// Runs on notify's thread. Only filters and forwards, so arrival times
/// stay accurate while the worker is busy.
struct EventForwarder {
    target: String,
    triggers: Sender<Trigger>,
}

impl EventForwarder {
    fn forward(&self, event: &Event, arrived: Instant) {
        let Some(path) = matching_path(event, &self.target) else {
            return;
        };
        if path.is_dir() {
            return;
        }
        tracing::trace!(path = %path.display(), kind = ?event.kind, "target event");
        let trigger = Trigger {
            path: path.to_path_buf(),
            arrived,
        };
        if self.triggers.send(trigger).is_err() {
            tracing::debug!("watch worker gone, event dropped");
        }
    }
}

impl notify::EventHandler for EventForwarder {
    fn handle_event(&mut self, event: notify::Result<Event>) {
        match event {
            Ok(event) => self.forward(&event, Instant::now()),
            Err(err) => tracing::warn!(error = %err, "watch error"),
        }
    }
}

/// Settles, processes and reports one trigger at a time.
struct WatchJob {
    output_dir: PathBuf,
    compressor: Compressor,
    debouncer: Debouncer,
    settle: Duration,
    dispatcher: UiDispatcher<WatchReport>,
}

impl WatchJob {
    fn run(mut self, triggers: Receiver<Trigger>, stop: Receiver<()>) {
        loop {
            select! {
                recv(triggers) -> trigger => match trigger {
                    Ok(trigger) => self.handle(trigger),
                    Err(_) => break,
                },
                recv(stop) -> _ => break,
            }
        }
        tracing::debug!("watch worker exited");
    }

    fn handle(&mut self, trigger: Trigger) {
        let Trigger { path, arrived } = trigger;
        if !self.debouncer.try_fire(arrived) {
            tracing::debug!(path = %path.display(), "event inside debounce window, dropped");
            return;
        }

        tracing::info!(path = %path.display(), "target changed");
        if !self.settle.is_zero() {
            thread::sleep(self.settle);
        }
        let outcome = self.compressor.process(&path, &self.output_dir);
        if !self.dispatcher.send(WatchReport { path, outcome }) {
            tracing::warn!("ui queue closed, watch report dropped");
        }
        // Anything that arrived while this run was busy is stale.
        self.debouncer.mark(Instant::now());
    }
}

/// The thread running a [`WatchJob`]. Joined on drop.
struct Worker {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    fn spawn(job: WatchJob, triggers: Receiver<Trigger>) -> Result<Self, WatchError> {
        let (stop, stopped) = crossbeam_channel::bounded(0);
        let thread = thread::Builder::new()
            .name("watch-worker".to_string())
            .spawn(move || job.run(triggers, stopped))
            .map_err(WatchError::Spawn)?;
        Ok(Self {
            stop: Some(stop),
            thread: Some(thread),
        })
    }

    /// Waits for an in-flight run to finish. Triggers still queued may be dropped.
    fn join(&mut self) {
        drop(self.stop.take());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("watch worker panicked");
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.join();
    }
}

#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub directory: PathBuf,
    pub target: String,
    pub output_dir: PathBuf,
}

impl WatchConfig {
    pub fn validate(&self) -> Result<(), WatchError> {
        if !self.directory.is_dir() {
            return Err(WatchError::MissingDirectory(self.directory.clone()));
        }
        if self.target.trim().is_empty() {
            return Err(WatchError::EmptyFilename);
        }
        Ok(())
    }
}

/// An active watch. Dropping or [`stop`](Self::stop)ping it ends the watch.
pub struct WatchSession {
    // Declared first so it drops before the worker is joined.
    watcher: RecommendedWatcher,
    worker: Worker,
    config: WatchConfig,
}

impl std::fmt::Debug for WatchSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchSession")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl WatchSession {
    pub fn start(
        config: WatchConfig,
        compressor: Compressor,
        dispatcher: UiDispatcher<WatchReport>,
    ) -> Result<Self, WatchError> {
        config.validate()?;
        let (triggers, queued) = crossbeam_channel::unbounded();
        let worker = Worker::spawn(
            WatchJob {
                output_dir: config.output_dir.clone(),
                compressor,
                debouncer: Debouncer::new(DEBOUNCE_WINDOW),
                settle: SETTLE_DELAY,
                dispatcher,
            },
            queued,
        )?;
        let forwarder = EventForwarder {
            target: config.target.trim().to_string(),
            triggers,
        };
        let mut watcher = notify::recommended_watcher(forwarder)?;
        watcher.watch(&config.directory, RecursiveMode::NonRecursive)?;
        tracing::info!(
            dir = %config.directory.display(),
            target = %config.target,
            "watch started"
        );
        Ok(Self {
            watcher,
            worker,
            config,
        })
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    /// Unsubscribes, then blocks until a run already in progress has
    /// delivered its report.
    pub fn stop(mut self) {
        if let Err(err) = self.watcher.unwatch(&self.config.directory) {
            tracing::warn!(error = %err, "unwatch failed");
        }
        self.worker.join();
        tracing::info!(dir = %self.config.directory.display(), "watch stopped");
    }
}
