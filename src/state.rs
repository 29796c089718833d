use crate::batch::{
    Admission, Batch, BatchError, BatchItem, BatchSummary, LogLine, LogStatus, PendingFiles,
};
use crate::compression::{display_name, BelowThreshold, Compressor, Outcome};
use crate::config::{Config, ConfigStore};
use crate::dispatch::{self, UiDispatcher, UiQueue};
use crate::watcher::{WatchConfig, WatchError, WatchReport, WatchSession};
use std::path::PathBuf;

#[derive(Debug)]
pub enum BatchProgress {
    Next(BatchItem),
    Finished {
        summary: BatchSummary,
        output_dir: PathBuf,
    },
}

/// Everything the UI shell mutates, owned in one place.
pub struct AppState {
    store: ConfigStore,
    config: Config,
    pending: PendingFiles,
    log: Vec<LogLine>,
    status: String,
    batch: Option<Batch>,
    active_row: Option<usize>,
    watch: Option<WatchSession>,
    dispatcher: UiDispatcher<WatchReport>,
    reports: UiQueue<WatchReport>,
}

impl AppState {
    pub fn new(store: ConfigStore) -> Self {
        let config = store.load();
        let (dispatcher, reports) = dispatch::channel();
        Self {
            store,
            config,
            pending: PendingFiles::default(),
            log: Vec::new(),
            status: String::from("Select or drop image files to compress."),
            batch: None,
            active_row: None,
            watch: None,
            dispatcher,
            reports,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn pending(&self) -> &PendingFiles {
        &self.pending
    }

    pub fn log(&self) -> &[LogLine] {
        &self.log
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn is_batch_running(&self) -> bool {
        self.batch.is_some()
    }

    pub fn is_watching(&self) -> bool {
        self.watch.is_some()
    }

    pub fn compressor(&self) -> Compressor {
        Compressor::new(self.config.compression_options())
    }

    /// The compressor the running batch was started with.
    pub fn batch_compressor(&self) -> Option<Compressor> {
        self.batch.as_ref().map(|batch| batch.compressor().clone())
    }

    pub fn add_files(&mut self, paths: impl IntoIterator<Item = PathBuf>) {
        for path in paths {
            let name = display_name(&path);
            match self.pending.add(path) {
                Admission::Queued => self.log.push(LogLine::new(LogStatus::Queued, name)),
                Admission::Unsupported => {
                    self.log.push(LogLine::new(LogStatus::Unsupported, name))
                }
                Admission::Duplicate => {}
            }
        }
    }

    pub fn clear(&mut self) {
        if self.is_batch_running() {
            return;
        }
        self.pending.clear();
        self.log.clear();
    }

    pub fn set_save_directory(&mut self, dir: PathBuf) {
        tracing::info!(dir = %dir.display(), "save directory changed");
        self.config.save_directory = dir;
        self.store.persist(&self.config);
    }

    /// Ignored while a watch is active.
    pub fn set_watch_directory(&mut self, dir: PathBuf) -> bool {
        if self.is_watching() {
            return false;
        }
        tracing::info!(dir = %dir.display(), "watch directory changed");
        self.config.watch_directory = dir;
        self.store.persist(&self.config);
        true
    }

    /// Ignored while a watch is active. Persisted when a watch starts.
    pub fn set_target_filename(&mut self, name: String) -> bool {
        if self.is_watching() {
            return false;
        }
        self.config.target_filename = name;
        true
    }

    /// Ignored while a batch or watch is running, since both captured the
    /// policy when they started.
    pub fn set_below_threshold(&mut self, policy: BelowThreshold) -> bool {
        if self.is_batch_running() || self.is_watching() {
            return false;
        }
        self.config.below_threshold = policy;
        self.store.persist(&self.config);
        true
    }

    pub fn start_batch(&mut self) -> Result<BatchItem, BatchError> {
        let mut batch =
            Batch::prepare(&self.pending, &self.config.save_directory, self.compressor())?;
        tracing::info!(files = batch.files().len(), dir = %batch.output_dir().display(), "batch started");
        self.log.clear();
        self.status = String::from("Compressing...");
        let first = batch.next_item().ok_or(BatchError::NoFiles)?;
        self.push_processing(&first);
        self.batch = Some(batch);
        Ok(first)
    }

    /// Records the outcome of the in-flight item and hands out the next one.
    pub fn finish_item(&mut self, item: &BatchItem, outcome: &Outcome) -> Option<BatchProgress> {
        let batch = self.batch.as_mut()?;
        batch.record(outcome);
        if let Some(row) = self.active_row.take().and_then(|row| self.log.get_mut(row)) {
            *row = LogLine::from_outcome(display_name(&item.path), outcome);
        }

        if let Some(next) = batch.next_item() {
            self.push_processing(&next);
            return Some(BatchProgress::Next(next));
        }

        let batch = self.batch.take()?;
        let summary = batch.summary();
        self.pending.remove_all(batch.files());
        self.status = format!("Done! {summary}");
        Some(BatchProgress::Finished {
            summary,
            output_dir: batch.output_dir().to_path_buf(),
        })
    }

    fn push_processing(&mut self, item: &BatchItem) {
        self.active_row = Some(self.log.len());
        self.log
            .push(LogLine::new(LogStatus::Processing, display_name(&item.path)));
    }

    pub fn start_watch(&mut self) -> Result<(), WatchError> {
        if self.is_watching() {
            return Err(WatchError::AlreadyActive);
        }
        let config = WatchConfig {
            directory: self.config.watch_directory.clone(),
            target: self.config.target_filename.trim().to_string(),
            output_dir: self.config.watch_output_dir().to_path_buf(),
        };
        let session = WatchSession::start(config, self.compressor(), self.dispatcher.clone())?;
        self.status = format!(
            "Watching {} for {}",
            session.config().directory.display(),
            session.config().target
        );
        self.watch = Some(session);
        self.store.persist(&self.config);
        Ok(())
    }

    pub fn stop_watch(&mut self) -> bool {
        match self.watch.take() {
            Some(session) => {
                session.stop();
                self.poll_watch();
                self.status = String::from("Watching stopped.");
                true
            }
            None => false,
        }
    }

    /// Moves watcher results into the log. Returns how many arrived.
    pub fn poll_watch(&mut self) -> usize {
        let reports = self.reports.drain();
        for report in &reports {
            self.log
                .push(LogLine::from_outcome(display_name(&report.path), &report.outcome));
        }
        reports.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CONFIG_FILE;
    use anyhow::Result;
    use std::fs;
    use std::path::Path;
    use tempfile::{tempdir, TempDir};

    fn state_in(dir: &TempDir) -> AppState {
        let store = ConfigStore::with_default_dir(
            dir.path().join(CONFIG_FILE),
            dir.path().to_path_buf(),
        );
        AppState::new(store)
    }

    fn png(dir: &Path, name: &str) -> Result<PathBuf> {
        let path = dir.join(name);
        image::RgbaImage::from_pixel(6, 6, image::Rgba([1, 2, 3, 100])).save(&path)?;
        Ok(path)
    }

    fn process(state: &AppState, item: &BatchItem) -> Outcome {
        state
            .batch_compressor()
            .expect("batch running")
            .process(&item.path, &item.output_dir)
    }

    #[test]
    fn unsupported_files_are_logged_but_not_queued() -> Result<()> {
        let dir = tempdir()?;
        let mut state = state_in(&dir);

        state.add_files([
            PathBuf::from("a.png"),
            PathBuf::from("b.gif"),
            PathBuf::from("a.png"),
        ]);

        assert_eq!(state.pending().paths(), &[PathBuf::from("a.png")]);
        let statuses: Vec<_> = state.log().iter().map(|l| l.status).collect();
        assert_eq!(statuses, vec![LogStatus::Queued, LogStatus::Unsupported]);
        Ok(())
    }

    #[test]
    fn empty_batch_leaves_everything_untouched() -> Result<()> {
        let dir = tempdir()?;
        let mut state = state_in(&dir);
        state.add_files([PathBuf::from("notes.txt")]);

        assert_eq!(state.start_batch().unwrap_err(), BatchError::NoFiles);
        assert_eq!(state.log().len(), 1);
        assert!(!state.is_batch_running());
        Ok(())
    }

    #[test]
    fn batch_updates_rows_in_place_and_clears_pending() -> Result<()> {
        let src = tempdir()?;
        let dir = tempdir()?;
        let mut state = state_in(&dir);
        let first = png(src.path(), "one.png")?;
        let second = png(src.path(), "two.png")?;
        state.add_files([first.clone(), second.clone()]);

        let item = state.start_batch()?;
        assert_eq!(item.path, first);
        assert_eq!(state.log().len(), 1);
        assert_eq!(state.log()[0].status, LogStatus::Processing);

        let outcome = process(&state, &item);
        let Some(BatchProgress::Next(item)) = state.finish_item(&item, &outcome) else {
            panic!("expected a second item");
        };
        assert_eq!(item.path, second);
        assert_eq!(state.log()[0].status, LogStatus::Done);
        assert_eq!(state.log()[1].status, LogStatus::Processing);

        let outcome = process(&state, &item);
        match state.finish_item(&item, &outcome) {
            Some(BatchProgress::Finished { summary, output_dir }) => {
                assert_eq!(summary.succeeded, 2);
                assert_eq!(output_dir, dir.path());
            }
            other => panic!("unexpected progress: {other:?}"),
        }
        assert!(state.pending().is_empty());
        assert!(!state.is_batch_running());
        assert_eq!(
            fs::read(&first)?,
            fs::read(dir.path().join("one_original.png"))?
        );
        Ok(())
    }

    #[test]
    fn second_watch_start_is_rejected() -> Result<()> {
        let dir = tempdir()?;
        let mut state = state_in(&dir);

        state.start_watch()?;
        assert!(matches!(state.start_watch(), Err(WatchError::AlreadyActive)));
        assert!(state.is_watching());
        assert!(!state.set_target_filename("other.png".to_string()));

        assert!(state.stop_watch());
        assert!(!state.is_watching());
        assert!(!state.stop_watch());
        assert!(state.set_target_filename("other.png".to_string()));
        Ok(())
    }

    #[test]
    fn watch_without_filename_warns_and_stays_inactive() -> Result<()> {
        let dir = tempdir()?;
        let mut state = state_in(&dir);
        state.set_target_filename(String::new());

        assert!(matches!(state.start_watch(), Err(WatchError::EmptyFilename)));
        assert!(!state.is_watching());
        Ok(())
    }

    #[test]
    fn policy_change_is_persisted() -> Result<()> {
        let dir = tempdir()?;
        let mut state = state_in(&dir);
        assert!(state.set_below_threshold(BelowThreshold::Skip));

        let reloaded = state_in(&dir);
        assert_eq!(reloaded.config().below_threshold, BelowThreshold::Skip);
        Ok(())
    }

    #[test]
    fn files_added_mid_batch_stay_queued_for_the_next_run() -> Result<()> {
        let src = tempdir()?;
        let dir = tempdir()?;
        let mut state = state_in(&dir);
        let a = png(src.path(), "a.png")?;
        let b = png(src.path(), "b.png")?;
        state.add_files([a.clone()]);

        let item = state.start_batch()?;
        state.add_files([b.clone()]);
        let outcome = process(&state, &item);
        assert!(matches!(
            state.finish_item(&item, &outcome),
            Some(BatchProgress::Finished { .. })
        ));
        assert_eq!(state.pending().paths(), &[b.clone()]);

        let item = state.start_batch()?;
        assert_eq!(item.path, b);
        let outcome = process(&state, &item);
        state.finish_item(&item, &outcome);
        assert!(dir.path().join("b_original.png").exists());
        assert!(state.pending().is_empty());
        Ok(())
    }

    #[test]
    fn policy_is_locked_for_the_running_batch() -> Result<()> {
        let src = tempdir()?;
        let dir = tempdir()?;
        let mut state = state_in(&dir);
        state.add_files([png(src.path(), "one.png")?, png(src.path(), "two.png")?]);

        let item = state.start_batch()?;
        assert!(!state.set_below_threshold(BelowThreshold::Compress));
        assert_eq!(state.config().below_threshold, BelowThreshold::Copy);

        let outcome = process(&state, &item);
        let Some(BatchProgress::Next(item)) = state.finish_item(&item, &outcome) else {
            panic!("expected a second item");
        };
        let outcome = process(&state, &item);
        assert!(matches!(outcome, Outcome::Copied { .. }));
        state.finish_item(&item, &outcome);

        assert!(state.set_below_threshold(BelowThreshold::Compress));
        Ok(())
    }

    #[test]
    fn reports_queued_before_stop_reach_the_log() -> Result<()> {
        let dir = tempdir()?;
        let mut state = state_in(&dir);
        state.start_watch()?;

        let path = dir.path().join("capture.png");
        assert!(state.dispatcher.send(WatchReport {
            path: path.clone(),
            outcome: Outcome::Failed {
                filename: "capture.png".to_string(),
                message: "truncated".to_string(),
            },
        }));
        assert!(state.stop_watch());

        assert_eq!(state.log().len(), 1);
        assert_eq!(state.log()[0].status, LogStatus::Failed);
        assert_eq!(state.status(), "Watching stopped.");
        Ok(())
    }
}
