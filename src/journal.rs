use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

#[cfg(test)]
use std::io;

use crate::config::AppConfig;
#[cfg(test)]
use crate::errors::AppError;
use crate::errors::{AppResult, ErrorKind};

const JOURNAL_FILE: &str = "import-journal.jsonl";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    #[serde(rename_all = "camelCase")]
    RunStarted {
        country_code: String,
        limit_per_region: usize,
        regions_total: usize,
        concurrency: usize,
    },
    #[serde(rename_all = "camelCase")]
    RegionCompleted {
        region: String,
        returned: usize,
        created: usize,
        skipped: usize,
        rejected: usize,
        cost_usd: f64,
    },
    #[serde(rename_all = "camelCase")]
    RegionFailed {
        region: String,
        kind: ErrorKind,
        message: String,
        cost_usd: f64,
    },
    #[serde(rename_all = "camelCase")]
    RunFinished {
        country_code: String,
        regions_processed: usize,
        trails_created: usize,
        trails_skipped: usize,
        trails_rejected: usize,
        failed_regions: usize,
        total_cost_usd: f64,
        cancelled: bool,
    },
}

impl RunEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RunEvent::RunStarted { .. } => "run_started",
            RunEvent::RegionCompleted { .. } => "region_completed",
            RunEvent::RegionFailed { .. } => "region_failed",
            RunEvent::RunFinished { .. } => "run_finished",
        }
    }
}

#[derive(Debug, Serialize)]
struct JournalEntry<'a> {
    timestamp: DateTime<Utc>,
    #[serde(flatten)]
    event: &'a RunEvent,
}

#[derive(Clone)]
pub struct RunJournal {
    enabled: Arc<AtomicBool>,
    queue: Arc<Mutex<Vec<(DateTime<Utc>, RunEvent)>>>,
    path: PathBuf,
    batch_size: usize,
    max_file_bytes: u64,
    max_file_count: usize,
    #[cfg(test)]
    fault_injector: Option<Arc<TestFaultInjector>>,
}

impl RunJournal {
    pub fn open<P: AsRef<Path>>(data_dir: P, config: &AppConfig) -> AppResult<Self> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir)?;
        let path = data_dir.join(JOURNAL_FILE);
        OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            enabled: Arc::new(AtomicBool::new(config.journal_enabled)),
            queue: Arc::new(Mutex::new(Vec::new())),
            path,
            batch_size: config.journal_batch_size.max(1),
            max_file_bytes: config.journal_buffer_max_bytes,
            max_file_count: config.journal_buffer_max_files,
            #[cfg(test)]
            fault_injector: None,
        })
    }

    pub fn record(&self, event: RunEvent) -> AppResult<()> {
        if !self.enabled.load(Ordering::Relaxed) {
            return Ok(());
        }

        let mut queue = self.queue.lock();
        queue.push((Utc::now(), event));
        if queue.len() >= self.batch_size {
            self.persist_locked(&mut queue)?;
        }
        Ok(())
    }

    pub fn flush(&self) -> AppResult<()> {
        let mut queue = self.queue.lock();
        self.persist_locked(&mut queue)
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn persist_locked(&self, queue: &mut Vec<(DateTime<Utc>, RunEvent)>) -> AppResult<()> {
        if queue.is_empty() {
            return Ok(());
        }

        let mut lines = Vec::with_capacity(queue.len());
        let mut incoming = 0_u64;
        for (timestamp, event) in queue.iter() {
            let line = serde_json::to_vec(&JournalEntry {
                timestamp: *timestamp,
                event,
            })?;
            incoming += line.len() as u64 + 1;
            lines.push(line);
        }

        self.rotate_if_needed(incoming)?;
        self.append(&lines)?;
        queue.clear();
        Ok(())
    }

    fn append(&self, lines: &[Vec<u8>]) -> AppResult<()> {
        #[cfg(test)]
        if self
            .fault_injector
            .as_ref()
            .map(|hooks| hooks.take_disk_full())
            .unwrap_or(false)
        {
            return Err(AppError::Io(io::Error::new(
                io::ErrorKind::WriteZero,
                "simulated disk full",
            )));
        }

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        for line in lines {
            file.write_all(line)?;
            file.write_all(b"\n")?;
        }
        file.flush()?;
        Ok(())
    }

    fn rotate_if_needed(&self, incoming: u64) -> AppResult<()> {
        let current = fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);
        if current == 0 || current + incoming <= self.max_file_bytes {
            return Ok(());
        }

        if self.max_file_count <= 1 {
            OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&self.path)?;
            return Ok(());
        }

        let rotated = self.directory().join(format!(
            "{}-{}.jsonl",
            self.stem(),
            Utc::now().format("%Y%m%d%H%M%S%3f")
        ));
        fs::rename(&self.path, &rotated)?;
        self.prune_rotations()?;
        Ok(())
    }

    pub fn rotations(&self) -> AppResult<Vec<PathBuf>> {
        let prefix = format!("{}-", self.stem());
        let mut rotations = fs::read_dir(self.directory())?
            .filter_map(|entry| {
                let entry = entry.ok()?;
                let name = entry.file_name().to_string_lossy().to_string();
                (name.starts_with(&prefix) && name.ends_with(".jsonl")).then(|| entry.path())
            })
            .collect::<Vec<_>>();
        // Suffixes are fixed-width timestamps, so name order is age order.
        rotations.sort();
        Ok(rotations)
    }

    fn prune_rotations(&self) -> AppResult<()> {
        let rotations = self.rotations()?;
        let allowed = self.max_file_count.saturating_sub(1);
        if rotations.len() > allowed {
            let excess = rotations.len() - allowed;
            for path in rotations.into_iter().take(excess) {
                let _ = fs::remove_file(path);
            }
        }
        Ok(())
    }

    fn directory(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "import-journal".into())
    }
}

#[cfg(test)]
#[derive(Default)]
pub struct TestFaultInjector {
    disk_full: AtomicBool,
}

#[cfg(test)]
impl TestFaultInjector {
    pub fn fail_next_write(&self) {
        self.disk_full.store(true, Ordering::SeqCst);
    }

    fn take_disk_full(&self) -> bool {
        self.disk_full.swap(false, Ordering::SeqCst)
    }
}

#[cfg(test)]
impl RunJournal {
    pub fn enable_test_hooks(&mut self) -> Arc<TestFaultInjector> {
        let hooks = Arc::new(TestFaultInjector::default());
        self.fault_injector = Some(hooks.clone());
        hooks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config(dir: &Path) -> AppConfig {
        let mut config = AppConfig::with_defaults(dir);
        config.journal_batch_size = 1;
        config
    }

    fn failed(region: &str) -> RunEvent {
        RunEvent::RegionFailed {
            region: region.into(),
            kind: ErrorKind::SchemaValidationError,
            message: "chat response failed schema validation".into(),
            cost_usd: 0.0002,
        }
    }

    #[test]
    fn writes_tagged_events_as_json_lines() {
        let dir = tempdir().unwrap();
        let journal = RunJournal::open(dir.path(), &config(dir.path())).unwrap();
        journal
            .record(RunEvent::RunStarted {
                country_code: "US".into(),
                limit_per_region: 10,
                regions_total: 51,
                concurrency: 3,
            })
            .unwrap();
        journal.record(failed("UT")).unwrap();

        let contents = fs::read_to_string(journal.path()).unwrap();
        let lines: Vec<serde_json::Value> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "run_started");
        assert_eq!(lines[0]["regionsTotal"], 51);
        assert!(lines[0]["timestamp"].is_string());
        assert_eq!(lines[1]["event"], "region_failed");
        assert_eq!(lines[1]["kind"], "SchemaValidationError");
    }

    #[test]
    fn batches_until_flush() {
        let dir = tempdir().unwrap();
        let mut config = config(dir.path());
        config.journal_batch_size = 4;
        let journal = RunJournal::open(dir.path(), &config).unwrap();
        journal.record(failed("UT")).unwrap();
        assert_eq!(journal.pending(), 1);
        assert!(fs::read_to_string(journal.path()).unwrap().is_empty());

        journal.flush().unwrap();
        assert_eq!(journal.pending(), 0);
        assert!(fs::read_to_string(journal.path()).unwrap().contains("UT"));
    }

    #[test]
    fn disabled_journal_drops_events() {
        let dir = tempdir().unwrap();
        let journal = RunJournal::open(dir.path(), &config(dir.path())).unwrap();
        journal.set_enabled(false);
        journal.record(failed("UT")).unwrap();
        assert_eq!(journal.pending(), 0);
        assert!(fs::read_to_string(journal.path()).unwrap().is_empty());
    }

    #[test]
    fn rotates_and_prunes_when_exceeding_capacity() {
        let dir = tempdir().unwrap();
        let mut config = config(dir.path());
        config.journal_buffer_max_bytes = 64;
        config.journal_buffer_max_files = 3;
        let journal = RunJournal::open(dir.path(), &config).unwrap();
        for index in 0..6 {
            journal.record(failed(&format!("region-{index}"))).unwrap();
            std::thread::sleep(std::time::Duration::from_millis(2));
        }

        let rotations = journal.rotations().unwrap();
        assert!(!rotations.is_empty());
        assert!(rotations.len() <= 2);
        assert!(fs::read_to_string(journal.path())
            .unwrap()
            .contains("region-5"));
    }

    #[test]
    fn keeps_events_queued_after_write_failure() {
        let dir = tempdir().unwrap();
        let mut journal = RunJournal::open(dir.path(), &config(dir.path())).unwrap();
        let hooks = journal.enable_test_hooks();
        hooks.fail_next_write();

        assert!(journal.record(failed("UT")).is_err());
        assert_eq!(journal.pending(), 1);
        journal.flush().unwrap();
        assert_eq!(journal.pending(), 0);
    }
}
