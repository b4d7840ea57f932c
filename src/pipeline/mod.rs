use anyhow::{anyhow, Result};
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{UnitError, UnitResult};
use crate::merge::{MergeJob, Merger};
use crate::metadata;
use crate::scanner::{self, ConsolidationUnit};

/// Terminal state of one unit after a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOutcome {
    Done,
    Skipped,
    Failed,
}

/// What happened to one unit, kept for the end-of-run summary
#[derive(Debug, Clone)]
pub struct UnitReport {
    pub unit: PathBuf,
    pub outcome: UnitOutcome,
    /// Output name for done units, reason for skipped and failed ones
    pub detail: String,
    /// Failure group tag (`UnitError::kind`), set on failed units only
    pub kind: Option<&'static str>,
}

/// Aggregate result of one consolidation run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub reports: Vec<UnitReport>,
    pub deleted: usize,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn discovered(&self) -> usize {
        self.reports.len()
    }

    pub fn done(&self) -> usize {
        self.count(UnitOutcome::Done)
    }

    pub fn skipped(&self) -> usize {
        self.count(UnitOutcome::Skipped)
    }

    pub fn failed(&self) -> usize {
        self.count(UnitOutcome::Failed)
    }

    fn count(&self, outcome: UnitOutcome) -> usize {
        self.reports
            .iter()
            .filter(|r| r.outcome == outcome)
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &UnitReport> {
        self.reports
            .iter()
            .filter(|r| r.outcome == UnitOutcome::Failed)
    }

    /// Failed reports grouped by failure kind, in kind order.
    pub fn failure_groups(&self) -> BTreeMap<&'static str, Vec<&UnitReport>> {
        let mut groups: BTreeMap<&'static str, Vec<&UnitReport>> = BTreeMap::new();
        for report in self.failures() {
            groups
                .entry(report.kind.unwrap_or("failed"))
                .or_default()
                .push(report);
        }
        groups
    }

    /// Print the run summary to stdout
    pub fn print(&self) {
        println!("\n📊 Consolidation Summary");
        println!("════════════════════════");
        println!("📁 Units discovered: {}", self.discovered());
        println!("✅ Done:    {}", self.done());
        println!("⚠️  Skipped: {}", self.skipped());
        println!("❌ Failed:  {}", self.failed());
        if self.deleted > 0 {
            println!("🧹 Source folders removed: {}", self.deleted);
        }
        println!("⏱️  Run time: {:.2}s", self.elapsed.as_secs_f64());

        if self.failed() > 0 {
            println!("\n❌ Failures:");
            println!("─────────────");
            for (kind, reports) in self.failure_groups() {
                println!("{} ({}):", kind, reports.len());
                for report in reports {
                    println!("  • {}: {}", report.unit.display(), report.detail);
                }
            }
        }
    }
}

/// Replaces characters that cannot appear in output file names
pub struct TitleSanitizer {
    illegal: Regex,
}

impl TitleSanitizer {
    pub fn new() -> Result<Self> {
        Ok(Self {
            illegal: Regex::new(r#"[\x00-\x1f\\/:*?"<>|]"#)?,
        })
    }

    /// Produce a safe file stem from an episode title. Never returns an
    /// empty string.
    pub fn sanitize(&self, title: &str) -> String {
        let cleaned = self.illegal.replace_all(title, "_");
        let cleaned = cleaned.trim().trim_end_matches('.').trim_end();
        if cleaned.is_empty() {
            "untitled".to_string()
        } else {
            cleaned.to_string()
        }
    }
}

/// Drives one full consolidation run over a root directory.
///
/// Units are queued once and pulled by a fixed set of workers, so at most
/// `config.workers` external merges run at any time. Failures stay confined
/// to their unit; the run always continues to the remaining units.
pub struct Orchestrator {
    root: PathBuf,
    delete_sources: bool,
    config: Config,
}

impl Orchestrator {
    pub fn new(root: PathBuf, delete_sources: bool, config: Config) -> Self {
        Self {
            root,
            delete_sources,
            config,
        }
    }

    pub async fn run(&self) -> Result<RunSummary> {
        let start_time = Instant::now();

        // No unit can succeed without the merge tool, so this aborts the
        // whole run rather than failing every unit individually.
        which::which(&self.config.ffmpeg_bin).map_err(|_| {
            anyhow!(
                "Merge tool not found: '{}' (install it or set BILITIDY_FFMPEG)",
                self.config.ffmpeg_bin
            )
        })?;

        let units = scanner::discover(&self.root, &self.config)?;
        info!(
            "🔎 Discovered {} consolidation unit(s) in {:?}",
            units.len(),
            self.root
        );

        if units.is_empty() {
            return Ok(RunSummary {
                elapsed: start_time.elapsed(),
                ..RunSummary::default()
            });
        }

        let workers = self.config.workers.min(units.len()).max(1);
        let (tx, rx) = mpsc::channel(units.len());
        for unit in units {
            tx.send(unit).await?;
        }
        drop(tx);

        let queue = Arc::new(Mutex::new(rx));
        let claimed_titles = Arc::new(Mutex::new(HashSet::new()));
        let sanitizer = Arc::new(TitleSanitizer::new()?);

        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let context = WorkerContext {
                root: self.root.clone(),
                delete_sources: self.delete_sources,
                config: self.config.clone(),
                merger: Merger::new(self.config.clone()),
                sanitizer: Arc::clone(&sanitizer),
                claimed_titles: Arc::clone(&claimed_titles),
            };
            let queue = Arc::clone(&queue);
            handles.push(tokio::spawn(worker_loop(worker_id, context, queue)));
        }

        let mut summary = RunSummary::default();
        for handle in handles {
            let (reports, deleted) = handle.await?;
            summary.reports.extend(reports);
            summary.deleted += deleted;
        }
        summary.elapsed = start_time.elapsed();

        Ok(summary)
    }
}

/// Pull units off the shared queue until it is drained.
async fn worker_loop(
    worker_id: usize,
    context: WorkerContext,
    queue: Arc<Mutex<mpsc::Receiver<ConsolidationUnit>>>,
) -> (Vec<UnitReport>, usize) {
    let mut reports = Vec::new();
    let mut deleted = 0;

    loop {
        let unit = queue.lock().await.recv().await;
        let Some(unit) = unit else {
            break;
        };
        debug!("Worker {} picked up {:?}", worker_id, unit.dir);

        let (report, removed) = context.consolidate(&unit).await;
        if removed {
            deleted += 1;
        }
        reports.push(report);
    }

    debug!("Worker {} finished", worker_id);
    (reports, deleted)
}

/// Everything one worker needs to process units on its own
struct WorkerContext {
    root: PathBuf,
    delete_sources: bool,
    config: Config,
    merger: Merger,
    sanitizer: Arc<TitleSanitizer>,
    claimed_titles: Arc<Mutex<HashSet<String>>>,
}

enum Consolidated {
    Merged(PathBuf),
    AlreadyPresent(PathBuf),
}

impl WorkerContext {
    async fn consolidate(&self, unit: &ConsolidationUnit) -> (UnitReport, bool) {
        info!("➡️ Consolidating: {:?}", unit.dir);

        match self.try_merge(unit).await {
            Ok(Consolidated::Merged(output)) => {
                info!("✅ Consolidated {:?} -> {:?}", unit.dir, output);
                let removed = if self.delete_sources {
                    self.remove_source(unit).await
                } else {
                    false
                };
                let detail = output
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                (self.report(unit, UnitOutcome::Done, detail, None), removed)
            }
            Ok(Consolidated::AlreadyPresent(output)) => {
                info!("⚠️ Output already exists, skipping: {:?}", unit.dir);
                let detail = format!("output {:?} already exists", output.file_name());
                (self.report(unit, UnitOutcome::Skipped, detail, None), false)
            }
            Err(e) => {
                error!("❌ Consolidation FAILED for {:?}: {}", unit.dir, e);
                let report = self.report(unit, UnitOutcome::Failed, e.to_string(), Some(e.kind()));
                (report, false)
            }
        }
    }

    /// Run one unit through the pipeline: metadata, title claim, plan,
    /// external merge.
    async fn try_merge(&self, unit: &ConsolidationUnit) -> UnitResult<Consolidated> {
        let meta = metadata::read_metadata(&unit.dir, &self.config)?;
        debug!(
            "Unit {:?}: '{}' ({} media)",
            unit.dir, meta.episode_title, meta.media_type
        );

        let title = self.sanitizer.sanitize(&meta.episode_title);

        // The first unit to claim a title owns it for the whole run; any
        // later unit resolving to the same name fails instead of racing the
        // winner for the output file.
        {
            let mut claimed = self.claimed_titles.lock().await;
            if !claimed.insert(title.clone()) {
                return Err(UnitError::DuplicateTitle { title });
            }
        }

        let output = self.root.join(format!("{}.{}", title, self.config.output_ext));
        if output.exists() {
            return Ok(Consolidated::AlreadyPresent(output));
        }

        let job = MergeJob::plan(unit, &meta, output.clone(), &self.config)?;
        debug!("Planned {} job {} for {:?}", job.kind(), job.id, unit.dir);
        self.merger.invoke(&job).await?;

        Ok(Consolidated::Merged(output))
    }

    /// Remove a consolidated unit's source folder. Never touches the scan
    /// root itself, since the outputs live there.
    async fn remove_source(&self, unit: &ConsolidationUnit) -> bool {
        if unit.dir == self.root {
            warn!("Not removing scan root: {:?}", self.root);
            return false;
        }

        match tokio::fs::remove_dir_all(&unit.dir).await {
            Ok(()) => {
                info!("🧹 Removed source folder: {:?}", unit.dir);
                true
            }
            Err(e) => {
                // The merge already succeeded; a stuck source folder is
                // only worth a warning.
                warn!("Failed to remove source folder {:?}: {}", unit.dir, e);
                false
            }
        }
    }

    fn report(
        &self,
        unit: &ConsolidationUnit,
        outcome: UnitOutcome,
        detail: String,
        kind: Option<&'static str>,
    ) -> UnitReport {
        UnitReport {
            unit: unit.dir.clone(),
            outcome,
            detail,
            kind,
        }
    }
}
