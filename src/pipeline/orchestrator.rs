//! Pipeline orchestrator
//!
//! Drives one harvest run through its phases: expand configured seeds into
//! fetch tasks, drain the task set through the scheduler and adapters, route
//! image refs through the resolver, and stream records through persistence.
//! Cancellation (Ctrl-C or the configured deadline) stops new submissions,
//! gives in-flight tasks a grace period, and flushes whatever records were
//! already produced.

use crate::archives::{adapter_for, Adapter, ParseContext, ParseOutput};
use crate::config::{ArchiveKind, Config};
use crate::fetch::{
    build_http_client, BackoffPolicy, FetchErrorKind, FetchedPage, Scheduler, SchedulerLimits,
    TaskOutcome,
};
use crate::model::{FetchTask, ImageStatus, Record, TaskKind, TaskRole};
use crate::pipeline::summary::{RunPhase, RunSummary};
use crate::resolve::Resolver;
use crate::storage::{Persistence, RunStatus, StorageError, StoreStatus, WriteStatus};
use crate::{HarvestError, Result};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;

/// Runs one harvest over every configured archive
///
/// Returns the run summary; the caller decides how to present it. Only
/// persistence failures and startup errors surface as `Err` — per-task
/// trouble is accounted in the summary instead.
pub async fn run_harvest(config: Config, config_hash: &str, resume: bool) -> Result<RunSummary> {
    let mut orchestrator = Orchestrator::new(config, config_hash, resume)?;
    orchestrator.run().await
}

/// One unit of joined work in the drain loop
enum Done {
    /// A page fetch finished (success or terminal failure)
    Page(TaskOutcome),

    /// A record finished resolving, downloading, and writing
    Record(RecordOutcome),
}

/// What one record task produced, handed back for accounting
struct RecordOutcome {
    write: std::result::Result<WriteStatus, StorageError>,
    images_stored: u64,
    images_deduplicated: u64,
    images_degraded: u64,
    images_failed: u64,
    failures: Vec<&'static str>,
    retried: Vec<(String, u32, bool)>,
}

pub struct Orchestrator {
    config: Config,
    adapters: HashMap<String, Box<dyn Adapter>>,
    scheduler: Arc<Scheduler>,
    resolver: Arc<Resolver>,
    persistence: Arc<Mutex<Persistence>>,
    tasks: JoinSet<Done>,

    /// URLs already enqueued this run; follow-ups pointing back at them are
    /// dropped instead of re-fetched
    seen_urls: HashSet<String>,

    phase: RunPhase,
    summary: RunSummary,

    // Held so the cancellation channel outlives the signal tasks
    cancel_tx: watch::Sender<bool>,
    cancel_rx: watch::Receiver<bool>,
}

impl Orchestrator {
    pub fn new(config: Config, config_hash: &str, resume: bool) -> Result<Self> {
        let output_dir = PathBuf::from(&config.output.output_dir);
        let persistence = Persistence::open(&output_dir, config_hash, resume)?;

        let (cancel_tx, cancel_rx) = watch::channel(false);

        let client = build_http_client(&config.user_agent)?;
        let limits = SchedulerLimits {
            concurrency_limit: config.harvester.concurrency_limit as usize,
            per_host_min_interval: Duration::from_millis(config.harvester.per_host_min_interval),
        };
        let backoff = BackoffPolicy::from_config(&config.harvester);
        let scheduler = Arc::new(Scheduler::new(client, limits, backoff, cancel_rx.clone()));
        let resolver = Arc::new(Resolver::new(scheduler.clone()));

        let adapters = config
            .archives
            .iter()
            .map(|archive| (archive.name.clone(), adapter_for(archive.kind)))
            .collect();

        Ok(Self {
            config,
            adapters,
            scheduler,
            resolver,
            persistence: Arc::new(Mutex::new(persistence)),
            tasks: JoinSet::new(),
            seen_urls: HashSet::new(),
            phase: RunPhase::Seeding,
            summary: RunSummary::default(),
            cancel_tx,
            cancel_rx,
        })
    }

    /// Runs the phases to completion and returns the summary
    pub async fn run(&mut self) -> Result<RunSummary> {
        let start = std::time::Instant::now();
        self.install_cancellation();

        tracing::info!(
            "Run {} starting: {} archives, concurrency {}, min interval {}ms",
            self.persistence.lock().unwrap().run_id(),
            self.config.archives.len(),
            self.config.harvester.concurrency_limit,
            self.config.harvester.per_host_min_interval
        );

        self.seed()?;

        let drained = self.drain().await;

        self.phase = RunPhase::Finished;
        let status = match &drained {
            Err(_) => RunStatus::Failed,
            Ok(()) if self.summary.cancelled => RunStatus::Interrupted,
            Ok(()) => RunStatus::Completed,
        };

        let finalized = self.persistence.lock().unwrap().finalize(status);
        drained?;
        self.summary.compacted = finalized?;
        self.summary.elapsed = start.elapsed();

        tracing::info!(
            "Run finished: {} records written, {} updated, {} images stored, {} task failures, {:.1}s",
            self.summary.records_written,
            self.summary.records_updated,
            self.summary.images_stored,
            self.summary.total_failures(),
            self.summary.elapsed.as_secs_f64()
        );

        Ok(std::mem::take(&mut self.summary))
    }

    /// Wires Ctrl-C and the optional deadline to the cancellation channel
    fn install_cancellation(&self) {
        let tx = self.cancel_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupt received, cancelling run");
                let _ = tx.send(true);
            }
        });

        if let Some(deadline) = self.config.harvester.deadline {
            let tx = self.cancel_tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(deadline)).await;
                tracing::info!("Deadline of {}s reached, cancelling run", deadline);
                let _ = tx.send(true);
            });
        }
    }

    /// Expands configured seeds into initial work
    ///
    /// Local tabular seeds are parsed right here (no fetch involved); HTTP
    /// seeds become the first fetch task of their archive.
    fn seed(&mut self) -> Result<()> {
        self.phase = RunPhase::Seeding;

        for archive in self.config.archives.clone() {
            match archive.kind {
                ArchiveKind::CsvExport if !archive.seed.starts_with("http") => {
                    tracing::info!("Seeding '{}' from file {}", archive.name, archive.seed);
                    let bytes = std::fs::read(&archive.seed).map_err(|e| HarvestError::Seed {
                        archive: archive.name.clone(),
                        message: format!("cannot read seed file '{}': {}", archive.seed, e),
                    })?;
                    let page = FetchedPage {
                        final_url: archive.base_url.clone(),
                        status: 200,
                        content_type: "text/csv".to_string(),
                        bytes,
                    };
                    let ctx = ParseContext {
                        archive: &archive,
                        url: url::Url::parse(&archive.base_url)?,
                        role: TaskRole::Detail,
                    };
                    let parsed = self
                        .adapters
                        .get(&archive.name)
                        .map(|adapter| adapter.parse(&page, &ctx))
                        .transpose();
                    match parsed {
                        Ok(Some(output)) => self.absorb_parse_output(output),
                        Ok(None) => {}
                        Err(error) => {
                            tracing::warn!(
                                "Seed file for '{}' did not match expected structure: {}",
                                archive.name,
                                error
                            );
                            self.summary.parse_mismatches += 1;
                        }
                    }
                }
                ArchiveKind::CsvExport => {
                    let url = url::Url::parse(&archive.seed)?;
                    self.enqueue(FetchTask::new(
                        url,
                        &archive.name,
                        TaskKind::Page,
                        TaskRole::Detail,
                    ));
                }
                ArchiveKind::Gallery | ArchiveKind::Blog => {
                    let url = url::Url::parse(&archive.seed)?;
                    self.enqueue(FetchTask::new(
                        url,
                        &archive.name,
                        TaskKind::Page,
                        TaskRole::Listing,
                    ));
                }
            }
        }

        Ok(())
    }

    /// Works the task set down to empty, or aborts it after cancellation
    async fn drain(&mut self) -> Result<()> {
        self.phase = RunPhase::Draining;
        tracing::info!("Draining {} seeded tasks", self.tasks.len());

        let mut grace_deadline: Option<tokio::time::Instant> = None;
        let mut handled: u64 = 0;

        while !self.tasks.is_empty() {
            let joined = if let Some(deadline) = grace_deadline {
                match tokio::time::timeout_at(deadline, self.tasks.join_next()).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        tracing::warn!(
                            "Grace period elapsed, abandoning {} in-flight tasks",
                            self.tasks.len()
                        );
                        self.tasks.abort_all();
                        while self.tasks.join_next().await.is_some() {}
                        break;
                    }
                }
            } else {
                tokio::select! {
                    joined = self.tasks.join_next() => joined,
                    changed = self.cancel_rx.changed() => {
                        if changed.is_err() || *self.cancel_rx.borrow() {
                            self.phase = RunPhase::Cancelling;
                            self.summary.cancelled = true;
                            grace_deadline = Some(
                                tokio::time::Instant::now()
                                    + Duration::from_millis(self.config.harvester.grace_period),
                            );
                            tracing::info!(
                                "Cancellation observed with {} tasks outstanding, grace {}ms",
                                self.tasks.len(),
                                self.config.harvester.grace_period
                            );
                        }
                        continue;
                    }
                }
            };

            match joined {
                Some(Ok(done)) => {
                    self.handle(done)?;
                    handled += 1;
                    if handled % 25 == 0 {
                        tracing::info!(
                            "Progress: {} tasks finished, {} outstanding",
                            handled,
                            self.tasks.len()
                        );
                    }
                }
                Some(Err(join_error)) => {
                    if !join_error.is_cancelled() {
                        tracing::error!("Task panicked: {}", join_error);
                    }
                }
                None => break,
            }
        }

        Ok(())
    }

    /// Routes one joined unit of work
    fn handle(&mut self, done: Done) -> Result<()> {
        match done {
            Done::Page(outcome) => self.handle_page(outcome),
            Done::Record(outcome) => self.handle_record(outcome),
        }
    }

    fn handle_page(&mut self, outcome: TaskOutcome) -> Result<()> {
        let task = outcome.task;
        if task.attempt > 0 {
            self.summary
                .record_retry(task.url.to_string(), task.attempt, outcome.result.is_ok());
        }

        let page = match outcome.result {
            Ok(page) => page,
            Err(failure) => {
                self.summary.record_failure(failure.kind.label());
                if failure.kind != FetchErrorKind::Cancelled {
                    tracing::warn!(
                        "Task for {} failed terminally ({}): {}",
                        task.url,
                        failure.kind.label(),
                        failure.message
                    );
                }
                return Ok(());
            }
        };

        self.summary.pages_fetched += 1;

        let parsed = {
            let Some(archive) = self
                .config
                .archives
                .iter()
                .find(|archive| archive.name == task.archive)
            else {
                tracing::error!("No archive configured for task from '{}'", task.archive);
                return Ok(());
            };
            let Some(adapter) = self.adapters.get(&task.archive) else {
                return Ok(());
            };

            let ctx = ParseContext {
                archive,
                url: url::Url::parse(&page.final_url).unwrap_or_else(|_| task.url.clone()),
                role: task.role,
            };
            adapter.parse(&page, &ctx)
        };

        match parsed {
            Ok(output) => self.absorb_parse_output(output),
            Err(error) => {
                self.summary.parse_mismatches += 1;
                tracing::warn!("Skipping {}: {}", task.url, error);
            }
        }

        Ok(())
    }

    fn handle_record(&mut self, outcome: RecordOutcome) -> Result<()> {
        self.summary.images_stored += outcome.images_stored;
        self.summary.images_deduplicated += outcome.images_deduplicated;
        self.summary.images_degraded += outcome.images_degraded;
        self.summary.images_failed += outcome.images_failed;

        for kind in outcome.failures {
            self.summary.record_failure(kind);
        }
        for (url, attempts, succeeded) in outcome.retried {
            self.summary.record_retry(url, attempts, succeeded);
        }

        match outcome.write {
            Ok(WriteStatus::Inserted) => self.summary.records_written += 1,
            Ok(WriteStatus::Updated) => self.summary.records_updated += 1,
            Err(error) => {
                tracing::error!("Persistence failure, aborting run: {}", error);
                self.tasks.abort_all();
                return Err(error.into());
            }
        }

        Ok(())
    }

    /// Spawns follow-up fetches and record tasks from one parse result
    fn absorb_parse_output(&mut self, output: ParseOutput) {
        self.summary.items_skipped += u64::from(output.skipped);

        for follow_up in output.follow_ups {
            self.enqueue(follow_up);
        }
        for record in output.records {
            self.spawn_record(record);
        }
    }

    /// Submits a fetch task unless cancelled or already seen
    fn enqueue(&mut self, task: FetchTask) {
        if *self.cancel_rx.borrow() {
            return;
        }
        if !self.seen_urls.insert(task.url.to_string()) {
            return;
        }

        let scheduler = self.scheduler.clone();
        self.tasks
            .spawn(async move { Done::Page(scheduler.submit(task).await) });
    }

    /// Spawns the resolve-download-write task for one record
    ///
    /// Spawned even under cancellation: records already produced must reach
    /// the dataset. Their network steps observe the cancellation signal and
    /// degrade on their own.
    fn spawn_record(&mut self, record: Record) {
        let scheduler = self.scheduler.clone();
        let resolver = self.resolver.clone();
        let persistence = self.persistence.clone();
        self.tasks.spawn(async move {
            Done::Record(process_record(record, scheduler, resolver, persistence).await)
        });
    }
}

/// Resolves, downloads, and stores a record's images, then writes the record
async fn process_record(
    mut record: Record,
    scheduler: Arc<Scheduler>,
    resolver: Arc<Resolver>,
    persistence: Arc<Mutex<Persistence>>,
) -> RecordOutcome {
    let mut outcome = RecordOutcome {
        write: Ok(WriteStatus::Inserted),
        images_stored: 0,
        images_deduplicated: 0,
        images_degraded: 0,
        images_failed: 0,
        failures: Vec::new(),
        retried: Vec::new(),
    };

    let images = std::mem::take(&mut record.image_refs);
    for image in images {
        let mut image = resolver.resolve(&record.archive, image).await;

        if image.status != ImageStatus::Resolved {
            outcome.images_failed += 1;
            record.image_refs.push(image);
            continue;
        }
        if image.degraded {
            outcome.images_degraded += 1;
        }

        let Some(resolved_url) = image.resolved_url.clone() else {
            outcome.images_failed += 1;
            record.image_refs.push(image);
            continue;
        };

        let download = match url::Url::parse(&resolved_url) {
            Ok(url) => {
                let task =
                    FetchTask::new(url, &record.archive, TaskKind::Image, TaskRole::Detail);
                Some(scheduler.submit(task).await)
            }
            Err(_) => None,
        };

        match download {
            Some(fetched) => {
                if fetched.task.attempt > 0 {
                    outcome.retried.push((
                        resolved_url.clone(),
                        fetched.task.attempt,
                        fetched.result.is_ok(),
                    ));
                }
                match fetched.result {
                    Ok(page) => {
                        let stored = persistence
                            .lock()
                            .unwrap()
                            .store_image(&page.bytes, &mut image);
                        match stored {
                            Ok(StoreStatus::Stored) => outcome.images_stored += 1,
                            Ok(StoreStatus::Deduplicated) => outcome.images_deduplicated += 1,
                            Err(error) => {
                                record.image_refs.push(image);
                                outcome.write = Err(error);
                                return outcome;
                            }
                        }
                    }
                    Err(failure) => {
                        outcome.failures.push(failure.kind.label());
                        outcome.images_failed += 1;
                        let _ = image.mark_failed();
                    }
                }
            }
            None => {
                outcome.images_failed += 1;
                let _ = image.mark_failed();
            }
        }

        record.image_refs.push(image);
    }

    outcome.write = persistence.lock().unwrap().write(&record);
    outcome
}
