use crate::{
    client::{ChatClient, OpenAiClient},
    config::Config,
    error::{Error, Result},
    file::WorkItem,
    mirror::{Mirror, MirrorStats},
    progress::ProgressCounter,
    prompt::PromptBuilder,
    scanner::Scanner,
    worker::{Status, TranslationOutcome, Translator},
    writer::{self, OutcomeRecord, RunReport},
};
use rayon::prelude::*;
use serde::Serialize;
use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    path::Path,
    sync::{Arc, mpsc},
    time::{Duration, Instant},
};
use tracing::{debug, error, info, instrument, warn};

/// Statistics collected during pipeline execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineStats {
    /// Translatable files discovered
    pub total_files: usize,

    /// Files newly translated
    pub translated: usize,

    /// Files whose output already existed
    pub skipped: usize,

    /// Files that failed
    pub failed: usize,

    /// Translated files saved as the raw reply
    pub fallbacks: usize,

    /// Files a dry run would have sent for translation
    pub pending: usize,

    /// What the mirror pass did
    pub mirror: MirrorStats,

    /// Total execution time
    pub duration: Duration,

    /// Time spent mirroring and scanning
    pub prepare_duration: Duration,

    /// Time spent translating
    pub translate_duration: Duration,

    /// Output directory path
    pub output_directory: String,
}

impl PipelineStats {
    /// Returns true if no file failed.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Prints a human-readable summary to stdout.
    pub fn print_summary(&self) {
        println!("\n╔═══════════════════════════════════════════════════════╗");
        println!("║            Translation Run Summary                    ║");
        println!("╠═══════════════════════════════════════════════════════╣");
        println!(
            "║ Files Found:          {:>8}                        ║",
            self.total_files
        );
        println!(
            "║   - Translated:       {:>8}                        ║",
            self.translated
        );
        println!(
            "║   - Skipped:          {:>8}                        ║",
            self.skipped
        );
        println!(
            "║   - Failed:           {:>8}                        ║",
            self.failed
        );
        if self.fallbacks > 0 {
            println!(
                "║   - Raw responses:    {:>8}                        ║",
                self.fallbacks
            );
        }
        if self.pending > 0 {
            println!(
                "║   - Would translate:  {:>8}                        ║",
                self.pending
            );
        }
        println!("║                                                       ║");
        println!(
            "║ Files Copied:         {:>8}                        ║",
            self.mirror.copied_files
        );
        println!(
            "║ Directories:          {:>8}                        ║",
            self.mirror.directories
        );
        println!("║ Output Directory:                                     ║");
        println!(
            "║   {}                                              ║",
            self.output_directory
        );
        println!("║                                                       ║");
        println!("║ Timing Breakdown:                                     ║");
        println!(
            "║   - Preparing:        {:>8.2}s                     ║",
            self.prepare_duration.as_secs_f64()
        );
        println!(
            "║   - Translating:      {:>8.2}s                     ║",
            self.translate_duration.as_secs_f64()
        );
        println!(
            "║   - Total:            {:>8.2}s                     ║",
            self.duration.as_secs_f64()
        );
        println!("╚═══════════════════════════════════════════════════════╝\n");
    }
}

/// One outcome together with the progress index it completed under.
#[derive(Debug, Clone)]
pub struct CompletedItem {
    /// 1-based completion index
    pub index: usize,

    /// What happened to the item
    pub outcome: TranslationOutcome,
}

/// Main orchestrator: mirror, scan, then translate with a bounded worker pool.
pub struct Pipeline {
    config: Config,
    scanner: Scanner,
    mirror: Mirror,
    prompt: PromptBuilder,
    client: Option<Arc<dyn ChatClient>>,
}

impl Pipeline {
    /// Creates a new pipeline with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration validation fails
    /// - The prompt template cannot be loaded
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let scanner = Scanner::new(&config);
        let mirror = Mirror::new(&config);
        let prompt = PromptBuilder::new(&config)?;

        Ok(Self {
            config,
            scanner,
            mirror,
            prompt,
            client: None,
        })
    }

    /// Uses `client` instead of building an [`OpenAiClient`] from the config.
    #[must_use]
    pub fn with_client(mut self, client: Arc<dyn ChatClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Executes the complete pipeline and returns statistics.
    ///
    /// # Process
    ///
    /// 1. **Mirror**: Recreates the directory tree and copies untranslated files
    /// 2. **Scan**: Collects every translatable file
    /// 3. **Translate**: Runs each file through a worker, at most `threads` at a time
    ///
    /// Per-file failures are logged and counted; they never abort the run.
    ///
    /// # Errors
    ///
    /// Returns an error only for conditions that stop the run before any
    /// translation starts: missing input, unwritable output tree, prompt
    /// rendering or client construction failures.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use doc_translate::{Config, Pipeline};
    ///
    /// # fn main() -> anyhow::Result<()> {
    /// let config = Config::builder()
    ///     .input_dir("./docs")
    ///     .output_dir("./docs-zh")
    ///     .api_key("sk-...")
    ///     .build()?;
    ///
    /// let stats = Pipeline::new(config)?.run()?;
    /// stats.print_summary();
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip(self), fields(input_dir = %self.config.input_dir.display()))]
    pub fn run(self) -> Result<PipelineStats> {
        let start_time = Instant::now();

        if self.config.dry_run {
            return self.run_dry(start_time);
        }

        info!("Stage 1/3: Mirroring directory structure...");
        let mirror = self.mirror.sync()?;

        info!("Stage 2/3: Scanning for translatable files...");
        let items = self.scanner.scan()?;
        let prepare_duration = start_time.elapsed();

        let mut stats = PipelineStats {
            total_files: items.len(),
            mirror,
            prepare_duration,
            output_directory: self.config.output_dir.display().to_string(),
            ..PipelineStats::default()
        };

        if items.is_empty() {
            info!("No files to translate were found.");
            stats.duration = start_time.elapsed();
            return Ok(stats);
        }

        info!(
            "Stage 3/3: Found {} files to translate. Starting with {} workers...",
            items.len(),
            self.config.threads
        );

        let system_prompt = self.prompt.render(&self.config.target_language)?;
        let client: Arc<dyn ChatClient> = match self.client {
            Some(ref client) => Arc::clone(client),
            None => Arc::new(OpenAiClient::new(&self.config.api)?),
        };
        let translator = Translator::new(
            client,
            self.config.api.model.as_str(),
            system_prompt,
            self.config.output_dir.as_path(),
            self.config.api.timeout,
        );

        let translate_start = Instant::now();
        let completed = dispatch(&translator, items, self.config.threads, &self.config.output_dir)?;
        stats.translate_duration = translate_start.elapsed();

        for done in &completed {
            match done.outcome.status {
                Status::Success => stats.translated += 1,
                Status::Skipped => stats.skipped += 1,
                Status::Failed => stats.failed += 1,
            }
            if done.outcome.fallback {
                stats.fallbacks += 1;
            }
        }
        stats.duration = start_time.elapsed();

        info!(
            "All translation tasks completed in {:.2}s: {} translated, {} skipped, {} failed",
            stats.duration.as_secs_f64(),
            stats.translated,
            stats.skipped,
            stats.failed
        );

        if let Some(ref path) = self.config.report_path {
            let report = self.build_report(&stats, &completed);
            if let Err(e) = writer::write_report(path, &report) {
                warn!("Could not write report: {}", e);
            }
        }

        Ok(stats)
    }

    /// Lists what a real run would do without writing or calling the API.
    fn run_dry(&self, start_time: Instant) -> Result<PipelineStats> {
        warn!("Dry run mode enabled - no API calls, no file writes");

        let items = self.scanner.scan()?;
        let total = items.len();
        let mut stats = PipelineStats {
            total_files: total,
            output_directory: self.config.output_dir.display().to_string(),
            ..PipelineStats::default()
        };

        if items.is_empty() {
            info!("No files to translate were found.");
        }

        for (i, item) in items.iter().enumerate() {
            let output_path = item.output_path(&self.config.output_dir);
            if output_path.exists() {
                stats.skipped += 1;
                info!("[{}/{}] Would skip existing file: {}", i + 1, total, output_path.display());
            } else {
                stats.pending += 1;
                info!("[{}/{}] Would translate {}", i + 1, total, item.posix_path());
            }
        }

        stats.prepare_duration = start_time.elapsed();
        stats.duration = stats.prepare_duration;
        Ok(stats)
    }

    fn build_report(&self, stats: &PipelineStats, completed: &[CompletedItem]) -> RunReport {
        RunReport {
            generated_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            input_directory: self.config.input_dir.display().to_string(),
            output_directory: self.config.output_dir.display().to_string(),
            model: self.config.api.model.clone(),
            total_files: stats.total_files,
            translated: stats.translated,
            skipped: stats.skipped,
            failed: stats.failed,
            fallbacks: stats.fallbacks,
            duration_secs: stats.duration.as_secs_f64(),
            outcomes: completed
                .iter()
                .map(|done| OutcomeRecord {
                    index: done.index,
                    path: done.outcome.item.posix_path(),
                    status: done.outcome.status.as_str(),
                    fallback: done.outcome.fallback,
                    error: done.outcome.error.as_ref().map(ToString::to_string),
                })
                .collect(),
        }
    }
}

/// Runs every item through `translator` on a pool of `threads` workers.
///
/// Workers hand finished outcomes to the calling thread over a channel; only
/// the calling thread advances the progress counter and logs, so progress
/// lines come out in index order. Returns once every item has an outcome,
/// in completion order.
pub(crate) fn dispatch(
    translator: &Translator,
    items: Vec<WorkItem>,
    threads: usize,
    output_dir: &Path,
) -> Result<Vec<CompletedItem>> {
    let progress = ProgressCounter::new(items.len());
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("translate-{i}"))
        .build()
        .map_err(|e| Error::worker(format!("failed to start worker pool: {e}")))?;

    debug!("Dispatching {} items to {} workers", progress.total(), threads);

    let (tx, rx) = mpsc::channel::<TranslationOutcome>();
    let mut completed = Vec::with_capacity(items.len());

    std::thread::scope(|s| {
        s.spawn(move || {
            pool.install(|| {
                items
                    .into_par_iter()
                    .with_max_len(1)
                    .for_each_with(tx, |tx, item| {
                        // The receiver lives until every sender is dropped.
                        let _ = tx.send(run_guarded(translator, item));
                    });
            });
        });

        for outcome in rx {
            let index = progress.advance();
            let label = progress.label(index);
            let message = outcome.message(output_dir);
            match outcome.status {
                Status::Failed => error!("{} {}", label, message),
                Status::Success | Status::Skipped => info!("{} {}", label, message),
            }
            completed.push(CompletedItem { index, outcome });
        }
    });

    Ok(completed)
}

/// Converts a panic inside a worker into a failed outcome for that item.
fn run_guarded(translator: &Translator, item: WorkItem) -> TranslationOutcome {
    let backup = item.clone();
    panic::catch_unwind(AssertUnwindSafe(|| translator.process(item)))
        .unwrap_or_else(|payload| TranslationOutcome::failed(backup, Error::worker(panic_message(&*payload))))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "worker panicked".to_string())
}
