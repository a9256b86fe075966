use anyhow::Context;
use clap::Parser;
use doc_translate::{Config, Error, Pipeline, PipelineStats};
use std::{path::PathBuf, process::ExitCode, time::Duration};
use tracing::{debug, error};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "doc-translate",
    version,
    author,
    about = "Translate a documentation tree with an LLM",
    long_about = "Translate a documentation tree with an OpenAI-compatible chat model.\n\n\
    The input tree is mirrored into the output directory. Files with a translatable \
    extension are sent to the model one request per file, the rest are copied as-is. \
    Files already present in the output are never translated again, so an interrupted \
    run can simply be restarted.\n\n\
    USAGE EXAMPLES:\n  \
      # Translate Markdown and reStructuredText files\n  \
      doc-translate ./docs ./docs-zh\n\n  \
      # Only Markdown, 4 workers, custom endpoint\n  \
      doc-translate ./docs ./docs-zh --extensions md --threads 4 --base-url http://localhost:8000/v1\n\n  \
      # See what would be translated\n  \
      doc-translate ./docs ./docs-zh --dry-run"
)]
struct Cli {
    /// Directory holding the source documentation
    #[arg(value_name = "INPUT_DIR")]
    input_dir: PathBuf,

    /// Directory receiving the mirrored, translated tree
    #[arg(value_name = "OUTPUT_DIR")]
    output_dir: PathBuf,

    /// File extensions to translate (a leading dot is optional)
    #[arg(long, num_args = 1.., default_values = [".md", ".rst"])]
    extensions: Vec<String>,

    /// API key for the chat-completion service
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Base URL of the OpenAI-compatible API
    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    base_url: String,

    /// Model name
    #[arg(long, env = "OPENAI_MODEL", default_value = "gpt-4o-mini")]
    model: String,

    /// Number of files translated concurrently
    #[arg(short, long, default_value_t = 10)]
    threads: usize,

    /// Upper bound in seconds for one request, streaming included
    #[arg(long, default_value_t = 600, value_name = "SECS")]
    timeout: u64,

    /// Language the documentation is translated into
    #[arg(long, default_value = "Simplified Chinese", value_name = "LANG")]
    target_language: String,

    /// Tera template replacing the built-in system prompt
    ///
    /// The template receives `target_language`.
    #[arg(long, value_name = "FILE")]
    prompt_template: Option<PathBuf>,

    /// Write a JSON report of every outcome to this file
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// List what would be translated without writing or calling the API
    #[arg(long)]
    dry_run: bool,

    /// Verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    setup_tracing(cli.verbose);

    match execute(cli) {
        Ok(stats) => {
            stats.print_summary();
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{:#}", e);
            // Full chain for anything that is not a known startup condition.
            if !e.downcast_ref::<Error>().is_some_and(Error::is_fatal) {
                debug!("{:?}", e);
            }
            ExitCode::FAILURE
        }
    }
}

fn execute(cli: Cli) -> anyhow::Result<PipelineStats> {
    let mut builder = Config::builder()
        .input_dir(cli.input_dir)
        .output_dir(cli.output_dir)
        .extensions(cli.extensions)
        .threads(cli.threads)
        .base_url(cli.base_url)
        .model(cli.model)
        .timeout(Duration::from_secs(cli.timeout))
        .target_language(cli.target_language)
        .dry_run(cli.dry_run);

    if let Some(api_key) = cli.api_key {
        builder = builder.api_key(api_key);
    }

    if let Some(template) = cli.prompt_template {
        builder = builder.prompt_template(template);
    }

    if let Some(report) = cli.report {
        builder = builder.report_path(report);
    }

    let config = builder.build().context("Failed to build configuration")?;

    let stats = Pipeline::new(config)
        .context("Failed to create pipeline")?
        .run()
        .context("Pipeline execution failed")?;

    Ok(stats)
}

fn setup_tracing(verbosity: u8) {
    let default_filter = match verbosity {
        0 => "doc_translate=info",
        1 => "doc_translate=debug",
        _ => "doc_translate=trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_thread_ids(false))
        .init();
}
