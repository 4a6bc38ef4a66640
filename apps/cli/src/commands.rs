//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use grantscout_artifacts::{read_grants_csv, write_json};
use grantscout_core::analysis::{analyze, format_thousands, frequency_table, tag_frequencies};
use grantscout_core::{Extractor, OpenRouterModel, Pipeline, ProgressReporter, RunConfig, RunResult};
use grantscout_crawler::{ChromeRenderer, Crawler, FETCH_TIMEOUT, build_client};
use grantscout_shared::{
    AppConfig, SeedConfig, ValidationPolicy, init_config, load_config, load_config_from,
    validate_api_key,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// GrantScout: find AU/NZ research funding opportunities.
#[derive(Parser)]
#[command(
    name = "grantscout",
    version,
    about = "Crawl funder websites and feeds into a clean, de-duplicated grants table.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to the user config directory).
    #[arg(long, global = true, env = "GRANTSCOUT_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Crawl seeds, extract grants, ingest feeds and export CSV/JSON.
    Run(RunArgs),

    /// Crawl seeds only and list the pages that would be extracted.
    Crawl {
        /// Seed list: one URL per line, `#` comments allowed.
        #[arg(long)]
        seeds: PathBuf,

        /// Write the crawled pages as JSON.
        #[arg(short, long)]
        out: Option<PathBuf>,

        #[command(flatten)]
        limits: CrawlLimits,

        /// Re-render script-gated pages with headless Chrome.
        #[arg(long)]
        render: bool,
    },

    /// Ingest the configured feeds only and export them.
    Feeds {
        /// Output directory for the export.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Parse deadlines and funding amounts in an exported CSV.
    Analyze {
        /// Grants CSV produced by `run` or `feeds`.
        csv: PathBuf,

        /// Output CSV (defaults to `<stem>_parsed_complete.csv`).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Reference date for deadline status (YYYY-MM-DD, defaults to today).
        #[arg(long)]
        today: Option<NaiveDate>,
    },

    /// Print tag frequencies for an exported CSV as a Markdown table.
    Tags {
        /// Grants CSV produced by `run` or `feeds`.
        csv: PathBuf,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Arguments for `grantscout run`.
#[derive(Args)]
pub(crate) struct RunArgs {
    /// Seed list: one URL per line, `#` comments allowed.
    #[arg(long)]
    seeds: Option<PathBuf>,

    /// Output directory for the export.
    #[arg(short, long)]
    out: Option<PathBuf>,

    #[command(flatten)]
    limits: CrawlLimits,

    /// Skip structured feeds.
    #[arg(long)]
    no_feeds: bool,

    /// Skip crawling and extraction.
    #[arg(long)]
    no_crawl: bool,

    /// Re-render script-gated pages with headless Chrome.
    #[arg(long)]
    render: bool,

    /// What to do with extracted records that do not fit the schema.
    #[arg(long)]
    policy: Option<ValidationPolicy>,
}

/// Per-run crawl overrides.
#[derive(Args)]
pub(crate) struct CrawlLimits {
    /// Maximum link depth from each seed.
    #[arg(long)]
    max_depth: Option<u32>,

    /// Maximum pages fetched per seed.
    #[arg(long)]
    max_pages: Option<usize>,
}

impl CrawlLimits {
    fn apply(&self, seeds: &mut SeedConfig) {
        seeds.max_depth = self.max_depth.or(seeds.max_depth);
        seeds.max_pages_per_seed = self.max_pages.or(seeds.max_pages_per_seed);
    }
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "grantscout=info",
        1 => "grantscout=debug",
        _ => "grantscout=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Run(args) => cmd_run(config_path, args).await,
        Command::Crawl {
            seeds,
            out,
            limits,
            render,
        } => cmd_crawl(config_path, &seeds, out.as_deref(), &limits, render).await,
        Command::Feeds { out } => cmd_feeds(config_path, out).await,
        Command::Analyze { csv, out, today } => cmd_analyze(&csv, out.as_deref(), today),
        Command::Tags { csv } => cmd_tags(&csv),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path).await,
        },
    }
}

fn load(config_path: Option<&Path>) -> Result<AppConfig> {
    let config = match config_path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(config)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(config_path: Option<&Path>, args: RunArgs) -> Result<()> {
    let config = load(config_path)?;

    let mut seeds = match (&args.seeds, args.no_crawl) {
        (Some(path), false) => SeedConfig::from_file(path)?,
        _ => SeedConfig::default(),
    };
    args.limits.apply(&mut seeds);

    let mut run_config = RunConfig::from_app(&config, seeds);
    run_config.include_crawl = !args.no_crawl;
    run_config.include_feeds = !args.no_feeds;
    run_config.render |= args.render;
    if let Some(out) = args.out {
        run_config.output_dir = out;
    }

    let crawls = run_config.include_crawl && !run_config.seeds.seeds.is_empty();
    if run_config.include_crawl && args.seeds.is_none() && config.feeds.is_empty() {
        return Err(eyre!("--seeds is required unless feeds are configured"));
    }

    // Only crawling needs the LLM.
    let extractor = if crawls {
        let api_key = validate_api_key(&config)?;
        let model = OpenRouterModel::from_config(&config.llm, &api_key)?;
        let policy = args.policy.unwrap_or(config.llm.validation_policy);
        Some(Extractor::from_config(model, &config.llm).with_policy(policy))
    } else {
        None
    };

    info!(
        seeds = run_config.seeds.seeds.len(),
        feeds = run_config.feeds.len(),
        crawl = run_config.include_crawl,
        render = run_config.render,
        "starting grantscout run"
    );

    let crawler = Crawler::new(run_config.crawl.clone())?;
    let renderer = ChromeRenderer::from_config(&config.render);
    let client = build_client(FETCH_TIMEOUT)?;
    let pipeline = Pipeline::new(run_config, crawler, extractor, Some(renderer), client);

    let reporter = CliProgress::new();
    let result = pipeline.run(&reporter).await;
    if result.is_err() {
        reporter.spinner.finish_and_clear();
    }
    print_run_summary(&result?);
    Ok(())
}

async fn cmd_crawl(
    config_path: Option<&Path>,
    seeds_path: &Path,
    out: Option<&Path>,
    limits: &CrawlLimits,
    render: bool,
) -> Result<()> {
    let config = load(config_path)?;
    let mut seeds = SeedConfig::from_file(seeds_path)?;
    limits.apply(&mut seeds);

    let mut run_config = RunConfig::from_app(&config, seeds);
    run_config.include_feeds = false;
    run_config.render |= render;

    let crawler = Crawler::new(run_config.crawl.clone())?;
    let renderer = ChromeRenderer::from_config(&config.render);
    let client = build_client(FETCH_TIMEOUT)?;
    let pipeline: Pipeline<OpenRouterModel> =
        Pipeline::new(run_config, crawler, None, Some(renderer), client);

    let output = pipeline.crawl_pages().await;

    println!();
    println!("  {:>5}  {:>7}  {:<6}  URL", "Depth", "Chars", "Render");
    for page in &output.pages {
        println!(
            "  {:>5}  {:>7}  {:<6}  {}",
            page.depth,
            page.text.chars().count(),
            if page.needs_richer_render { "yes" } else { "" },
            page.url
        );
    }
    println!();
    for report in &output.reports {
        println!(
            "  {}: {} pages, {} skipped, {} errors in {:.1}s",
            report.seed,
            report.pages_fetched,
            report.pages_skipped,
            report.errors.len(),
            report.duration.as_secs_f64()
        );
    }

    if let Some(path) = out {
        write_json(path, &output.pages)?;
        println!("  Pages written to {}", path.display());
    }
    println!();
    Ok(())
}

async fn cmd_feeds(config_path: Option<&Path>, out: Option<PathBuf>) -> Result<()> {
    let config = load(config_path)?;
    if config.feeds.is_empty() {
        return Err(eyre!("no feeds configured; add [[feeds]] entries to the config file"));
    }

    let mut run_config = RunConfig::from_app(&config, SeedConfig::default());
    run_config.include_crawl = false;
    if let Some(out) = out {
        run_config.output_dir = out;
    }

    let crawler = Crawler::new(run_config.crawl.clone())?;
    let client = build_client(FETCH_TIMEOUT)?;
    let pipeline: Pipeline<OpenRouterModel> = Pipeline::new(run_config, crawler, None, None, client);

    let reporter = CliProgress::new();
    let result = pipeline.run(&reporter).await;
    if result.is_err() {
        reporter.spinner.finish_and_clear();
    }
    print_run_summary(&result?);
    Ok(())
}

fn cmd_analyze(csv: &Path, out: Option<&Path>, today: Option<NaiveDate>) -> Result<()> {
    let today = today.unwrap_or_else(|| Local::now().date_naive());
    let summary = analyze(csv, out, today)?;

    println!();
    println!("  Analysed {} grants ({} expired)", summary.total, summary.expired);
    println!("  Output:  {}", summary.output.display());
    println!();
    println!("  Deadline status:");
    for (status, count) in &summary.by_status {
        println!("    {status:<10} {count}");
    }
    println!("  Funding confidence:");
    for (confidence, count) in &summary.by_confidence {
        println!("    {confidence:<10} {count}");
    }
    if !summary.actionable.is_empty() {
        println!();
        println!("  Largest open opportunities (AUD):");
        for (name, amount) in summary.actionable.iter().take(10) {
            println!(
                "    {:>14}  {name}",
                format_thousands(*amount)
            );
        }
    }
    println!();
    Ok(())
}

fn cmd_tags(csv: &Path) -> Result<()> {
    let grants = read_grants_csv(csv)?;
    let counts = tag_frequencies(&grants);
    info!(grants = grants.len(), tags = counts.len(), "tags generated");
    print!("{}", frequency_table(&counts));
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = load(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

fn print_run_summary(result: &RunResult) {
    let c = &result.counts;
    println!();
    println!("  Run complete in {:.1}s", result.elapsed.as_secs_f64());
    println!("  Pages crawled:      {}", c.pages_crawled);
    println!(
        "  Chunks extracted:   {} ({} failed)",
        c.chunks_extracted, c.chunks_failed
    );
    println!("  Records extracted:  {}", c.records_extracted);
    println!("  Records from feeds: {}", c.records_from_feeds);
    println!("  In scope:           {}", c.records_in_scope);
    println!("  Duplicates dropped: {}", c.duplicates_dropped);
    println!("  Exported:           {}", c.records_exported);
    println!();
    println!("  CSV:  {}", result.paths.csv.display());
    println!("  JSON: {}", result.paths.json.display());

    if !result.failed_sources.is_empty() {
        println!();
        println!("  Failed sources:");
        for (source, reason) in &result.failed_sources {
            println!("    {source}: {reason}");
        }
    }
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn chunk_processed(&self, url: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Extracting [{current}/{total}] {url}"));
    }

    fn feed_ingested(&self, feed: &str, grants: usize) {
        self.spinner
            .println(format!("  feed {feed}: {grants} grants"));
    }

    fn done(&self, _result: &RunResult) {
        self.spinner.finish_and_clear();
    }
}
