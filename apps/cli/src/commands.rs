//! CLI command definitions, routing, and tracing setup.

use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use medinfo_core::{
    AnswerSource, ConversationSession, DefaultResolver, Resolution, ResolveProgress, Tier,
    TurnOutcome, build_resolver,
};
use medinfo_dataset::{MedicineDataset, format_record};
use medinfo_shared::{AppConfig, ServiceError, init_config, load_config, load_config_from};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// medinfo: medicine information assistant.
#[derive(Parser)]
#[command(
    name = "medinfo",
    version,
    about = "Answer medicine questions from a local dataset, falling back to language models.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.medinfo/medinfo.toml).
    #[arg(long, global = true, env = "MEDINFO_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the dataset CSV path.
    #[arg(long, global = true)]
    pub dataset: Option<PathBuf>,

    /// Skip the medical model tier.
    #[arg(long, global = true)]
    pub no_medical: bool,

    /// Skip the generic model tier.
    #[arg(long, global = true)]
    pub no_generic: bool,

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
    /// Start an interactive conversation. Type `exit` to leave.
    Chat {
        /// Write the transcript as JSON to this file when the session ends.
        #[arg(long)]
        save: Option<PathBuf>,
    },

    /// Answer a single query and exit.
    Ask {
        /// The medicine or question.
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,

        /// Print the resolution (source tier and text) as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Search the local dataset only.
    Lookup {
        /// Medicine name or part of it.
        query: String,

        /// List every matching name instead of the first match's details.
        #[arg(long)]
        all: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
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

/// Initialize tracing based on CLI flags. Logs go to stderr so they never
/// interleave with answers on stdout.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "medinfo=warn",
        1 => "medinfo=debug",
        _ => "medinfo=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match &cli.command {
        Command::Chat { save } => cmd_chat(&cli, save.as_deref()).await,
        Command::Ask { query, json } => cmd_ask(&cli, &query.join(" "), *json).await,
        Command::Lookup { query, all } => cmd_lookup(&cli, query, *all),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(&cli),
        },
    }
}

/// Load config from `--config` or the default location, then apply flag overrides.
fn resolve_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };

    if let Some(path) = &cli.dataset {
        config.dataset.path = path.to_string_lossy().into_owned();
    }
    if cli.no_medical {
        config.medical_model.enabled = false;
    }
    if cli.no_generic {
        config.generic_model.enabled = false;
    }

    Ok(config)
}

async fn startup(cli: &Cli) -> Result<DefaultResolver> {
    let config = resolve_config(cli)?;
    let resolver = build_resolver(&config)
        .await
        .wrap_err("failed to start the medicine assistant")?;
    Ok(resolver)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_chat(cli: &Cli, save: Option<&Path>) -> Result<()> {
    let resolver = startup(cli).await?;
    let mut session = ConversationSession::new();
    info!(session = %session.id(), "chat session started");

    println!("Medicine Information Chatbot");
    println!("Ask about a medicine. Type `exit` to leave.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("You: ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                println!();
                None
            }
        };
        let Some(line) = line else {
            break;
        };

        let cancel = CancellationToken::new();
        let watcher = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            })
        };

        let progress = CliProgress::new();
        let outcome = session.submit(&resolver, &line, &cancel, &progress).await;
        progress.finish();
        watcher.abort();

        match outcome {
            TurnOutcome::Ignored => {}
            TurnOutcome::Farewell(text) => {
                println!("Assistant: {text}");
                break;
            }
            TurnOutcome::Answered(resolution) => {
                print_resolution(&resolution);
                println!();
            }
        }
    }

    if let Some(path) = save {
        let json = session.to_json()?;
        std::fs::write(path, json)
            .wrap_err_with(|| format!("failed to write transcript to {}", path.display()))?;
        println!("Transcript saved to {}", path.display());
    }

    Ok(())
}

async fn cmd_ask(cli: &Cli, query: &str, json: bool) -> Result<()> {
    let resolver = startup(cli).await?;

    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let progress = CliProgress::new();
    let resolution = resolver.resolve(query, &cancel, &progress).await;
    progress.finish();
    watcher.abort();

    if resolution.source == AnswerSource::Ignored {
        return Err(eyre!("nothing to ask: the query is blank"));
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&resolution)?);
    } else {
        print_resolution(&resolution);
    }

    Ok(())
}

fn cmd_lookup(cli: &Cli, query: &str, all: bool) -> Result<()> {
    let config = resolve_config(cli)?;
    let dataset = MedicineDataset::load(Path::new(&config.dataset.path))?;

    if all {
        let matches = dataset.filter(query);
        if matches.is_empty() {
            return Err(eyre!("no medicine in the dataset matches '{query}'"));
        }
        for record in matches {
            println!("{}", record.name);
        }
        return Ok(());
    }

    match dataset.lookup(query) {
        Some(record) => {
            println!("{}", format_record(record));
            Ok(())
        }
        None => Err(eyre!("no medicine in the dataset matches '{query}'")),
    }
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(cli: &Cli) -> Result<()> {
    let config = resolve_config(cli)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

fn print_resolution(resolution: &Resolution) {
    if let Some(notice) = &resolution.notice {
        println!("Assistant: {notice}");
    }
    println!("Assistant: {}", resolution.text);
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// Spinner on stderr naming the tier currently being consulted.
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
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ResolveProgress for CliProgress {
    fn tier_started(&self, tier: Tier) {
        let msg = match tier {
            Tier::Dataset => "Searching the medicine dataset",
            Tier::MedicalModel => "Asking the medical model (Ctrl-C to cancel)",
            Tier::GenericModel => "Asking the general knowledge model (Ctrl-C to cancel)",
        };
        self.spinner.set_message(msg);
    }

    fn tier_failed(&self, tier: Tier, error: &ServiceError) {
        self.spinner.set_message(format!("The {tier} could not answer: {error}"));
    }
}
