//! # Summary Harness CLI (`summ`)
//!
//! ## Usage
//!
//! ```bash
//! summ --config ./config/summ.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `summ init` | Create the SQLite database and run schema migrations |
//! | `summ text <file>...` | Summarize text files (`-` reads stdin) |
//! | `summ documents [<id>...]` | Summarize passages ranked from indexed documents |
//! | `summ leases list` | Show active provider leases |
//! | `summ leases release <requester>` | Drop every lease of a crashed requester |
//!
//! The summary goes to stdout; logs and statistics go to stderr.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use summary_harness::allocator::release_requester;
use summary_harness::config::{self, Config};
use summary_harness::harness::{self, LeaseTools};
use summary_harness::logging::init_tracing;
use summary_harness::migrate;
use summary_harness::summarize::{Summary, SummaryRequest};
use summary_harness_core::models::DocumentScope;
use summary_harness_core::store::LeaseStore;

/// Summary Harness CLI, retrieval-augmented map-reduce summarization.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/summ.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "summ",
    about = "Summary Harness, map-reduce summarization over capacity-limited LLM providers",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/summ.toml")]
    config: PathBuf,

    /// Increase log verbosity (`-v` debug, `-vv` trace). `RUST_LOG` wins.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent, running it multiple times is safe.
    Init,

    /// Summarize one or more text files.
    ///
    /// Files are summarized as if concatenated paragraph by paragraph.
    Text {
        /// Input files, `-` for stdin.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        #[command(flatten)]
        options: SummaryArgs,
    },

    /// Summarize passages ranked from the vector index.
    Documents {
        /// Document ids to search. Omit to search every document.
        ids: Vec<String>,

        /// Prompt used to rank passages. Defaults to `--prompt`.
        #[arg(long)]
        search_prompt: Option<String>,

        /// Maximum hits per search sentence.
        #[arg(long)]
        sentence_limit: Option<usize>,

        /// Similarity floor for a hit.
        #[arg(long)]
        min_score: Option<f32>,

        /// Extra text files summarized alongside the passages.
        #[arg(long = "text")]
        files: Vec<PathBuf>,

        #[command(flatten)]
        options: SummaryArgs,
    },

    /// Inspect and repair provider leases.
    Leases {
        #[command(subcommand)]
        action: LeaseAction,
    },
}

#[derive(Subcommand)]
enum LeaseAction {
    /// List active leases and their holders.
    List,

    /// Remove a requester from every lease.
    Release {
        /// Requester id as shown by `summ leases list`.
        requester: String,
    },
}

/// Options shared by the summarizing commands.
#[derive(Args)]
struct SummaryArgs {
    /// Summarization instruction.
    #[arg(long, short)]
    prompt: String,

    #[arg(long)]
    persona: Option<String>,

    /// Output format instructions for the final answer.
    #[arg(long)]
    format: Option<String>,

    /// Use this summarizer instead of the configured pool order.
    #[arg(long)]
    provider: Option<String>,

    #[arg(long)]
    retries: Option<usize>,

    /// Maximum chunks taken from the input (0 = unlimited).
    #[arg(long)]
    max_chunks: Option<usize>,

    /// Accepted final characters, comma separated.
    #[arg(long, value_delimiter = ',')]
    endings: Option<Vec<String>>,

    /// Print the full summary with statistics as JSON.
    #[arg(long)]
    json: bool,
}

impl SummaryArgs {
    fn apply(&self, mut request: SummaryRequest) -> SummaryRequest {
        request.persona = self.persona.clone();
        request.output_format = self.format.clone();
        request.provider = self.provider.clone();
        request.retries = self.retries;
        request.max_chunks = self.max_chunks;
        request.endings = self.endings.clone();
        request
    }
}

fn read_input(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read stdin")?;
        return Ok(text);
    }
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

async fn summarize(cfg: &Config, request: SummaryRequest, json: bool) -> Result<()> {
    let pool = harness::open(cfg).await?;
    let requester = uuid::Uuid::new_v4().to_string();
    let engine = harness::build_engine(cfg, &pool, &requester)?;

    let outcome = tokio::select! {
        result = engine.summarize(&request) => result.map_err(anyhow::Error::from),
        _ = tokio::signal::ctrl_c() => Err(anyhow::anyhow!("interrupted")),
    };
    let shutdown = engine.allocator().shutdown().await;
    pool.close().await;

    let summary = outcome?;
    shutdown?;
    print_summary(&summary, json)
}

fn print_summary(summary: &Summary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }
    println!("{}", summary.result.text);
    eprintln!(
        "rounds: {}  calls: {}  passages: {}  tokens: {} in / {} out  cost: {:.6}  time: {}ms{}",
        summary.rounds,
        summary.llm_calls,
        summary.passages,
        summary.result.prompt_tokens,
        summary.result.output_tokens,
        summary.result.cost,
        summary.processing_ms,
        if summary.cached { "  (cached)" } else { "" }
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Text { files, options } => {
            let mut request = options.apply(SummaryRequest::new(options.prompt.clone()));
            for file in &files {
                request = request.text(read_input(file)?);
            }
            summarize(&cfg, request, options.json).await?;
        }
        Commands::Documents {
            ids,
            search_prompt,
            sentence_limit,
            min_score,
            files,
            options,
        } => {
            if cfg.vector.is_none() {
                bail!("`summ documents` needs a [vector] section in the config");
            }
            let scope = if ids.is_empty() {
                DocumentScope::All
            } else {
                DocumentScope::Only(ids)
            };
            let mut request = options
                .apply(SummaryRequest::new(options.prompt.clone()))
                .documents(scope);
            request.search_prompt = search_prompt;
            request.sentence_limit = sentence_limit;
            request.min_score = min_score;
            for file in &files {
                request = request.text(read_input(file)?);
            }
            summarize(&cfg, request, options.json).await?;
        }
        Commands::Leases { action } => {
            let pool = harness::open(&cfg).await?;
            let tools = LeaseTools::new(&pool, &cfg);
            match action {
                LeaseAction::List => {
                    let entries = tools.leases.entries().await?;
                    if entries.is_empty() {
                        println!("No active leases.");
                    }
                    for (key, holders) in entries {
                        let holders: Vec<String> = holders.into_iter().collect();
                        println!("{}  {}", key, holders.join(","));
                    }
                }
                LeaseAction::Release { requester } => {
                    let released =
                        release_requester(tools.leases.as_ref(), tools.mutex.as_ref(), &requester)
                            .await?;
                    println!("Released {} lease(s) held by {}.", released.len(), requester);
                    for key in released {
                        println!("  {}", key);
                    }
                }
            }
            pool.close().await;
        }
    }

    Ok(())
}
