//! # ScholarFlow
//!
//! Command-line entry point.
//!
//! ```bash
//! # Run the HTTP + WebSocket API
//! scholarflow serve --port 8000
//!
//! # Research a question from the terminal
//! scholarflow research "How do surface codes correct quantum errors?"
//! ```

// =============================================================================
// IMPORTS
// =============================================================================
use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use scholarflow::server::{self, AppState, ServiceInfo};
use scholarflow::tools::{ArxivSearcher, PdfParser};
use scholarflow::{
    ChannelError, Config, InMemorySessionStore, InMemoryVectorIndex, OpenRouterClient,
    ProgressEvent, PushChannel, Status, Workflow, WorkflowRunner,
};

// =============================================================================
// CLI ARGUMENTS
// =============================================================================
#[derive(Parser, Debug)]
#[command(
    name = "scholarflow",
    version,
    about = "A research agent that plans, reads arXiv papers, and writes cited reports",
    long_about = r#"
ScholarFlow breaks a research question into sub-questions, finds and reads
arXiv papers for each one, and writes a report with citations.

Configuration comes from the environment or a .env file:
  OPENROUTER_API_KEY   API key for the completion models (required)
  SMART_MODEL          model used for planning and writing
  FAST_MODEL           model used for paper summaries
  LIGHTWEIGHT_MODE     process fewer papers and skip large PDFs
  SKIP_VECTOR_STORE    do not index paper text for retrieval

EXAMPLES:
  scholarflow serve --host 0.0.0.0 --port 8000
  scholarflow research "What are the limits of in-context learning?"
"#
)]
struct Args {
    /// Enable debug logging
    #[arg(short = 'v', long = "verbose", global = true, default_value = "false")]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the REST API and the progress WebSocket
    Serve {
        /// Bind host (overrides HOST)
        #[arg(long)]
        host: Option<String>,

        /// Bind port (overrides PORT)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Run one research session and print the report
    Research {
        /// The research question
        #[arg(value_name = "QUERY")]
        query: String,
    },
}

// =============================================================================
// MAIN FUNCTION
// =============================================================================
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose)?;

    let mut config = Config::from_env()?;
    config.validate()?;

    info!(
        smart_model = %config.smart_model,
        fast_model = %config.fast_model,
        lightweight = config.lightweight_mode,
        vector_index = !config.skip_vector_store,
        "Configuration loaded"
    );

    let runner = Arc::new(build_runner(&config)?);

    match args.command {
        Command::Serve { host, port } => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }

            let state = AppState {
                runner,
                info: Arc::new(ServiceInfo::from_config(&config)),
            };
            server::run_server(state, &config.host, config.port).await
        }
        Command::Research { query } => research(&runner, &query).await,
    }
}

/// Wire the production collaborators into a runner.
fn build_runner(config: &Config) -> Result<WorkflowRunner> {
    let llm = Arc::new(OpenRouterClient::new(config));

    let search = ArxivSearcher::new(config.arxiv_base_url.as_str(), config.arxiv_max_results)
        .context("Failed to create arXiv client")?
        .with_rate_limit(config.arxiv_rate_limit());

    let pdf = PdfParser::new(config.pdf_chunk_size, config.pdf_chunk_overlap)
        .context("Failed to create PDF downloader")?
        .lightweight(config.lightweight_mode);

    let mut workflow = Workflow::new(
        llm,
        Arc::new(search),
        Arc::new(pdf),
        config.workflow_settings(),
    );
    if !config.skip_vector_store {
        workflow = workflow.with_vector_index(Arc::new(InMemoryVectorIndex::new()));
    }

    Ok(WorkflowRunner::new(
        Arc::new(workflow),
        Arc::new(InMemorySessionStore::new()),
    ))
}

// =============================================================================
// ONE-SHOT RESEARCH
// =============================================================================

/// Prints progress events as they arrive.
struct StdoutChannel;

#[async_trait]
impl PushChannel for StdoutChannel {
    async fn send(&self, event: &ProgressEvent) -> Result<(), ChannelError> {
        match event {
            ProgressEvent::Started { session_id, .. } => {
                println!("Session {}", session_id);
            }
            ProgressEvent::Progress {
                node,
                step,
                status,
                plan,
                current_task_index,
                documents,
                ..
            } => {
                println!(
                    "[{}] {} -> {} (question {}/{}, {} papers)",
                    step,
                    node,
                    status,
                    (*current_task_index).min(plan.len()),
                    plan.len(),
                    documents.len()
                );
            }
            ProgressEvent::Researching {
                question_index,
                question,
                total_questions,
            } => {
                println!("  Question {}/{}: {}", question_index + 1, total_questions, question);
            }
            ProgressEvent::PaperComplete { title, arxiv_id, .. } => {
                println!("    + {} ({})", title, arxiv_id);
            }
            _ => {}
        }
        Ok(())
    }
}

async fn research(runner: &WorkflowRunner, query: &str) -> Result<()> {
    let state = runner.run_streaming(query, Arc::new(StdoutChannel)).await?;

    if state.status == Status::Error {
        let message = state.error.unwrap_or_else(|| "unknown error".to_string());
        error!(session_id = %state.session_id, error = %message, "Research failed");
        anyhow::bail!("Research failed: {}", message);
    }

    println!("\n{}", "=".repeat(60));
    println!("RESEARCH REPORT");
    println!("{}\n", "=".repeat(60));
    println!("{}", state.report().unwrap_or_default());
    println!("\n{}", "=".repeat(60));

    if let Some(warning) = &state.error {
        eprintln!("Note: {}", warning);
    }

    info!(
        session_id = %state.session_id,
        papers = state.documents.len(),
        "Research completed"
    );
    Ok(())
}

// =============================================================================
// LOGGING INITIALIZATION
// =============================================================================
/// Install the global tracing subscriber. `RUST_LOG` wins over `--verbose`.
fn init_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    Ok(())
}
