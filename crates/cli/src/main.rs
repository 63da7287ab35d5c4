//! Carematch CLI - step-by-step care-need assessment.
//!
//! Every invocation restores the member's draft, applies one command,
//! persists the result and prints where the assessment stands.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use carematch_core::{AssessmentConfig, Field, FieldValue};
use carematch_session::{
    AssessmentSession, HttpSubmitter, OutboxSubmitter, SessionSnapshot, StepMove, SubmitBlocked,
    SubmitOutcome, Submitter, SystemClock,
};
use carematch_storage::JsonFileStore;

/// Log filter when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Parser)]
#[command(name = "carematch")]
#[command(about = "Multi-step care-need assessment", long_about = None)]
struct Cli {
    /// Member being assessed
    #[arg(long)]
    member: String,

    /// Directory holding drafts and the submission outbox
    #[arg(long, default_value = ".carematch")]
    data_dir: PathBuf,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the current draft and step
    Show,
    /// Set a field
    Set {
        /// Field name (e.g. mobilityLevel)
        field: String,
        /// Value
        value: String,
    },
    /// Clear a field
    Clear {
        /// Field name
        field: String,
    },
    /// Validate the current step and move forward
    Next,
    /// Move back one step
    Prev,
    /// Jump to a step
    Goto {
        /// Step index
        step: usize,
    },
    /// Save the draft now
    Save,
    /// Submit the assessment
    Submit {
        /// POST the assessment to this URL
        #[arg(long)]
        endpoint: Option<String>,
        /// Write the assessment to this directory (default: <data-dir>/outbox)
        #[arg(long, conflicts_with = "endpoint")]
        outbox: Option<PathBuf>,
    },
    /// Discard the draft
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AssessmentConfig::from_json_file(path)?,
        None => AssessmentConfig::default(),
    };

    let store = JsonFileStore::new(cli.data_dir.join("drafts")).await?;
    let submitter: Arc<dyn Submitter> = match &cli.command {
        Commands::Submit { endpoint: Some(url), .. } => {
            Arc::new(HttpSubmitter::new(url.clone(), Duration::from_secs(30))?)
        }
        Commands::Submit { outbox, .. } => {
            let dir = outbox.clone().unwrap_or_else(|| cli.data_dir.join("outbox"));
            Arc::new(OutboxSubmitter::new(dir, Arc::new(SystemClock)))
        }
        _ => Arc::new(OutboxSubmitter::new(cli.data_dir.join("outbox"), Arc::new(SystemClock))),
    };

    let mut session = AssessmentSession::builder(cli.member.as_str(), Arc::new(store), submitter)
        .with_config(config)
        .open()
        .await?;
    if let Some(step) = session.resume_step() {
        session.go_to_step(step)?;
    }

    match cli.command {
        Commands::Show => {}
        Commands::Set { field, value } => {
            let field = parse_field(&field)?;
            let value = FieldValue::parse(field, &value).map_err(|e| anyhow!(e))?;
            session.update_field(field, value)?;
        }
        Commands::Clear { field } => {
            session.update_field(parse_field(&field)?, FieldValue::Empty)?;
        }
        Commands::Next => match session.next_step().await {
            StepMove::Moved { from, to } => println!("Moved from step {} to {}", from, to),
            StepMove::Blocked => println!("Step {} is incomplete", session.current_step()),
            StepMove::AtTerminal => println!("Already on the last step"),
        },
        Commands::Prev => session.previous_step(),
        Commands::Goto { step } => session.go_to_step(step)?,
        Commands::Save => {
            if session.save_draft().await? {
                println!("Draft saved");
            } else {
                println!("Nothing to save");
            }
        }
        Commands::Submit { .. } => match session.submit().await {
            SubmitOutcome::Submitted(receipt) => {
                info!("Submitted {}", receipt.id);
                println!("Submitted: {} at {}", receipt.id, receipt.submitted_at);
            }
            SubmitOutcome::Failed(e) => println!("Submission failed: {}", e),
            SubmitOutcome::Blocked(SubmitBlocked::Invalid(errors)) => {
                println!("Cannot submit, {} field(s) need attention", errors.len());
            }
            SubmitOutcome::Blocked(SubmitBlocked::InFlight) => {
                println!("A submission is already in progress");
            }
        },
        Commands::Reset => {
            session.reset().await?;
            println!("Draft discarded");
        }
    }

    session.save_position().await?;

    print_snapshot(&session.snapshot(), &session);
    Ok(())
}

fn parse_field(name: &str) -> Result<Field> {
    name.parse().map_err(|e: String| anyhow!(e))
}

fn print_snapshot(snapshot: &SessionSnapshot, session: &AssessmentSession) {
    let step = session.current_step_definition();
    println!(
        "Assessment for {} - step {}/{}: {}",
        snapshot.draft.member_id,
        snapshot.current_step_index + 1,
        snapshot.total_steps,
        step.title
    );
    println!(
        "  Progress: {}% ({} step(s) complete)",
        snapshot.progress.percentage, snapshot.progress.completed_steps
    );
    println!("  Ready to submit: {}", snapshot.progress.can_submit);
    if let Some(tier) = session.care_tier() {
        println!("  Care tier: {:?}", tier);
    }
    if let Some(saved) = snapshot.last_saved_at {
        println!("  Saved: {}", saved);
    }

    println!("Fields:");
    for field in Field::ALL {
        let marker = if step.requires(field) { "*" } else { " " };
        println!("  {}{:<20} {}", marker, field.as_str(), snapshot.draft.get(field));
    }

    if !snapshot.errors.is_empty() {
        println!("Errors:");
        for (field, message) in &snapshot.errors {
            println!("  {}: {}", field, message);
        }
    }
}
