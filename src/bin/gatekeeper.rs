use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sql_gatekeeper::contract::SafetyContract;
use sql_gatekeeper::engine::{Candidate, Engine, EvaluationRequest};
use sql_gatekeeper::EngineConfig;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Validate and minimally repair generated SQL against a per-question contract
#[derive(Parser)]
#[command(name = "gatekeeper")]
#[command(about = "Validate untrusted SQL candidates against a safety contract")]
struct Args {
    /// Extra permitted alias, added to SQL_PERMITTED_ALIASES (repeatable)
    #[arg(long = "permit-alias", global = true)]
    permit_alias: Vec<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate every candidate of a request file and print the result
    Validate {
        /// JSON file holding an evaluation request
        #[arg(short, long)]
        request: PathBuf,

        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
    },
    /// Check a single SQL statement against a contract file
    Check {
        /// SQL text to check
        #[arg(short, long)]
        sql: String,

        /// JSON file holding a safety contract
        #[arg(short, long)]
        contract: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = EngineConfig::from_env()
        .context("invalid engine configuration")?
        .with_extra_aliases(&args.permit_alias);
    let engine = Engine::new(config).context("invalid engine configuration")?;

    match args.command {
        Command::Validate { request, pretty } => {
            let raw = std::fs::read_to_string(&request)
                .with_context(|| format!("reading request {}", request.display()))?;
            let request: EvaluationRequest = serde_json::from_str(&raw).context("parsing request")?;
            info!("Loaded request {} with {} candidate(s)", request.question_id, request.candidates.len());

            let result = engine.evaluate_concurrent(request).await?;
            let output = if pretty {
                serde_json::to_string_pretty(&result)?
            } else {
                serde_json::to_string(&result)?
            };
            println!("{}", output);
        }
        Command::Check { sql, contract } => {
            let raw = std::fs::read_to_string(&contract)
                .with_context(|| format!("reading contract {}", contract.display()))?;
            let contract: SafetyContract = serde_json::from_str(&raw).context("parsing contract")?;
            let request = EvaluationRequest {
                question_id: "check".to_string(),
                contract: Some(contract),
                candidates: vec![Candidate::new(&sql)],
                ..Default::default()
            };
            let question = engine.prepare(&request)?;
            let evaluation = question.evaluate_candidate(0, &request.candidates[0]);
            let result = question.select(std::slice::from_ref(&evaluation));
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "evaluation": evaluation,
                    "result": result,
                }))?
            );
        }
    }
    Ok(())
}
