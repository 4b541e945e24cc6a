mod app;
mod cli;
mod offload;
mod repl;
mod server;
mod telegram;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use app::{build_embedder, build_pipeline, check_credentials, load_config, DataSource};
use clap::Parser;
use cli::{Cli, Commands};
use faqbot_core::{
    calibrate_threshold, load_cases, load_corpus, probe_cases, save_index_jsonl, score_probes,
    threshold_grid, Credentials, Decision, DenseRetriever, RetrievalStrategy,
};
use tracing_subscriber::EnvFilter;

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.pipeline)?;
    let creds = Credentials::from_env();

    match &cli.command {
        Commands::BuildIndex { input, output } => {
            if config.strategy != RetrievalStrategy::Dense {
                bail!("build-index embeds questions; it needs the dense strategy");
            }
            check_credentials(&config, &creds)?;
            let records = load_corpus(input)?;
            let embedder = build_embedder(&config, &creds)?;
            let retriever = DenseRetriever::build(embedder.clone(), records).await?;
            let entries = retriever.to_entries();
            save_index_jsonl(output, &entries)
                .with_context(|| format!("write index {}", output.display()))?;

            println!(
                "model={} indexed_entries={} output={}",
                embedder.name(),
                entries.len(),
                output.display()
            );
        }
        Commands::Query { question, json } => {
            let source = DataSource::from_args(&cli.pipeline)?;
            let pipeline = build_pipeline(&config, &creds, &source).await?;
            let reply = pipeline.answer(question).await?;

            if *json {
                println!("{}", serde_json::to_string_pretty(&reply)?);
            } else {
                let decision = match reply.decision {
                    Decision::Confident => "confident",
                    Decision::NoConfidentMatch => "no_confident_match",
                };
                println!(
                    "decision={} score={:.4} entry_id={}",
                    decision,
                    reply.score,
                    reply.entry_id.as_deref().unwrap_or("null")
                );
                if reply.decision == Decision::Confident {
                    println!("answer={}", reply.text);
                } else {
                    for suggestion in &reply.suggestions {
                        println!("suggestion={suggestion}");
                    }
                }
            }
        }
        Commands::Chat => {
            let source = DataSource::from_args(&cli.pipeline)?;
            let pipeline = build_pipeline(&config, &creds, &source).await?;
            repl::run(&pipeline).await?;
        }
        Commands::Serve { addr } => {
            let source = DataSource::from_args(&cli.pipeline)?;
            let pipeline = build_pipeline(&config, &creds, &source).await?;
            server::serve(Arc::new(pipeline), *addr).await?;
        }
        Commands::Telegram {
            api_base,
            poll_timeout,
        } => {
            let token = creds.telegram_bot_token()?.to_string();
            let source = DataSource::from_args(&cli.pipeline)?;
            let pipeline = build_pipeline(&config, &creds, &source).await?;
            let client =
                telegram::TelegramClient::new(api_base, &token, Duration::from_secs(*poll_timeout))?;
            telegram::Bot::new(client, Arc::new(pipeline)).run().await?;
        }
        Commands::Eval {
            cases,
            min_pass_rate,
            calibrate,
        } => {
            let source = DataSource::from_args(&cli.pipeline)?;
            let pipeline = build_pipeline(&config, &creds, &source).await?;
            let cases = load_cases(cases)?;
            let probes = probe_cases(&pipeline, &cases).await?;
            let summary = score_probes(&probes, pipeline.gate());

            for o in &summary.outcomes {
                println!(
                    "case={} passed={} decision={:?} faq_id={} score={:.4} latency={:.1}ms",
                    o.case_id,
                    o.passed,
                    o.actual_decision,
                    o.actual_faq_id.as_deref().unwrap_or("null"),
                    o.score,
                    o.latency_ms
                );
            }

            let total_ms: f64 = summary.outcomes.iter().map(|o| o.latency_ms).sum();
            let avg_ms = total_ms / summary.outcomes.len().max(1) as f64;
            println!(
                "threshold={:.2} total={} passed={} failed={} pass_rate={:.4} required={:.4} meets_threshold={} avg_latency={:.1}ms",
                summary.threshold,
                summary.total,
                summary.passed,
                summary.failed,
                summary.pass_rate,
                min_pass_rate,
                summary.meets(*min_pass_rate),
                avg_ms
            );

            if *calibrate {
                let grid = threshold_grid(0.05, 0.95, 0.01);
                if let Some(best) = calibrate_threshold(&probes, &grid) {
                    println!(
                        "calibrated_threshold={:.2} pass_rate={:.4}",
                        best.threshold, best.pass_rate
                    );
                }
            }

            if !summary.meets(*min_pass_rate) {
                bail!(
                    "pass rate {:.4} is below the required {:.4}",
                    summary.pass_rate,
                    min_pass_rate
                );
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .ok();

    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
