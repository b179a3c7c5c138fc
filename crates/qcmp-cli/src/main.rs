use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use qcmp_core::stats::derive_stats;
use qcmp_core::EntityReference;
use qcmp_pipeline::{
    load_entities, ExactLabelMatch, FirstCandidate, PipelineConfig, QuarterComparePipeline,
    SimilarLabel,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "qcmp-cli")]
#[command(about = "Quarter Compare command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Resolve every entity in an event file and write a report.
    Run(RunArgs),
    /// Resolve a single entity and print its record.
    Resolve(ResolveArgs),
}

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum Selector {
    #[default]
    First,
    Exact,
    Similar,
}

#[derive(Debug, Args)]
struct PipelineArgs {
    #[arg(long)]
    endpoints: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = Selector::First)]
    selector: Selector,
}

#[derive(Debug, Args)]
struct RunArgs {
    #[arg(long, default_value = "entities.json")]
    entities: PathBuf,
    #[arg(long)]
    concurrency: Option<usize>,
    #[arg(long)]
    reports_dir: Option<PathBuf>,
    #[command(flatten)]
    pipeline: PipelineArgs,
}

#[derive(Debug, Args)]
struct ResolveArgs {
    short_name: String,
    #[arg(long, default_value = "")]
    label: String,
    #[command(flatten)]
    pipeline: PipelineArgs,
}

fn build_pipeline(mut config: PipelineConfig, args: &PipelineArgs) -> Result<QuarterComparePipeline> {
    if args.endpoints.is_some() {
        config.endpoints_file = args.endpoints.clone();
    }
    let pipeline = QuarterComparePipeline::new(config)?;
    match args.selector {
        Selector::First => pipeline.with_selector(FirstCandidate),
        Selector::Exact => pipeline.with_selector(ExactLabelMatch),
        Selector::Similar => pipeline.with_selector(SimilarLabel::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = PipelineConfig::from_env();

    match cli.command {
        Some(Commands::Resolve(args)) => {
            let pipeline = build_pipeline(config, &args.pipeline)?;
            let entity = EntityReference::new(args.short_name, args.label, None);
            let result = pipeline.resolve_one(&entity).await?;
            let stats = derive_stats(&result);
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "result": result,
                    "stats": stats,
                }))?
            );
        }
        command => {
            let args = match command {
                Some(Commands::Run(args)) => args,
                _ => RunArgs {
                    entities: PathBuf::from("entities.json"),
                    concurrency: None,
                    reports_dir: None,
                    pipeline: PipelineArgs {
                        endpoints: config.endpoints_file.clone(),
                        selector: Selector::default(),
                    },
                },
            };
            if let Some(concurrency) = args.concurrency {
                config.concurrency = concurrency.max(1);
            }
            if let Some(reports_dir) = args.reports_dir.clone() {
                config.reports_dir = reports_dir;
            }

            let entities = load_entities(&args.entities).await?;
            let pipeline = build_pipeline(config, &args.pipeline)?;
            let summary = pipeline.run_once(entities).await?;
            println!(
                "run complete: run_id={} requested={} resolved={} reports={}",
                summary.run_id,
                summary.requested,
                summary.resolved,
                summary.reports_dir.display()
            );
        }
    }

    Ok(())
}
