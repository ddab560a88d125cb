use std::sync::Arc;

use anyhow::{Context, anyhow};
use clap::Parser;
use scoring::{
    batch::{BatchAnomalyScorer, BatchReport},
    executable_utils::{PopulationArgs, initialize_executable},
    storage::ProdStorage,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = PopulationArgs::parse();
    let config = initialize_executable(&args.config)
        .map_err(|e| anyhow!(e))
        .with_context(|| format!("loading config from {}", args.config))?;

    let storage = ProdStorage::new(&config.common.database_url)
        .await
        .map_err(|e| anyhow!(e))
        .context("connecting to the database")?;

    let mut scorer = BatchAnomalyScorer::new(Arc::new(storage), config.batch.clone());
    if let Some(fraction) = args.fraction {
        scorer = scorer.with_contamination(fraction);
    }

    let report = scorer
        .run(args.dry_run)
        .await
        .map_err(|e| anyhow!(e))
        .context("population scoring failed")?;

    match report {
        BatchReport::Empty => println!("No observations found. Nothing to score."),
        BatchReport::Scored {
            population,
            flagged,
            cutoff,
            contamination,
            high_fraction,
            written,
            dry_run,
            sample,
        } => {
            println!(
                "Scored {} patients: {} flagged ({:.1}%), contamination {}, cutoff {:.4}",
                population,
                flagged,
                high_fraction * 100.0,
                contamination,
                cutoff
            );
            println!(
                "Sample: patient {} score {:.4} high_risk {}",
                sample.0, sample.1, sample.2
            );
            if dry_run {
                println!("Dry run: no records written");
            } else {
                println!("Wrote {} risk score records", written);
            }
        }
    }
    Ok(())
}
