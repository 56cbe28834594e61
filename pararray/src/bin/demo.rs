//! pararray-demo: run a randomized multi-stage pipeline and report on it.
//!
//! Every stage adds the item's index to its value after a seeded random
//! delay, so with S stages item i ends at `i * (S + 1)`.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, bail};
use clap::Parser;
use pararray::util::{SeedableRandom, SharedRandom, delay_for};
use pararray::{
    AdmissionOrder, BoxError, LogOptions, ParArray, Settled, StageOptions, init_logging,
};

#[derive(Parser, Debug)]
#[command(
    name = "pararray-demo",
    version,
    about = "Run a randomized ordered pipeline"
)]
struct Args {
    /// Number of items
    #[arg(long, default_value_t = 100)]
    items: u64,

    /// Number of chained stages
    #[arg(long, default_value_t = 6)]
    stages: usize,

    /// Concurrency limit per stage (unbounded when omitted)
    #[arg(long)]
    max_concurrency: Option<usize>,

    /// Admission order: completion or index
    #[arg(long, default_value_t = AdmissionOrder::Completion)]
    admission: AdmissionOrder,

    /// Minimum spacing between worker starts, in milliseconds
    #[arg(long, default_value_t = 0)]
    interval_ms: u64,

    #[arg(long, default_value_t = 10)]
    min_delay_ms: u64,

    #[arg(long, default_value_t = 200)]
    max_delay_ms: u64,

    /// Seed for the delay generator
    #[arg(long, default_value_t = SeedableRandom::DEFAULT_SEED)]
    seed: u32,

    /// Make the first stage fail for this index
    #[arg(long)]
    fail_at: Option<usize>,

    /// JSON file with one StageOptions object per stage (overrides --stages
    /// and the per-stage flags)
    #[arg(long)]
    plan: Option<PathBuf>,

    /// Log to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Log filter directives (defaults to RUST_LOG, then info)
    #[arg(long)]
    log_filter: Option<String>,
}

impl Args {
    fn stage_plan(&self) -> anyhow::Result<Vec<StageOptions>> {
        if let Some(path) = &self.plan {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read stage plan {}", path.display()))?;
            return Ok(StageOptions::plan_from_json(&json)?);
        }

        let mut options = StageOptions::default()
            .admission(self.admission)
            .min_start_interval_ms(self.interval_ms);
        if let Some(limit) = self.max_concurrency {
            options = options.max_concurrency(limit);
        }
        Ok(vec![options; self.stages])
    }
}

#[derive(Debug, thiserror::Error)]
#[error("injected failure at index {0}")]
struct InjectedFailure(usize);

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    if args.max_delay_ms <= args.min_delay_ms {
        bail!(
            "--max-delay-ms ({}) must be greater than --min-delay-ms ({})",
            args.max_delay_ms,
            args.min_delay_ms
        );
    }

    let _logging = init_logging(&LogOptions {
        filter: args.log_filter.clone(),
        file: args.log_file.clone(),
    })?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    runtime.block_on(run(args))
}

async fn run(args: Args) -> anyhow::Result<()> {
    let plan = args.stage_plan()?;
    let rng = SeedableRandom::new(args.seed).shared();
    let started = Instant::now();

    tracing::info!(items = args.items, stages = plan.len(), "starting pipeline");

    let mut array = ParArray::from_items(0..args.items);
    for (stage, options) in plan.iter().enumerate() {
        let rng = rng.clone();
        let (min_ms, max_ms) = (args.min_delay_ms, args.max_delay_ms);
        let fail_at = if stage == 0 { args.fail_at } else { None };
        array = array.async_map(
            move |idx: usize, value: u64| step(rng.clone(), min_ms, max_ms, fail_at, idx, value),
            options.clone(),
        )?;
    }

    let settled = array.all_settled().await;
    let elapsed = started.elapsed();

    let rejected: Vec<(usize, String)> = settled
        .iter()
        .enumerate()
        .filter_map(|(idx, entry)| entry.reason().map(|reason| (idx, reason.to_string())))
        .collect();
    let stage_count = plan.len() as u64;
    let mismatched = settled
        .iter()
        .enumerate()
        .filter(|(idx, entry)| match entry {
            Settled::Fulfilled(value) => *value != *idx as u64 * (stage_count + 1),
            Settled::Rejected(_) => false,
        })
        .count();

    println!(
        "{} items through {} stages in {}ms: {} fulfilled, {} rejected",
        settled.len(),
        plan.len(),
        elapsed.as_millis(),
        settled.len() - rejected.len(),
        rejected.len()
    );
    for stage in array.pipeline_metrics().stages {
        println!(
            "  stage {}: capacity {}, admission {}, peak {}, invoked {}, failed {}, passed through {}, {}ms",
            stage.index,
            stage.capacity,
            stage.admission,
            stage.peak_occupancy,
            stage.invoked,
            stage.failed,
            stage.passed_through,
            stage.duration_ms.unwrap_or_default()
        );
    }
    for (idx, reason) in &rejected {
        println!("  rejected [{}]: {}", idx, reason);
    }

    if mismatched > 0 {
        bail!("{} items produced unexpected values", mismatched);
    }
    if !rejected.is_empty() {
        bail!("{} items were rejected", rejected.len());
    }
    Ok(())
}

async fn step(
    rng: SharedRandom,
    min_ms: u64,
    max_ms: u64,
    fail_at: Option<usize>,
    idx: usize,
    value: u64,
) -> Result<u64, BoxError> {
    let pause = rng.lock().millis(min_ms, max_ms)?;
    delay_for(pause).await;
    if fail_at == Some(idx) {
        return Err(InjectedFailure(idx).into());
    }
    Ok(value + idx as u64)
}
