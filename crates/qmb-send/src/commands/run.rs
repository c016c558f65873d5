use std::error::Error;

use clap::Args;
use qmb_batch::{BatchReport, BatchRunner, Dispatcher, DryRunDispatcher, ExecMode, LocalShell, Sbatch};

use super::{ModeArg, PlanSource};

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub source: PlanSource,
    /// Run jobs sequentially here or submit them to the SLURM queue.
    #[arg(long, value_enum, default_value_t = ModeArg::Local)]
    pub mode: ModeArg,
    /// Write scripts but hand out placeholder ids instead of executing them.
    #[arg(long)]
    pub dry_run: bool,
    /// Scheduler submission program used in queued mode.
    #[arg(long, default_value = "sbatch")]
    pub sbatch: String,
    /// Exit with an error when any unit was rejected or skipped.
    #[arg(long)]
    pub strict: bool,
}

pub fn run(args: &RunArgs) -> Result<(), Box<dyn Error>> {
    let batch = args.source.load()?;
    let mode = ExecMode::from(args.mode);
    let report = if args.dry_run {
        dispatch(&batch, DryRunDispatcher::new(), mode)?
    } else {
        match mode {
            ExecMode::Local => dispatch(&batch, LocalShell::default(), mode)?,
            ExecMode::Queued => {
                let sbatch = Sbatch {
                    program: args.sbatch.clone(),
                    ..Sbatch::default()
                };
                dispatch(&batch, sbatch, mode)?
            }
        }
    };

    let path = report.write(batch.layout())?;
    for warning in &report.warnings {
        tracing::warn!("{warning}");
    }
    println!(
        "{} jobs, {} units: {} accepted, {} rejected, {} skipped",
        report.jobs,
        report.units.len(),
        report.accepted(),
        report.rejected(),
        report.skipped()
    );
    println!("report written to {}", path.display());

    if args.strict && report.accepted() != report.units.len() {
        return Err(format!(
            "{} of {} units were not accepted",
            report.units.len() - report.accepted(),
            report.units.len()
        )
        .into());
    }
    Ok(())
}

fn dispatch<D: Dispatcher>(
    batch: &qmb_batch::Batch,
    dispatcher: D,
    mode: ExecMode,
) -> Result<BatchReport, Box<dyn Error>> {
    let mut runner = BatchRunner::new(batch, dispatcher);
    Ok(runner.run(mode)?)
}
