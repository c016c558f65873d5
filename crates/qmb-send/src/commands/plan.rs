use std::error::Error;

use clap::Args;
use qmb_batch::ExecMode;
use serde_json::json;

use super::{ModeArg, PlanSource};

#[derive(Args, Debug)]
pub struct PlanArgs {
    #[command(flatten)]
    pub source: PlanSource,
    /// Mode the script names and seed handling are previewed for.
    #[arg(long, value_enum, default_value_t = ModeArg::Local)]
    pub mode: ModeArg,
    /// Emit a JSON listing instead of one line per unit.
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: &PlanArgs) -> Result<(), Box<dyn Error>> {
    let batch = args.source.load()?;
    let mode = ExecMode::from(args.mode);
    let mut units = Vec::new();
    for stage in &batch.settings().stages {
        for job in batch.jobs() {
            let script = batch.render(stage, job, mode, None)?;
            units.push(json!({
                "stage": script.stage,
                "descriptor": script.descriptor,
                "job_name": script.job_name,
                "script": script.file_name,
                "array": script.array,
                "commands": script.commands.len(),
            }));
        }
    }

    if args.json {
        let payload = json!({
            "plan_hash": batch.plan_hash()?,
            "storage": batch.layout().root.display().to_string(),
            "jobs": batch.jobs().len(),
            "seeds": batch.classification().seed_range().map(|range| range.count()),
            "units": units,
            "warnings": batch.warnings(),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    for unit in &units {
        println!(
            "{}\t{}\t{}",
            unit["stage"].as_str().unwrap_or_default(),
            unit["descriptor"].as_str().unwrap_or_default(),
            unit["script"].as_str().unwrap_or_default()
        );
    }
    for warning in batch.warnings() {
        tracing::warn!("{warning}");
    }
    println!("{} jobs x {} stages", batch.jobs().len(), batch.settings().stages.len());
    Ok(())
}
