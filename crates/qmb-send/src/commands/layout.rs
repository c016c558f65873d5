use std::error::Error;

use clap::Args;

use super::PlanSource;

#[derive(Args, Debug)]
pub struct LayoutArgs {
    #[command(flatten)]
    pub source: PlanSource,
}

pub fn run(args: &LayoutArgs) -> Result<(), Box<dyn Error>> {
    let batch = args.source.load()?;
    let layout = batch.prepare_folders()?;
    for dir in layout.subdirs() {
        println!("{}", dir.display());
    }
    Ok(())
}
