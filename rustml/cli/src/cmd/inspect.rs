use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use rustml_grad::{model_summary, Checkpoint};
use rustml_pix2pix::Pix2PixModel;

const GROUPS: [&str; 2] = ["generator", "discriminator"];

#[derive(Args)]
pub struct InspectArgs {
    /// Checkpoint written by `sweai train`.
    #[arg(long)]
    checkpoint: PathBuf,

    /// Print the stored config as JSON only.
    #[arg(long)]
    config_only: bool,
}

pub fn run(args: InspectArgs) -> Result<()> {
    let checkpoint = Checkpoint::load(&args.checkpoint)
        .with_context(|| format!("Failed to load checkpoint: {}", args.checkpoint.display()))?;
    let config = Pix2PixModel::checkpoint_config(&checkpoint)
        .context("Checkpoint has no usable config")?;

    if args.config_only {
        println!("{}", config.to_json()?);
        return Ok(());
    }

    println!("Checkpoint: {}", args.checkpoint.display());
    println!("Epoch:      {}", checkpoint.metadata("epoch").unwrap_or("?"));
    println!(
        "Model:      ngf {}, num_downs {}, content_count {}, image {}x{}",
        config.model.ngf,
        config.model.num_downs,
        config.model.content_count,
        config.model.image_size(),
        config.model.image_size()
    );
    println!();
    for group in GROUPS {
        let params = checkpoint.group(group);
        let values: usize = params.iter().map(|p| p.data.len()).sum();
        println!("{group:<14} {:>4} tensors {values:>12} values", params.len());
    }
    println!("{:<14} {:>4} tensors {:>12} values", "total", checkpoint.params.len(), checkpoint.parameter_count());

    let (model, _) = Pix2PixModel::load(&args.checkpoint)
        .with_context(|| format!("Checkpoint does not match its config: {}", args.checkpoint.display()))?;
    println!();
    println!("Generator");
    println!("{}", model_summary(model.generator()));
    println!("Discriminator");
    println!("{}", model_summary(model.discriminator()));
    Ok(())
}
