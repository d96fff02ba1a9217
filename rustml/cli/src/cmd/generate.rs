use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use rustml_grad::ops;
use rustml_pix2pix::{load_conditions, save_batch, Pix2PixModel};

#[derive(Args)]
pub struct GenerateArgs {
    /// Checkpoint written by `sweai train`.
    #[arg(long)]
    checkpoint: PathBuf,

    /// Sample directory with content_*.png and style_*.png.
    #[arg(long)]
    sample: PathBuf,

    /// Output PNG path.
    #[arg(long, default_value = "generated.png")]
    output: PathBuf,
}

pub fn run(args: GenerateArgs) -> Result<()> {
    let (mut model, epoch) = Pix2PixModel::load(&args.checkpoint)
        .with_context(|| format!("Failed to load checkpoint: {}", args.checkpoint.display()))?;
    model.eval();
    eprintln!("Loaded {} (epoch {epoch})", args.checkpoint.display());

    let image_size = model.config().model.image_size();
    let (content, style) = load_conditions(&args.sample, image_size)
        .with_context(|| format!("Failed to load sample: {}", args.sample.display()))?;
    let content = ops::unsqueeze(&content, 0)?;
    let style = ops::unsqueeze(&style, 0)?;

    let fake = model
        .generate(&content, &style)
        .context("Generation failed")?;
    save_batch(&args.output, &fake)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    println!("{}", args.output.display());
    Ok(())
}
