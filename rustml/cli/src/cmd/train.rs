use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use rustml_pix2pix::{DataLoader, GanTrainer, GlyphDataset, Pix2PixConfig, Pix2PixModel};

#[derive(Args)]
pub struct TrainArgs {
    /// Dataset root: one sub-directory per sample holding
    /// content_*.png, style_*.png and target.png.
    #[arg(long)]
    data: PathBuf,

    /// JSON config file; defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the number of constant-rate epochs.
    #[arg(long)]
    epochs: Option<usize>,

    /// Override the number of decay epochs.
    #[arg(long)]
    epochs_decay: Option<usize>,

    /// Override the batch size.
    #[arg(long)]
    batch_size: Option<usize>,

    /// Override the RNG seed used for shuffling.
    #[arg(long)]
    seed: Option<u64>,

    /// Output directory for samples, checkpoints and the resolved config.
    #[arg(long, default_value = "runs/pix2pix")]
    out: PathBuf,
}

fn resolve_config(args: &TrainArgs) -> Result<Pix2PixConfig> {
    let mut config = match &args.config {
        Some(path) => Pix2PixConfig::load(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => Pix2PixConfig::default(),
    };
    if let Some(epochs) = args.epochs {
        config.train.epochs = epochs;
    }
    if let Some(decay) = args.epochs_decay {
        config.train.epochs_decay = decay;
    }
    if let Some(batch_size) = args.batch_size {
        config.train.batch_size = batch_size;
    }
    if args.seed.is_some() {
        config.train.seed = args.seed;
    }
    Ok(config)
}

pub fn run(args: TrainArgs) -> Result<()> {
    let mut config = resolve_config(&args)?;
    config.validate().context("Invalid configuration")?;

    let image_size = config.model.image_size();
    eprintln!("Loading dataset from {} ...", args.data.display());
    let dataset = GlyphDataset::from_dir(&args.data, image_size)
        .with_context(|| format!("Failed to load dataset: {}", args.data.display()))?;
    if dataset.content_count() != config.model.content_count {
        log::warn!(
            "dataset has {} content images per sample, config says {}; using the dataset's",
            dataset.content_count(),
            config.model.content_count
        );
        config.model.content_count = dataset.content_count();
    }
    eprintln!(
        "{} samples, {} content / {} style images each, {image_size}x{image_size}",
        dataset.len(),
        dataset.content_count(),
        dataset.style_count()
    );

    fs::create_dir_all(&args.out)
        .with_context(|| format!("Failed to create output dir: {}", args.out.display()))?;
    let config_path = args.out.join("config.json");
    config
        .save(&config_path)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;

    let (batch_size, shuffle) = (config.train.batch_size, config.train.shuffle);
    let mut loader = match config.train.seed {
        Some(seed) => DataLoader::with_seed(dataset, batch_size, shuffle, seed),
        None => DataLoader::new(dataset, batch_size, shuffle),
    };

    let model = Pix2PixModel::new(config).context("Failed to build model")?;
    let mut trainer = GanTrainer::new(model).with_output_dir(&args.out);
    let history = trainer.fit(&mut loader).context("Training failed")?;

    for stats in &history {
        let losses: Vec<String> = stats
            .losses
            .iter()
            .map(|(name, value)| format!("{name}={value:.4}"))
            .collect();
        println!("epoch {:>3}  lr={:.6}  {}", stats.epoch, stats.lr, losses.join("  "));
    }
    println!("{}", args.out.join("checkpoints").join("latest.safetensors").display());
    Ok(())
}
