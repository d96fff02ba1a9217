mod cmd;

use clap::Parser;

/// SweAI: train, sample and inspect style-conditioned Pix2Pix models.
#[derive(Parser)]
#[command(name = "sweai", version, about)]
struct Cli {
    /// Log level used when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: cmd::Command,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(cli.log_level.as_str()))
        .format_timestamp_secs()
        .init();
    log::debug!("sweai {}", env!("CARGO_PKG_VERSION"));
    cmd::run(cli.command)
}
