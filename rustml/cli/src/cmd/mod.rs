pub mod generate;
pub mod inspect;
pub mod train;

use clap::Subcommand;

#[derive(Subcommand)]
pub enum Command {
    /// Train a generator/discriminator pair on a glyph dataset directory.
    Train(train::TrainArgs),

    /// Render a glyph from a checkpoint and one sample directory.
    Generate(generate::GenerateArgs),

    /// Show the config, epoch and parameter groups of a checkpoint.
    Inspect(inspect::InspectArgs),
}

pub fn run(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Train(args) => train::run(args),
        Command::Generate(args) => generate::run(args),
        Command::Inspect(args) => inspect::run(args),
    }
}
