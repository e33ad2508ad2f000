use clap::Parser;
use diagrescore::{Cli, Commands, rescore_process};

fn main() -> std::io::Result<()> {
    let args = Cli::parse();

    match args.command {
        Commands::Rescore(cmd_args) => rescore_process(cmd_args),
    }
}
