use clap::Parser;
use barreplay::cli::{run, Cli};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}
