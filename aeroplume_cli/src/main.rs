#![allow(missing_docs)]

use aeroplume_cli::Opts;
use clap::Parser;
use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::init();

    let opts = Opts::parse();
    aeroplume_cli::run(&opts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_command() {
        use clap::CommandFactory;
        Opts::command().debug_assert();
    }
}
