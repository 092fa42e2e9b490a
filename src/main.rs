use clap::Parser;

use weft::cli::{self, Cli};

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    if let Err(error) = cli::run(cli) {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}
