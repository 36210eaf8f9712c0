// src/main.rs

use forgeloop::{cli, logging, run};

fn main() {
    if let Err(err) = run_main() {
        eprintln!("forgeloop error: {err:?}");
        std::process::exit(1);
    }
}

fn run_main() -> anyhow::Result<()> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;
    let outcome = run(args)?;
    if !outcome.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
