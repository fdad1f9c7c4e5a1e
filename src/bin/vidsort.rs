//! vidsort - sort, tag and mine home videos with an object detector

use anyhow::Result;
use clap::Parser;
use vidsort::cli::{self, Cli};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Cli::try_parse().unwrap_or_else(|err| {
        // Help and version go to stdout and succeed; usage errors exit 1.
        let code = if err.use_stderr() { 1 } else { 0 };
        let _ = err.print();
        std::process::exit(code);
    });

    let code = cli::run(args)?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
