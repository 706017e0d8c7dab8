mod cli;
mod constants;
mod detection;
mod display;
mod endpoints;
mod fingerprints;
mod http_client;
mod logger;
mod models;
mod progress;
mod scanner;
mod version;
mod wordfence;
mod writer;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use logger::Logger;
use models::ScanOptions;
use std::fs;

fn main() {
    let cli = Cli::parse();
    let logger = Logger::new();

    let outcome = match cli.command {
        Commands::Scan {
            url,
            file,
            no_check_version,
            threads,
            output,
            verbose,
        } => {
            if url.is_some() == file.is_some() {
                eprintln!("❌ You must provide exactly one of --url or --file");
                std::process::exit(1);
            }

            let opts = ScanOptions {
                url,
                file,
                no_check_version,
                threads: threads.max(1),
                output,
                verbose,
            };
            scanner::scan_targets(opts, &logger)
        }
        Commands::Update => wordfence::update(&logger),
        Commands::Uninstall => uninstall(&logger),
    };

    if let Err(e) = outcome {
        logger.error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

fn uninstall(logger: &Logger) -> Result<()> {
    let config_dir = dirs::config_dir().context("Failed to locate user config directory")?;
    let storage = config_dir.join(constants::STORAGE_DIR);

    if storage.exists() {
        fs::remove_dir_all(&storage)
            .with_context(|| format!("Failed to remove {}", storage.display()))?;
        logger.info(&format!("Removed {}", storage.display()));
    } else {
        logger.warning("wpprobe storage directory not found. Nothing to remove.");
    }

    let executable = std::env::current_exe().context("Failed to locate the wpprobe binary")?;
    fs::remove_file(&executable)
        .with_context(|| format!("Failed to remove {}", executable.display()))?;

    logger.success("wpprobe has been fully uninstalled.");
    Ok(())
}
