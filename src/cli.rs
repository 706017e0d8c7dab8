use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "wpprobe")]
#[command(version = crate::constants::VERSION)]
#[command(about = "Stealthy WordPress plugin enumerator and vulnerability matcher")]
#[command(long_about = "WPProbe - Stealthy WordPress plugin enumerator and vulnerability matcher.

Detects installed plugins by comparing the REST routes a site exposes against
an embedded fingerprint database, recovers plugin versions from readme.txt and
style.css, and matches each (plugin, version) pair against a locally cached
Wordfence vulnerability catalogue.

Commands:
  scan         Scan one or more WordPress sites
  update       Refresh the local Wordfence vulnerability catalogue
  uninstall    Remove the wpprobe storage directory and the binary

Examples:
  # Scan a single site
  wpprobe scan -u https://example.com

  # Scan a list of sites with 20 threads, writing findings to CSV
  wpprobe scan -f targets.txt -t 20 -o results.csv

  # Skip version probing (faster, less accurate vulnerability matching)
  wpprobe scan -u https://example.com --no-check-version

  # Refresh the vulnerability catalogue
  wpprobe update")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan WordPress sites for installed plugins and known vulnerabilities
    Scan {
        /// Target URL to scan
        #[arg(short, long)]
        url: Option<String>,
        /// File containing a list of target URLs, one per line
        #[arg(short, long)]
        file: Option<String>,
        /// Skip plugin version probing
        #[arg(long)]
        no_check_version: bool,
        /// Number of concurrent threads
        #[arg(short, long, default_value_t = 10)]
        threads: usize,
        /// Output file to save results (format chosen by extension: .csv, .json)
        #[arg(short, long)]
        output: Option<String>,
        /// Enable verbose output
        #[arg(short, long)]
        verbose: bool,
    },
    /// Refresh the local Wordfence vulnerability catalogue
    Update,
    /// Remove the wpprobe storage directory and the binary itself
    Uninstall,
}
