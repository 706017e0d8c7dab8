use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{mpsc, Arc};
use std::thread;

use crate::detection::detect_plugins;
use crate::display::display_results;
use crate::endpoints::fetch_endpoints;
use crate::fingerprints;
use crate::logger::Logger;
use crate::models::{PluginEntry, ScanOptions};
use crate::progress::ProgressManager;
use crate::version::get_plugin_version;
use crate::wordfence::WordfenceDatabase;
use crate::writer::{get_writer, ResultWriter};

/// Drives the full pipeline over every target. The worker budget is split in
/// two tiers: up to `threads` sites in flight, and within each site up to
/// `threads / n_targets` concurrent plugin probes.
pub fn scan_targets(opts: ScanOptions, logger: &Logger) -> Result<()> {
    let targets = resolve_targets(&opts)?;
    let single_site = opts.file.is_none();
    let site_threads = site_thread_count(opts.threads, targets.len());

    let index = Arc::new(fingerprints::embedded_plugin_endpoints());
    if index.is_empty() {
        logger.warning("Embedded fingerprint index is empty; no plugins can be detected.");
    }
    let database = Arc::new(WordfenceDatabase::load(logger));

    let writer: Option<Arc<dyn ResultWriter>> = match &opts.output {
        Some(output) => Some(get_writer(output)?),
        None => None,
    };

    let progress = Arc::new(ProgressManager::new(
        targets.len() as u64,
        "Scanning targets",
    ));

    {
        // On SIGINT/SIGTERM: settle the bar, then die. In-flight probes are
        // abandoned.
        let progress = Arc::clone(&progress);
        let _ = ctrlc::set_handler(move || {
            progress.finish();
            std::process::exit(1);
        });
    }

    let site_pool_size = opts.threads.min(targets.len()).max(1);
    let chunk_size = targets.len().div_ceil(site_pool_size);
    let mut handles = Vec::new();

    for chunk in targets.chunks(chunk_size) {
        let chunk = chunk.to_vec();
        let opts = opts.clone();
        let index = Arc::clone(&index);
        let database = Arc::clone(&database);
        let writer = writer.clone();
        let progress = Arc::clone(&progress);

        handles.push(thread::spawn(move || {
            for target in chunk {
                // A panic inside one site must never take down the scan.
                let _ = panic::catch_unwind(AssertUnwindSafe(|| {
                    scan_site(
                        &target,
                        &opts,
                        single_site,
                        site_threads,
                        &index,
                        &database,
                        writer.as_deref(),
                        &progress,
                    );
                }));
            }
        }));
    }

    for handle in handles {
        let _ = handle.join();
    }

    progress.finish();
    if let Some(writer) = writer {
        writer.close();
    }

    Ok(())
}

fn resolve_targets(opts: &ScanOptions) -> Result<Vec<String>> {
    match (&opts.url, &opts.file) {
        (_, Some(file)) => {
            let targets = read_lines(file)?;
            if targets.is_empty() {
                bail!("No targets found in {}", file);
            }
            Ok(targets)
        }
        (Some(url), None) => Ok(vec![url.clone()]),
        (None, None) => bail!("You must provide either --url or --file"),
    }
}

fn read_lines(path: &str) -> Result<Vec<String>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read file {}", path))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

fn site_thread_count(threads: usize, n_targets: usize) -> usize {
    (threads / n_targets.max(1)).max(1)
}

#[allow(clippy::too_many_arguments)]
fn scan_site(
    target: &str,
    opts: &ScanOptions,
    single_site: bool,
    site_threads: usize,
    index: &Arc<HashMap<String, Vec<String>>>,
    database: &Arc<WordfenceDatabase>,
    writer: Option<&dyn ResultWriter>,
    progress: &Arc<ProgressManager>,
) {
    let endpoints = fetch_endpoints(target);
    if endpoints.is_empty() {
        if single_site {
            progress.println(&format!("❌ No REST endpoints found on {}", target));
        }
        finish_site(target, &[], writer, progress, single_site);
        return;
    }

    let detection = detect_plugins(&endpoints, index);
    if detection.detected.is_empty() {
        if single_site {
            progress.println(&format!("❌ No plugins detected on {}", target));
        }
        finish_site(target, &[], writer, progress, single_site);
        return;
    }

    if opts.verbose {
        progress.println(&format!(
            "Detected {} plugin(s) on {}",
            detection.detected.len(),
            target
        ));
    }

    // In single-site mode the bar tracks plugins rather than targets.
    if single_site {
        progress.set_total(detection.detected.len() as u64);
    }

    let (tx, rx) = mpsc::channel::<(String, String, Vec<PluginEntry>)>();
    let worker_count = site_threads.min(detection.detected.len()).max(1);
    let plugin_chunk_size = detection.detected.len().div_ceil(worker_count);
    let mut handles = Vec::new();

    for chunk in detection.detected.chunks(plugin_chunk_size) {
        let chunk = chunk.to_vec();
        let tx = tx.clone();
        let target = target.to_string();
        let no_check_version = opts.no_check_version;
        let database = Arc::clone(database);
        let progress = Arc::clone(progress);

        handles.push(thread::spawn(move || {
            for plugin in chunk {
                let _ = panic::catch_unwind(AssertUnwindSafe(|| {
                    let version = if no_check_version {
                        "unknown".to_string()
                    } else {
                        get_plugin_version(&target, &plugin)
                    };

                    let vulnerabilities = database.vulnerabilities_for_plugin(&plugin, &version);
                    let entries = if vulnerabilities.is_empty() {
                        vec![PluginEntry::not_vulnerable(&plugin, &version)]
                    } else {
                        vulnerabilities
                            .into_iter()
                            .map(|v| PluginEntry {
                                plugin: plugin.clone(),
                                version: version.clone(),
                                severity: v.severity,
                                cves: vec![v.cve],
                                cve_links: vec![v.cve_link],
                                title: v.title,
                                auth_type: v.auth_type,
                                cvss_score: v.cvss_score,
                                cvss_vector: v.cvss_vector,
                            })
                            .collect()
                    };

                    let _ = tx.send((plugin.clone(), version, entries));
                    if single_site {
                        progress.increment();
                    }
                }));
            }
        }));
    }
    drop(tx);

    let mut plugin_versions: HashMap<String, String> = HashMap::new();
    let mut findings: Vec<PluginEntry> = Vec::new();
    while let Ok((plugin, version, entries)) = rx.recv() {
        plugin_versions.insert(plugin, version);
        findings.extend(entries);
    }

    for handle in handles {
        let _ = handle.join();
    }

    resolve_ambiguities(&detection.matches, &mut plugin_versions, &mut findings);

    if let Some(writer) = writer {
        writer.write_results(target, &findings);
    }
    display_results(
        target,
        &plugin_versions,
        &detection,
        &findings,
        Some(progress.as_ref()),
    );

    if !single_site {
        progress.increment();
    }
}

fn finish_site(
    target: &str,
    findings: &[PluginEntry],
    writer: Option<&dyn ResultWriter>,
    progress: &Arc<ProgressManager>,
    single_site: bool,
) {
    // Empty batches still reach the writer so file-mode output lines up with
    // the input list.
    if let Some(writer) = writer {
        writer.write_results(target, findings);
    }
    if !single_site {
        progress.increment();
    }
}

/// When plugins share an identical route set they are indistinguishable by
/// fingerprint alone, but a recovered version is proof of presence: if any
/// member of an ambiguity group has a version, members without one are noise
/// and get dropped.
fn resolve_ambiguities(
    matches: &HashMap<String, Vec<String>>,
    plugin_versions: &mut HashMap<String, String>,
    findings: &mut Vec<PluginEntry>,
) {
    let mut dropped: Vec<String> = Vec::new();

    for group in matches.values() {
        if group.len() < 2 {
            continue;
        }

        let any_known = group
            .iter()
            .any(|p| matches!(plugin_versions.get(p), Some(v) if v != "unknown"));
        if !any_known {
            continue;
        }

        for plugin in group {
            if matches!(plugin_versions.get(plugin), Some(v) if v == "unknown") {
                dropped.push(plugin.clone());
            }
        }
    }

    for plugin in dropped {
        plugin_versions.remove(&plugin);
        findings.retain(|entry| entry.plugin != plugin);
    }
}
