use regex::Regex;
use semver::Version;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::constants::PROBE_TIMEOUT;
use crate::http_client::HttpClient;

const README_PATTERN: &str = r"(?:Stable tag|Version):\s*([0-9a-zA-Z.-]+)";
const STYLE_PATTERN: &str = r"Version:\s*([0-9a-zA-Z.-]+)";

/// Probes the two artifact files advertising a plugin's version. Both probes
/// run concurrently and the first non-empty capture wins; the loser is
/// abandoned. Returns "unknown" when neither file yields a version.
pub fn get_plugin_version(target: &str, plugin: &str) -> String {
    let client = match HttpClient::new(Duration::from_secs(PROBE_TIMEOUT)) {
        Ok(client) => Arc::new(client),
        Err(_) => return "unknown".to_string(),
    };

    let (tx, rx) = mpsc::channel();

    {
        let tx = tx.clone();
        let client = Arc::clone(&client);
        let target = target.to_string();
        let plugin = plugin.to_string();
        thread::spawn(move || {
            if let Some(version) = fetch_version_from_readme(&client, &target, &plugin) {
                let _ = tx.send(version);
            }
        });
    }

    {
        let tx = tx.clone();
        let client = Arc::clone(&client);
        let target = target.to_string();
        let plugin = plugin.to_string();
        thread::spawn(move || {
            if let Some(version) = fetch_version_from_style(&client, &target, &plugin) {
                let _ = tx.send(version);
            }
        });
    }
    drop(tx);

    match rx.recv() {
        Ok(version) => version,
        Err(_) => "unknown".to_string(),
    }
}

fn fetch_version_from_readme(client: &HttpClient, target: &str, plugin: &str) -> Option<String> {
    for readme_name in ["readme.txt", "Readme.txt", "README.txt"] {
        let url = format!("{}/wp-content/plugins/{}/{}", target, plugin, readme_name);
        if let Some(version) = fetch_version_from_url(client, &url, README_PATTERN) {
            return Some(version);
        }
    }
    None
}

fn fetch_version_from_style(client: &HttpClient, target: &str, plugin: &str) -> Option<String> {
    let url = format!("{}/wp-content/themes/{}/style.css", target, plugin);
    fetch_version_from_url(client, &url, STYLE_PATTERN)
}

fn fetch_version_from_url(client: &HttpClient, url: &str, pattern: &str) -> Option<String> {
    let body = client.get(url).ok()?;
    extract_version(&body, pattern)
}

fn extract_version(body: &str, pattern: &str) -> Option<String> {
    let re = Regex::new(pattern).unwrap();
    let captures = re.captures(body)?;
    let version = captures.get(1)?.as_str().trim();
    if version.is_empty() {
        None
    } else {
        Some(version.to_string())
    }
}

/// Inclusive semver range check on both ends. Anything that fails to parse,
/// including the "unknown" sentinel, never matches.
pub fn is_version_vulnerable(version: &str, from_version: &str, to_version: &str) -> bool {
    let (version, from, to) = match (
        parse_version(version),
        parse_version(from_version),
        parse_version(to_version),
    ) {
        (Some(v), Some(f), Some(t)) => (v, f, t),
        _ => return false,
    };

    version >= from && version <= to
}

// Catalogue entries use truncated versions such as "4.9"; pad them out
// before handing them to the strict semver parser.
fn parse_version(value: &str) -> Option<Version> {
    let trimmed = value.trim().trim_start_matches('v');
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(version) = Version::parse(trimmed) {
        return Some(version);
    }

    let parts: Vec<&str> = trimmed.split('.').collect();
    if parts.len() >= 3 || parts.iter().any(|p| p.is_empty()) {
        return None;
    }

    let mut padded = parts;
    while padded.len() < 3 {
        padded.push("0");
    }
    Version::parse(&padded.join(".")).ok()
}
