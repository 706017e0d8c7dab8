use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::constants;
use crate::logger::Logger;
use crate::models::Vulnerability;
use crate::version::is_version_vulnerable;

/// Locally cached Wordfence catalogue. Loaded once per run and handed by
/// reference through the orchestrator; never re-read in-process.
pub struct WordfenceDatabase {
    vulnerabilities: Vec<Vulnerability>,
}

impl WordfenceDatabase {
    /// Reads the cached catalogue. A missing or malformed file degrades to
    /// an empty catalogue with a one-time warning; the scan still runs, it
    /// just cannot name vulnerabilities.
    pub fn load(logger: &Logger) -> Self {
        let path = match storage_path(constants::WORDFENCE_FILE) {
            Ok(path) => path,
            Err(e) => {
                logger.warning(&format!("Failed to get storage path: {}", e));
                return Self {
                    vulnerabilities: vec![],
                };
            }
        };

        match load_from_file(&path) {
            Ok(vulnerabilities) => Self { vulnerabilities },
            Err(e) => {
                logger.warning(&format!("Failed to read Wordfence catalogue: {}", e));
                logger.info("Run 'wpprobe update' to fetch the latest vulnerability catalogue.");
                logger.warning("The scan will proceed, but vulnerabilities will not be displayed.");
                Self {
                    vulnerabilities: vec![],
                }
            }
        }
    }

    pub fn from_vulnerabilities(vulnerabilities: Vec<Vulnerability>) -> Self {
        Self { vulnerabilities }
    }

    /// Catalogue entries matching a plugin at a specific version. Entries
    /// without a CVE are skipped; the range check is inclusive on both ends.
    pub fn vulnerabilities_for_plugin(&self, plugin: &str, version: &str) -> Vec<Vulnerability> {
        self.vulnerabilities
            .iter()
            .filter(|v| {
                v.slug == plugin
                    && !v.cve.is_empty()
                    && is_version_vulnerable(version, &v.from_version, &v.to_version)
            })
            .cloned()
            .collect()
    }
}

fn load_from_file(path: &Path) -> Result<Vec<Vulnerability>> {
    let content = fs::read_to_string(path).context("Failed to read catalogue file")?;
    let vulnerabilities: Vec<Vulnerability> =
        serde_json::from_str(&content).context("Failed to parse catalogue file")?;
    Ok(vulnerabilities)
}

pub fn storage_path(filename: &str) -> Result<PathBuf> {
    let config_dir = dirs::config_dir().context("Failed to locate user config directory")?;
    let storage = config_dir.join(constants::STORAGE_DIR);
    fs::create_dir_all(&storage).context("Failed to create storage directory")?;
    Ok(storage.join(filename))
}

/// Refreshes the local catalogue from the Wordfence production feed.
pub fn update(logger: &Logger) -> Result<()> {
    logger.info("Fetching Wordfence data...");
    let feed = fetch_wordfence_data()?;

    logger.info("Processing vulnerabilities...");
    let vulnerabilities = process_wordfence_data(&feed);

    logger.info("Saving vulnerabilities to file...");
    let path = storage_path(constants::WORDFENCE_FILE)?;
    save_vulnerabilities(&path, &vulnerabilities)?;

    logger.success(&format!(
        "Wordfence catalogue updated: {} entries saved in {}",
        vulnerabilities.len(),
        path.display()
    ));
    Ok(())
}

fn fetch_wordfence_data() -> Result<Value> {
    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(constants::WORDFENCE_API_TIMEOUT))
        .user_agent(format!("wpprobe/{}", constants::VERSION))
        .build()
        .context("Failed to create HTTP client")?;

    let response = client
        .get(constants::WORDFENCE_API_URL)
        .send()
        .context("Failed to reach the Wordfence API")?;

    match response.status().as_u16() {
        200 => {
            let data: Value = response
                .json()
                .context("Failed to decode Wordfence feed JSON")?;
            Ok(data)
        }
        429 => {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("a few minutes")
                .to_string();
            bail!("rate limit exceeded (429), retry after {}", retry_after)
        }
        status => bail!("unexpected API status: {}", status),
    }
}

/// Flattens the untyped feed into one record per
/// `software[*].affected_versions[*]` combination. Malformed records are
/// skipped silently, as are records without a CVE.
pub fn process_wordfence_data(feed: &Value) -> Vec<Vulnerability> {
    let mut vulnerabilities = Vec::new();

    let records = match feed.as_object() {
        Some(map) => map,
        None => return vulnerabilities,
    };

    for record in records.values() {
        let record = match record.as_object() {
            Some(map) => map,
            None => continue,
        };

        let title = record
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let cve = record
            .get("cve")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if cve.is_empty() {
            continue;
        }
        let cve_link = record
            .get("cve_link")
            .and_then(Value::as_str)
            .unwrap_or_default();

        let mut cvss_score = 0.0;
        let mut cvss_vector = "";
        let mut severity = String::new();
        if let Some(cvss) = record.get("cvss").and_then(Value::as_object) {
            cvss_score = cvss.get("score").and_then(Value::as_f64).unwrap_or(0.0);
            cvss_vector = cvss.get("vector").and_then(Value::as_str).unwrap_or("");
            severity = cvss
                .get("rating")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_lowercase();
        }

        let auth_type = derive_auth_type(cvss_vector, title);

        let software = match record.get("software").and_then(Value::as_array) {
            Some(list) => list,
            None => continue,
        };

        for item in software {
            let item = match item.as_object() {
                Some(map) => map,
                None => continue,
            };

            let slug = item
                .get("slug")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let software_type = item
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or_default();

            let affected_versions = match item.get("affected_versions").and_then(Value::as_object) {
                Some(map) => map,
                None => continue,
            };

            for (version_label, range) in affected_versions {
                let range = match range.as_object() {
                    Some(map) => map,
                    None => continue,
                };

                let from_version = match range.get("from_version").and_then(Value::as_str) {
                    Some(v) => v.replace('*', "0.0.0"),
                    None => continue,
                };
                let to_version = match range.get("to_version").and_then(Value::as_str) {
                    Some(v) => v.replace('*', "999999.0.0"),
                    None => continue,
                };

                vulnerabilities.push(Vulnerability {
                    title: title.to_string(),
                    slug: slug.to_string(),
                    software_type: software_type.to_string(),
                    affected_version: version_label.clone(),
                    from_version,
                    from_inclusive: range
                        .get("from_inclusive")
                        .and_then(Value::as_bool)
                        .unwrap_or(true),
                    to_version,
                    to_inclusive: range
                        .get("to_inclusive")
                        .and_then(Value::as_bool)
                        .unwrap_or(true),
                    severity: severity.clone(),
                    cve: cve.to_string(),
                    cve_link: cve_link.to_string(),
                    auth_type: auth_type.clone(),
                    cvss_score,
                    cvss_vector: cvss_vector.to_string(),
                });
            }
        }
    }

    vulnerabilities
}

// Privileges-required component of the CVSS vector decides the posture; the
// title wording is the fallback when no vector is present.
fn derive_auth_type(cvss_vector: &str, title: &str) -> String {
    if cvss_vector.contains("PR:N") {
        return "Unauth".to_string();
    }
    if cvss_vector.contains("PR:L") {
        return "Auth".to_string();
    }
    if cvss_vector.contains("PR:H") {
        return "Privileged".to_string();
    }

    let lower_title = title.to_lowercase();
    if lower_title.contains("unauth") {
        "Unauth".to_string()
    } else if lower_title.contains("auth") {
        "Auth".to_string()
    } else {
        "Unknown".to_string()
    }
}

fn save_vulnerabilities(path: &Path, vulnerabilities: &[Vulnerability]) -> Result<()> {
    let parent = path
        .parent()
        .context("Catalogue path has no parent directory")?;

    let content = serde_json::to_string_pretty(vulnerabilities)
        .context("Failed to serialize catalogue")?;

    // Write-then-rename so a crashed update never leaves a truncated file.
    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .context("Failed to create temporary catalogue file")?;
    tmp.write_all(content.as_bytes())
        .context("Failed to write catalogue")?;
    tmp.persist(path)
        .context("Failed to replace catalogue file")?;

    Ok(())
}
