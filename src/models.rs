use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// Wordfence catalogue models
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vulnerability {
    pub title: String,
    pub slug: String,
    #[serde(rename = "type")]
    pub software_type: String,
    pub affected_version: String,
    pub from_version: String,
    pub from_inclusive: bool,
    pub to_version: String,
    pub to_inclusive: bool,
    pub severity: String,
    pub cve: String,
    pub cve_link: String,
    pub auth_type: String,
    pub cvss_score: f64,
    pub cvss_vector: String,
}

// One emitted finding: a (plugin, version) pair and a single matched
// vulnerability, or an N/A sentinel when nothing matched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginEntry {
    pub plugin: String,
    pub version: String,
    pub severity: String,
    pub cves: Vec<String>,
    #[serde(rename = "cve_link")]
    pub cve_links: Vec<String>,
    pub title: String,
    pub auth_type: String,
    pub cvss_score: f64,
    pub cvss_vector: String,
}

impl PluginEntry {
    pub fn not_vulnerable(plugin: &str, version: &str) -> Self {
        PluginEntry {
            plugin: plugin.to_string(),
            version: version.to_string(),
            severity: "N/A".to_string(),
            cves: vec![],
            cve_links: vec![],
            title: String::new(),
            auth_type: "N/A".to_string(),
            cvss_score: 0.0,
            cvss_vector: String::new(),
        }
    }
}

// Result of fingerprint matching for one site
#[derive(Debug, Clone, Default)]
pub struct PluginDetectionResult {
    pub scores: HashMap<String, usize>,
    pub confidence: HashMap<String, f64>,
    pub ambiguity: HashMap<String, bool>,
    pub detected: Vec<String>,
    pub matches: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub url: Option<String>,
    pub file: Option<String>,
    pub no_check_version: bool,
    pub threads: usize,
    pub output: Option<String>,
    pub verbose: bool,
}
