use anyhow::{Context, Result};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::models::PluginEntry;

/// Shared result sink. Writers are handed to every site worker; each call is
/// serialised internally.
pub trait ResultWriter: Send + Sync {
    fn write_results(&self, url: &str, results: &[PluginEntry]);
    fn close(&self);
}

fn auth_type_order(auth: &str) -> u8 {
    match auth.to_lowercase().as_str() {
        "unauth" => 0,
        "auth" => 1,
        _ => 2,
    }
}

//
// CSV writer
//

pub struct CsvWriter {
    writer: Mutex<csv::Writer<File>>,
}

const CSV_HEADER: [&str; 10] = [
    "URL",
    "Plugin",
    "Version",
    "Severity",
    "AuthType",
    "CVEs",
    "CVE Links",
    "CVSS Score",
    "CVSS Vector",
    "Title",
];

impl CsvWriter {
    pub fn new(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create CSV file {}", path.display()))?;
        let mut writer = csv::Writer::from_writer(file);
        writer.write_record(CSV_HEADER).context("Failed to write CSV header")?;
        writer.flush().context("Failed to flush CSV header")?;

        Ok(Self {
            writer: Mutex::new(writer),
        })
    }
}

impl ResultWriter for CsvWriter {
    fn write_results(&self, url: &str, results: &[PluginEntry]) {
        let mut sorted: Vec<&PluginEntry> = results.iter().collect();
        sorted.sort_by_key(|entry| auth_type_order(&entry.auth_type));

        let mut writer = self.writer.lock().unwrap();
        for entry in sorted {
            let _ = writer.write_record([
                url,
                &entry.plugin,
                &entry.version,
                &entry.severity,
                &entry.auth_type,
                &entry.cves.join(", "),
                &entry.cve_links.join(", "),
                &format!("{:.1}", entry.cvss_score),
                &entry.cvss_vector,
                &entry.title,
            ]);
        }
        let _ = writer.flush();
    }

    fn close(&self) {
        let _ = self.writer.lock().unwrap().flush();
    }
}

//
// JSON writer
//

struct JsonSink {
    file: File,
    first: bool,
}

pub struct JsonWriter {
    sink: Mutex<JsonSink>,
}

impl JsonWriter {
    pub fn new(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create JSON file {}", path.display()))?;
        Ok(Self {
            sink: Mutex::new(JsonSink { file, first: true }),
        })
    }
}

impl ResultWriter for JsonWriter {
    /// Streams one pretty-printed object per call, newline-separated.
    fn write_results(&self, url: &str, results: &[PluginEntry]) {
        let entry = json!({
            "url": url,
            "plugins": group_plugins(results),
        });
        let rendered = match serde_json::to_string_pretty(&entry) {
            Ok(text) => text,
            Err(_) => return,
        };

        let mut sink = self.sink.lock().unwrap();
        if sink.first {
            sink.first = false;
        } else {
            let _ = sink.file.write_all(b"\n");
        }
        let _ = sink.file.write_all(rendered.as_bytes());
        let _ = sink.file.flush();
    }

    fn close(&self) {
        let _ = self.sink.lock().unwrap().file.flush();
    }
}

// plugin -> version -> severity -> auth -> vulnerabilities, rebuilt as the
// nested output shape with auth groups in a fixed order and empty or N/A
// severity buckets dropped.
fn group_plugins(results: &[PluginEntry]) -> Value {
    type AuthGroups = BTreeMap<String, Vec<Value>>;
    type SeverityGroups = BTreeMap<String, AuthGroups>;

    let mut grouped: BTreeMap<(String, String), SeverityGroups> = BTreeMap::new();

    for entry in results {
        let key = (entry.plugin.clone(), entry.version.clone());
        let severities = grouped.entry(key).or_default();

        if entry.severity.is_empty() || entry.severity == "N/A" {
            continue;
        }

        let auth = match entry.auth_type.to_lowercase().as_str() {
            a @ ("auth" | "unauth" | "privileged") => a.to_string(),
            _ => "unknown".to_string(),
        };

        let bucket = severities
            .entry(entry.severity.clone())
            .or_default()
            .entry(auth)
            .or_default();

        for (i, cve) in entry.cves.iter().enumerate() {
            let cve_link = entry.cve_links.get(i).cloned().unwrap_or_default();
            bucket.push(json!({
                "cve": cve,
                "cve_link": cve_link,
                "title": entry.title,
                "cvss_score": entry.cvss_score,
                "cvss_vector": entry.cvss_vector,
            }));
        }
    }

    let mut plugins: Map<String, Value> = Map::new();

    for ((plugin, version), severities) in grouped {
        let mut formatted_severities: Map<String, Value> = Map::new();

        for (severity, auth_groups) in severities {
            let mut ordered = Vec::new();
            for auth in ["unauth", "auth", "privileged", "unknown"] {
                if let Some(vulns) = auth_groups.get(auth) {
                    if !vulns.is_empty() {
                        ordered.push(json!({
                            "auth_type": title_case(auth),
                            "vulnerabilities": vulns,
                        }));
                    }
                }
            }
            if !ordered.is_empty() {
                formatted_severities.insert(severity, Value::Array(ordered));
            }
        }

        let mut version_entry = Map::new();
        version_entry.insert("version".to_string(), Value::String(version));
        if !formatted_severities.is_empty() {
            version_entry.insert("severities".to_string(), Value::Object(formatted_severities));
        }

        let versions = plugins
            .entry(plugin)
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Some(list) = versions.as_array_mut() {
            list.push(Value::Object(version_entry));
        }
    }

    Value::Object(plugins)
}

fn title_case(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

//
// Writer factory
//

pub fn detect_output_format(output_file: &str) -> &'static str {
    let ext = Path::new(output_file)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");

    match ext {
        "csv" => "csv",
        "json" => "json",
        _ => {
            eprintln!("⚠️ Unsupported output format: {}. Defaulting to CSV.", ext);
            "csv"
        }
    }
}

pub fn get_writer(output_file: &str) -> Result<Arc<dyn ResultWriter>> {
    let path = Path::new(output_file);
    match detect_output_format(output_file) {
        "json" => Ok(Arc::new(JsonWriter::new(path)?)),
        _ => Ok(Arc::new(CsvWriter::new(path)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn entry(plugin: &str, version: &str, severity: &str, auth: &str, cve: &str) -> PluginEntry {
        PluginEntry {
            plugin: plugin.to_string(),
            version: version.to_string(),
            severity: severity.to_string(),
            cves: vec![cve.to_string()],
            cve_links: vec![format!("https://cve.example/{}", cve)],
            title: format!("{} issue", plugin),
            auth_type: auth.to_string(),
            cvss_score: 7.5,
            cvss_vector: "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:H/A:N".to_string(),
        }
    }

    #[test]
    fn format_detection_follows_the_extension() {
        assert_eq!(detect_output_format("out.csv"), "csv");
        assert_eq!(detect_output_format("out.json"), "json");
        assert_eq!(detect_output_format("out.txt"), "csv");
        assert_eq!(detect_output_format("out"), "csv");
    }

    #[test]
    fn csv_row_count_matches_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let writer = CsvWriter::new(&path).unwrap();

        writer.write_results(
            "https://a.example",
            &[
                entry("p1", "1.0.0", "high", "Unauth", "CVE-2024-0001"),
                entry("p1", "1.0.0", "medium", "Auth", "CVE-2024-0002"),
                entry("p2", "unknown", "N/A", "N/A", ""),
            ],
        );
        writer.close();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        assert_eq!(
            reader.headers().unwrap().iter().collect::<Vec<_>>(),
            CSV_HEADER.to_vec()
        );
        assert_eq!(reader.records().count(), 3);
    }

    #[test]
    fn csv_rows_are_sorted_unauth_first() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let writer = CsvWriter::new(&path).unwrap();

        writer.write_results(
            "https://a.example",
            &[
                entry("p", "1.0.0", "low", "Privileged", "CVE-2024-0003"),
                entry("p", "1.0.0", "high", "Auth", "CVE-2024-0002"),
                entry("p", "1.0.0", "critical", "Unauth", "CVE-2024-0001"),
            ],
        );
        writer.close();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let auth_column: Vec<String> = reader
            .records()
            .map(|r| r.unwrap().get(4).unwrap().to_string())
            .collect();
        assert_eq!(auth_column, vec!["Unauth", "Auth", "Privileged"]);
    }

    #[test]
    fn json_emits_one_object_per_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let writer = JsonWriter::new(&path).unwrap();

        writer.write_results(
            "https://a.example",
            &[entry("p1", "1.0.0", "high", "Unauth", "CVE-2024-0001")],
        );
        writer.write_results("https://b.example", &[]);
        writer.close();

        let content = fs::read_to_string(&path).unwrap();
        let objects: Vec<Value> = serde_json::Deserializer::from_str(&content)
            .into_iter::<Value>()
            .map(|v| v.unwrap())
            .collect();

        assert_eq!(objects.len(), 2);
        for object in &objects {
            assert!(object.get("url").is_some());
            assert!(object.get("plugins").is_some());
        }
        assert_eq!(objects[1]["plugins"], json!({}));
    }

    #[test]
    fn json_groups_by_severity_and_auth_in_order() {
        let results = vec![
            entry("p", "1.0.0", "high", "Privileged", "CVE-2024-0004"),
            entry("p", "1.0.0", "high", "Unauth", "CVE-2024-0001"),
            entry("p", "1.0.0", "high", "Auth", "CVE-2024-0002"),
            entry("p", "1.0.0", "high", "Nonsense", "CVE-2024-0003"),
        ];
        let grouped = group_plugins(&results);

        let versions = grouped["p"].as_array().unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0]["version"], "1.0.0");

        let high = versions[0]["severities"]["high"].as_array().unwrap();
        let auth_order: Vec<&str> = high
            .iter()
            .map(|g| g["auth_type"].as_str().unwrap())
            .collect();
        assert_eq!(auth_order, vec!["Unauth", "Auth", "Privileged", "Unknown"]);
    }

    #[test]
    fn sentinel_entries_keep_the_version_but_no_severities() {
        let grouped = group_plugins(&[entry("p", "2.1.0", "N/A", "N/A", "")]);

        let versions = grouped["p"].as_array().unwrap();
        assert_eq!(versions[0]["version"], "2.1.0");
        assert!(versions[0].get("severities").is_none());
    }
}
