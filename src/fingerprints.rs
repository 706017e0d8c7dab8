use std::collections::HashMap;

// Route-to-plugin index, compiled into the binary. One JSON object per line,
// each mapping one or more plugin slugs to their canonical REST routes.
pub const EMBEDDED_FINGERPRINTS: &str = include_str!("../data/scanned_plugins.json");

/// Parses the newline-delimited fingerprint index. Lines that fail to parse
/// are skipped so future record shapes don't break old binaries.
pub fn load_plugin_endpoints(data: &str) -> HashMap<String, Vec<String>> {
    let mut plugin_endpoints: HashMap<String, Vec<String>> = HashMap::new();

    for line in data.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let parsed: HashMap<String, Vec<String>> = match serde_json::from_str(line) {
            Ok(map) => map,
            Err(_) => continue,
        };

        for (plugin, endpoints) in parsed {
            plugin_endpoints.insert(plugin, endpoints);
        }
    }

    plugin_endpoints
}

/// The embedded index parsed once at scan start.
pub fn embedded_plugin_endpoints() -> HashMap<String, Vec<String>> {
    load_plugin_endpoints(EMBEDDED_FINGERPRINTS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_one_object_per_line() {
        let data = concat!(
            r#"{"plugin-a": ["/a/v1", "/a/v1/items"]}"#,
            "\n",
            r#"{"plugin-b": ["/b/v1"]}"#,
            "\n",
        );
        let index = load_plugin_endpoints(data);
        assert_eq!(index.len(), 2);
        assert_eq!(index["plugin-a"].len(), 2);
        assert_eq!(index["plugin-b"], vec!["/b/v1"]);
    }

    #[test]
    fn line_may_carry_several_slugs() {
        let data = r#"{"lite": ["/shared/v1"], "pro": ["/shared/v1"]}"#;
        let index = load_plugin_endpoints(data);
        assert_eq!(index.len(), 2);
        assert_eq!(index["lite"], index["pro"]);
    }

    #[test]
    fn malformed_and_blank_lines_are_skipped() {
        let data = "\nnot json at all\n{\"ok\": [\"/ok/v1\"]}\n{\"bad\": 42}\n";
        let index = load_plugin_endpoints(data);
        assert_eq!(index.len(), 1);
        assert!(index.contains_key("ok"));
    }

    #[test]
    fn embedded_index_is_non_empty() {
        let index = embedded_plugin_endpoints();
        assert!(!index.is_empty());
        assert!(index.values().all(|routes| !routes.is_empty()));
    }
}
