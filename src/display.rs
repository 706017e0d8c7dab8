use colored::*;
use std::collections::{BTreeMap, HashMap};

use crate::models::{PluginDetectionResult, PluginEntry};
use crate::progress::ProgressManager;

const SEVERITY_ORDER: [&str; 4] = ["Critical", "High", "Medium", "Low"];
const AUTH_ORDER: [&str; 3] = ["Unauth", "Auth", "Unknown"];
const CVES_PER_LINE: usize = 4;

// severity -> auth group -> CVEs
type VulnBuckets = BTreeMap<String, BTreeMap<String, Vec<String>>>;

struct TreeNode {
    label: String,
    children: Vec<TreeNode>,
}

impl TreeNode {
    fn new(label: String) -> Self {
        Self {
            label,
            children: vec![],
        }
    }

    fn child(&mut self, node: TreeNode) {
        self.children.push(node);
    }

    fn render(&self) -> String {
        let mut lines = vec![self.label.clone()];
        render_children(&self.children, "", &mut lines);
        lines.join("\n")
    }
}

fn render_children(children: &[TreeNode], prefix: &str, lines: &mut Vec<String>) {
    for (i, child) in children.iter().enumerate() {
        let last = i == children.len() - 1;
        let connector = if last { "└── " } else { "├── " };
        lines.push(format!("{}{}{}", prefix, connector, child.label));

        let child_prefix = format!("{}{}", prefix, if last { "    " } else { "│   " });
        render_children(&child.children, &child_prefix, lines);
    }
}

/// Renders the per-site summary panel: a severity-count header and one tree
/// node per plugin, with severity and auth-type subtrees underneath.
pub fn display_results(
    target: &str,
    plugin_versions: &HashMap<String, String>,
    detection: &PluginDetectionResult,
    findings: &[PluginEntry],
    progress: Option<&ProgressManager>,
) {
    let buckets = bucket_findings(findings);

    let mut summary: HashMap<&str, usize> = HashMap::new();
    for plugin_buckets in buckets.values() {
        for (severity, auth_groups) in plugin_buckets {
            let count: usize = auth_groups.values().map(Vec::len).sum();
            *summary.entry(severity_key(severity)).or_default() += count;
        }
    }

    let summary_line = format!(
        "🔎 {} ({})",
        target.bright_cyan().bold(),
        SEVERITY_ORDER
            .iter()
            .map(|s| format!("{}: {}", paint_severity(s, s), summary.get(s).copied().unwrap_or(0)))
            .collect::<Vec<_>>()
            .join(" | ")
    );

    let mut root = TreeNode::new(summary_line.yellow().bold().to_string());

    for plugin in sorted_plugins(plugin_versions, detection, &buckets) {
        let version = plugin_versions[&plugin].as_str();
        let confidence = detection.confidence.get(&plugin).copied().unwrap_or(0.0);
        let ambiguous = detection.ambiguity.get(&plugin).copied().unwrap_or(false);
        let plugin_buckets = buckets.get(&plugin);

        let label = format_plugin_label(&plugin, version, confidence, ambiguous);
        let mut node = TreeNode::new(paint_plugin(version, plugin_buckets, &label));

        if let Some(plugin_buckets) = plugin_buckets {
            for severity in SEVERITY_ORDER {
                if let Some(auth_groups) = plugin_buckets.get(severity) {
                    let mut severity_node =
                        TreeNode::new(paint_severity(severity, severity).to_string());

                    for auth in AUTH_ORDER {
                        if let Some(cves) = auth_groups.get(auth) {
                            if cves.is_empty() {
                                continue;
                            }
                            let mut sorted_cves = cves.clone();
                            sorted_cves.sort_by(|a, b| cve_order(a).cmp(&cve_order(b)));

                            let mut auth_node = TreeNode::new(auth.bold().to_string());
                            for chunk in wrap_cves(&sorted_cves) {
                                auth_node.child(TreeNode::new(chunk));
                            }
                            severity_node.child(auth_node);
                        }
                    }

                    node.child(severity_node);
                }
            }
        }

        root.child(node);
    }

    if detection.ambiguity.values().any(|&a| a) {
        root.child(TreeNode::new(
            "⚠️ indicates that multiple plugins share common endpoints; only one of these is likely active.".to_string(),
        ));
    }

    let panel = render_panel(&root.render());
    match progress {
        Some(progress) => progress.println(&panel),
        None => println!("{}", panel),
    }
}

fn bucket_findings(findings: &[PluginEntry]) -> HashMap<String, VulnBuckets> {
    let mut buckets: HashMap<String, VulnBuckets> = HashMap::new();

    for entry in findings {
        let severity = title_severity(&entry.severity);
        if !SEVERITY_ORDER.contains(&severity.as_str()) {
            continue;
        }

        let auth = match entry.auth_type.as_str() {
            "Unauth" | "Auth" => entry.auth_type.clone(),
            _ => "Unknown".to_string(),
        };

        buckets
            .entry(entry.plugin.clone())
            .or_default()
            .entry(severity)
            .or_default()
            .entry(auth)
            .or_default()
            .extend(entry.cves.iter().cloned());
    }

    buckets
}

fn title_severity(severity: &str) -> String {
    let lower = severity.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn severity_key(severity: &str) -> &'static str {
    match severity {
        "Critical" => "Critical",
        "High" => "High",
        "Medium" => "Medium",
        _ => "Low",
    }
}

fn format_plugin_label(plugin: &str, version: &str, confidence: f64, ambiguous: bool) -> String {
    if ambiguous {
        format!("{} ({}) ⚠️", plugin, version)
    } else if version == "unknown" {
        format!("{} ({}) [{:.2}% confidence]", plugin, version, confidence)
    } else {
        format!("{} ({})", plugin, version)
    }
}

// has-vuln first, then confidence, then known versions, then name
fn sorted_plugins(
    plugin_versions: &HashMap<String, String>,
    detection: &PluginDetectionResult,
    buckets: &HashMap<String, VulnBuckets>,
) -> Vec<String> {
    let mut plugins: Vec<String> = plugin_versions.keys().cloned().collect();

    plugins.sort_by(|a, b| {
        let a_vuln = buckets.contains_key(a);
        let b_vuln = buckets.contains_key(b);
        let a_confidence = detection.confidence.get(a).copied().unwrap_or(0.0);
        let b_confidence = detection.confidence.get(b).copied().unwrap_or(0.0);
        let a_unknown = plugin_versions[a] == "unknown";
        let b_unknown = plugin_versions[b] == "unknown";

        b_vuln
            .cmp(&a_vuln)
            .then(
                b_confidence
                    .partial_cmp(&a_confidence)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
            .then(a_unknown.cmp(&b_unknown))
            .then(a.cmp(b))
    });

    plugins
}

fn cve_order(cve: &str) -> (u32, u32) {
    let parts: Vec<&str> = cve.split('-').collect();
    if parts.len() != 3 {
        return (0, 0);
    }
    let year = parts[1].parse().unwrap_or(0);
    let id = parts[2].parse().unwrap_or(0);
    (year, id)
}

fn wrap_cves(cves: &[String]) -> Vec<String> {
    cves.chunks(CVES_PER_LINE)
        .map(|chunk| chunk.join(" ⋅ "))
        .collect()
}

fn paint_severity(severity: &str, text: &str) -> ColoredString {
    match severity {
        "Critical" => text.bright_red().bold(),
        "High" => text.red().bold(),
        "Medium" => text.yellow().bold(),
        _ => text.bright_yellow().bold(),
    }
}

fn paint_plugin(version: &str, buckets: Option<&VulnBuckets>, label: &str) -> String {
    if version == "unknown" {
        return label.bright_black().bold().to_string();
    }
    if let Some(buckets) = buckets {
        for severity in SEVERITY_ORDER {
            if buckets.contains_key(severity) {
                return paint_severity(severity, label).to_string();
            }
        }
    }
    label.bright_green().bold().to_string()
}

fn render_panel(content: &str) -> String {
    let width = content
        .lines()
        .map(visible_width)
        .max()
        .unwrap_or(0);

    let mut out = Vec::new();
    out.push(format!("╭{}╮", "─".repeat(width + 4)));
    for line in content.lines() {
        let padding = width - visible_width(line);
        out.push(format!("│  {}{}  │", line, " ".repeat(padding)));
    }
    out.push(format!("╰{}╯", "─".repeat(width + 4)));
    out.join("\n")
}

// Rough display width: ANSI sequences stripped, everything else counted as
// one column.
fn visible_width(line: &str) -> usize {
    let mut width = 0;
    let mut in_escape = false;
    for c in line.chars() {
        if in_escape {
            if c == 'm' {
                in_escape = false;
            }
        } else if c == '\u{1b}' {
            in_escape = true;
        } else {
            width += 1;
        }
    }
    width
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(plugin: &str, severity: &str, auth: &str, cves: &[&str]) -> PluginEntry {
        PluginEntry {
            plugin: plugin.to_string(),
            version: "1.0.0".to_string(),
            severity: severity.to_string(),
            cves: cves.iter().map(|c| c.to_string()).collect(),
            cve_links: vec![],
            title: String::new(),
            auth_type: auth.to_string(),
            cvss_score: 0.0,
            cvss_vector: String::new(),
        }
    }

    #[test]
    fn labels_show_ambiguity_before_confidence() {
        assert_eq!(
            format_plugin_label("p", "unknown", 42.5, true),
            "p (unknown) ⚠️"
        );
        assert_eq!(
            format_plugin_label("p", "unknown", 42.5, false),
            "p (unknown) [42.50% confidence]"
        );
        assert_eq!(format_plugin_label("p", "1.2.3", 99.0, false), "p (1.2.3)");
    }

    #[test]
    fn vulnerable_plugins_come_first() {
        let mut versions = HashMap::new();
        versions.insert("quiet".to_string(), "2.0.0".to_string());
        versions.insert("vulnerable".to_string(), "1.0.0".to_string());
        versions.insert("mystery".to_string(), "unknown".to_string());

        let mut detection = PluginDetectionResult::default();
        detection.confidence.insert("quiet".to_string(), 90.0);
        detection.confidence.insert("vulnerable".to_string(), 50.0);
        detection.confidence.insert("mystery".to_string(), 50.0);

        let buckets = bucket_findings(&[finding(
            "vulnerable",
            "high",
            "Unauth",
            &["CVE-2024-0001"],
        )]);

        let order = sorted_plugins(&versions, &detection, &buckets);
        assert_eq!(order, vec!["vulnerable", "quiet", "mystery"]);
    }

    #[test]
    fn known_version_wins_over_unknown_at_equal_confidence() {
        let mut versions = HashMap::new();
        versions.insert("known".to_string(), "1.0.0".to_string());
        versions.insert("unknown-one".to_string(), "unknown".to_string());

        let mut detection = PluginDetectionResult::default();
        detection.confidence.insert("known".to_string(), 50.0);
        detection.confidence.insert("unknown-one".to_string(), 50.0);

        let order = sorted_plugins(&versions, &detection, &HashMap::new());
        assert_eq!(order, vec!["known", "unknown-one"]);
    }

    #[test]
    fn cves_sort_by_year_then_id() {
        let mut cves = vec![
            "CVE-2024-100".to_string(),
            "CVE-2023-999".to_string(),
            "CVE-2024-99".to_string(),
        ];
        cves.sort_by(|a, b| cve_order(a).cmp(&cve_order(b)));
        assert_eq!(cves, vec!["CVE-2023-999", "CVE-2024-99", "CVE-2024-100"]);
    }

    #[test]
    fn cves_wrap_four_per_line() {
        let cves: Vec<String> = (1..=6).map(|i| format!("CVE-2024-{:04}", i)).collect();
        let wrapped = wrap_cves(&cves);

        assert_eq!(wrapped.len(), 2);
        assert_eq!(
            wrapped[0],
            "CVE-2024-0001 ⋅ CVE-2024-0002 ⋅ CVE-2024-0003 ⋅ CVE-2024-0004"
        );
        assert_eq!(wrapped[1], "CVE-2024-0005 ⋅ CVE-2024-0006");
    }

    #[test]
    fn findings_bucket_by_severity_then_auth() {
        let buckets = bucket_findings(&[
            finding("p", "critical", "Unauth", &["CVE-2024-0001"]),
            finding("p", "critical", "Privileged", &["CVE-2024-0002"]),
            finding("p", "low", "Auth", &["CVE-2024-0003"]),
            finding("p", "N/A", "N/A", &[]),
        ]);

        let plugin_buckets = &buckets["p"];
        assert_eq!(plugin_buckets["Critical"]["Unauth"], vec!["CVE-2024-0001"]);
        // Privileged folds into the Unknown display group
        assert_eq!(plugin_buckets["Critical"]["Unknown"], vec!["CVE-2024-0002"]);
        assert_eq!(plugin_buckets["Low"]["Auth"], vec!["CVE-2024-0003"]);
        assert!(!plugin_buckets.contains_key("N/A"));
    }

    #[test]
    fn panel_border_tracks_the_widest_line() {
        colored::control::set_override(false);
        let panel = render_panel("short\na much longer line here");
        let lines: Vec<&str> = panel.lines().collect();

        assert!(lines[0].starts_with('╭') && lines[0].ends_with('╮'));
        assert!(lines[lines.len() - 1].starts_with('╰'));
        let widths: Vec<usize> = lines.iter().map(|l| l.chars().count()).collect();
        assert!(widths.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn ansi_sequences_do_not_count_toward_width() {
        let plain = "plain text";
        let colored_line = format!("\u{1b}[31m{}\u{1b}[0m", plain);
        assert_eq!(visible_width(&colored_line), visible_width(plain));
    }
}
