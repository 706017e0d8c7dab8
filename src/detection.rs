use std::collections::{HashMap, HashSet};

use crate::models::PluginDetectionResult;

/// Scores every fingerprinted plugin against the routes observed on a site.
/// A plugin is detected when at least 15% of its canonical routes (and never
/// fewer than one) were observed. Detected plugins whose canonical route sets
/// are identical cannot be told apart and are flagged ambiguous.
pub fn detect_plugins(
    detected_endpoints: &[String],
    plugin_endpoints: &HashMap<String, Vec<String>>,
) -> PluginDetectionResult {
    let observed: HashSet<&str> = detected_endpoints.iter().map(String::as_str).collect();

    let mut result = PluginDetectionResult::default();

    for (plugin, known_routes) in plugin_endpoints {
        if known_routes.is_empty() {
            continue;
        }

        let match_count = known_routes
            .iter()
            .filter(|route| observed.contains(route.as_str()))
            .count();

        let threshold = ((known_routes.len() as f64) * 0.15).ceil().max(1.0) as usize;
        if match_count >= threshold {
            result.scores.insert(plugin.clone(), match_count);
            result.confidence.insert(
                plugin.clone(),
                (match_count as f64 / known_routes.len() as f64) * 100.0,
            );
            result.detected.push(plugin.clone());
        }
    }

    // Stable ordering keeps detection deterministic for fixed inputs.
    result.detected.sort();

    // Ambiguity only makes sense among detected plugins: bucket them by
    // their canonical route set.
    let mut groups: HashMap<String, Vec<String>> = HashMap::new();
    let mut keys: HashMap<String, String> = HashMap::new();

    for plugin in &result.detected {
        let mut canonical = plugin_endpoints[plugin].clone();
        canonical.sort();
        let key = canonical.join("\n");
        groups.entry(key.clone()).or_default().push(plugin.clone());
        keys.insert(plugin.clone(), key);
    }

    for members in groups.values() {
        if members.len() > 1 {
            for plugin in members {
                result.ambiguity.insert(plugin.clone(), true);
            }
        }
    }

    for plugin in &result.detected {
        let members = groups[&keys[plugin]].clone();
        result.matches.insert(plugin.clone(), members);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(entries: &[(&str, &[&str])]) -> HashMap<String, Vec<String>> {
        entries
            .iter()
            .map(|(slug, routes)| {
                (
                    slug.to_string(),
                    routes.iter().map(|r| r.to_string()).collect(),
                )
            })
            .collect()
    }

    fn observed(routes: &[&str]) -> Vec<String> {
        routes.iter().map(|r| r.to_string()).collect()
    }

    #[test]
    fn partial_match_above_threshold_is_detected() {
        let index = index(&[("plugin1", &["/a", "/b", "/c"])]);
        let result = detect_plugins(&observed(&["/a", "/b"]), &index);

        assert_eq!(result.detected, vec!["plugin1"]);
        assert_eq!(result.scores["plugin1"], 2);
        assert!((result.confidence["plugin1"] - 66.666).abs() < 0.01);
        assert!(result.ambiguity.is_empty());
        assert_eq!(result.matches["plugin1"], vec!["plugin1"]);
    }

    #[test]
    fn identical_route_sets_are_flagged_ambiguous() {
        let index = index(&[("p1", &["/shared"]), ("p2", &["/shared"])]);
        let result = detect_plugins(&observed(&["/shared"]), &index);

        assert_eq!(result.detected, vec!["p1", "p2"]);
        assert_eq!(result.confidence["p1"], 100.0);
        assert_eq!(result.confidence["p2"], 100.0);
        assert!(result.ambiguity["p1"]);
        assert!(result.ambiguity["p2"]);

        let mut group = result.matches["p1"].clone();
        group.sort();
        assert_eq!(group, vec!["p1", "p2"]);
        assert_eq!(result.matches["p1"].len(), result.matches["p2"].len());
    }

    #[test]
    fn single_match_below_threshold_is_rejected() {
        let index = index(&[("p", &["/a", "/b", "/c", "/d", "/e", "/f", "/g"])]);
        let result = detect_plugins(&observed(&["/a"]), &index);

        // threshold = ceil(7 * 0.15) = 2
        assert!(result.detected.is_empty());
    }

    #[test]
    fn two_matches_meet_the_seven_route_threshold() {
        let index = index(&[("p", &["/a", "/b", "/c", "/d", "/e", "/f", "/g"])]);
        let result = detect_plugins(&observed(&["/a", "/b"]), &index);

        assert_eq!(result.detected, vec!["p"]);
        assert_eq!(result.scores["p"], 2);
    }

    #[test]
    fn single_route_plugin_needs_one_match() {
        let index = index(&[("tiny", &["/only"])]);

        let hit = detect_plugins(&observed(&["/only"]), &index);
        assert_eq!(hit.detected, vec!["tiny"]);
        assert_eq!(hit.confidence["tiny"], 100.0);

        let miss = detect_plugins(&observed(&["/other"]), &index);
        assert!(miss.detected.is_empty());
    }

    #[test]
    fn empty_canonical_sets_are_ignored() {
        let index = index(&[("ghost", &[]), ("real", &["/r"])]);
        let result = detect_plugins(&observed(&["/r"]), &index);

        assert_eq!(result.detected, vec!["real"]);
    }

    #[test]
    fn no_observed_routes_means_empty_result() {
        let index = index(&[("p", &["/a"])]);
        let result = detect_plugins(&[], &index);

        assert!(result.detected.is_empty());
        assert!(result.scores.is_empty());
        assert!(result.matches.is_empty());
    }

    #[test]
    fn confidence_stays_within_bounds() {
        let index = index(&[
            ("p1", &["/x", "/y"]),
            ("p2", &["/x", "/z", "/w", "/v", "/u"]),
        ]);
        let result = detect_plugins(&observed(&["/x", "/y", "/z"]), &index);

        for plugin in &result.detected {
            let confidence = result.confidence[plugin];
            assert!((0.0..=100.0).contains(&confidence));
            let expected = result.scores[plugin] as f64
                / index[plugin].len() as f64
                * 100.0;
            assert!((confidence - expected).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn detection_is_deterministic() {
        let index = index(&[
            ("a", &["/1", "/2"]),
            ("b", &["/1", "/2"]),
            ("c", &["/3"]),
        ]);
        let routes = observed(&["/1", "/2", "/3"]);

        let first = detect_plugins(&routes, &index);
        let second = detect_plugins(&routes, &index);

        assert_eq!(first.detected, second.detected);
        assert_eq!(first.scores, second.scores);
        assert_eq!(first.ambiguity, second.ambiguity);
        assert_eq!(first.matches, second.matches);
    }
}
