use serde_json::Value;
use std::collections::HashSet;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use crate::constants::PROBE_TIMEOUT;
use crate::http_client::HttpClient;

// Installations expose either of the two discovery paths, sometimes both.
const DISCOVERY_PATHS: [&str; 2] = ["/?rest_route=/", "/wp-json"];

/// Queries both REST discovery paths concurrently and returns the union of
/// the advertised routes. Never fails; anything unreachable or unparseable
/// contributes nothing.
pub fn fetch_endpoints(target: &str) -> Vec<String> {
    let (tx, rx) = mpsc::channel();

    for path in DISCOVERY_PATHS {
        let tx = tx.clone();
        let target = target.to_string();
        thread::spawn(move || {
            let endpoints = match HttpClient::new(Duration::from_secs(PROBE_TIMEOUT)) {
                Ok(client) => fetch_endpoints_from_path(&client, &target, path),
                Err(_) => vec![],
            };
            let _ = tx.send(endpoints);
        });
    }
    drop(tx);

    let mut unique: HashSet<String> = HashSet::new();
    while let Ok(endpoints) = rx.recv() {
        unique.extend(endpoints);
    }

    unique.into_iter().collect()
}

fn fetch_endpoints_from_path(client: &HttpClient, target: &str, path: &str) -> Vec<String> {
    match client.get(&format!("{}{}", target, path)) {
        Ok(body) => routes_from_body(&body),
        Err(_) => vec![],
    }
}

fn routes_from_body(body: &str) -> Vec<String> {
    let json: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => return vec![],
    };

    match json.get("routes").and_then(Value::as_object) {
        Some(routes) => routes.keys().cloned().collect(),
        None => vec![],
    }
}
