//! Argument, environment variable, and label merges

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::EnvVar;

/// Parse a list of `key[=value]` argument tokens into a key-to-value map
///
/// Tokens are split on the first `=`; everything after it is kept verbatim,
/// so an argument whose value is itself a `key=value` pair survives intact
/// (`--nameservers=ns=10.0.0.1:53` parses to key `--nameservers`, value
/// `ns=10.0.0.1:53`). A token with no `=` is a bare flag, stored with an
/// empty value. Empty tokens are ignored. Later tokens replace earlier ones
/// with the same key.
pub fn parse_args(tokens: &[String]) -> BTreeMap<String, String> {
    let mut parsed = BTreeMap::new();
    for token in tokens {
        if token.is_empty() {
            continue;
        }
        match token.split_once('=') {
            Some((key, value)) => parsed.insert(key.to_string(), value.to_string()),
            None => parsed.insert(token.clone(), String::new()),
        };
    }
    parsed
}

/// Merge two argument lists, override winning by key
///
/// Both lists are parsed with [`parse_args`]; `overrides` entries are applied
/// after `source` entries into the same map, so an override sharing a key
/// fully replaces the source value. The result is re-serialized as
/// `key=value` tokens (bare flags re-emitted without a trailing `=`) sorted
/// lexicographically by full token.
pub fn merge_args(source: &[String], overrides: &[String]) -> Vec<String> {
    let mut parsed = parse_args(source);
    parsed.extend(parse_args(overrides));

    let mut merged: Vec<String> = parsed
        .into_iter()
        .map(|(key, value)| {
            if value.is_empty() {
                key
            } else {
                format!("{key}={value}")
            }
        })
        .collect();
    merged.sort();
    merged
}

/// Merge two environment variable lists, override winning by name
///
/// The value side is opaque: the whole `EnvVar` (including `valueFrom`
/// sources) is replaced when names collide, never inspected. Output is
/// sorted by name.
pub fn merge_env(source: &[EnvVar], overrides: &[EnvVar]) -> Vec<EnvVar> {
    let mut by_name: BTreeMap<String, EnvVar> = BTreeMap::new();
    for var in source.iter().chain(overrides) {
        by_name.insert(var.name.clone(), var.clone());
    }
    by_name.into_values().collect()
}

/// Merge two label maps, override winning on key collision
pub fn merge_labels(
    source: &BTreeMap<String, String>,
    overrides: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut merged = source.clone();
    for (key, value) in overrides {
        merged.insert(key.clone(), value.clone());
    }
    merged
}
