// SPDX-License-Identifier: MIT
//! Lenient `key=value,key=value` parsing.
//!
//! Used for `OTEL_RESOURCE_ATTRIBUTES` and for the exporter header string.
//! Malformed segments are dropped, never reported.

use std::collections::BTreeMap;

/// Resource attributes parsed from a delimited string.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResourceAttributes(BTreeMap<String, String>);

impl ResourceAttributes {
    /// Parses `raw`; absent or empty input yields an empty set.
    pub fn parse(raw: Option<&str>) -> Self {
        Self(parse_key_value_list(raw))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl FromIterator<(String, String)> for ResourceAttributes {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Splits on `,`, then each segment on the first `=`.
///
/// A pair is kept only when both halves exist and the key is not blank.
/// Later duplicates overwrite earlier ones.
pub fn parse_key_value_list(raw: Option<&str>) -> BTreeMap<String, String> {
    let mut pairs = BTreeMap::new();
    let Some(raw) = raw else {
        return pairs;
    };
    for segment in raw.split(',').filter(|s| !s.is_empty()) {
        let Some((key, value)) = segment.split_once('=') else {
            continue;
        };
        if key.trim().is_empty() {
            continue;
        }
        pairs.insert(key.to_string(), value.to_string());
    }
    pairs
}
