/*!
 * Metric Series Identity
 * A series is (metric name, canonical tag set); different tag sets on the
 * same name are distinct series
 */

use crate::core::errors::MetricsError;
use crate::data::{Value, ValueKind};
use std::collections::BTreeMap;

/// Identity of one metric series
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeriesKey {
    name: String,
    tags: String,
}

impl SeriesKey {
    /// Build a series key from a metric name and a tag set.
    ///
    /// Tags must be a map of scalars (string, bool, int, finite float);
    /// nested containers and nulls are rejected. The tag set is
    /// canonicalized by key order so insertion order never splits a series.
    pub fn new(name: impl Into<String>, tags: &Value) -> Result<Self, MetricsError> {
        Ok(Self {
            name: name.into(),
            tags: canonical_tags(tags)?,
        })
    }

    /// A key with no tags, used by host and process gauges
    pub fn untagged(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tags: "{}".to_string(),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Canonical JSON of the tag set, sorted by key
    #[inline]
    pub fn tags(&self) -> &str {
        &self.tags
    }
}

fn canonical_tags(tags: &Value) -> Result<String, MetricsError> {
    let entries = match tags {
        Value::Map(entries) => entries,
        other => {
            return Err(MetricsError::InvalidArgumentType(format!(
                "tag set must be a map, got {}",
                other.kind()
            )))
        }
    };

    let mut sorted: BTreeMap<&str, &Value> = BTreeMap::new();
    for (key, value) in entries {
        match value.kind() {
            ValueKind::String | ValueKind::Bool | ValueKind::Int | ValueKind::Float => {
                sorted.insert(key.as_str(), value);
            }
            other => {
                return Err(MetricsError::InvalidArgumentType(format!(
                    "tag {:?} must be a scalar, got {}",
                    key, other
                )))
            }
        }
    }

    serde_json::to_string(&sorted)
        .map_err(|e| MetricsError::InvalidArgumentType(format!("unserializable tag set: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_order_does_not_split_series() {
        let mut a = Value::new_map();
        a.set_string("region", "eu").unwrap();
        a.set_string("host", "web-1").unwrap();

        let mut b = Value::new_map();
        b.set_string("host", "web-1").unwrap();
        b.set_string("region", "eu").unwrap();

        assert_eq!(
            SeriesKey::new("requests", &a).unwrap(),
            SeriesKey::new("requests", &b).unwrap()
        );
    }

    #[test]
    fn test_different_tags_are_distinct_series() {
        let mut a = Value::new_map();
        a.set_string("status", "200").unwrap();

        let mut b = Value::new_map();
        b.set_string("status", "500").unwrap();

        assert_ne!(
            SeriesKey::new("requests", &a).unwrap(),
            SeriesKey::new("requests", &b).unwrap()
        );
    }

    #[test]
    fn test_empty_tags_match_untagged() {
        let key = SeriesKey::new("cpu", &Value::new_map()).unwrap();
        assert_eq!(key, SeriesKey::untagged("cpu"));
        assert_eq!(key.tags(), "{}");
    }

    #[test]
    fn test_nested_tags_rejected() {
        let mut tags = Value::new_map();
        tags.set_data("nested", Value::new_map()).unwrap();
        assert!(matches!(
            SeriesKey::new("requests", &tags),
            Err(MetricsError::InvalidArgumentType(_))
        ));
    }

    #[test]
    fn test_null_tag_rejected() {
        let mut tags = Value::new_map();
        tags.set_null("empty").unwrap();
        assert!(matches!(
            SeriesKey::new("requests", &tags),
            Err(MetricsError::InvalidArgumentType(_))
        ));
    }

    #[test]
    fn test_non_map_tags_rejected() {
        assert!(matches!(
            SeriesKey::new("requests", &Value::new_array()),
            Err(MetricsError::InvalidArgumentType(_))
        ));
    }
}
