use chrono::{DateTime, Utc};
use serde::Deserializer;
use serde_derive::{Deserialize, Serialize};

const UNKNOWN: &str = "Unknown";

/// Descriptive attributes returned by a classification provider.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Attributes {
    #[serde(default, deserialize_with = "lenient_string")]
    pub brand: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub model: Option<String>,
    #[serde(rename = "type", default, deserialize_with = "lenient_string")]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub color: Option<String>,
    #[serde(default, deserialize_with = "lenient_features")]
    pub distinctive_features: Vec<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub estimated_value: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub condition: Option<String>,
    #[serde(default, deserialize_with = "lenient_confidence")]
    pub confidence: f32,
}

/// Attributes attached to a track, tagged with where and when they came from.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Enrichment {
    #[serde(flatten)]
    pub attributes: Attributes,
    pub provider: String,
    pub timestamp: DateTime<Utc>,
}

impl Enrichment {
    pub fn new(attributes: Attributes, provider: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            attributes,
            provider: provider.into(),
            timestamp,
        }
    }

    #[inline]
    pub fn confidence(&self) -> f32 {
        self.attributes.confidence
    }

    /// True when `self` should replace `current` on a track.
    #[inline]
    pub fn is_fresher_than(&self, current: Option<&Enrichment>) -> bool {
        current.map_or(true, |cur| self.timestamp > cur.timestamp)
    }
}

fn known(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case(UNKNOWN))
}

/// Builds the label shown for a track.
///
/// Brand and model win; the generic type is used when neither is known, and
/// the colour is appended while fewer than two parts were found. The
/// provider's confidence decides how assertive the label is:
/// above 0.8 it is shown as is, above 0.6 it gets a `(?)` marker, and below
/// that the detector class stays in front with the guess in parentheses.
pub fn compose_display_name(attributes: Option<&Attributes>, fallback_class: &str) -> String {
    let attributes = match attributes {
        Some(attributes) => attributes,
        None => return fallback_class.to_string(),
    };

    let mut parts: Vec<&str> = Vec::with_capacity(3);
    parts.extend(known(&attributes.brand));
    parts.extend(known(&attributes.model));

    if parts.is_empty() {
        parts.extend(known(&attributes.kind));
    }

    if parts.len() < 2 {
        parts.extend(known(&attributes.color));
    }

    if parts.is_empty() {
        return fallback_class.to_string();
    }

    let name = parts.join(" ");

    if attributes.confidence > 0.8 {
        name
    } else if attributes.confidence > 0.6 {
        format!("{} (?)", name)
    } else {
        format!("{} ({}?)", fallback_class, name)
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match <serde_json::Value as serde::Deserialize>::deserialize(deserializer)? {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}

fn lenient_features<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(match <serde_json::Value as serde::Deserialize>::deserialize(deserializer)? {
        serde_json::Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            })
            .collect(),
        serde_json::Value::String(s) => vec![s],
        _ => Vec::new(),
    })
}

fn lenient_confidence<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f32, D::Error> {
    let raw = match <serde_json::Value as serde::Deserialize>::deserialize(deserializer)? {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0),
        serde_json::Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    };

    Ok((raw as f32).clamp(0.0, 1.0))
}
