//! A single measurement sample.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, de::Error as _};

/// One measurement sample.
///
/// On the wire the value may be a number or a numeric string, and the timestamp
/// may be epoch milliseconds or an RFC 3339 string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Point {
    /// The measurement (category) name.
    pub measurement: String,
    /// The synthetic series identifier, written as the `tagId` tag.
    pub tag_id: String,
    /// The sampled value, written as the `value` float field.
    #[serde(deserialize_with = "deserialize_value")]
    pub value: f64,
    /// When the sample was taken.
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
}

impl Point {
    pub fn new(
        measurement: impl Into<String>,
        tag_id: impl Into<String>,
        value: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            measurement: measurement.into(),
            tag_id: tag_id.into(),
            value,
            timestamp,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawValue {
    Number(f64),
    Text(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Millis(i64),
    Text(String),
}

fn deserialize_value<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match RawValue::deserialize(deserializer)? {
        RawValue::Number(value) => Ok(value),
        RawValue::Text(text) => text
            .trim()
            .parse::<f64>()
            .map_err(|err| D::Error::custom(format!("invalid value {text:?}: {err}"))),
    }
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    match RawTimestamp::deserialize(deserializer)? {
        RawTimestamp::Millis(millis) => from_millis(millis).map_err(D::Error::custom),
        RawTimestamp::Text(text) => {
            if let Ok(millis) = text.trim().parse::<i64>() {
                return from_millis(millis).map_err(D::Error::custom);
            }

            DateTime::parse_from_rfc3339(text.trim())
                .map(|ts| ts.with_timezone(&Utc))
                .map_err(|err| D::Error::custom(format!("invalid timestamp {text:?}: {err}")))
        }
    }
}

fn from_millis(millis: i64) -> Result<DateTime<Utc>, String> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| format!("timestamp {millis} is out of range"))
}
