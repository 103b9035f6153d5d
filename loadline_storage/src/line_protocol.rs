//! Line protocol encoding.
//!
//! Every point becomes one line:
//!
//! ```text
//! <measurement>,<tag>=<value>[,<tag>=<value>...] value=<float> <timestamp ns>
//! ```
//!
//! Tags are sorted by key and tags with an empty value are skipped.
//!
//! Backslashes are doubled and `\n`, `\r`, `\t` are written as escape
//! sequences, so a name can never end in a bare `\` that would escape the
//! delimiter after it.
use std::fmt::Write as _;

use crate::{
    Point,
    error::{InvalidPointSnafu, Result},
};

pub const TAG_ID_KEY: &str = "tagId";
pub const VALUE_FIELD: &str = "value";

/// Encode a sequence of points, appending one line per point to `buf`.
///
/// Nothing is appended if any point fails to encode.
pub fn encode_points(
    buf: &mut String,
    points: &[Point],
    default_tags: &[(String, String)],
) -> Result<usize> {
    let mut encoded = String::with_capacity(points.len() * 96);
    for point in points {
        encode_point(&mut encoded, point, default_tags)?;
        encoded.push('\n');
    }

    buf.push_str(&encoded);
    Ok(points.len())
}

/// Encode a single point, without a trailing newline.
pub fn encode_point(
    buf: &mut String,
    point: &Point,
    default_tags: &[(String, String)],
) -> Result<()> {
    if point.measurement.is_empty() {
        return InvalidPointSnafu {
            message: "measurement must not be empty",
        }
        .fail();
    }

    if !point.value.is_finite() {
        return InvalidPointSnafu {
            message: format!("value {} of {} is not finite", point.value, point.tag_id),
        }
        .fail();
    }

    let Some(timestamp) = point.timestamp.timestamp_nanos_opt() else {
        return InvalidPointSnafu {
            message: format!("timestamp {} is out of range", point.timestamp),
        }
        .fail();
    };

    let mut tags: Vec<(&str, &str)> = default_tags
        .iter()
        .filter(|(key, _)| key != TAG_ID_KEY)
        .map(|(key, value)| (key.as_str(), value.as_str()))
        .collect();
    tags.push((TAG_ID_KEY, point.tag_id.as_str()));
    tags.sort_by(|a, b| a.0.cmp(b.0));

    escape_into(buf, &point.measurement, &[',', ' ']);
    for (key, value) in tags {
        if value.is_empty() {
            continue;
        }
        buf.push(',');
        escape_into(buf, key, &[',', '=', ' ']);
        buf.push('=');
        escape_into(buf, value, &[',', '=', ' ']);
    }

    // Writing to a String never fails.
    let _ = write!(buf, " {VALUE_FIELD}={} {timestamp}", point.value);

    Ok(())
}

fn escape_into(buf: &mut String, value: &str, special: &[char]) {
    for c in value.chars() {
        match c {
            '\\' => buf.push_str("\\\\"),
            '\n' => buf.push_str("\\n"),
            '\r' => buf.push_str("\\r"),
            '\t' => buf.push_str("\\t"),
            c if special.contains(&c) => {
                buf.push('\\');
                buf.push(c);
            }
            c => buf.push(c),
        }
    }
}
