//! InfluxDB line protocol encoding.
//!
//! ```text
//! measurement,tag=value,tag2=value field="text",count=3i 1705314600000000000
//! ```
//!
//! Tags are written in key order and tags with an empty value are left out,
//! since the protocol cannot express them. Unsigned values above `i64::MAX`
//! are written as floats because 1.x servers reject the `u` suffix by default.

use crate::models::{DataPoint, FieldValue};
use std::fmt::Write as _;

fn escape_into(out: &mut String, text: &str, special: &[char]) {
    for c in text.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            c if special.contains(&c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
}

fn push_measurement(out: &mut String, name: &str) {
    escape_into(out, name, &[',', ' ']);
}

fn push_key(out: &mut String, key: &str) {
    escape_into(out, key, &[',', '=', ' ']);
}

fn push_field_value(out: &mut String, value: &FieldValue) {
    match value {
        FieldValue::Float(v) => {
            let _ = write!(out, "{v}");
        }
        FieldValue::Integer(v) => {
            let _ = write!(out, "{v}i");
        }
        FieldValue::UInteger(v) => {
            // Precision loss is accepted for values this large.
            #[allow(clippy::cast_precision_loss)]
            let as_float = *v as f64;
            let _ = write!(out, "{as_float}");
        }
        FieldValue::Boolean(v) => {
            let _ = write!(out, "{v}");
        }
        FieldValue::String(v) => {
            out.push('"');
            for c in v.chars() {
                if c == '"' || c == '\\' {
                    out.push('\\');
                }
                out.push(c);
            }
            out.push('"');
        }
    }
}

/// Appends one point as a line (without trailing newline).
pub fn write_point(out: &mut String, point: &DataPoint) {
    push_measurement(out, point.name());

    for (key, value) in point.tags() {
        if value.is_empty() {
            continue;
        }
        out.push(',');
        push_key(out, key);
        out.push('=');
        push_key(out, value);
    }

    let mut separator = ' ';
    for (key, value) in point.fields() {
        out.push(separator);
        separator = ',';
        push_key(out, key);
        out.push('=');
        push_field_value(out, value);
    }

    let _ = write!(out, " {}", point.timestamp_nanos());
}

/// Encodes one point.
///
/// # Example
///
/// ```
/// use sink::models::DataPoint;
/// use sink::writer::line_protocol::encode_point;
/// use chrono::{TimeZone, Utc};
///
/// let point = DataPoint::builder("syslog")
///     .tag("host", "web 1")
///     .field("message", "hi")
///     .timestamp(Utc.timestamp_opt(1, 0).unwrap())
///     .build()
///     .unwrap();
///
/// assert_eq!(encode_point(&point), r#"syslog,host=web\ 1 message="hi" 1000000000"#);
/// ```
#[must_use]
pub fn encode_point(point: &DataPoint) -> String {
    let mut out = String::with_capacity(128);
    write_point(&mut out, point);
    out
}

/// Encodes a batch, one point per line.
#[must_use]
pub fn encode_batch(points: &[DataPoint]) -> String {
    let mut out = String::with_capacity(points.len() * 128);
    for (i, point) in points.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        write_point(&mut out, point);
    }
    out
}
