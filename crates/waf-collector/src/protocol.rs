//! Line protocol encoder for the sender input file
//!
//! One point per line: `<host> <key> <clock> <value>\n`. Fields that the
//! sender would otherwise split on are wrapped in double quotes; inside
//! quotes a backslash is escaped before any double quote, otherwise the
//! backslash added for a quote would itself get doubled.

use crate::models::{MetricPoint, MetricValue};
use std::borrow::Cow;
use std::io::{self, Write};

/// Encode `points` into a buffer the sink consumes verbatim
pub fn encode(points: &[MetricPoint]) -> Vec<u8> {
    let mut buf = String::with_capacity(points.len() * 64);
    for point in points {
        push_line(&mut buf, point);
    }
    buf.into_bytes()
}

/// Stream `points` to `out`, one line each
pub fn write_points<W: Write>(out: &mut W, points: &[MetricPoint]) -> io::Result<()> {
    let mut line = String::with_capacity(128);
    for point in points {
        line.clear();
        push_line(&mut line, point);
        out.write_all(line.as_bytes())?;
    }
    Ok(())
}

fn push_line(buf: &mut String, point: &MetricPoint) {
    buf.push_str(&encode_text(&point.host));
    buf.push(' ');
    buf.push_str(&encode_key(&point.key));
    buf.push(' ');
    buf.push_str(&point.clock.to_string());
    buf.push(' ');
    buf.push_str(&encode_value(&point.value));
    buf.push('\n');
}

/// Keys are quoted when they carry a space or an item parameter list
pub fn encode_key(key: &str) -> Cow<'_, str> {
    if key.is_empty() || key.contains(' ') || key.contains('[') {
        Cow::Owned(quote(key))
    } else {
        Cow::Borrowed(key)
    }
}

pub fn encode_value(value: &MetricValue) -> Cow<'_, str> {
    match value {
        MetricValue::Text(text) => encode_text(text),
        other => Cow::Owned(other.to_string()),
    }
}

/// Free-form strings are quoted when they contain a space, a double
/// quote or a newline
pub fn encode_text(text: &str) -> Cow<'_, str> {
    if text.is_empty() || text.contains([' ', '"', '\n']) {
        Cow::Owned(quote(text))
    } else {
        Cow::Borrowed(text)
    }
}

fn quote(raw: &str) -> String {
    let escaped = raw.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", escaped)
}
