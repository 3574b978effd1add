use std::fmt::Write as _;
use thiserror::Error;

use super::{MetricSet, MetricValue};

#[derive(Debug, Error, PartialEq)]
pub enum EncodeError {
    #[error("invalid metric name {0:?}")]
    InvalidName(String),

    #[error("metric {0} has a non-finite value")]
    NonFinite(String),
}

/// Renders `name value\n` per metric, in insertion order.
pub fn encode(metrics: &MetricSet) -> Result<String, EncodeError> {
    let mut body = String::with_capacity(metrics.len() * 32);
    for (name, value) in metrics.iter() {
        if !is_identifier(name) {
            return Err(EncodeError::InvalidName(name.to_owned()));
        }
        let rendered = render(value).ok_or_else(|| EncodeError::NonFinite(name.to_owned()))?;
        // Writing into a String cannot fail.
        let _ = writeln!(body, "{name} {rendered}");
    }
    Ok(body)
}

fn render(value: &MetricValue) -> Option<String> {
    match *value {
        MetricValue::Int(v) => Some(v.to_string()),
        MetricValue::UInt(v) => Some(v.to_string()),
        MetricValue::Float(v) if v.is_finite() => {
            let fixed = format!("{v:.2}");
            let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
            Some(match trimmed {
                "" | "-" | "-0" => "0".to_owned(),
                other => other.to_owned(),
            })
        }
        MetricValue::Float(_) => None,
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
