use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

use crate::types::UsageRecord;

/// `{"usage": [...]}` as sent by callers that bundle other fields alongside.
#[derive(Deserialize)]
struct UsageEnvelope {
    usage: Vec<UsageRecord>,
}

/// Read usage records from `path`, or stdin when `None` or `-`.
pub fn read_usage(path: Option<&Path>) -> Result<Vec<UsageRecord>> {
    let records = match path {
        Some(p) if p != Path::new("-") => {
            let file =
                File::open(p).with_context(|| format!("Failed to open {}", p.display()))?;
            parse_usage_reader(BufReader::new(file))
                .with_context(|| format!("Failed to read usage from {}", p.display()))?
        }
        _ => parse_usage_reader(io::stdin().lock()).context("Failed to read usage from stdin")?,
    };
    debug!(records = records.len(), "read usage records");
    Ok(records)
}

fn parse_usage_reader<R: BufRead>(mut reader: R) -> Result<Vec<UsageRecord>> {
    let mut data = String::new();
    reader.read_to_string(&mut data)?;
    parse_usage(&data)
}

/// Accepts a JSON array of records, a `{"usage": [...]}` object, or JSON
/// lines with one record per line.
pub fn parse_usage(data: &str) -> Result<Vec<UsageRecord>> {
    let trimmed = data.trim_start();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).context("Invalid usage array");
    }
    if trimmed.starts_with('{') {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
            if value.get("usage").is_some() {
                let envelope: UsageEnvelope =
                    serde_json::from_value(value).context("Invalid usage envelope")?;
                return Ok(envelope.usage);
            }
        }
    }
    parse_usage_lines(data.as_bytes())
}

fn parse_usage_lines<R: BufRead>(reader: R) -> Result<Vec<UsageRecord>> {
    let mut records = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line)
            .with_context(|| format!("Invalid usage record on line {}", i + 1))?;
        records.push(record);
    }
    Ok(records)
}
