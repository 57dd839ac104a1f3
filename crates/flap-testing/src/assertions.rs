//! Custom assertions over decoded NDJSON output.

use anyhow::{Context, Result};
use serde_json::Value;
use std::path::Path;

/// Read an NDJSON file; lines that are not JSON come back as strings.
pub fn read_ndjson(path: &Path) -> Result<Vec<Value>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(content
        .lines()
        .map(|line| serde_json::from_str(line).unwrap_or_else(|_| Value::String(line.to_string())))
        .collect())
}

/// Assert the number of records (decoded or passed through) in an NDJSON file.
pub fn assert_record_count(path: &Path, expected: usize) -> Result<()> {
    let records = read_ndjson(path)?;
    if records.len() != expected {
        anyhow::bail!(
            "Expected {} records in {}, got {}",
            expected,
            path.display(),
            records.len()
        );
    }
    Ok(())
}

/// Assert that a decoded record carries `details.<key> == value`.
pub fn assert_detail(record: &Value, key: &str, value: &str) -> Result<()> {
    let actual = record["details"][key]
        .as_str()
        .with_context(|| format!("Record has no details.{}: {}", key, record))?;
    if actual != value {
        anyhow::bail!("Expected details.{} = {}, got {}", key, value, actual);
    }
    Ok(())
}
