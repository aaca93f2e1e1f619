//! CLI subcommands

pub mod analyze;
pub mod discords;
pub mod entities;
pub mod push;

use anyhow::{Context, Result};
use std::path::Path;

use crate::client::SampleRow;

/// Read a JSON array of `{timestamp, values}` rows
pub fn load_rows(path: &Path) -> Result<Vec<SampleRow>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let rows: Vec<SampleRow> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse rows from {}", path.display()))?;
    if rows.is_empty() {
        anyhow::bail!("{} contains no rows", path.display());
    }
    Ok(rows)
}
