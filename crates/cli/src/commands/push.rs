//! Push rows from a file to the agent

use anyhow::{Context, Result};
use std::path::Path;
use tabled::Tabled;

use crate::client::{ApiClient, IngestResponse};
use crate::commands::load_rows;
use crate::output::{
    color_severity, color_status, print_json, print_success, print_table, OutputFormat,
};

#[derive(Tabled)]
struct AlertRow {
    #[tabled(rename = "Alert")]
    name: String,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Summary")]
    summary: String,
}

/// Push every row of `file` to `entity`, in order
pub async fn push_rows(
    client: &ApiClient,
    entity: &str,
    file: &Path,
    format: OutputFormat,
) -> Result<()> {
    let rows = load_rows(file)?;

    let mut responses: Vec<IngestResponse> = Vec::with_capacity(rows.len());
    for row in &rows {
        let response = client
            .push(entity, row)
            .await
            .with_context(|| format!("Row at timestamp {} rejected", row.timestamp))?;
        responses.push(response);
    }

    match format {
        OutputFormat::Json => print_json(&responses)?,
        OutputFormat::Table => {
            let alerts: Vec<AlertRow> = responses
                .iter()
                .flat_map(|r| r.alerts.alerts.iter())
                .map(|a| AlertRow {
                    name: a.labels.get("alertname").cloned().unwrap_or_default(),
                    severity: color_severity(
                        a.labels.get("severity").map(String::as_str).unwrap_or(""),
                    ),
                    summary: a.annotations.get("summary").cloned().unwrap_or_default(),
                })
                .collect();

            print_success(&format!("Pushed {} rows to {}", rows.len(), entity));
            if let Some(last) = responses.last() {
                println!("Anomaly check:    {}", color_status(&last.anomaly_status));
                println!("Prediction check: {}", color_status(&last.prediction_status));
            }
            print_table(alerts, "No alerts raised");
        }
    }

    Ok(())
}
