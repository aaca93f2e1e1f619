//! Entity listing and status commands

use anyhow::Result;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{
    format_distance, format_optional_timestamp, print_info, print_json, print_table, OutputFormat,
};

#[derive(Tabled)]
struct EntityRow {
    #[tabled(rename = "Entity")]
    entity: String,
}

#[derive(Tabled)]
struct FieldRow {
    #[tabled(rename = "Field")]
    field: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

/// List monitored entities
pub async fn list_entities(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let result = client.entities().await?;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => {
            let total = result.entities.len();
            let rows: Vec<EntityRow> = result
                .entities
                .into_iter()
                .map(|entity| EntityRow { entity })
                .collect();
            print_table(rows, "No entities monitored");
            if total > 0 {
                println!("\nTotal: {} entities", total);
            }
        }
    }

    Ok(())
}

/// Show the state of one entity
pub async fn show_status(client: &ApiClient, entity: &str, format: OutputFormat) -> Result<()> {
    let snapshot = client.status(entity).await?;

    match format {
        OutputFormat::Json => print_json(&snapshot)?,
        OutputFormat::Table => {
            let rows = vec![
                FieldRow {
                    field: "Channels",
                    value: snapshot.channels.join(", "),
                },
                FieldRow {
                    field: "Samples",
                    value: snapshot.samples.to_string(),
                },
                FieldRow {
                    field: "Window",
                    value: snapshot.window_size.to_string(),
                },
                FieldRow {
                    field: "Profile length",
                    value: snapshot
                        .profile_len
                        .map_or_else(|| "warming up".to_string(), |l| l.to_string()),
                },
                FieldRow {
                    field: "Last distance",
                    value: snapshot
                        .last_joint_distance
                        .map_or_else(|| "-".to_string(), format_distance),
                },
                FieldRow {
                    field: "Last sample",
                    value: format_optional_timestamp(snapshot.last_timestamp),
                },
                FieldRow {
                    field: "Last anomaly check",
                    value: format_optional_timestamp(snapshot.last_anomaly_check),
                },
                FieldRow {
                    field: "Last prediction check",
                    value: format_optional_timestamp(snapshot.last_prediction_check),
                },
            ];
            print_info(&format!("Entity {}", snapshot.entity_id));
            print_table(rows, "No state");
        }
    }

    Ok(())
}
