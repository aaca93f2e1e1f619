//! Discord query command

use anyhow::Result;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{
    format_distance, format_optional_timestamp, print_json, print_table, OutputFormat,
};

#[derive(Tabled)]
pub(crate) struct DiscordRow {
    #[tabled(rename = "Rank")]
    pub rank: usize,
    #[tabled(rename = "Index")]
    pub index: usize,
    #[tabled(rename = "Timestamp")]
    pub timestamp: String,
    #[tabled(rename = "Distance")]
    pub distance: String,
}

/// Show the top-k discords of an entity
pub async fn show_discords(
    client: &ApiClient,
    entity: &str,
    k: usize,
    format: OutputFormat,
) -> Result<()> {
    let result = client.discords(entity, k).await?;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => {
            let rows: Vec<DiscordRow> = result
                .discords
                .iter()
                .enumerate()
                .map(|(rank, d)| DiscordRow {
                    rank: rank + 1,
                    index: d.index,
                    timestamp: format_optional_timestamp(d.timestamp),
                    distance: format_distance(d.distance),
                })
                .collect();
            print_table(rows, "No discords found");
        }
    }

    Ok(())
}
