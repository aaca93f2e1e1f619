//! Offline matrix-profile analysis of a rows file

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

use sentinel_lib::anomaly::{compute_profile, joint, AnomalyScorer, MatrixProfile};

use crate::client::SampleRow;
use crate::commands::discords::DiscordRow;
use crate::commands::load_rows;
use crate::output::{
    format_distance, format_timestamp, print_info, print_json, print_table, print_warning,
    OutputFormat,
};

/// Detection parameters for an offline run
#[derive(Debug, Clone, Copy)]
pub struct AnalyzeOptions {
    pub window: usize,
    pub k: usize,
    pub trailing_window: usize,
    pub threshold_k: f64,
}

#[derive(Debug, Serialize)]
pub struct AnalysisReport {
    pub samples: usize,
    pub channels: Vec<String>,
    pub window: usize,
    pub profile_len: usize,
    pub discords: Vec<AnalyzedDiscord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_point: Option<LastPoint>,
}

#[derive(Debug, Serialize)]
pub struct AnalyzedDiscord {
    pub index: usize,
    pub timestamp: i64,
    pub distance: f64,
    /// Channel that supplied the joint distance
    pub channel: String,
}

/// Anomaly gate applied to the newest profile entry
#[derive(Debug, Serialize)]
pub struct LastPoint {
    pub score: f64,
    pub threshold: f64,
    pub anomalous: bool,
}

/// Split rows into one series per channel, rejecting inconsistent input
fn channel_series(rows: &[SampleRow]) -> Result<(Vec<String>, Vec<Vec<f64>>)> {
    let first = rows.first().context("No rows to analyze")?;
    let channels: Vec<String> = first.values.keys().cloned().collect();
    if channels.is_empty() {
        anyhow::bail!("Row at timestamp {} carries no channel values", first.timestamp);
    }

    let mut series = vec![Vec::with_capacity(rows.len()); channels.len()];
    let mut previous: Option<i64> = None;
    for row in rows {
        if previous.is_some_and(|p| row.timestamp <= p) {
            anyhow::bail!("Timestamps must be strictly increasing at {}", row.timestamp);
        }
        previous = Some(row.timestamp);

        if row.values.len() != channels.len() {
            anyhow::bail!(
                "Row at timestamp {} has channels [{}], expected [{}]",
                row.timestamp,
                row.values.keys().cloned().collect::<Vec<_>>().join(", "),
                channels.join(", ")
            );
        }
        for (name, values) in channels.iter().zip(series.iter_mut()) {
            let value = *row.values.get(name).with_context(|| {
                format!("Row at timestamp {} is missing channel '{}'", row.timestamp, name)
            })?;
            if !value.is_finite() || value < 0.0 {
                anyhow::bail!(
                    "Malformed value {} for channel '{}' at {}",
                    value,
                    name,
                    row.timestamp
                );
            }
            values.push(value);
        }
    }

    Ok((channels, series))
}

/// Compute the joint profile of `rows` and extract discords
pub fn analyze_rows(rows: &[SampleRow], options: AnalyzeOptions) -> Result<AnalysisReport> {
    let scorer = AnomalyScorer::new(options.trailing_window, options.threshold_k)?;
    let (channels, series) = channel_series(rows)?;

    let profiles = channels
        .iter()
        .zip(&series)
        .map(|(name, values)| {
            compute_profile(values, options.window)
                .with_context(|| format!("Failed to profile channel '{}'", name))
        })
        .collect::<Result<Vec<MatrixProfile>>>()?;
    let refs: Vec<&MatrixProfile> = profiles.iter().collect();
    let joint = joint(&refs)?;

    let discords = joint
        .top_discords(options.k)?
        .into_iter()
        .map(|d| AnalyzedDiscord {
            index: d.index,
            timestamp: rows[d.index].timestamp,
            distance: d.distance,
            channel: channels[joint.sources()[d.index]].clone(),
        })
        .collect();

    let last_point = scorer.evaluate(joint.distances()).map(|outcome| LastPoint {
        score: outcome.score,
        threshold: outcome.threshold,
        anomalous: outcome.is_anomalous(),
    });

    Ok(AnalysisReport {
        samples: rows.len(),
        channels,
        window: options.window,
        profile_len: joint.len(),
        discords,
        last_point,
    })
}

#[derive(tabled::Tabled)]
struct ChannelDiscordRow {
    #[tabled(inline)]
    discord: DiscordRow,
    #[tabled(rename = "Channel")]
    channel: String,
}

/// Analyze a rows file without contacting the agent
pub fn analyze_file(file: &Path, options: AnalyzeOptions, format: OutputFormat) -> Result<()> {
    let rows = load_rows(file)?;
    let report = analyze_rows(&rows, options)?;

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => {
            print_info(&format!(
                "{} samples, channels [{}], window {}, profile length {}",
                report.samples,
                report.channels.join(", "),
                report.window,
                report.profile_len
            ));

            let rows: Vec<ChannelDiscordRow> = report
                .discords
                .iter()
                .enumerate()
                .map(|(rank, d)| ChannelDiscordRow {
                    discord: DiscordRow {
                        rank: rank + 1,
                        index: d.index,
                        timestamp: format_timestamp(d.timestamp),
                        distance: format_distance(d.distance),
                    },
                    channel: d.channel.clone(),
                })
                .collect();
            print_table(rows, "No discords found");

            match &report.last_point {
                Some(point) if point.anomalous => print_warning(&format!(
                    "Newest subsequence is anomalous: distance {} above threshold {}",
                    format_distance(point.score),
                    format_distance(point.threshold)
                )),
                Some(point) => print_info(&format!(
                    "Newest subsequence is normal: distance {} within threshold {}",
                    format_distance(point.score),
                    format_distance(point.threshold)
                )),
                None => print_info("Not enough profile entries to score the newest subsequence"),
            }
        }
    }

    Ok(())
}
