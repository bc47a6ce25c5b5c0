use crate::models::{Checkpoint, GasUtilizationSample, LiveSample, PollTarget};
use crate::repository::{GasStats, TransferBucketTotal};
use comfy_table::{Cell, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use csv::Writer;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "csv" => OutputFormat::Csv,
            _ => OutputFormat::Table,
        }
    }
}

/// Renders `items` as a table, pretty JSON array or CSV with a header row.
fn render<T: Serialize>(
    items: &[T],
    format: &OutputFormat,
    empty_message: &str,
    headers: &[&str],
    row: impl Fn(&T) -> Vec<Cell>,
) -> String {
    match format {
        OutputFormat::Table => {
            if items.is_empty() {
                return empty_message.to_string();
            }

            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_header(headers.to_vec());
            for item in items {
                table.add_row(row(item));
            }
            table.to_string()
        }
        OutputFormat::Json => {
            serde_json::to_string_pretty(items).unwrap_or_else(|_| "[]".to_string())
        }
        OutputFormat::Csv => {
            let mut wtr = Writer::from_writer(vec![]);
            for item in items {
                let _ = wtr.serialize(item);
            }
            String::from_utf8(wtr.into_inner().unwrap_or_default()).unwrap_or_default()
        }
    }
}

fn or_na<T: ToString>(value: Option<T>) -> String {
    value.map_or("N/A".to_string(), |v| v.to_string())
}

pub fn format_targets(targets: &[PollTarget], format: &OutputFormat) -> String {
    render(
        targets,
        format,
        "No targets registered.",
        &["ID", "Name", "RPC Endpoint"],
        |t| {
            vec![
                Cell::new(&t.id),
                Cell::new(&t.display_name),
                Cell::new(&t.rpc_endpoint),
            ]
        },
    )
}

pub fn format_checkpoints(checkpoints: &[Checkpoint], format: &OutputFormat) -> String {
    render(
        checkpoints,
        format,
        "No checkpoints recorded.",
        &["Target", "Last Processed Block", "Updated At"],
        |c| {
            vec![
                Cell::new(&c.target_id),
                Cell::new(c.last_processed_block),
                Cell::new(c.updated_at),
            ]
        },
    )
}

pub fn format_live_samples(samples: &[LiveSample], format: &OutputFormat) -> String {
    render(
        samples,
        format,
        "No live samples found.",
        &["Block", "Timestamp", "Block Time (s)", "Txs", "TPS", "Gas Used", "Utilization"],
        |s| {
            vec![
                Cell::new(s.block_number),
                Cell::new(s.block_timestamp),
                Cell::new(s.block_time_seconds),
                Cell::new(s.tx_count),
                Cell::new(format!("{:.2}", s.tps)),
                Cell::new(s.gas_used),
                Cell::new(format!("{:.2}%", s.utilization_percent)),
            ]
        },
    )
}

pub fn format_gas_samples(samples: &[GasUtilizationSample], format: &OutputFormat) -> String {
    render(
        samples,
        format,
        "No gas utilization samples found.",
        &["Block", "Timestamp", "Gas Used", "Gas Limit", "Utilization"],
        |s| {
            vec![
                Cell::new(s.block_number),
                Cell::new(s.block_timestamp),
                Cell::new(s.gas_used),
                Cell::new(s.gas_limit),
                Cell::new(format!("{:.2}%", s.utilization_percent)),
            ]
        },
    )
}

pub fn format_transfer_buckets(totals: &[TransferBucketTotal], format: &OutputFormat) -> String {
    render(
        totals,
        format,
        "No transfer buckets found.",
        &["Minute", "Kind", "Transfers"],
        |b| {
            vec![
                Cell::new(b.bucket_start_minute),
                Cell::new(b.kind),
                Cell::new(b.count),
            ]
        },
    )
}

pub fn format_gas_stats(stats: &GasStats, format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_header(vec!["Metric", "Value"]);

            table.add_row(vec![Cell::new("Samples"), Cell::new(stats.samples)]);
            table.add_row(vec![
                Cell::new("Average Utilization"),
                Cell::new(or_na(stats.average_utilization.map(|u| format!("{u:.2}%")))),
            ]);
            table.add_row(vec![
                Cell::new("Peak Utilization"),
                Cell::new(or_na(stats.peak_utilization.map(|u| format!("{u:.2}%")))),
            ]);
            table.add_row(vec![
                Cell::new("Earliest Block"),
                Cell::new(or_na(stats.earliest_block)),
            ]);
            table.add_row(vec![
                Cell::new("Latest Block"),
                Cell::new(or_na(stats.latest_block)),
            ]);

            table.to_string()
        }
        OutputFormat::Json => {
            serde_json::to_string_pretty(stats).unwrap_or_else(|_| "{}".to_string())
        }
        OutputFormat::Csv => {
            let mut wtr = Writer::from_writer(vec![]);
            let _ = wtr.write_record(["metric", "value"]);
            let _ = wtr.write_record(["samples", &stats.samples.to_string()]);
            let _ = wtr.write_record(["average_utilization", &or_na(stats.average_utilization)]);
            let _ = wtr.write_record(["peak_utilization", &or_na(stats.peak_utilization)]);
            let _ = wtr.write_record(["earliest_block", &or_na(stats.earliest_block)]);
            let _ = wtr.write_record(["latest_block", &or_na(stats.latest_block)]);
            String::from_utf8(wtr.into_inner().unwrap_or_default()).unwrap_or_default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TransferKind;

    fn totals() -> Vec<TransferBucketTotal> {
        vec![TransferBucketTotal {
            target_id: "t1".to_string(),
            bucket_start_minute: 1_700_000_040,
            kind: TransferKind::Erc721,
            count: 4,
        }]
    }

    #[test]
    fn parses_output_format() {
        assert_eq!(OutputFormat::from("JSON"), OutputFormat::Json);
        assert_eq!(OutputFormat::from("csv"), OutputFormat::Csv);
        assert_eq!(OutputFormat::from("anything"), OutputFormat::Table);
    }

    #[test]
    fn csv_has_header_and_rows() {
        let csv = format_transfer_buckets(&totals(), &OutputFormat::Csv);
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("target_id,bucket_start_minute,kind,count"));
        assert_eq!(lines.next(), Some("t1,1700000040,erc721,4"));
    }

    #[test]
    fn json_is_an_array_of_records() {
        let json = format_transfer_buckets(&totals(), &OutputFormat::Json);
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed[0]["kind"], "erc721");
        assert_eq!(parsed[0]["count"], 4);
    }

    #[test]
    fn empty_table_prints_message() {
        assert_eq!(
            format_targets(&[], &OutputFormat::Table),
            "No targets registered."
        );
    }
}
