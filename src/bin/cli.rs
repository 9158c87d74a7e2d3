//! idxmngr CLI
//!
//! Command-line interface for index manager operations:
//! - List and inspect indexes
//! - Create an index
//! - Search an index
//! - Insert records

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use idxmngr::api::dto::{
    BatchInsertRequest, CreateIndexRequest, IndexSummary, SearchIndexRequest,
};
use idxmngr::client::{IndexClient, IndexClientConfig};
use idxmngr::pipeline::{InsertRecord, InsertSummary};
use idxmngr::store::ComparisonOp;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "idxmngr-cli")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Operate an idxmngr index manager over its HTTP API")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// API server URL
    #[arg(long, default_value = "http://localhost:8083", global = true)]
    pub api_url: String,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,

    /// Request timeout in milliseconds
    #[arg(long, default_value = "30000", global = true)]
    pub timeout_ms: u64,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show server health
    Status,

    /// List indexes
    List {
        /// Only indexes on this network
        #[arg(short, long)]
        network: Option<String>,
    },

    /// Show one index with its counters
    Info {
        /// Index id or name
        index: String,
        #[arg(short, long)]
        network: Option<String>,
    },

    /// Create an index
    Create {
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: String,
        /// Field the key is built from
        #[arg(long)]
        key_col: String,
        #[arg(long)]
        network: String,
        /// Backing file (default: <network>/<name>.bf)
        #[arg(long, default_value = "")]
        file_path: String,
        /// Maximum key length, 0 for unlimited
        #[arg(long, default_value = "0")]
        key_size: u32,
        /// Key schema name
        #[arg(long)]
        schema: Option<String>,
    },

    /// Search an index
    Search {
        /// Index id or name
        index: String,
        #[arg(short, long)]
        network: Option<String>,
        /// Operator name or code (Eq, NotEq, Lt, LtEq, Gt, GtEq, Range)
        #[arg(long, default_value = "Eq")]
        op: String,
        #[arg(long)]
        value: Option<String>,
        #[arg(long)]
        begin: Option<String>,
        #[arg(long)]
        end: Option<String>,
        /// Build the key from fields (key=value) instead of --value
        #[arg(long = "field")]
        fields: Vec<String>,
        #[arg(long)]
        schema: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Insert records
    Insert {
        /// Index id or name
        index: String,
        #[arg(short, long)]
        network: Option<String>,
        /// JSON file with a records array or a batch object
        #[arg(long, conflicts_with = "tx")]
        file: Option<PathBuf>,
        /// Transaction id of a single record
        #[arg(long)]
        tx: Option<String>,
        /// Record field in key=value format
        #[arg(long = "field")]
        fields: Vec<String>,
        #[arg(long)]
        block: Option<u64>,
        #[arg(long)]
        schema: Option<String>,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let client = IndexClient::new(IndexClientConfig {
        base_url: cli.api_url.clone(),
        request_timeout_ms: cli.timeout_ms,
    })?;
    let json = cli.format == "json";

    match cli.command {
        Commands::Status => {
            let health = client
                .health()
                .await
                .with_context(|| format!("cannot reach idxmngr at {}", cli.api_url))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&health)?);
            } else {
                println!("idxmngr v{}", health.version);
                println!();
                println!("Status: {}", health.status);
                println!(
                    "Indexes: {} ({} unavailable)",
                    health.indexes, health.unavailable_indexes
                );
                println!("Uptime: {}", format_duration(health.uptime_seconds));
            }
        }

        Commands::List { network } => {
            let indexes = client.list_indexes(network.as_deref()).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&indexes)?);
            } else if indexes.is_empty() {
                println!("No indexes defined yet.");
                println!();
                println!("Create one with:");
                println!("  idxmngr-cli create --id 001 --name speeding --key-col IndexableData --network hardhat --schema speeding");
            } else {
                print_index_table(&indexes);
            }
        }

        Commands::Info { index, network } => {
            let info = client.index_info(&index, network.as_deref()).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                let s = &info.summary;
                println!("{} ({}) on {}", s.index_name, s.index_id, s.network);
                println!("  Key column:  {}", s.indexing_key);
                println!("  Schema:      {}", s.schema.as_deref().unwrap_or("-"));
                println!("  File:        {}", s.file_path);
                println!("  Key size:    {}", s.key_size);
                println!("  Keys:        {}", s.key_count);
                println!("  Entries:     {}", s.entry_count);
                println!("  Searches:    {}", info.call_count);
                println!("  Block:       {}", info.block_num);
                println!("  File size:   {} bytes", info.file_size_bytes);
                if let Some(failure) = &info.failure {
                    println!("  UNAVAILABLE: {}", failure);
                }
            }
        }

        Commands::Create {
            id,
            name,
            key_col,
            network,
            file_path,
            key_size,
            schema,
        } => {
            let request = CreateIndexRequest {
                index_id: id,
                index_name: name,
                key_col,
                file_path,
                key_size,
                network,
                schema,
            };
            let created = client.create_index(&request).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&created)?);
            } else {
                println!(
                    "Created index {} on {} at {} ({} ms)",
                    created.index_id, created.network, created.file_path, created.duration_ms
                );
            }
        }

        Commands::Search {
            index,
            network,
            op,
            value,
            begin,
            end,
            fields,
            schema,
            limit,
        } => {
            let com_op = ComparisonOp::from_name(&op)
                .with_context(|| format!("unknown comparison operator: {}", op))?;
            let fields = if fields.is_empty() {
                None
            } else {
                Some(
                    parse_fields(&fields)?
                        .into_iter()
                        .map(|(k, v)| (k, serde_json::Value::String(v)))
                        .collect(),
                )
            };

            let request = SearchIndexRequest {
                index_id: Some(index),
                index_name: None,
                network,
                field: None,
                value,
                begin,
                end,
                com_op,
                fields,
                schema,
                limit,
            };
            let result = client.search(&request).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                for tx in &result.idx_data {
                    println!("{}", tx);
                }
                eprintln!("{} result(s) in {} ms", result.count, result.duration_ms);
            }
        }

        Commands::Insert {
            index,
            network,
            file,
            tx,
            fields,
            block,
            schema,
        } => {
            let records = match (file, tx) {
                (Some(path), _) => read_records(&path)?,
                (None, Some(tx)) => {
                    let mut record = InsertRecord::new(tx);
                    record.data = parse_fields(&fields)?;
                    record.block_number = block;
                    vec![record]
                }
                (None, None) => bail!("either --file or --tx is required"),
            };

            let request = BatchInsertRequest {
                index_id: Some(index),
                indexing_key: None,
                network,
                schema,
                filter: None,
                records,
            };
            let summary = client.insert_batch(&request).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_summary(&summary);
            }
            if summary.failed > 0 {
                std::process::exit(2);
            }
        }

        Commands::Config { output } => {
            let config = idxmngr::config::generate_default_config();

            match output {
                Some(path) => {
                    // Create parent directory if needed
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&path, &config)?;
                    println!("Config written to {:?}", path);
                }
                None => {
                    print!("{}", config);
                }
            }
        }
    }

    Ok(())
}

/// Parse `key=value` arguments
fn parse_fields(args: &[String]) -> anyhow::Result<HashMap<String, String>> {
    args.iter()
        .map(|arg| match arg.split_once('=') {
            Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_string(), v.to_string())),
            _ => bail!("invalid field '{}', expected key=value", arg),
        })
        .collect()
}

/// Records from a JSON file: a bare array or an object with `records`
fn read_records(path: &Path) -> anyhow::Result<Vec<InsertRecord>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("failed to read {:?}", path))?;
    let value: serde_json::Value =
        serde_json::from_str(&content).with_context(|| format!("invalid JSON in {:?}", path))?;

    let records = match value {
        serde_json::Value::Array(_) => value,
        serde_json::Value::Object(mut map) => match map.remove("records") {
            Some(records) => records,
            None => bail!("{:?} has no \"records\" array", path),
        },
        _ => bail!("{:?} must hold an array of records", path),
    };

    Ok(serde_json::from_value(records)?)
}

fn print_index_table(indexes: &[IndexSummary]) {
    println!(
        "{:<8} {:<20} {:<16} {:<12} {:>10} {:>10}",
        "ID", "Name", "Key column", "Network", "Keys", "Entries"
    );
    println!("{}", "-".repeat(81));

    for idx in indexes {
        let marker = if idx.available { "" } else { " (unavailable)" };
        println!(
            "{:<8} {:<20} {:<16} {:<12} {:>10} {:>10}{}",
            idx.index_id,
            idx.index_name,
            idx.indexing_key,
            idx.network,
            idx.key_count,
            idx.entry_count,
            marker
        );
    }
}

fn print_summary(summary: &InsertSummary) {
    println!("{}", summary);

    let problems: Vec<_> = summary
        .outcomes
        .iter()
        .filter(|o| o.reason.is_some())
        .collect();
    if !problems.is_empty() {
        println!();
        println!("Not inserted (first 10):");
        for outcome in problems.iter().take(10) {
            println!(
                "  {} {:?}: {}",
                outcome.tx_id,
                outcome.status,
                outcome.reason.as_deref().unwrap_or("-")
            );
        }
    }
}

fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else if seconds < 86400 {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    } else {
        format!("{}d {}h", seconds / 86400, (seconds % 86400) / 3600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fields() {
        let fields = parse_fields(&["speeding=85".into(), "obuId=OBU=7".into()]).unwrap();
        assert_eq!(fields["speeding"], "85");
        assert_eq!(fields["obuId"], "OBU=7");

        assert!(parse_fields(&["novalue".into()]).is_err());
        assert!(parse_fields(&["=x".into()]).is_err());
    }

    #[test]
    fn test_read_records_shapes() {
        let dir = tempfile::tempdir().unwrap();

        let array = dir.path().join("array.json");
        std::fs::write(&array, r#"[{"txId":"a","data":{"purpose":"audit"}}]"#).unwrap();
        assert_eq!(read_records(&array).unwrap()[0].tx_id, "a");

        let batch = dir.path().join("batch.json");
        std::fs::write(
            &batch,
            r#"{"indexId":"002","records":[{"txId":"b","data":{"purpose":"audit"},"blockNumber":7}]}"#,
        )
        .unwrap();
        let records = read_records(&batch).unwrap();
        assert_eq!(records[0].block_number, Some(7));

        let scalar = dir.path().join("scalar.json");
        std::fs::write(&scalar, "42").unwrap();
        assert!(read_records(&scalar).is_err());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(5), "5s");
        assert_eq!(format_duration(125), "2m 5s");
        assert_eq!(format_duration(3 * 3600 + 60), "3h 1m");
        assert_eq!(format_duration(90000), "1d 1h");
    }
}
