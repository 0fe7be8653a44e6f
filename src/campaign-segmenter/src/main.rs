//! Campaign Segmenter: parse segment documents and evaluate them against
//! installation data from the command line.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use campaign_core::config::ParserSettings;
use campaign_core::{CampaignError, CampaignResult, Clock, FixedClock, SegmenterConfig, SystemClock};
use campaign_segmentation::{Data, DataSource, SegmentCatalog, SegmentationDslParser, Segmenter};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "campaign-segmenter")]
#[command(about = "Parse and evaluate audience segments")]
#[command(version)]
struct Cli {
    /// Reject unknown criteria and values instead of keeping them as never-matching nodes
    #[arg(long, global = true, default_value_t = false)]
    strict: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that a segment document parses
    Parse {
        /// Segment document (JSON file, `-` for stdin)
        #[arg(long)]
        segment: PathBuf,
    },
    /// Evaluate a segment against installation data
    Match {
        /// Segment document (JSON file, `-` for stdin)
        #[arg(long)]
        segment: PathBuf,

        /// Installation data: {"installation", "user", "events", "presenceInfo", "lastAppOpenDate"}
        #[arg(long)]
        data: PathBuf,

        /// Evaluate as of this instant (ms since epoch) instead of the system clock
        #[arg(long, env = "CAMPAIGN_SEGMENTER__NOW")]
        now: Option<i64>,
    },
    /// Register every segment of a {"name": document} file and list those the data belongs to
    Catalog {
        #[arg(long)]
        segments: PathBuf,

        #[arg(long)]
        data: PathBuf,

        #[arg(long, env = "CAMPAIGN_SEGMENTER__NOW")]
        now: Option<i64>,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ParseReport {
    valid: bool,
    criterion: &'static str,
    data_source: String,
}

#[derive(Serialize)]
struct MatchReport {
    matches: bool,
}

#[derive(Serialize)]
struct CatalogReport {
    registered: usize,
    matching: Vec<String>,
}

/// Reads a JSON document from `path`, or from stdin when `path` is `-`.
fn read_document(path: &Path) -> CampaignResult<Value> {
    let raw = if path == Path::new("-") {
        let mut buffer = String::new();
        std::io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        std::fs::read_to_string(path)?
    };
    Ok(serde_json::from_str(&raw)?)
}

fn read_json(path: &Path) -> anyhow::Result<Value> {
    read_document(path).with_context(|| format!("reading {}", path.display()))
}

fn clock(config: &SegmenterConfig, now: Option<i64>) -> Arc<dyn Clock> {
    match now {
        Some(now) => Arc::new(FixedClock(now)),
        None => Arc::new(SystemClock::with_offset(config.clock_offset_ms)),
    }
}

fn print<T: Serialize>(report: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (config, config_error) = match SegmenterConfig::load() {
        Ok(config) => (config, None),
        Err(e) => (SegmenterConfig::default(), Some(e)),
    };

    // Logs go to stderr; stdout carries the reports.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter.as_str().into()),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    if let Some(e) = config_error {
        warn!(error = %e, "Failed to load config, using defaults");
    }

    let settings = if cli.strict {
        ParserSettings::strict()
    } else {
        config.parser.clone()
    };
    info!(
        accept_unknown_criteria = settings.accept_unknown_criteria,
        accept_unknown_values = settings.accept_unknown_values,
        "Configuration loaded"
    );
    let parser = SegmentationDslParser::from_settings(&settings)?;

    match cli.command {
        Command::Parse { segment } => {
            let document = read_json(&segment)?;
            let criterion = parser
                .parse(&document, DataSource::Installation)
                .map_err(CampaignError::from)?;
            print(&ParseReport {
                valid: true,
                criterion: criterion.label(),
                data_source: criterion.context.data_source().name(),
            })
        }
        Command::Match { segment, data, now } => {
            let document = read_json(&segment)?;
            let data: Data = serde_json::from_value(read_json(&data)?).context("decoding installation data")?;
            let criterion = parser
                .parse(&document, DataSource::Installation)
                .map_err(CampaignError::from)?;
            let matches = Segmenter::with_clock(data, clock(&config, now)).matches_installation(&criterion);
            info!(matches, "Segment evaluated");
            print(&MatchReport { matches })
        }
        Command::Catalog { segments, data, now } => {
            let documents = read_json(&segments)?;
            let documents = documents
                .as_object()
                .context("the segments file must map segment names to documents")?;
            let data: Data = serde_json::from_value(read_json(&data)?).context("decoding installation data")?;

            let catalog = SegmentCatalog::with_clock(parser, clock(&config, now));
            for (name, document) in documents {
                catalog
                    .register(name.as_str(), document.clone())
                    .with_context(|| format!("parsing segment \"{name}\""))?;
            }
            let matching = catalog
                .matching_segments(&data)
                .iter()
                .filter_map(|id| catalog.get(id))
                .map(|segment| segment.name)
                .collect();
            print(&CatalogReport {
                registered: catalog.len(),
                matching,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_document_errors() {
        let missing = read_document(Path::new("/nonexistent/segment.json")).unwrap_err();
        assert!(matches!(missing, CampaignError::Io(_)));

        let path = std::env::temp_dir().join(format!("campaign-segmenter-{}.json", std::process::id()));
        std::fs::write(&path, "{\".lang\": ").unwrap();
        let invalid = read_document(&path).unwrap_err();
        assert!(matches!(invalid, CampaignError::Serialization(_)));

        std::fs::write(&path, "{\".lang\": {\"eq\": \"fr\"}}").unwrap();
        assert_eq!(read_document(&path).unwrap(), serde_json::json!({".lang": {"eq": "fr"}}));
        std::fs::remove_file(&path).unwrap();
    }
}
