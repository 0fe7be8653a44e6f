use serde::Deserialize;

use crate::error::CampaignResult;

/// Root segmenter configuration. Loaded from environment variables
/// with the prefix `CAMPAIGN_SEGMENTER__`.
#[derive(Debug, Clone, Deserialize)]
pub struct SegmenterConfig {
    #[serde(default)]
    pub parser: ParserSettings,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    /// Offset applied to the system clock, as computed by the (external)
    /// time synchronization layer.
    #[serde(default)]
    pub clock_offset_ms: i64,
}

/// Leniency switches of the segmentation DSL parser.
///
/// When a switch is on, the parser turns what would have been an unknown
/// criterion (resp. value) error into an unknown AST node that never matches.
#[derive(Debug, Clone, Deserialize)]
pub struct ParserSettings {
    #[serde(default = "default_accept_unknown")]
    pub accept_unknown_criteria: bool,
    #[serde(default = "default_accept_unknown")]
    pub accept_unknown_values: bool,
}

// Default functions
fn default_log_filter() -> String {
    "campaign_segmenter=info,campaign_segmentation=info".to_string()
}
fn default_accept_unknown() -> bool {
    true
}

impl Default for ParserSettings {
    fn default() -> Self {
        Self {
            accept_unknown_criteria: default_accept_unknown(),
            accept_unknown_values: default_accept_unknown(),
        }
    }
}

impl ParserSettings {
    /// Settings that reject anything the registered parsers do not know.
    pub fn strict() -> Self {
        Self {
            accept_unknown_criteria: false,
            accept_unknown_values: false,
        }
    }
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            parser: ParserSettings::default(),
            log_filter: default_log_filter(),
            clock_offset_ms: 0,
        }
    }
}

impl SegmenterConfig {
    /// Load configuration from environment variables.
    pub fn load() -> CampaignResult<Self> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("CAMPAIGN_SEGMENTER")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }
}
