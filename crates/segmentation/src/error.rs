use campaign_core::CampaignError;
use serde_json::Value;
use thiserror::Error;

pub type SegmentationResult<T> = Result<T, SegmentationError>;

/// Failures raised while building parsers or parsing a segment document.
///
/// Evaluation never fails: a parsed segment always yields a boolean.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SegmentationError {
    #[error("Bad input: {0}")]
    BadInput(String),

    #[error("Unknown criterion \"{key}\" with value {value}")]
    UnknownCriterion { key: String, value: Value },

    #[error("Unknown value \"{key}\" with value {value}")]
    UnknownValue { key: String, value: Value },

    #[error("A criterion parser already exists for key \"{0}\"")]
    CriterionParserAlreadyExists(String),

    #[error("A value parser already exists for key \"{0}\"")]
    ValueParserAlreadyExists(String),
}

impl SegmentationError {
    pub fn bad_input(message: impl Into<String>) -> Self {
        SegmentationError::BadInput(message.into())
    }

    pub fn is_bad_input(&self) -> bool {
        matches!(self, SegmentationError::BadInput(_))
    }

    pub fn is_unknown_criterion(&self) -> bool {
        matches!(self, SegmentationError::UnknownCriterion { .. })
    }

    pub fn is_unknown_value(&self) -> bool {
        matches!(self, SegmentationError::UnknownValue { .. })
    }
}

impl From<SegmentationError> for CampaignError {
    fn from(err: SegmentationError) -> Self {
        CampaignError::Segmentation(err.to_string())
    }
}
