use thiserror::Error;

pub type CampaignResult<T> = Result<T, CampaignError>;

#[derive(Error, Debug)]
pub enum CampaignError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Segmentation error: {0}")]
    Segmentation(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for CampaignError {
    fn from(err: config::ConfigError) -> Self {
        CampaignError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(raw: &str) -> CampaignResult<serde_json::Value> {
        Ok(serde_json::from_str(raw)?)
    }

    #[test]
    fn test_serialization_errors_convert() {
        let err = decode("{not json").unwrap_err();
        assert!(matches!(err, CampaignError::Serialization(_)));
        assert!(err.to_string().starts_with("Serialization error"));
        assert!(decode("{}").is_ok());
    }

    #[test]
    fn test_io_errors_convert() {
        let read = || -> CampaignResult<String> { Ok(std::fs::read_to_string("/nonexistent/segment.json")?) };
        assert!(matches!(read().unwrap_err(), CampaignError::Io(_)));
    }

    #[test]
    fn test_config_errors_convert() {
        let err: CampaignError = config::ConfigError::Message("bad value".to_string()).into();
        assert_eq!(err.to_string(), "Configuration error: bad value");
    }
}
