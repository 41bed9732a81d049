use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("No output device available")]
    DeviceUnavailable,

    #[error("Could not query output device: {0}")]
    DeviceConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("Unsupported sample format: {0}")]
    UnsupportedSampleFormat(String),

    #[error("Failed to build output stream: {0}")]
    StreamBuild(#[from] cpal::BuildStreamError),

    #[error("Failed to start output stream: {0}")]
    StreamPlay(#[from] cpal::PlayStreamError),

    #[error("Invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

impl EngineError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        EngineError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

/// Rejects NaN/inf and values outside `[min, max]`.
pub(crate) fn check_range(name: &'static str, value: f32, min: f32, max: f32) -> Result<f32> {
    if !value.is_finite() {
        return Err(EngineError::invalid(name, format!("{} is not finite", value)));
    }
    if value < min || value > max {
        return Err(EngineError::invalid(
            name,
            format!("{} is outside [{}, {}]", value, min, max),
        ));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_range() {
        assert_eq!(check_range("volume", 0.5, 0.0, 1.0).unwrap(), 0.5);
        assert!(check_range("volume", 1.5, 0.0, 1.0).is_err());
        assert!(check_range("volume", f32::NAN, 0.0, 1.0).is_err());

        let err = check_range("volume", -0.1, 0.0, 1.0).unwrap_err();
        let message = err.to_string();
        println!("Rejected: {}", message);
        assert!(message.contains("volume"));
    }
}
