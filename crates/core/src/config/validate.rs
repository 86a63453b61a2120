use super::{types::Config, ConfigError};

const FFMPEG_LOG_LEVELS: &[&str] = &[
    "quiet", "panic", "fatal", "error", "warning", "info", "verbose", "debug", "trace",
];

/// Validate configuration
/// Currently validates:
/// - Bitrate is allowed (enforced by serde)
/// - Converter timeout is not 0
/// - FFmpeg log level is one ffmpeg accepts
/// - Loudness target and true peak are in ffmpeg's loudnorm ranges
/// - Worker count, if set, is not 0
/// - Output directory is not an existing file
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let converter = &config.converter;

    if converter.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "converter.timeout_secs cannot be 0".to_string(),
        ));
    }

    if !FFMPEG_LOG_LEVELS.contains(&converter.ffmpeg_log_level.as_str()) {
        return Err(ConfigError::ValidationError(format!(
            "converter.ffmpeg_log_level must be one of {}, got {:?}",
            FFMPEG_LOG_LEVELS.join(", "),
            converter.ffmpeg_log_level
        )));
    }

    if !(-70.0..=-5.0).contains(&converter.loudness_target_lufs) {
        return Err(ConfigError::ValidationError(format!(
            "converter.loudness_target_lufs must be between -70 and -5, got {}",
            converter.loudness_target_lufs
        )));
    }

    if !(-9.0..=0.0).contains(&converter.true_peak_db) {
        return Err(ConfigError::ValidationError(format!(
            "converter.true_peak_db must be between -9 and 0, got {}",
            converter.true_peak_db
        )));
    }

    if config.batch.max_workers == Some(0) {
        return Err(ConfigError::ValidationError(
            "batch.max_workers cannot be 0".to_string(),
        ));
    }

    if let Some(ref dir) = config.conversion.output_directory {
        if dir.is_file() {
            return Err(ConfigError::ValidationError(format!(
                "conversion.output_directory is a file: {}",
                dir.display()
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_timeout_zero_fails() {
        let mut config = Config::default();
        config.converter.timeout_secs = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = Config::default();
        config.converter.ffmpeg_log_level = "loud".to_string();
        assert!(validate_config(&config).is_err());

        config.converter.ffmpeg_log_level = "warning".to_string();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_loudness_ranges() {
        let mut config = Config::default();
        config.converter.loudness_target_lufs = 0.0;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.converter.true_peak_db = 2.0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_workers_zero_fails() {
        let mut config = Config::default();
        config.batch.max_workers = Some(0);
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_output_directory_is_file() {
        let file = NamedTempFile::new().unwrap();
        let mut config = Config::default();
        config.conversion.output_directory = Some(file.path().to_path_buf());
        assert!(validate_config(&config).is_err());
    }
}
