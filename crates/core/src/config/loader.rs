use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Prefix of environment variables overriding file settings.
pub const ENV_PREFIX: &str = "VIDTUNE_";

/// Load configuration from file with environment variable overrides
///
/// Nested keys are separated by a double underscore, e.g.
/// `VIDTUNE_CONVERSION__BITRATE=320`.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Defaults plus environment overrides, for runs without a config file
pub fn load_config_from_env() -> Result<Config, ConfigError> {
    Figment::from(figment::providers::Serialized::defaults(Config::default()))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Write configuration as TOML, creating parent directories
pub fn save_config(config: &Config, path: &Path) -> Result<(), ConfigError> {
    let contents =
        toml::to_string_pretty(config).map_err(|e| ConfigError::WriteError(e.to_string()))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError(e.to_string()))?;
    }
    std::fs::write(path, contents).map_err(|e| ConfigError::WriteError(e.to_string()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Theme;
    use crate::task::Bitrate;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_load_config_from_str_valid() {
        let toml = r#"
[conversion]
bitrate = 320
normalize = true
output_directory = "/music"

[converter]
ffmpeg_path = "/opt/ffmpeg/bin/ffmpeg"

[batch]
max_workers = 2

[ui]
theme = "light"
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.conversion.bitrate, Bitrate::Kbps320);
        assert!(config.conversion.normalize);
        assert!(config.conversion.preserve_metadata);
        assert_eq!(config.conversion.output_directory, Some(PathBuf::from("/music")));
        assert_eq!(config.converter.ffmpeg_path, PathBuf::from("/opt/ffmpeg/bin/ffmpeg"));
        assert_eq!(config.converter.ffprobe_path, PathBuf::from("ffprobe"));
        assert_eq!(config.batch.max_workers, Some(2));
        assert_eq!(config.ui.theme, Theme::Light);
    }

    #[test]
    fn test_load_config_from_str_empty_uses_defaults() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_config_from_str_bad_bitrate() {
        let result = load_config_from_str("[conversion]\nbitrate = 64\n");
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
        assert!(err.to_string().contains("64"));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/vidtune.toml"));
        assert!(matches!(result.unwrap_err(), ConfigError::FileNotFound(_)));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[conversion]
bitrate = 128
preserve_metadata = false
"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.conversion.bitrate, Bitrate::Kbps128);
        assert!(!config.conversion.preserve_metadata);
    }

    #[test]
    fn test_env_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("vidtune.toml", "[conversion]\nbitrate = 128\n")?;
            jail.set_env("VIDTUNE_CONVERSION__BITRATE", "256");
            jail.set_env("VIDTUNE_BATCH__MAX_WORKERS", "3");

            let config = load_config(Path::new("vidtune.toml")).unwrap();
            assert_eq!(config.conversion.bitrate, Bitrate::Kbps256);
            assert_eq!(config.batch.max_workers, Some(3));
            Ok(())
        });
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings/vidtune.toml");

        let mut config = Config::default();
        config.conversion.bitrate = Bitrate::Kbps256;
        config.conversion.output_directory = Some(PathBuf::from("/music"));
        config.ui.theme = Theme::Light;

        save_config(&config, &path).unwrap();
        let loaded = load_config_from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded, config);
    }
}
