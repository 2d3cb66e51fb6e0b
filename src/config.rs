use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{InsightsError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub word_cloud: WordCloudConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    #[serde(default = "default_label")]
    pub label: String,
    #[serde(default = "default_word_cloud_messages")]
    pub word_cloud_messages: u32,
    #[serde(default = "default_analysis_messages")]
    pub analysis_messages: u32,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            label: default_label(),
            word_cloud_messages: default_word_cloud_messages(),
            analysis_messages: default_analysis_messages(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Fixed local port for the OAuth redirect listener
    #[serde(default = "default_callback_port")]
    pub callback_port: u16,
    #[serde(default = "default_callback_timeout_secs")]
    pub callback_timeout_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            callback_port: default_callback_port(),
            callback_timeout_secs: default_callback_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u16,
    #[serde(default = "default_summary_temperature")]
    pub summary_temperature: f32,
    #[serde(default)]
    pub sentiment_temperature: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_base: default_api_base(),
            system_prompt: default_system_prompt(),
            max_input_chars: default_max_input_chars(),
            max_tokens: default_max_tokens(),
            summary_temperature: default_summary_temperature(),
            sentiment_temperature: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WordCloudConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_max_words")]
    pub max_words: usize,
    #[serde(default = "default_background")]
    pub background: String,
    #[serde(default = "default_colormap")]
    pub colormap: String,
    #[serde(default = "default_output")]
    pub output: PathBuf,
    #[serde(default = "default_open_viewer")]
    pub open_viewer: bool,
}

impl Default for WordCloudConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            max_words: default_max_words(),
            background: default_background(),
            colormap: default_colormap(),
            output: default_output(),
            open_viewer: default_open_viewer(),
        }
    }
}

fn default_label() -> String {
    "INBOX".to_string()
}

fn default_word_cloud_messages() -> u32 {
    30
}

fn default_analysis_messages() -> u32 {
    10
}

fn default_callback_port() -> u16 {
    8501
}

fn default_callback_timeout_secs() -> u64 {
    300
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_system_prompt() -> String {
    "Let me assist you".to_string()
}

fn default_max_input_chars() -> usize {
    2000
}

fn default_max_tokens() -> u16 {
    256
}

fn default_summary_temperature() -> f32 {
    0.5
}

fn default_width() -> u32 {
    800
}

fn default_height() -> u32 {
    400
}

fn default_max_words() -> usize {
    50
}

fn default_background() -> String {
    "black".to_string()
}

fn default_colormap() -> String {
    "plasma".to_string()
}

fn default_output() -> PathBuf {
    PathBuf::from("wordcloud.png")
}

fn default_open_viewer() -> bool {
    true
}

/// Upper bound on messages fetched per action; Gmail caps list pages at 500
pub const MAX_MESSAGES: u32 = 500;

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        // If file doesn't exist, return default config with warning
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| InsightsError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content).map_err(|e| {
            InsightsError::ConfigError(format!("Failed to parse config file: {}", e))
        })?;

        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                InsightsError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self).map_err(|e| {
            InsightsError::ConfigError(format!("Failed to serialize config: {}", e))
        })?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| InsightsError::ConfigError(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.mail.label.trim().is_empty() {
            return Err(InsightsError::ConfigError(
                "mail.label cannot be empty".to_string(),
            ));
        }
        for (name, value) in [
            ("mail.word_cloud_messages", self.mail.word_cloud_messages),
            ("mail.analysis_messages", self.mail.analysis_messages),
        ] {
            if value == 0 {
                return Err(InsightsError::ConfigError(format!(
                    "{} must be at least 1",
                    name
                )));
            }
            if value > MAX_MESSAGES {
                return Err(InsightsError::ConfigError(format!(
                    "{} cannot exceed {}",
                    name, MAX_MESSAGES
                )));
            }
        }

        if self.auth.callback_port == 0 {
            return Err(InsightsError::ConfigError(
                "auth.callback_port must be a fixed, non-zero port".to_string(),
            ));
        }
        if self.auth.callback_timeout_secs == 0 {
            return Err(InsightsError::ConfigError(
                "auth.callback_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.model.model.trim().is_empty() {
            return Err(InsightsError::ConfigError(
                "model.model cannot be empty".to_string(),
            ));
        }
        if url::Url::parse(&self.model.api_base).is_err() {
            return Err(InsightsError::ConfigError(format!(
                "model.api_base is not a valid URL: '{}'",
                self.model.api_base
            )));
        }
        if self.model.max_input_chars == 0 {
            return Err(InsightsError::ConfigError(
                "model.max_input_chars must be greater than 0".to_string(),
            ));
        }
        if self.model.max_tokens == 0 {
            return Err(InsightsError::ConfigError(
                "model.max_tokens must be greater than 0".to_string(),
            ));
        }
        for (name, value) in [
            ("model.summary_temperature", self.model.summary_temperature),
            ("model.sentiment_temperature", self.model.sentiment_temperature),
        ] {
            if !(0.0..=2.0).contains(&value) {
                return Err(InsightsError::ConfigError(format!(
                    "{} must be between 0 and 2",
                    name
                )));
            }
        }

        if self.word_cloud.width < 16 || self.word_cloud.height < 16 {
            return Err(InsightsError::ConfigError(
                "word_cloud.width and word_cloud.height must be at least 16".to_string(),
            ));
        }
        if self.word_cloud.max_words == 0 {
            return Err(InsightsError::ConfigError(
                "word_cloud.max_words must be greater than 0".to_string(),
            ));
        }
        crate::wordcloud::parse_color(&self.word_cloud.background)?;
        crate::wordcloud::Colormap::from_name(&self.word_cloud.colormap)?;

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    /// Create an example configuration file
    pub async fn create_example(path: &Path) -> Result<()> {
        let config = Self::default();
        config.save(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.mail.label, "INBOX");
        assert_eq!(config.mail.word_cloud_messages, 30);
        assert_eq!(config.mail.analysis_messages, 10);

        assert_eq!(config.auth.callback_port, 8501);

        assert_eq!(config.model.model, "gpt-4o-mini");
        assert_eq!(config.model.system_prompt, "Let me assist you");
        assert_eq!(config.model.max_input_chars, 2000);
        assert_eq!(config.model.max_tokens, 256);
        assert_eq!(config.model.summary_temperature, 0.5);
        assert_eq!(config.model.sentiment_temperature, 0.0);

        assert_eq!(config.word_cloud.width, 800);
        assert_eq!(config.word_cloud.height, 400);
        assert_eq!(config.word_cloud.max_words, 50);
        assert_eq!(config.word_cloud.background, "black");
        assert_eq!(config.word_cloud.colormap, "plasma");
    }

    #[test]
    fn test_config_validation_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_zero_messages() {
        let mut config = Config::default();
        config.mail.word_cloud_messages = 0;
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("at least 1"));
    }

    #[test]
    fn test_config_validation_too_many_messages() {
        let mut config = Config::default();
        config.mail.analysis_messages = 501;
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("cannot exceed 500"));
    }

    #[test]
    fn test_config_validation_zero_port() {
        let mut config = Config::default();
        config.auth.callback_port = 0;
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("callback_port"));
    }

    #[test]
    fn test_config_validation_bad_api_base() {
        let mut config = Config::default();
        config.model.api_base = "not a url".to_string();
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("api_base"));
    }

    #[test]
    fn test_config_validation_temperature_range() {
        let mut config = Config::default();
        config.model.summary_temperature = 2.5;
        let result = config.validate();
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("summary_temperature must be between 0 and 2"));

        config.model.summary_temperature = 2.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_unknown_colormap() {
        let mut config = Config::default();
        config.word_cloud.colormap = "rainbow".to_string();
        assert!(config.validate().is_err());

        config.word_cloud.colormap = "viridis".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_background() {
        let mut config = Config::default();
        config.word_cloud.background = "#1a2b3c".to_string();
        assert!(config.validate().is_ok());

        config.word_cloud.background = "#zzz".to_string();
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_config_load_save_roundtrip() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();

        let mut config = Config::default();
        config.mail.analysis_messages = 5;
        config.save(path).await.unwrap();

        let loaded = Config::load(path).await.unwrap();
        assert_eq!(loaded.mail.analysis_messages, 5);
        assert_eq!(loaded.model.model, config.model.model);
        assert_eq!(loaded.word_cloud.output, config.word_cloud.output);
    }

    #[tokio::test]
    async fn test_config_load_nonexistent_returns_default() {
        let path = Path::new("/tmp/nonexistent-gmail-insights-config-12345.toml");

        let config = Config::load(path).await.unwrap();
        assert_eq!(config.mail.word_cloud_messages, 30);
    }

    #[tokio::test]
    async fn test_config_load_invalid_toml() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();

        tokio::fs::write(path, "this is not valid toml {[}]")
            .await
            .unwrap();

        let result = Config::load(path).await;
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Failed to parse config file"));
    }

    #[tokio::test]
    async fn test_config_partial_with_defaults() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();

        let partial_config = r#"
[model]
model = "gpt-4o"

[word_cloud]
colormap = "viridis"
"#;
        tokio::fs::write(path, partial_config).await.unwrap();

        let config = Config::load(path).await.unwrap();

        assert_eq!(config.model.model, "gpt-4o");
        assert_eq!(config.word_cloud.colormap, "viridis");

        assert_eq!(config.model.max_tokens, 256);
        assert_eq!(config.word_cloud.width, 800);
        assert_eq!(config.mail.label, "INBOX");
    }

    #[tokio::test]
    async fn test_config_create_example() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();

        Config::create_example(path).await.unwrap();
        assert!(path.exists());

        let config = Config::load(path).await.unwrap();
        assert_eq!(config.auth.callback_port, 8501);
    }
}
