use crate::types::Config;
use anyhow::{bail, Context, Result};
use std::fs;

const ACCESS_TOKEN_ENV: &str = "DISPATCH_ACCESS_TOKEN";

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("Failed to read config {}", path))?;
        let mut config = Self::from_yaml(&contents)?;

        if let Ok(token) = std::env::var(ACCESS_TOKEN_ENV) {
            if !token.trim().is_empty() {
                config.dispatch.access_token = token;
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(contents).context("Invalid config YAML")?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.gesture.eye_threshold_frames == 0 || self.gesture.smile_threshold_frames == 0 {
            bail!("gesture thresholds must be at least one frame");
        }
        if self.countdown.start_seconds == 0 {
            bail!("countdown.start_seconds must be at least one");
        }
        if self.countdown.tick_ms == 0 {
            bail!("countdown.tick_ms must be positive");
        }
        if self.replay.fps == 0 {
            bail!("replay.fps must be positive");
        }
        reqwest::Url::parse(&self.dispatch.base_url)
            .with_context(|| format!("Invalid dispatch.base_url {}", self.dispatch.base_url))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config = Config::from_yaml("gesture:\n  eye_threshold_frames: 10\n").unwrap();
        assert_eq!(config.gesture.eye_threshold_frames, 10);
        assert_eq!(config.gesture.smile_threshold_frames, 25);
        assert_eq!(config.countdown.start_seconds, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let config = Config::from_yaml("gesture:\n  smile_threshold_frames: 0\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_countdown_rejected() {
        let config = Config::from_yaml("countdown:\n  start_seconds: 0\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("start_seconds"));
    }

    #[test]
    fn test_bad_base_url_rejected() {
        let config = Config::from_yaml("dispatch:\n  base_url: \"not a url\"\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_shipped_config_loads() {
        let contents = include_str!("../config.yaml");
        let config = Config::from_yaml(contents).unwrap();
        config.validate().unwrap();
        assert_eq!(config.replay.fps, 30);
    }
}
