//! Configuration loading and parsing

use anyhow::{Context, Result};
use can_trace_decoder::DecoderConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Application configuration (loaded from a TOML file or built from flags)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(flatten)]
    pub decoder: DecoderConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
    /// Stop each input after this many events
    pub max_events: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_config_deserialization() {
        let toml_content = r#"
            inputs = ["trace1.bin", "trace2.bin"]
            databases = ["powertrain.dbc", "body.arxml"]

            [output]
            format = "json"
            max_events = 100
        "#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.decoder.inputs.len(), 2);
        assert_eq!(config.decoder.databases[1], PathBuf::from("body.arxml"));
        assert_eq!(config.output.format, OutputFormat::Json);
        assert_eq!(config.output.max_events, Some(100));
        assert!(config.decoder.validate().is_ok());
    }

    #[test]
    fn test_output_section_optional() {
        let config: AppConfig = toml::from_str(r#"inputs = ["t.bin"]"#).unwrap();
        assert_eq!(config.output.format, OutputFormat::Text);
        assert!(config.decoder.databases.is_empty());
        assert!(config.decoder.validate().is_err());
    }
}
