//! Pipeline configuration loaded from TOML.
//!
//! ```toml
//! [output]
//! format = "text"
//! pretty = true
//! indent = "  "
//! binary_extension = "asset"
//! text_extension = "ron"
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::format::Format;
use crate::token::text::TextStyle;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub output: OutputConfig,
}

/// How assets are written.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Backend used when the target path has no known extension.
    pub format: Format,
    pub pretty: bool,
    pub indent: String,
    pub binary_extension: String,
    pub text_extension: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: Format::Binary,
            pretty: true,
            indent: "    ".into(),
            binary_extension: Format::Binary.extension().into(),
            text_extension: Format::Text.extension().into(),
        }
    }
}

impl OutputConfig {
    pub fn text_style(&self) -> TextStyle {
        TextStyle {
            pretty: self.pretty,
            indent: self.indent.clone(),
        }
    }

    /// Backend for `path`, by extension, falling back to [`format`](Self::format).
    pub fn format_for(&self, path: &Path) -> Format {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext == self.text_extension => Format::Text,
            Some(ext) if ext == self.binary_extension => Format::Binary,
            _ => self.format,
        }
    }

    pub fn extension(&self, format: Format) -> &str {
        match format {
            Format::Binary => &self.binary_extension,
            Format::Text => &self.text_extension,
        }
    }
}

/// Load a pipeline config from a TOML file.
///
/// Returns `Err` with a human-readable message if the file cannot be read
/// or parsed.
pub fn load_config(path: &Path) -> Result<PipelineConfig, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
    parse_config(&content).map_err(|e| format!("failed to parse {}: {e}", path.display()))
}

pub fn parse_config(content: &str) -> Result<PipelineConfig, toml::de::Error> {
    toml::from_str(content)
}

/// Like [`load_config`], but falls back to defaults when the file is unusable.
pub fn load_or_default(path: &Path) -> PipelineConfig {
    match load_config(path) {
        Ok(config) => {
            log::info!("Loaded pipeline config from {}", path.display());
            config
        }
        Err(e) => {
            log::warn!("{e}; using default pipeline config");
            PipelineConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let config = parse_config("[output]\nformat = \"text\"\nindent = \"\\t\"\n").unwrap();
        assert_eq!(config.output.format, Format::Text);
        assert_eq!(config.output.indent, "\t");
        assert!(config.output.pretty);
        assert_eq!(config.output.binary_extension, "bin");
    }

    #[test]
    fn empty_config_is_default() {
        let config = parse_config("").unwrap();
        assert_eq!(config.output.format, Format::Binary);
    }

    #[test]
    fn format_by_extension() {
        let output = OutputConfig {
            binary_extension: "asset".into(),
            ..OutputConfig::default()
        };
        assert_eq!(output.format_for(Path::new("a/b.asset")), Format::Binary);
        assert_eq!(output.format_for(Path::new("a/b.ron")), Format::Text);
        assert_eq!(output.format_for(Path::new("a/b")), Format::Binary);
    }

    #[test]
    fn unknown_format_is_rejected() {
        assert!(parse_config("[output]\nformat = \"xml\"\n").is_err());
    }

    #[test]
    fn missing_file_falls_back() {
        let config = load_or_default(Path::new("/nonexistent/pipeline.toml"));
        assert_eq!(config.output.text_extension, "ron");
    }
}
