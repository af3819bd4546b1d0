//! Output formatting for CLI commands.
//!
//! Provides abstraction layer for outputting results in text or JSON format.

use anyhow::Result;
use pathtree_core::ManifestAttributes;
use serde::Serialize;
use std::io::{self, Write};

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Writer for command output with format abstraction.
pub struct OutputWriter {
    format: OutputFormat,
    stdout: io::Stdout,
}

impl OutputWriter {
    pub fn new(json: bool) -> Self {
        Self {
            format: if json {
                OutputFormat::Json
            } else {
                OutputFormat::Text
            },
            stdout: io::stdout(),
        }
    }

    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    /// Write output using the configured format.
    ///
    /// The `text_fn` closure is called only in text mode to generate the
    /// human-readable output.
    pub fn write<T: Serialize>(&self, data: &T, text_fn: impl FnOnce() -> String) -> Result<()> {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(data)?;
                writeln!(&self.stdout, "{}", json)?;
            }
            OutputFormat::Text => {
                let text = text_fn();
                if !text.is_empty() {
                    write!(&self.stdout, "{}", text)?;
                }
            }
        }
        Ok(())
    }

    /// Write raw bytes to stdout, bypassing formatting.
    pub fn write_raw(&self, bytes: &[u8]) -> Result<()> {
        let mut handle = self.stdout.lock();
        handle.write_all(bytes)?;
        handle.flush()?;
        Ok(())
    }

    /// Write an error message to stderr.
    ///
    /// In JSON mode, writes a JSON error object with success=false.
    pub fn write_error(&self, error: &anyhow::Error, result_code: u8) {
        match self.format {
            OutputFormat::Json => {
                let error_output = ErrorOutput {
                    success: false,
                    result_code,
                    error: format!("{:#}", error),
                };
                if let Ok(json) = serde_json::to_string_pretty(&error_output) {
                    let _ = writeln!(io::stderr(), "{}", json);
                }
            }
            OutputFormat::Text => {
                let _ = writeln!(io::stderr(), "Error: {:#}", error);
            }
        }
    }
}

// ============================================================================
// Data Transfer Objects (DTOs) for JSON output
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ErrorOutput {
    pub success: bool,
    pub result_code: u8,
    pub error: String,
}

/// One visited entry in `ls` output.
#[derive(Debug, Clone, Serialize)]
pub struct EntryInfo {
    pub relative: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LsOutput {
    pub success: bool,
    pub result_code: u8,
    pub roots: Vec<String>,
    pub entries: Vec<EntryInfo>,
}

/// Output for `cat` in JSON mode. Content is decoded lossily as UTF-8.
#[derive(Debug, Serialize)]
pub struct CatOutput {
    pub success: bool,
    pub result_code: u8,
    pub relative: String,
    pub path: String,
    pub size: usize,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct ManifestOutput {
    pub success: bool,
    pub result_code: u8,
    pub root: String,
    pub manifest: Option<ManifestAttributes>,
}

#[derive(Debug, Serialize)]
pub struct RootsOutput {
    pub success: bool,
    pub result_code: u8,
    pub roots: Vec<String>,
    pub archive: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_without_url_omits_field() {
        let entry = EntryInfo {
            relative: "a/B.class".to_string(),
            path: "/tmp/a/B.class".to_string(),
            url: None,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert!(json.get("url").is_none());
        assert_eq!(json["relative"], "a/B.class");
    }

    #[test]
    fn test_manifest_output_serializes_attributes() {
        let output = ManifestOutput {
            success: true,
            result_code: 0,
            root: "/tmp/app.jar".to_string(),
            manifest: Some(ManifestAttributes::parse(
                "Manifest-Version: 1.0\nMulti-Release: true\n",
            )),
        };
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["manifest"]["multi_release"], true);
    }
}
