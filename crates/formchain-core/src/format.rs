//! Format model: the value types shared by converters, pools and pipelines.

use crate::converter::ConvertError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// A data format a converter can read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Csv,
    Json,
    Xml,
    #[serde(alias = "yml")]
    Yaml,
}

impl Format {
    /// All known formats.
    pub const ALL: [Format; 4] = [Format::Csv, Format::Json, Format::Xml, Format::Yaml];

    /// Lowercase name, as used in converter keys.
    pub fn name(self) -> &'static str {
        match self {
            Format::Csv => "csv",
            Format::Json => "json",
            Format::Xml => "xml",
            Format::Yaml => "yaml",
        }
    }

    /// File extension for this format.
    pub fn extension(self) -> &'static str {
        self.name()
    }

    /// Detect format from a file path extension.
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        let ext = path.as_ref().extension()?.to_str()?;
        ext.parse().ok()
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Format {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(Format::Csv),
            "json" => Ok(Format::Json),
            "xml" => Ok(Format::Xml),
            "yaml" | "yml" => Ok(Format::Yaml),
            _ => Err(UnknownFormat(s.to_string())),
        }
    }
}

/// Returned when a string does not name a known format.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown format: {0}")]
pub struct UnknownFormat(pub String);

/// Options that tune how converters render their output.
///
/// Every option is independent and defaults to off/empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionOptions {
    /// Indent structured output.
    pub indent: bool,
    /// Pretty-print structured output.
    pub pretty_print: bool,
    /// Explicit column order for tabular data.
    pub headers: Vec<String>,
    /// Persist every stage's output next to the final output.
    pub save_intermediary_steps: bool,
}

impl ConversionOptions {
    /// Whether output should be laid out for humans.
    pub fn pretty(&self) -> bool {
        self.indent || self.pretty_print
    }
}

/// A single `from → to` hop in a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "StepRepr", into = "StepRepr")]
pub struct ConversionStep {
    pub from: Format,
    pub to: Format,
}

impl ConversionStep {
    pub fn new(from: Format, to: Format) -> Self {
        Self { from, to }
    }

    /// Converter key for this step, e.g. `csv-json`.
    pub fn key(&self) -> String {
        converter_key(self.from, self.to)
    }
}

impl fmt::Display for ConversionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}→{}", self.from, self.to)
    }
}

impl FromStr for ConversionStep {
    type Err = UnknownFormat;

    /// Parse a converter key such as `csv-json`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (from, to) = s
            .split_once('-')
            .ok_or_else(|| UnknownFormat(s.to_string()))?;
        Ok(Self::new(from.parse()?, to.parse()?))
    }
}

/// Steps are written either as a `"csv-json"` key or as a `{from, to}` table.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum StepRepr {
    Key(String),
    Pair { from: Format, to: Format },
}

impl TryFrom<StepRepr> for ConversionStep {
    type Error = UnknownFormat;

    fn try_from(repr: StepRepr) -> Result<Self, Self::Error> {
        match repr {
            StepRepr::Key(key) => key.parse(),
            StepRepr::Pair { from, to } => Ok(Self::new(from, to)),
        }
    }
}

impl From<ConversionStep> for StepRepr {
    fn from(step: ConversionStep) -> Self {
        StepRepr::Key(step.key())
    }
}

/// Build the registry key for a format pair.
pub fn converter_key(from: Format, to: Format) -> String {
    format!("{}-{}", from, to)
}

/// Successful output of a single conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertOutput {
    pub data: Vec<u8>,
    pub format: Format,
}

impl ConvertOutput {
    pub fn new(data: Vec<u8>, format: Format) -> Self {
        Self { data, format }
    }
}

/// Record of one attempted step in a pipeline run.
#[derive(Debug, Clone)]
pub struct ConversionResult {
    /// The step that produced this result.
    pub step: ConversionStep,
    /// Output bytes (empty when the step failed).
    pub data: Vec<u8>,
    /// Format of `data`.
    pub format: Format,
    /// Set when the step failed.
    pub error: Option<ConvertError>,
}

impl ConversionResult {
    pub(crate) fn from_outcome(
        step: ConversionStep,
        outcome: &Result<ConvertOutput, ConvertError>,
    ) -> Self {
        match outcome {
            Ok(output) => Self {
                step,
                data: output.data.clone(),
                format: output.format,
                error: None,
            },
            Err(e) => Self {
                step,
                data: Vec::new(),
                format: step.to,
                error: Some(e.clone()),
            },
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}
