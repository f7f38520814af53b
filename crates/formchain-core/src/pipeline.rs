//! Pipeline definition and construction.
//!
//! A [`Pipeline`] is an ordered list of conversion steps plus the input and
//! output paths and the options shared by every step. Pipelines are only
//! produced by [`PipelineBuilder::build`], which validates them; once built
//! they are read-only.
//!
//! Pipelines can also be described in YAML, JSON or TOML files
//! (see [`PipelineDef`]).

use crate::format::{ConversionOptions, ConversionStep, Format};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A validated, immutable conversion pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    steps: Vec<ConversionStep>,
    options: ConversionOptions,
    input_path: PathBuf,
    output_path: PathBuf,
}

impl Pipeline {
    /// Start building a pipeline.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    pub fn steps(&self) -> &[ConversionStep] {
        &self.steps
    }

    pub fn options(&self) -> &ConversionOptions {
        &self.options
    }

    pub fn input_path(&self) -> &Path {
        &self.input_path
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }
}

/// Fluent builder for [`Pipeline`].
#[derive(Debug, Clone, Default)]
pub struct PipelineBuilder {
    steps: Vec<ConversionStep>,
    options: ConversionOptions,
    input_path: PathBuf,
    output_path: PathBuf,
}

impl PipelineBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the input file.
    pub fn input_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.input_path = path.into();
        self
    }

    /// Set the output file.
    pub fn output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = path.into();
        self
    }

    /// Replace all options at once.
    pub fn options(mut self, options: ConversionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn indent(mut self) -> Self {
        self.options.indent = true;
        self
    }

    pub fn pretty_print(mut self) -> Self {
        self.options.pretty_print = true;
        self
    }

    /// Explicit column order for tabular stages.
    pub fn headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options.headers = headers.into_iter().map(Into::into).collect();
        self
    }

    /// Write every stage's output to the executor's steps directory.
    pub fn save_intermediary_steps(mut self) -> Self {
        self.options.save_intermediary_steps = true;
        self
    }

    /// Append an arbitrary step.
    pub fn step(mut self, from: Format, to: Format) -> Self {
        self.steps.push(ConversionStep::new(from, to));
        self
    }

    /// Append several steps.
    pub fn steps(mut self, steps: impl IntoIterator<Item = ConversionStep>) -> Self {
        self.steps.extend(steps);
        self
    }

    pub fn csv_to_json(self) -> Self {
        self.step(Format::Csv, Format::Json)
    }

    pub fn json_to_xml(self) -> Self {
        self.step(Format::Json, Format::Xml)
    }

    pub fn xml_to_yaml(self) -> Self {
        self.step(Format::Xml, Format::Yaml)
    }

    /// Validate and produce the pipeline.
    pub fn build(self) -> Result<Pipeline, PipelineError> {
        if self.steps.is_empty() {
            return Err(PipelineError::Invalid("at least one conversion step is required"));
        }
        if self.input_path.as_os_str().is_empty() {
            return Err(PipelineError::Invalid("input path is required"));
        }
        if self.output_path.as_os_str().is_empty() {
            return Err(PipelineError::Invalid("output path is required"));
        }

        Ok(Pipeline {
            steps: self.steps,
            options: self.options,
            input_path: self.input_path,
            output_path: self.output_path,
        })
    }
}

/// Serializable pipeline description, as stored in pipeline files.
///
/// ```yaml
/// input: people.csv
/// output: people.yaml
/// steps: [csv-json, json-xml, xml-yaml]
/// options:
///   indent: true
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineDef {
    #[serde(default)]
    pub input: Option<PathBuf>,

    #[serde(default)]
    pub output: Option<PathBuf>,

    #[serde(default)]
    pub steps: Vec<ConversionStep>,

    #[serde(default)]
    pub options: ConversionOptions,
}

impl PipelineDef {
    /// Parse a definition from bytes, picking the format from `path`'s extension.
    ///
    /// Defaults to YAML when there is no recognizable extension.
    pub fn from_bytes(data: &[u8], path: Option<&Path>) -> Result<Self, PipelineError> {
        let format = path
            .and_then(|p| p.extension())
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_else(|| "yaml".to_string());

        Self::from_bytes_format(data, &format)
    }

    /// Parse a definition with an explicit format (`yaml`, `json` or `toml`).
    pub fn from_bytes_format(data: &[u8], format: &str) -> Result<Self, PipelineError> {
        match format {
            "json" => serde_json::from_slice(data).map_err(|e| PipelineError::Parse(e.to_string())),
            "yaml" | "yml" => {
                serde_yaml::from_slice(data).map_err(|e| PipelineError::Parse(e.to_string()))
            }
            "toml" => {
                let s = std::str::from_utf8(data)
                    .map_err(|e| PipelineError::Parse(format!("Invalid UTF-8: {}", e)))?;
                toml::from_str(s).map_err(|e| PipelineError::Parse(e.to_string()))
            }
            _ => Err(PipelineError::Parse(format!(
                "Unsupported pipeline format: {}",
                format
            ))),
        }
    }

    /// Serialize the definition.
    pub fn to_bytes(&self, format: &str) -> Result<Vec<u8>, PipelineError> {
        match format {
            "json" => {
                serde_json::to_vec_pretty(self).map_err(|e| PipelineError::Parse(e.to_string()))
            }
            "yaml" | "yml" => serde_yaml::to_string(self)
                .map(|s| s.into_bytes())
                .map_err(|e| PipelineError::Parse(e.to_string())),
            "toml" => toml::to_string_pretty(self)
                .map(|s| s.into_bytes())
                .map_err(|e| PipelineError::Parse(e.to_string())),
            _ => Err(PipelineError::Parse(format!(
                "Unsupported pipeline format: {}",
                format
            ))),
        }
    }

    /// Turn the definition into a builder, so callers can adjust it before building.
    pub fn into_builder(self) -> PipelineBuilder {
        let mut builder = PipelineBuilder::new()
            .steps(self.steps)
            .options(self.options);
        if let Some(input) = self.input {
            builder = builder.input_path(input);
        }
        if let Some(output) = self.output {
            builder = builder.output_path(output);
        }
        builder
    }

    /// Validate and build the pipeline.
    pub fn build(self) -> Result<Pipeline, PipelineError> {
        self.into_builder().build()
    }
}

/// Errors from building or loading pipelines.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    #[error("pipeline invalid: {0}")]
    Invalid(&'static str),

    #[error("failed to parse pipeline: {0}")]
    Parse(String),
}
