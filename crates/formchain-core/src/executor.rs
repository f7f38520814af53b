//! Executor: runs a built pipeline end to end.
//!
//! A run reads the input file once, then walks the steps strictly in order:
//! take a converter from the pool, convert, hand the converter back, and
//! (optionally) persist the stage before feeding it to the next step. The
//! first failure ends the run; nothing is written to the output path after
//! a failure.

use crate::converter::ConvertError;
use crate::format::{ConversionResult, ConversionStep, Format};
use crate::pipeline::Pipeline;
use crate::pool::ConverterPool;
use crate::registry::RegistryError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Default directory for intermediate stage files.
pub const DEFAULT_STEPS_DIR: &str = "steps";

/// Outcome of a pipeline run.
#[derive(Debug)]
pub struct PipelineResult {
    /// True when every step ran and the output file was written.
    pub success: bool,
    /// One entry per attempted step, ending at the first failure.
    pub results: Vec<ConversionResult>,
    /// The error that stopped the run.
    pub error: Option<ExecuteError>,
    /// Wall-clock time from reading input to writing output (or failing).
    pub duration: Duration,
}

impl PipelineResult {
    /// Duration in nanoseconds.
    pub fn duration_nanos(&self) -> u64 {
        u64::try_from(self.duration.as_nanos()).unwrap_or(u64::MAX)
    }
}

/// Errors that stop a pipeline run.
///
/// Step numbers are 1-indexed.
#[derive(Debug, thiserror::Error)]
pub enum ExecuteError {
    #[error("failed to read input file {}: {source}", .path.display())]
    ReadInput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create steps directory {}: {source}", .path.display())]
    StepsDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to get converter for step {step} ({from}→{to}): {source}")]
    Acquire {
        step: usize,
        from: Format,
        to: Format,
        #[source]
        source: RegistryError,
    },

    #[error("step {step} failed ({from}→{to}): {source}")]
    StepFailed {
        step: usize,
        from: Format,
        to: Format,
        #[source]
        source: ConvertError,
    },

    #[error("failed to save intermediary step {step} to {}: {source}", .path.display())]
    SaveIntermediate {
        step: usize,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write output file {}: {source}", .path.display())]
    WriteOutput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Drives pipelines using converters from a shared pool.
#[derive(Debug, Clone)]
pub struct PipelineExecutor {
    pool: Arc<ConverterPool>,
    steps_dir: PathBuf,
}

impl PipelineExecutor {
    /// Create an executor that takes converters from `pool`.
    pub fn new(pool: Arc<ConverterPool>) -> Self {
        Self {
            pool,
            steps_dir: PathBuf::from(DEFAULT_STEPS_DIR),
        }
    }

    /// Set where intermediate stage files go.
    pub fn with_steps_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.steps_dir = dir.into();
        self
    }

    pub fn steps_dir(&self) -> &Path {
        &self.steps_dir
    }

    pub fn pool(&self) -> &Arc<ConverterPool> {
        &self.pool
    }

    /// File name for a persisted stage, e.g. `step_1_csv_to_json.json`.
    pub fn intermediate_file_name(index: usize, step: &ConversionStep) -> String {
        format!(
            "step_{}_{}_to_{}.{}",
            index,
            step.from,
            step.to,
            step.to.extension()
        )
    }

    /// Run `pipeline` to completion or first failure.
    pub fn execute(&self, pipeline: &Pipeline) -> PipelineResult {
        let start = Instant::now();
        let mut results = Vec::with_capacity(pipeline.steps().len());

        info!(
            input = %pipeline.input_path().display(),
            output = %pipeline.output_path().display(),
            steps = pipeline.steps().len(),
            "starting pipeline"
        );

        let outcome = self.run(pipeline, &mut results);
        let duration = start.elapsed();

        match outcome {
            Ok(()) => {
                info!(
                    steps = results.len(),
                    duration_ms = duration.as_millis() as u64,
                    "pipeline finished"
                );
                PipelineResult {
                    success: true,
                    results,
                    error: None,
                    duration,
                }
            }
            Err(e) => {
                warn!(error = %e, "pipeline failed");
                PipelineResult {
                    success: false,
                    results,
                    error: Some(e),
                    duration,
                }
            }
        }
    }

    fn run(
        &self,
        pipeline: &Pipeline,
        results: &mut Vec<ConversionResult>,
    ) -> Result<(), ExecuteError> {
        let input_path = pipeline.input_path();
        let mut current = std::fs::read(input_path).map_err(|source| ExecuteError::ReadInput {
            path: input_path.to_path_buf(),
            source,
        })?;

        let options = pipeline.options();
        if options.save_intermediary_steps {
            std::fs::create_dir_all(&self.steps_dir).map_err(|source| ExecuteError::StepsDir {
                path: self.steps_dir.clone(),
                source,
            })?;
        }

        for (idx, step) in pipeline.steps().iter().enumerate() {
            let n = idx + 1;
            let key = step.key();

            let converter = self.pool.get(&key).map_err(|source| ExecuteError::Acquire {
                step: n,
                from: step.from,
                to: step.to,
                source,
            })?;

            let outcome = converter.convert(&current, step.from, step.to, options);
            self.pool.put(converter);

            results.push(ConversionResult::from_outcome(*step, &outcome));

            let output = outcome.map_err(|source| ExecuteError::StepFailed {
                step: n,
                from: step.from,
                to: step.to,
                source,
            })?;

            debug!(
                step = n,
                key = %key,
                input_bytes = current.len(),
                output_bytes = output.data.len(),
                "step complete"
            );
            current = output.data;

            if options.save_intermediary_steps {
                let path = self.steps_dir.join(Self::intermediate_file_name(n, step));
                std::fs::write(&path, &current).map_err(|source| {
                    ExecuteError::SaveIntermediate {
                        step: n,
                        path: path.clone(),
                        source,
                    }
                })?;
            }
        }

        let output_path = pipeline.output_path();
        std::fs::write(output_path, &current).map_err(|source| ExecuteError::WriteOutput {
            path: output_path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::{Converter, ConverterDecl};
    use crate::format::{ConversionOptions, ConvertOutput};
    use crate::registry::Registry;
    use tempfile::TempDir;

    /// Appends `|to` to the payload; fails on payloads containing `!`.
    struct Tag {
        decl: ConverterDecl,
    }

    impl Converter for Tag {
        fn decl(&self) -> &ConverterDecl {
            &self.decl
        }

        fn convert(
            &self,
            input: &[u8],
            from: Format,
            to: Format,
            _options: &ConversionOptions,
        ) -> Result<ConvertOutput, ConvertError> {
            self.check_pair(from, to)?;
            if input.contains(&b'!') {
                return Err(ConvertError::InvalidInput("bang".into()));
            }
            let mut data = input.to_vec();
            data.extend_from_slice(format!("|{}", to).as_bytes());
            Ok(ConvertOutput::new(data, to))
        }
    }

    fn make_executor(max_size: usize) -> PipelineExecutor {
        let registry = Registry::new();
        for (from, to) in [
            (Format::Csv, Format::Json),
            (Format::Json, Format::Xml),
            (Format::Xml, Format::Yaml),
        ] {
            registry.register(crate::format::converter_key(from, to), move || {
                Box::new(Tag {
                    decl: ConverterDecl::new(from, to),
                }) as Box<dyn Converter>
            });
        }
        let pool = Arc::new(ConverterPool::new(max_size, Arc::new(registry)));
        PipelineExecutor::new(pool)
    }

    fn three_step(dir: &TempDir) -> crate::pipeline::PipelineBuilder {
        Pipeline::builder()
            .input_path(dir.path().join("in.csv"))
            .output_path(dir.path().join("out.yaml"))
            .csv_to_json()
            .json_to_xml()
            .xml_to_yaml()
    }

    #[test]
    fn test_execute_chains_steps() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("in.csv"), "data").unwrap();
        let executor = make_executor(2);

        let pipeline = three_step(&dir).build().unwrap();
        let result = executor.execute(&pipeline);

        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.results.len(), 3);
        assert!(result.results.iter().all(ConversionResult::is_ok));
        assert_eq!(result.results[1].format, Format::Xml);

        let output = std::fs::read_to_string(dir.path().join("out.yaml")).unwrap();
        assert_eq!(output, "data|json|xml|yaml");

        // Every converter went back to the pool.
        assert_eq!(executor.pool().size(), 3);
        assert_eq!(executor.pool().created(), 3);
    }

    #[test]
    fn test_failure_stops_and_returns_converter() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("in.csv"), "bad!").unwrap();
        let executor = make_executor(2);

        let pipeline = three_step(&dir).build().unwrap();
        let result = executor.execute(&pipeline);

        assert!(!result.success);
        assert_eq!(result.results.len(), 1);
        assert!(!result.results[0].is_ok());
        assert!(!dir.path().join("out.yaml").exists());

        let message = result.error.unwrap().to_string();
        assert!(message.contains("step 1 failed (csv→json)"), "{}", message);

        assert_eq!(executor.pool().size_of("csv-json"), 1);
    }

    #[test]
    fn test_missing_input_file() {
        let dir = TempDir::new().unwrap();
        let executor = make_executor(1);

        let pipeline = three_step(&dir).build().unwrap();
        let result = executor.execute(&pipeline);

        assert!(!result.success);
        assert!(result.results.is_empty());
        assert!(matches!(result.error, Some(ExecuteError::ReadInput { .. })));
    }

    #[test]
    fn test_unregistered_step() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("in.yaml"), "data").unwrap();
        let executor = make_executor(1);

        let pipeline = Pipeline::builder()
            .input_path(dir.path().join("in.yaml"))
            .output_path(dir.path().join("out.csv"))
            .step(Format::Yaml, Format::Csv)
            .build()
            .unwrap();
        let result = executor.execute(&pipeline);

        assert!(!result.success);
        assert!(result.results.is_empty());
        match result.error {
            Some(ExecuteError::Acquire { step, source, .. }) => {
                assert_eq!(step, 1);
                assert_eq!(source, RegistryError::UnsupportedConverter("yaml-csv".into()));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(executor.pool().created(), 0);
    }

    #[test]
    fn test_saves_intermediary_steps() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("in.csv"), "data").unwrap();
        let steps_dir = dir.path().join("stages");
        let executor = make_executor(1).with_steps_dir(&steps_dir);

        let pipeline = three_step(&dir).save_intermediary_steps().build().unwrap();
        let result = executor.execute(&pipeline);
        assert!(result.success, "{:?}", result.error);

        let first = std::fs::read_to_string(steps_dir.join("step_1_csv_to_json.json")).unwrap();
        assert_eq!(first, "data|json");
        assert!(steps_dir.join("step_2_json_to_xml.xml").exists());
        assert!(steps_dir.join("step_3_xml_to_yaml.yaml").exists());
    }

    #[test]
    fn test_steps_dir_failure_is_fatal() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("in.csv"), "data").unwrap();
        // A regular file where the steps directory should be.
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let executor = make_executor(1).with_steps_dir(&blocker);

        let pipeline = three_step(&dir).save_intermediary_steps().build().unwrap();
        let result = executor.execute(&pipeline);

        assert!(!result.success);
        assert!(matches!(result.error, Some(ExecuteError::StepsDir { .. })));
        assert!(!dir.path().join("out.yaml").exists());
    }

    #[test]
    fn test_intermediate_file_name() {
        let step = ConversionStep::new(Format::Json, Format::Xml);
        assert_eq!(
            PipelineExecutor::intermediate_file_name(2, &step),
            "step_2_json_to_xml.xml"
        );
    }

    #[test]
    fn test_concurrent_pipelines_share_pool() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("in.csv"), "data").unwrap();
        let executor = make_executor(2);

        let handles: Vec<_> = (0..6)
            .map(|i| {
                let executor = executor.clone();
                let pipeline = Pipeline::builder()
                    .input_path(dir.path().join("in.csv"))
                    .output_path(dir.path().join(format!("out_{}.yaml", i)))
                    .csv_to_json()
                    .json_to_xml()
                    .xml_to_yaml()
                    .build()
                    .unwrap();
                std::thread::spawn(move || executor.execute(&pipeline).success)
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap());
        }
        for key in ["csv-json", "json-xml", "xml-yaml"] {
            assert!(executor.pool().created_of(key) <= 2);
            assert!(executor.pool().size_of(key) <= 2);
        }
    }
}
