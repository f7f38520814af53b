//! formchain: chained format conversion
//!
//! Converters are registered by key (`"<from>-<to>"`) in a [`Registry`],
//! handed out through a bounded [`ConverterPool`], and driven step by step
//! by a [`PipelineExecutor`] over pipelines assembled with a
//! [`PipelineBuilder`].

mod converter;
mod executor;
mod format;
mod pipeline;
mod pool;
mod registry;

pub use converter::{ConvertError, Converter, ConverterDecl};
pub use executor::{DEFAULT_STEPS_DIR, ExecuteError, PipelineExecutor, PipelineResult};
pub use format::{
    ConversionOptions, ConversionResult, ConversionStep, ConvertOutput, Format, UnknownFormat,
    converter_key,
};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineDef, PipelineError};
pub use pool::ConverterPool;
pub use registry::{Constructor, ConverterFactory, Registry, RegistryError};
