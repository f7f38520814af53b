//! Converter declarations and traits.

use crate::format::{ConversionOptions, ConvertOutput, Format, converter_key};

/// Declaration of the exact format pair a converter handles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConverterDecl {
    /// Source format.
    pub from: Format,
    /// Target format.
    pub to: Format,
    /// Human-readable description.
    pub description: String,
}

impl ConverterDecl {
    /// Create a new converter declaration.
    pub fn new(from: Format, to: Format) -> Self {
        Self {
            from,
            to,
            description: String::new(),
        }
    }

    /// Set the description.
    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    /// Registry key for this converter, e.g. `csv-json`.
    pub fn key(&self) -> String {
        converter_key(self.from, self.to)
    }
}

/// Trait for implementing converters.
///
/// Implementations must be stateless: the pool hands the same instance to
/// unrelated pipeline runs, so nothing may carry over between calls.
pub trait Converter: Send + Sync {
    /// Get the declaration for this converter.
    fn decl(&self) -> &ConverterDecl;

    /// Convert `input` from `from` to `to`.
    ///
    /// Requests for any pair other than the declared one fail with
    /// [`ConvertError::Unsupported`].
    fn convert(
        &self,
        input: &[u8],
        from: Format,
        to: Format,
        options: &ConversionOptions,
    ) -> Result<ConvertOutput, ConvertError>;

    /// Whether `format` is one side of this converter's pair.
    fn supports_format(&self, format: Format) -> bool {
        let decl = self.decl();
        decl.from == format || decl.to == format
    }

    /// Reject any pair other than the declared one.
    fn check_pair(&self, from: Format, to: Format) -> Result<(), ConvertError> {
        let decl = self.decl();
        if decl.from == from && decl.to == to {
            Ok(())
        } else {
            Err(ConvertError::Unsupported { from, to })
        }
    }
}

/// Errors that can occur during conversion.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConvertError {
    #[error("unsupported conversion: {from} to {to}")]
    Unsupported { from: Format, to: Format },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("conversion failed: {0}")]
    Failed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Passthrough {
        decl: ConverterDecl,
    }

    impl Converter for Passthrough {
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
            Ok(ConvertOutput::new(input.to_vec(), to))
        }
    }

    fn passthrough() -> Passthrough {
        Passthrough {
            decl: ConverterDecl::new(Format::Csv, Format::Json).description("test"),
        }
    }

    #[test]
    fn test_decl_key() {
        let decl = ConverterDecl::new(Format::Xml, Format::Yaml);
        assert_eq!(decl.key(), "xml-yaml");
        assert!(decl.description.is_empty());
    }

    #[test]
    fn test_supports_format() {
        let converter = passthrough();
        assert!(converter.supports_format(Format::Csv));
        assert!(converter.supports_format(Format::Json));
        assert!(!converter.supports_format(Format::Yaml));
    }

    #[test]
    fn test_mismatched_pair_rejected() {
        let converter = passthrough();
        let options = ConversionOptions::default();

        let err = converter
            .convert(b"a,b", Format::Json, Format::Xml, &options)
            .unwrap_err();
        assert_eq!(
            err,
            ConvertError::Unsupported {
                from: Format::Json,
                to: Format::Xml
            }
        );
        assert!(err.to_string().contains("unsupported conversion"));

        // Reversed pair is still a mismatch.
        assert!(
            converter
                .convert(b"", Format::Json, Format::Csv, &options)
                .is_err()
        );
    }
}
