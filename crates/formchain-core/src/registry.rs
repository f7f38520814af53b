//! Registry for converters.

use crate::converter::{Converter, ConverterDecl};
use indexmap::IndexMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// Zero-argument constructor producing a fresh converter instance.
pub type Constructor = Arc<dyn Fn() -> Box<dyn Converter> + Send + Sync>;

/// Something that can build converters by key.
///
/// The pool depends on this rather than on [`Registry`] directly.
pub trait ConverterFactory: Send + Sync {
    /// Construct a new converter for `key`.
    fn create(&self, key: &str) -> Result<Box<dyn Converter>, RegistryError>;
}

/// Registry of available converters.
///
/// Maps converter keys (`"<from>-<to>"`) to constructors. Registration is
/// expected once at start-up; lookups happen continuously and concurrently,
/// so the map sits behind a read-write lock. The registry itself never holds
/// converter instances.
pub struct Registry {
    constructors: RwLock<IndexMap<String, Constructor>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("keys", &self.keys())
            .finish()
    }
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            constructors: RwLock::new(IndexMap::new()),
        }
    }

    /// Register a constructor for `key`, replacing any previous one.
    pub fn register<F>(&self, key: impl Into<String>, constructor: F)
    where
        F: Fn() -> Box<dyn Converter> + Send + Sync + 'static,
    {
        let key = key.into();
        debug!(key = %key, "registering converter");
        self.constructors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, Arc::new(constructor));
    }

    /// Construct a converter for `key`.
    pub fn create(&self, key: &str) -> Result<Box<dyn Converter>, RegistryError> {
        // Clone the constructor out so the read lock is not held while it runs.
        let constructor = self
            .constructors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
            .ok_or_else(|| RegistryError::UnsupportedConverter(key.to_string()))?;
        Ok(constructor())
    }

    /// Check whether `key` is registered.
    pub fn contains(&self, key: &str) -> bool {
        self.constructors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Registered keys, in registration order.
    pub fn keys(&self) -> Vec<String> {
        self.constructors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Declarations of all registered converters.
    ///
    /// Builds one throwaway instance per key to read its declaration.
    pub fn declarations(&self) -> Vec<ConverterDecl> {
        let constructors: Vec<Constructor> = self
            .constructors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        constructors.iter().map(|c| c().decl().clone()).collect()
    }

    /// Number of registered converters.
    pub fn len(&self) -> usize {
        self.constructors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Check if registry is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ConverterFactory for Registry {
    fn create(&self, key: &str) -> Result<Box<dyn Converter>, RegistryError> {
        Registry::create(self, key)
    }
}

/// Errors from converter lookup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("unsupported converter type: {0}")]
    UnsupportedConverter(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::ConvertError;
    use crate::format::{ConversionOptions, ConvertOutput, Format};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Echo {
        decl: ConverterDecl,
    }

    impl Echo {
        fn boxed(from: Format, to: Format) -> Box<dyn Converter> {
            Box::new(Self {
                decl: ConverterDecl::new(from, to),
            })
        }
    }

    impl Converter for Echo {
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

    fn make_test_registry() -> Registry {
        let registry = Registry::new();
        registry.register("csv-json", || Echo::boxed(Format::Csv, Format::Json));
        registry.register("json-xml", || Echo::boxed(Format::Json, Format::Xml));
        registry
    }

    #[test]
    fn test_create_registered() {
        let registry = make_test_registry();

        let converter = registry.create("json-xml").unwrap();
        assert_eq!(converter.decl().key(), "json-xml");
        assert_eq!(registry.len(), 2);
        assert!(registry.contains("csv-json"));
    }

    #[test]
    fn test_create_unknown_constructs_nothing() {
        let registry = Registry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        registry.register("csv-json", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Echo::boxed(Format::Csv, Format::Json)
        });

        let err = registry.create("yaml-csv").err().unwrap();
        assert_eq!(err, RegistryError::UnsupportedConverter("yaml-csv".into()));
        assert!(err.to_string().contains("unsupported converter type"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_register_overwrites() {
        let registry = make_test_registry();
        registry.register("csv-json", || Echo::boxed(Format::Xml, Format::Yaml));

        assert_eq!(registry.len(), 2);
        let converter = registry.create("csv-json").unwrap();
        assert_eq!(converter.decl().from, Format::Xml);
    }

    #[test]
    fn test_keys_and_declarations_in_order() {
        let registry = make_test_registry();
        assert_eq!(registry.keys(), vec!["csv-json", "json-xml"]);

        let decls = registry.declarations();
        assert_eq!(decls.len(), 2);
        assert_eq!(decls[1].to, Format::Xml);
    }

    #[test]
    fn test_concurrent_lookups() {
        let registry = Arc::new(make_test_registry());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        assert!(registry.create("csv-json").is_ok());
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().expect("lookup thread panicked");
        }
    }
}
