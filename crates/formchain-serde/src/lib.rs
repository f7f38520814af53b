//! Format converters for formchain.
//!
//! Each converter handles exactly one format pair and is stateless, so the
//! pool can hand the same instance to any number of pipeline runs.
//!
//! # Features
//!
//! - `csv` (default) - CSV via the csv crate
//! - `json` (default) - JSON via serde_json
//! - `xml` (default) - XML via quick-xml
//! - `yaml` (default) - YAML via serde_yaml
//! - `all` - All formats
//!
//! A converter is available when both of its formats are enabled:
//!
//! | key        | converter     |
//! |------------|---------------|
//! | `csv-json` | [`CsvToJson`] |
//! | `json-csv` | [`JsonToCsv`] |
//! | `json-xml` | [`JsonToXml`] |
//! | `xml-yaml` | [`XmlToYaml`] |

use formchain_core::Registry;

#[cfg(all(feature = "csv", feature = "json"))]
mod csv_json;
#[cfg(all(feature = "json", feature = "xml"))]
mod json_xml;
#[cfg(all(feature = "xml", feature = "yaml"))]
mod xml_yaml;

#[cfg(all(feature = "csv", feature = "json"))]
pub use csv_json::{CsvToJson, JsonToCsv};
#[cfg(all(feature = "json", feature = "xml"))]
pub use json_xml::JsonToXml;
#[cfg(all(feature = "xml", feature = "yaml"))]
pub use xml_yaml::XmlToYaml;

/// Register every enabled converter with the registry.
///
/// Call once at start-up, before the registry is shared.
pub fn register_all(registry: &Registry) {
    #[cfg(all(feature = "csv", feature = "json"))]
    {
        registry.register("csv-json", || Box::new(CsvToJson::new()));
        registry.register("json-csv", || Box::new(JsonToCsv::new()));
    }

    #[cfg(all(feature = "json", feature = "xml"))]
    {
        registry.register("json-xml", || Box::new(JsonToXml::new()));
    }

    #[cfg(all(feature = "xml", feature = "yaml"))]
    {
        registry.register("xml-yaml", || Box::new(XmlToYaml::new()));
    }

    tracing::debug!(converters = registry.len(), "registered serde converters");
}

/// Keys of the converters enabled by feature flags.
pub fn enabled_keys() -> Vec<&'static str> {
    [
        #[cfg(all(feature = "csv", feature = "json"))]
        "csv-json",
        #[cfg(all(feature = "csv", feature = "json"))]
        "json-csv",
        #[cfg(all(feature = "json", feature = "xml"))]
        "json-xml",
        #[cfg(all(feature = "xml", feature = "yaml"))]
        "xml-yaml",
    ]
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use formchain_core::ConversionStep;

    #[test]
    fn test_register_all_matches_enabled_keys() {
        let registry = Registry::new();
        register_all(&registry);

        assert_eq!(registry.keys(), enabled_keys());
    }

    #[test]
    fn test_registered_keys_match_declarations() {
        let registry = Registry::new();
        register_all(&registry);

        for key in registry.keys() {
            let converter = registry.create(&key).unwrap();
            assert_eq!(converter.decl().key(), key);

            let step: ConversionStep = key.parse().unwrap();
            assert!(converter.supports_format(step.from));
            assert!(converter.supports_format(step.to));
        }
    }

    #[test]
    #[cfg(all(feature = "csv", feature = "json", feature = "xml", feature = "yaml"))]
    fn test_canonical_chain_registered() {
        let registry = Registry::new();
        register_all(&registry);

        for key in ["csv-json", "json-xml", "xml-yaml"] {
            assert!(registry.contains(key), "missing {}", key);
        }
    }
}
