//! JSON → XML converter.

use formchain_core::{
    ConversionOptions, ConvertError, ConvertOutput, Converter, ConverterDecl, Format,
};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use serde_json::Value;

/// Name of the element wrapping the whole document.
pub const ROOT_ELEMENT: &str = "root";

/// Name used for members of a top-level array.
pub const ITEM_ELEMENT: &str = "item";

/// JSON document → XML wrapped in a single `<root>` element.
///
/// Mapping rules:
/// - object keys become child elements (invalid name characters become `_`)
/// - keys starting with `-` holding scalars become attributes
/// - the `#text` key becomes the element's text
/// - arrays repeat the element once per member; a top-level array becomes
///   repeated `<item>` children of `<root>`
/// - `null` becomes an empty element
pub struct JsonToXml {
    decl: ConverterDecl,
}

impl JsonToXml {
    pub fn new() -> Self {
        Self {
            decl: ConverterDecl::new(Format::Json, Format::Xml)
                .description("Convert a JSON document to XML under a single root element"),
        }
    }
}

impl Default for JsonToXml {
    fn default() -> Self {
        Self::new()
    }
}

impl Converter for JsonToXml {
    fn decl(&self) -> &ConverterDecl {
        &self.decl
    }

    fn convert(
        &self,
        input: &[u8],
        from: Format,
        to: Format,
        options: &ConversionOptions,
    ) -> Result<ConvertOutput, ConvertError> {
        self.check_pair(from, to)?;

        let value: Value = serde_json::from_slice(input)
            .map_err(|e| ConvertError::InvalidInput(format!("Invalid JSON: {}", e)))?;

        let mut writer = if options.pretty() {
            Writer::new_with_indent(Vec::new(), b' ', 2)
        } else {
            Writer::new(Vec::new())
        };

        write(
            &mut writer,
            Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)),
        )?;

        match &value {
            Value::Array(items) if !items.is_empty() => {
                write(&mut writer, Event::Start(BytesStart::new(ROOT_ELEMENT)))?;
                for item in items {
                    write_element(&mut writer, ITEM_ELEMENT, item)?;
                }
                write(&mut writer, Event::End(BytesEnd::new(ROOT_ELEMENT)))?;
            }
            Value::Array(_) => write(&mut writer, Event::Empty(BytesStart::new(ROOT_ELEMENT)))?,
            other => write_element(&mut writer, ROOT_ELEMENT, other)?,
        }

        Ok(ConvertOutput::new(writer.into_inner(), Format::Xml))
    }
}

fn write(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), ConvertError> {
    writer
        .write_event(event)
        .map_err(|e| ConvertError::Failed(format!("XML serialization failed: {}", e)))
}

fn write_element(
    writer: &mut Writer<Vec<u8>>,
    name: &str,
    value: &Value,
) -> Result<(), ConvertError> {
    match value {
        Value::Null => write(writer, Event::Empty(BytesStart::new(name))),
        Value::Array(items) => {
            for item in items {
                write_element(writer, name, item)?;
            }
            Ok(())
        }
        Value::Object(map) => {
            let mut start = BytesStart::new(name);
            let mut children = Vec::new();
            let mut text = None;

            for (key, member) in map {
                match key.strip_prefix('-') {
                    Some(attr) if is_scalar(member) => {
                        start.push_attribute((xml_name(attr).as_str(), scalar_text(member).as_str()));
                    }
                    _ if key == "#text" => text = Some(scalar_text(member)),
                    _ => children.push((xml_name(key), member)),
                }
            }

            if children.is_empty() && text.as_deref().is_none_or(str::is_empty) {
                return write(writer, Event::Empty(start));
            }

            write(writer, Event::Start(start))?;
            if let Some(text) = text {
                write(writer, Event::Text(BytesText::new(&text)))?;
            }
            for (child, member) in children {
                write_element(writer, &child, member)?;
            }
            write(writer, Event::End(BytesEnd::new(name)))
        }
        scalar => {
            write(writer, Event::Start(BytesStart::new(name)))?;
            let text = scalar_text(scalar);
            if !text.is_empty() {
                write(writer, Event::Text(BytesText::new(&text)))?;
            }
            write(writer, Event::End(BytesEnd::new(name)))
        }
    }
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Turn an arbitrary key into a valid XML element name.
fn xml_name(key: &str) -> String {
    let mut name: String = key
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if !name.starts_with(|c: char| c.is_alphabetic() || c == '_') {
        name.insert(0, '_');
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    fn convert(input: &str, options: &ConversionOptions) -> Result<String, ConvertError> {
        let out = JsonToXml::new().convert(input.as_bytes(), Format::Json, Format::Xml, options)?;
        assert_eq!(out.format, Format::Xml);
        Ok(String::from_utf8(out.data).unwrap())
    }

    #[test]
    fn test_object_wrapped_in_root() {
        let xml = convert(r#"{"name": "John", "age": 25}"#, &ConversionOptions::default()).unwrap();
        assert_eq!(
            xml,
            r#"<?xml version="1.0" encoding="UTF-8"?><root><name>John</name><age>25</age></root>"#
        );
    }

    #[test]
    fn test_top_level_array_becomes_items() {
        let xml = convert(
            r#"[{"name": "John"}, {"name": "Jane"}]"#,
            &ConversionOptions::default(),
        )
        .unwrap();
        assert!(xml.ends_with(
            "<root><item><name>John</name></item><item><name>Jane</name></item></root>"
        ));
    }

    #[test]
    fn test_scalar_and_empty_array() {
        let options = ConversionOptions::default();
        assert!(convert("42", &options).unwrap().ends_with("<root>42</root>"));
        assert!(convert("[]", &options).unwrap().ends_with("<root/>"));
        assert!(convert("null", &options).unwrap().ends_with("<root/>"));
    }

    #[test]
    fn test_nested_arrays_repeat_elements() {
        let xml = convert(r#"{"tag": ["a", "b"]}"#, &ConversionOptions::default()).unwrap();
        assert!(xml.ends_with("<root><tag>a</tag><tag>b</tag></root>"));
    }

    #[test]
    fn test_attributes_and_text() {
        let xml = convert(
            r##"{"book": {"-id": 7, "#text": "Dune"}}"##,
            &ConversionOptions::default(),
        )
        .unwrap();
        assert!(xml.ends_with(r#"<root><book id="7">Dune</book></root>"#), "{}", xml);
    }

    #[test]
    fn test_escaping_and_name_sanitizing() {
        let xml = convert(
            r#"{"first name": "<Jo & Co>", "1st": "x"}"#,
            &ConversionOptions::default(),
        )
        .unwrap();
        assert!(xml.contains("<first_name>&lt;Jo &amp; Co&gt;</first_name>"), "{}", xml);
        assert!(xml.contains("<_1st>x</_1st>"), "{}", xml);
    }

    #[test]
    fn test_indent_option() {
        let options = ConversionOptions {
            indent: true,
            ..Default::default()
        };
        let xml = convert(r#"{"a": {"b": "c"}}"#, &options).unwrap();
        assert!(xml.contains("\n  <a>\n    <b>c</b>\n  </a>\n"), "{}", xml);
    }

    #[test]
    fn test_malformed_json_fails() {
        let err = convert(r#"{"a": "#, &ConversionOptions::default()).unwrap_err();
        assert!(matches!(err, ConvertError::InvalidInput(ref msg) if msg.contains("Invalid JSON")));
    }

    #[test]
    fn test_rejects_other_pairs() {
        let err = JsonToXml::new()
            .convert(b"{}", Format::Csv, Format::Json, &ConversionOptions::default())
            .unwrap_err();
        assert!(err.to_string().contains("unsupported conversion"));
    }
}
