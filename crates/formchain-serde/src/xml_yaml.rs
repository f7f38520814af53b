//! XML → YAML converter.

use formchain_core::{
    ConversionOptions, ConvertError, ConvertOutput, Converter, ConverterDecl, Format,
};
use indexmap::IndexMap;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use serde_yaml::{Mapping, Value};

/// Prefix marking attribute keys in the generated mapping.
pub const ATTRIBUTE_PREFIX: char = '-';

/// Key holding element text when the element also has attributes or children.
pub const TEXT_KEY: &str = "#text";

/// XML document → YAML mapping.
///
/// The document becomes `{root_name: content}`. An element with neither
/// attributes nor children becomes its text; otherwise it becomes a mapping
/// with attributes under `-name` keys, children under their names (repeated
/// names collect into a sequence), and any text under `#text`.
pub struct XmlToYaml {
    decl: ConverterDecl,
}

impl XmlToYaml {
    pub fn new() -> Self {
        Self {
            decl: ConverterDecl::new(Format::Xml, Format::Yaml)
                .description("Convert an XML document to a YAML mapping"),
        }
    }
}

impl Default for XmlToYaml {
    fn default() -> Self {
        Self::new()
    }
}

impl Converter for XmlToYaml {
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

        let text = std::str::from_utf8(input)
            .map_err(|e| ConvertError::InvalidInput(format!("Invalid UTF-8: {}", e)))?;
        let (name, content) = parse_document(text)?;

        let mut doc = Mapping::new();
        doc.insert(Value::String(name), content);

        let data = serde_yaml::to_string(&doc)
            .map(String::into_bytes)
            .map_err(|e| ConvertError::Failed(format!("YAML serialization failed: {}", e)))?;

        Ok(ConvertOutput::new(data, Format::Yaml))
    }
}

/// An element whose end tag has not been seen yet.
struct OpenElement {
    name: String,
    fields: IndexMap<String, Value>,
    text: String,
}

impl OpenElement {
    fn open(start: &BytesStart<'_>) -> Result<Self, ConvertError> {
        let name = std::str::from_utf8(start.name().as_ref())
            .map_err(|e| invalid(format!("element name is not UTF-8: {}", e)))?
            .to_string();

        let mut fields = IndexMap::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| invalid(e.to_string()))?;
            let key = std::str::from_utf8(attr.key.as_ref())
                .map_err(|e| invalid(format!("attribute name is not UTF-8: {}", e)))?;
            let value = attr.unescape_value().map_err(|e| invalid(e.to_string()))?;
            fields.insert(
                format!("{}{}", ATTRIBUTE_PREFIX, key),
                Value::String(value.into_owned()),
            );
        }

        Ok(Self {
            name,
            fields,
            text: String::new(),
        })
    }

    fn into_value(self) -> (String, Value) {
        if self.fields.is_empty() {
            return (self.name, Value::String(self.text));
        }

        let mut fields = self.fields;
        if !self.text.is_empty() {
            fields.insert(TEXT_KEY.to_string(), Value::String(self.text));
        }
        let mapping: Mapping = fields
            .into_iter()
            .map(|(k, v)| (Value::String(k), v))
            .collect();
        (self.name, Value::Mapping(mapping))
    }
}

/// Add a child, turning repeated names into a sequence.
fn attach(fields: &mut IndexMap<String, Value>, name: String, value: Value) {
    match fields.get_mut(&name) {
        Some(Value::Sequence(items)) => items.push(value),
        Some(existing) => {
            let first = std::mem::replace(existing, Value::Null);
            *existing = Value::Sequence(vec![first, value]);
        }
        None => {
            fields.insert(name, value);
        }
    }
}

fn parse_document(text: &str) -> Result<(String, Value), ConvertError> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<OpenElement> = Vec::new();
    let mut root: Option<(String, Value)> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| invalid(format!("{}", e)))?;

        match event {
            Event::Start(start) => {
                ensure_single_root(&stack, &root)?;
                stack.push(OpenElement::open(&start)?);
            }
            Event::Empty(start) => {
                ensure_single_root(&stack, &root)?;
                close(OpenElement::open(&start)?, &mut stack, &mut root);
            }
            Event::End(end) => {
                let element = stack.pop().ok_or_else(|| {
                    invalid(format!(
                        "unexpected end tag </{}>",
                        String::from_utf8_lossy(end.name().as_ref())
                    ))
                })?;
                close(element, &mut stack, &mut root);
            }
            Event::Text(t) => {
                let content = t.unescape().map_err(|e| invalid(e.to_string()))?;
                push_text(&mut stack, &content)?;
            }
            Event::CData(c) => {
                push_text(&mut stack, &String::from_utf8_lossy(&c))?;
            }
            Event::Eof => break,
            // Declarations, comments, processing instructions, doctypes.
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(invalid(format!("unclosed element <{}>", open.name)));
    }
    root.ok_or_else(|| invalid("document has no root element".to_string()))
}

fn ensure_single_root(
    stack: &[OpenElement],
    root: &Option<(String, Value)>,
) -> Result<(), ConvertError> {
    if stack.is_empty() && root.is_some() {
        return Err(invalid("multiple root elements".to_string()));
    }
    Ok(())
}

fn close(
    element: OpenElement,
    stack: &mut [OpenElement],
    root: &mut Option<(String, Value)>,
) {
    let (name, value) = element.into_value();
    match stack.last_mut() {
        Some(parent) => attach(&mut parent.fields, name, value),
        None => *root = Some((name, value)),
    }
}

fn push_text(stack: &mut [OpenElement], content: &str) -> Result<(), ConvertError> {
    match stack.last_mut() {
        Some(element) => {
            element.text.push_str(content);
            Ok(())
        }
        None if content.trim().is_empty() => Ok(()),
        None => Err(invalid("text outside the root element".to_string())),
    }
}

fn invalid(message: String) -> ConvertError {
    ConvertError::InvalidInput(format!("Invalid XML: {}", message))
}
