//! CSV ⇄ JSON converters.

use formchain_core::{
    ConversionOptions, ConvertError, ConvertOutput, Converter, ConverterDecl, Format,
};
use indexmap::{IndexMap, IndexSet};

/// CSV with a header row → JSON array of objects.
///
/// Cell values stay strings. Records shorter than the header simply lack the
/// trailing keys; cells past the header are dropped.
pub struct CsvToJson {
    decl: ConverterDecl,
}

impl CsvToJson {
    pub fn new() -> Self {
        Self {
            decl: ConverterDecl::new(Format::Csv, Format::Json)
                .description("Convert CSV rows to a JSON array of objects"),
        }
    }
}

impl Default for CsvToJson {
    fn default() -> Self {
        Self::new()
    }
}

impl Converter for CsvToJson {
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
        check_quotes(input)?;

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(input);
        let mut records = reader.records();

        let mut rows: Vec<IndexMap<String, String>> = Vec::new();
        if let Some(header) = records.next() {
            let header: Vec<String> = header
                .map_err(csv_error)?
                .iter()
                .map(str::to_string)
                .collect();

            for record in records {
                let record = record.map_err(csv_error)?;
                let row: IndexMap<String, String> = header
                    .iter()
                    .cloned()
                    .zip(record.iter().map(str::to_string))
                    .collect();
                rows.push(select_columns(row, &options.headers));
            }
        }

        let data = serde_json::to_vec_pretty(&rows)
            .map_err(|e| ConvertError::Failed(format!("JSON serialization failed: {}", e)))?;

        Ok(ConvertOutput::new(data, Format::Json))
    }
}

/// Reorder (and filter) a row to the explicit column list, if one is set.
fn select_columns(
    mut row: IndexMap<String, String>,
    headers: &[String],
) -> IndexMap<String, String> {
    if headers.is_empty() {
        return row;
    }
    headers
        .iter()
        .filter_map(|h| row.shift_remove(h).map(|v| (h.clone(), v)))
        .collect()
}

fn csv_error(e: csv::Error) -> ConvertError {
    ConvertError::InvalidInput(format!("Invalid CSV: {}", e))
}

/// Reject malformed quoting.
///
/// The csv crate reads stray or unterminated quotes leniently; a conversion
/// must instead fail on them. A quote may only open a field, must be doubled
/// inside a quoted field, and a closing quote must end the field.
fn check_quotes(input: &[u8]) -> Result<(), ConvertError> {
    let mut line = 1;
    let mut quote_line = 1;
    let mut in_quotes = false;
    let mut field_start = true;
    let mut i = 0;

    while i < input.len() {
        let b = input[i];
        i += 1;

        if in_quotes {
            match b {
                b'"' if input.get(i) == Some(&b'"') => i += 1,
                b'"' => {
                    in_quotes = false;
                    if !matches!(input.get(i), None | Some(b',' | b'\n' | b'\r')) {
                        return Err(ConvertError::InvalidInput(format!(
                            "Invalid CSV: line {}: extraneous character after closing quote",
                            line
                        )));
                    }
                }
                b'\n' => line += 1,
                _ => {}
            }
            continue;
        }

        match b {
            b'"' if field_start => {
                in_quotes = true;
                quote_line = line;
                field_start = false;
            }
            b'"' => {
                return Err(ConvertError::InvalidInput(format!(
                    "Invalid CSV: line {}: bare quote in unquoted field",
                    line
                )));
            }
            b',' | b'\r' => field_start = true,
            b'\n' => {
                line += 1;
                field_start = true;
            }
            _ => field_start = false,
        }
    }

    if in_quotes {
        return Err(ConvertError::InvalidInput(format!(
            "Invalid CSV: line {}: unterminated quoted field",
            quote_line
        )));
    }
    Ok(())
}

/// JSON array of objects → CSV with a header row.
///
/// Columns come from `options.headers` when set, otherwise from the keys of
/// all objects in first-seen order.
pub struct JsonToCsv {
    decl: ConverterDecl,
}

impl JsonToCsv {
    pub fn new() -> Self {
        Self {
            decl: ConverterDecl::new(Format::Json, Format::Csv)
                .description("Convert a JSON array of objects to CSV"),
        }
    }
}

impl Default for JsonToCsv {
    fn default() -> Self {
        Self::new()
    }
}

impl Converter for JsonToCsv {
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

        let rows: Vec<IndexMap<String, serde_json::Value>> = serde_json::from_slice(input)
            .map_err(|e| {
                ConvertError::InvalidInput(format!("Expected a JSON array of objects: {}", e))
            })?;

        if rows.is_empty() {
            return Ok(ConvertOutput::new(Vec::new(), Format::Csv));
        }

        let columns: Vec<String> = if options.headers.is_empty() {
            let mut seen = IndexSet::new();
            for row in &rows {
                seen.extend(row.keys().cloned());
            }
            seen.into_iter().collect()
        } else {
            options.headers.clone()
        };

        let mut writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(Vec::new());

        writer.write_record(&columns).map_err(write_error)?;
        for row in &rows {
            let cells = columns
                .iter()
                .map(|c| row.get(c).map(cell_text).unwrap_or_default());
            writer.write_record(cells).map_err(write_error)?;
        }

        let data = writer
            .into_inner()
            .map_err(|e| ConvertError::Failed(format!("CSV serialization failed: {}", e)))?;

        Ok(ConvertOutput::new(data, Format::Csv))
    }
}

fn cell_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn write_error(e: csv::Error) -> ConvertError {
    ConvertError::Failed(format!("CSV serialization failed: {}", e))
}
