//! CSV decoding into a [`Table`] and encoding back out.
//!
//! - **Delimiter resolution**: `.tsv` → tab, everything else → comma, with a
//!   manual override.
//! - **Encoding**: input is decoded via `encoding_rs` (UTF-8 by default);
//!   output is always UTF-8.
//! - **stdin/stdout**: the `-` path routes through the standard streams.
//! - **Cell typing**: empty fields and placeholder tokens become missing; a
//!   column whose present fields all parse as finite numbers is loaded with
//!   numeric cells, every other column with text cells.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use csv::QuoteStyle;
use encoding_rs::{Encoding, UTF_8};
use log::debug;

use crate::{
    data::{Value, parse_number, parse_raw_cell},
    dataset::{Column, Table},
};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

pub fn resolve_input_delimiter(path: &Path, provided: Option<u8>) -> u8 {
    provided.unwrap_or_else(|| match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    })
}

pub fn open_csv_reader<R>(reader: R, delimiter: u8) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(false);
    builder.from_reader(reader)
}

pub fn open_csv_reader_from_path(path: &Path, delimiter: u8) -> Result<csv::Reader<Box<dyn Read>>> {
    let reader: Box<dyn Read> = if is_dash(path) {
        Box::new(std::io::stdin().lock())
    } else {
        Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Opening input file {path:?}"))?,
        ))
    };
    Ok(open_csv_reader(reader, delimiter))
}

pub fn open_csv_writer(path: Option<&Path>, delimiter: u8) -> Result<csv::Writer<Box<dyn Write>>> {
    let writer: Box<dyn Write> = match path {
        Some(p) if !is_dash(p) => Box::new(BufWriter::new(
            File::create(p).with_context(|| format!("Creating output file {p:?}"))?,
        )),
        _ => Box::new(std::io::stdout()),
    };
    let mut builder = csv::WriterBuilder::new();
    builder
        .delimiter(delimiter)
        .quote_style(QuoteStyle::Necessary)
        .double_quote(true);
    Ok(builder.from_writer(writer))
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(anyhow!(
            "Failed to decode text with encoding {}",
            encoding.name()
        ))
    } else {
        Ok(text.into_owned())
    }
}

pub fn decode_record(record: &csv::ByteRecord, encoding: &'static Encoding) -> Result<Vec<String>> {
    record
        .iter()
        .map(|field| decode_bytes(field, encoding))
        .collect()
}

pub fn reader_headers<R>(
    reader: &mut csv::Reader<R>,
    encoding: &'static Encoding,
) -> Result<Vec<String>>
where
    R: Read,
{
    let headers = reader.byte_headers()?.clone();
    decode_record(&headers, encoding)
}

pub fn read_table(path: &Path, delimiter: u8, encoding: &'static Encoding) -> Result<Table> {
    let reader = open_csv_reader_from_path(path, delimiter)?;
    read_table_from_reader(reader, encoding).with_context(|| format!("Reading table from {path:?}"))
}

pub fn read_table_from_reader<R>(
    mut reader: csv::Reader<R>,
    encoding: &'static Encoding,
) -> Result<Table>
where
    R: Read,
{
    let headers = reader_headers(&mut reader, encoding)?;
    let mut raw_columns: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];
    for (row_idx, record) in reader.byte_records().enumerate() {
        let record = record.with_context(|| format!("Reading row {}", row_idx + 2))?;
        let decoded = decode_record(&record, encoding)
            .with_context(|| format!("Decoding row {}", row_idx + 2))?;
        for (idx, field) in decoded.iter().enumerate() {
            raw_columns[idx].push(parse_raw_cell(field));
        }
    }
    let columns = headers
        .into_iter()
        .zip(raw_columns)
        .map(|(name, cells)| type_raw_column(name, cells))
        .collect::<Vec<_>>();
    let table = Table::new(columns)?;
    debug!(
        "Loaded table with {} row(s) and {} column(s)",
        table.row_count(),
        table.column_count()
    );
    Ok(table)
}

fn type_raw_column(name: String, cells: Vec<Option<String>>) -> Column {
    let numeric = cells
        .iter()
        .flatten()
        .all(|cell| parse_number(cell).is_some());
    let values = cells
        .into_iter()
        .map(|cell| {
            cell.map(|text| match parse_number(&text) {
                Some(number) if numeric => Value::Number(number),
                _ => Value::Text(text),
            })
        })
        .collect();
    Column::new(name, values)
}

pub fn write_table(table: &Table, path: Option<&Path>, delimiter: u8) -> Result<()> {
    let mut writer = open_csv_writer(path, delimiter)?;
    writer
        .write_record(table.headers())
        .context("Writing header row")?;
    for row_idx in 0..table.row_count() {
        writer
            .write_record(table.row_strings(row_idx))
            .with_context(|| format!("Writing row {}", row_idx + 2))?;
    }
    writer.flush().context("Flushing CSV output")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Representation;
    use tempfile::tempdir;

    fn read_str(contents: &str) -> Table {
        let reader = open_csv_reader(contents.as_bytes(), b',');
        read_table_from_reader(reader, UTF_8).expect("read table")
    }

    #[test]
    fn numeric_columns_are_typed_on_load() {
        let table = read_str("id,amount,label\n1,2.5,a\n2,NA,b\n3,4,\n");
        assert_eq!(table.shape(), (3, 3));
        let amount = table.column("amount").unwrap();
        assert_eq!(amount.representation(), Representation::Numeric);
        assert_eq!(amount.missing_count(), 1);
        let label = table.column("label").unwrap();
        assert_eq!(label.representation(), Representation::Text);
        assert_eq!(label.missing_count(), 1);
    }

    #[test]
    fn mixed_columns_stay_text() {
        let table = read_str("code\n10\nA7\n");
        let code = table.column("code").unwrap();
        assert_eq!(code.values[0], Some(Value::Text("10".into())));
    }

    #[test]
    fn header_only_input_yields_zero_rows() {
        let table = read_str("a,b\n");
        assert_eq!(table.shape(), (0, 2));
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let reader = open_csv_reader("a,b\n1\n".as_bytes(), b',');
        assert!(read_table_from_reader(reader, UTF_8).is_err());
    }

    #[test]
    fn write_then_read_preserves_cells() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("out.csv");
        let table = read_str("a,b\n1.5,\"x, y\"\n2,z\n");
        write_table(&table, Some(&path), b',').expect("write");
        let back = read_table(&path, b',', UTF_8).expect("read back");
        assert_eq!(back, table);
    }

    #[test]
    fn delimiter_follows_extension() {
        assert_eq!(resolve_input_delimiter(Path::new("x.tsv"), None), b'\t');
        assert_eq!(resolve_input_delimiter(Path::new("x.csv"), None), b',');
        assert_eq!(resolve_input_delimiter(Path::new("x.tsv"), Some(b';')), b';');
    }

    #[test]
    fn latin1_input_decodes() {
        let encoding = resolve_encoding(Some("windows-1252")).unwrap();
        let bytes = b"name\ncaf\xe9\n".to_vec();
        let reader = open_csv_reader(bytes.as_slice(), b',');
        let table = read_table_from_reader(reader, encoding).unwrap();
        assert_eq!(
            table.column("name").unwrap().values[0],
            Some(Value::Text("café".into()))
        );
    }
}
