//! xlsx bytes to [`Table`]s and back.
//!
//! Decoding uses `calamine`, encoding uses `rust_xlsxwriter`. Header and type
//! inference follow the usual dataframe conventions:
//!
//! - the first row of the used range is the header
//! - blank header cells become `Unnamed: {index}`, duplicates get `.1`, `.2`…
//! - whole numbers decode as integers, date-formatted cells as datetimes
//! - trailing all-empty rows are dropped

use std::{collections::HashMap, io::Cursor};

use calamine::{Data, Range, Reader, Xlsx};
use chrono::{NaiveDate, NaiveDateTime};
use rust_xlsxwriter::{
    DocProperties, ExcelDateTime, Format, FormatAlign, FormatBorder, Worksheet, XlsxError,
};
use tracing::debug;

use crate::{
    error::{Error, Result},
    table::{CellValue, Table},
    workbook::Workbook,
};

/// MIME type used when uploading encoded workbooks.
pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

const DATETIME_NUM_FORMAT: &str = "yyyy-mm-dd hh:mm:ss";

/// Largest magnitude at which every whole `f64` is an exact integer (2^53).
const MAX_EXACT_INT: f64 = 9_007_199_254_740_992.0;
const MAX_EXACT_INT_ABS: u64 = 1 << 53;

/// Decodes a single sheet.
///
/// # Errors
///
/// Returns [`Error::Decode`] if the bytes are not a readable xlsx container
/// and [`Error::SheetNotFound`] if the workbook has no sheet called
/// `sheet_name`.
pub fn decode_sheet(bytes: &[u8], sheet_name: &str) -> Result<Table> {
    let mut xlsx = open(bytes)?;
    let available = xlsx.sheet_names();
    if !available.iter().any(|name| name == sheet_name) {
        return Err(Error::SheetNotFound {
            name: sheet_name.to_string(),
            available,
        });
    }
    read_range(&mut xlsx, sheet_name)
}

/// Decodes every sheet, in tab order.
///
/// # Errors
///
/// Returns [`Error::Decode`] if the container or any sheet cannot be read.
pub fn decode_workbook(bytes: &[u8]) -> Result<Workbook> {
    let mut xlsx = open(bytes)?;
    let mut workbook = Workbook::new();
    for name in xlsx.sheet_names() {
        let table = read_range(&mut xlsx, &name)?;
        workbook.insert(name, table);
    }
    debug!(sheets = workbook.len(), "decoded workbook");
    Ok(workbook)
}

/// Serializes every sheet of `workbook` into one xlsx container.
///
/// Sheets are written in workbook order with the header in the first row and
/// no index column. The document creation time is fixed, so encoding the same
/// workbook twice produces identical bytes.
///
/// # Errors
///
/// Returns [`Error::Encode`] when a sheet name is invalid for Excel or a table
/// exceeds the worksheet limits.
pub fn encode_workbook(workbook: &Workbook) -> Result<Vec<u8>> {
    let mut book = rust_xlsxwriter::Workbook::new();
    let created = ExcelDateTime::from_ymd(2000, 1, 1)?;
    book.set_properties(&DocProperties::new().set_creation_datetime(&created));

    let header = Format::new()
        .set_bold()
        .set_border(FormatBorder::Thin)
        .set_align(FormatAlign::Center);
    let datetime = Format::new().set_num_format(DATETIME_NUM_FORMAT);

    for (name, table) in workbook.iter() {
        let sheet = book.add_worksheet();
        sheet.set_name(name)?;
        write_table(sheet, table, &header, &datetime)?;
    }

    let bytes = book.save_to_buffer()?;
    debug!(
        sheets = workbook.len(),
        bytes = bytes.len(),
        "encoded workbook"
    );
    Ok(bytes)
}

fn open(bytes: &[u8]) -> Result<Xlsx<Cursor<&[u8]>>> {
    Xlsx::new(Cursor::new(bytes)).map_err(|e| Error::Decode(e.to_string()))
}

fn read_range(xlsx: &mut Xlsx<Cursor<&[u8]>>, sheet_name: &str) -> Result<Table> {
    let range = xlsx
        .worksheet_range(sheet_name)
        .map_err(|e| Error::Decode(format!("sheet '{sheet_name}': {e}")))?;
    Ok(range_to_table(&range))
}

fn range_to_table(range: &Range<Data>) -> Table {
    let mut rows = range.rows();
    let Some(header_row) = rows.next() else {
        return Table::default();
    };

    let mut table = Table::new(header_names(header_row));

    let data: Vec<Vec<CellValue>> = rows
        .map(|row| row.iter().map(cell_value).collect())
        .collect();
    let used = data
        .iter()
        .rposition(|row: &Vec<CellValue>| row.iter().any(|c| !c.is_empty()))
        .map_or(0, |last| last + 1);

    for row in data.into_iter().take(used) {
        table.push_row(row);
    }
    table
}

fn header_names(row: &[Data]) -> Vec<String> {
    let raw = row.iter().enumerate().map(|(idx, cell)| {
        let name = cell_value(cell).to_string();
        if name.trim().is_empty() {
            format!("Unnamed: {idx}")
        } else {
            name
        }
    });

    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut names: Vec<String> = Vec::with_capacity(row.len());
    for name in raw {
        let mut candidate = name.clone();
        while names.contains(&candidate) {
            let counter = seen.entry(name.clone()).or_insert(0);
            *counter += 1;
            candidate = format!("{name}.{counter}");
        }
        names.push(candidate);
    }
    names
}

fn cell_value(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Empty,
        Data::String(s) if s.is_empty() => CellValue::Empty,
        Data::String(s) | Data::DurationIso(s) => CellValue::String(s.clone()),
        Data::Int(i) => CellValue::Int(*i),
        Data::Float(f) => number(*f),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) if dt.is_duration() => number(dt.as_f64()),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map_or_else(|| number(dt.as_f64()), CellValue::DateTime),
        Data::DateTimeIso(s) => {
            parse_iso_datetime(s).map_or_else(|| CellValue::String(s.clone()), CellValue::DateTime)
        }
        Data::Error(e) => CellValue::String(e.to_string()),
    }
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "guarded by the fract and magnitude checks"
)]
fn number(f: f64) -> CellValue {
    if f.fract() == 0.0 && f.abs() < MAX_EXACT_INT {
        CellValue::Int(f as i64)
    } else {
        CellValue::Float(f)
    }
}

fn parse_iso_datetime(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

#[expect(
    clippy::cast_precision_loss,
    reason = "integers are bounded by MAX_EXACT_INT_ABS before the f64 cast"
)]
fn write_table(
    sheet: &mut Worksheet,
    table: &Table,
    header: &Format,
    datetime: &Format,
) -> Result<(), XlsxError> {
    for (idx, name) in table.columns().iter().enumerate() {
        sheet.write_string_with_format(0, col_num(idx)?, name, header)?;
    }

    for (idx, cells) in table.raw_rows().iter().enumerate() {
        let row = u32::try_from(idx + 1).map_err(|_| XlsxError::RowColumnLimitError)?;
        for (col, cell) in cells.iter().enumerate() {
            let col = col_num(col)?;
            match cell {
                CellValue::Empty => {}
                CellValue::Bool(b) => {
                    sheet.write_boolean(row, col, *b)?;
                }
                // Beyond 2^53 an f64 cannot hold every integer; keep the digits.
                CellValue::Int(i) if i.unsigned_abs() > MAX_EXACT_INT_ABS => {
                    sheet.write_string(row, col, i.to_string())?;
                }
                CellValue::Int(i) => {
                    sheet.write_number(row, col, *i as f64)?;
                }
                // Excel has no representation for NaN or infinities.
                CellValue::Float(f) => {
                    if f.is_finite() {
                        sheet.write_number(row, col, *f)?;
                    }
                }
                CellValue::String(s) => {
                    sheet.write_string(row, col, s)?;
                }
                CellValue::DateTime(dt) => {
                    sheet.write_datetime_with_format(row, col, dt, datetime)?;
                }
            }
        }
    }
    Ok(())
}

fn col_num(idx: usize) -> Result<u16, XlsxError> {
    u16::try_from(idx).map_err(|_| XlsxError::RowColumnLimitError)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sales() -> Table {
        Table::new(["Region", "Amount"])
            .with_row([CellValue::from("North"), CellValue::Int(120)])
            .with_row([CellValue::from("South"), CellValue::Float(75.5)])
            .with_row([CellValue::from("West"), CellValue::Int(98)])
    }

    fn when() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap()
    }

    #[test]
    fn test_encode_then_decode_sheet_preserves_rows_and_columns() {
        let workbook = Workbook::new().with_sheet("Sales", sales());
        let bytes = encode_workbook(&workbook).unwrap();

        let table = decode_sheet(&bytes, "Sales").unwrap();
        assert_eq!(table.columns(), ["Region", "Amount"]);
        assert_eq!(table, sales());
    }

    #[test]
    fn test_decode_sheet_missing_name_returns_sheet_not_found() {
        let bytes = encode_workbook(&Workbook::new().with_sheet("Sales", sales())).unwrap();

        let err = decode_sheet(&bytes, "Budget").unwrap_err();
        match err {
            Error::SheetNotFound { name, available } => {
                assert_eq!(name, "Budget");
                assert_eq!(available, ["Sales"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_decode_garbage_returns_decode_error() {
        let err = decode_workbook(b"definitely not a zip archive").unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn test_decode_workbook_keeps_tab_order() {
        let workbook = Workbook::new()
            .with_sheet("Zeta", sales())
            .with_sheet("Alpha", sales())
            .with_sheet("Mid", sales());
        let decoded = decode_workbook(&encode_workbook(&workbook).unwrap()).unwrap();
        assert_eq!(
            decoded.sheet_names().collect::<Vec<_>>(),
            ["Zeta", "Alpha", "Mid"]
        );
    }

    #[test]
    fn test_datetime_and_bool_cells_survive_encoding() {
        let table = Table::new(["When", "Done"])
            .with_row([CellValue::DateTime(when()), CellValue::Bool(true)]);
        let bytes = encode_workbook(&Workbook::new().with_sheet("Log", table.clone())).unwrap();

        let decoded = decode_sheet(&bytes, "Log").unwrap();
        assert_eq!(decoded.get(0, "When"), Some(&CellValue::DateTime(when())));
        assert_eq!(decoded.get(0, "Done"), Some(&CellValue::Bool(true)));
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let workbook = Workbook::new()
            .with_sheet("Sales", sales())
            .with_sheet("Forecast", sales());
        assert_eq!(
            encode_workbook(&workbook).unwrap(),
            encode_workbook(&workbook).unwrap()
        );
    }

    #[test]
    fn test_invalid_sheet_name_returns_encode_error() {
        let workbook = Workbook::new().with_sheet("bad/name", sales());
        let err = encode_workbook(&workbook).unwrap_err();
        assert!(matches!(err, Error::Encode(_)));
    }

    #[test]
    fn test_empty_table_round_trips_header_only() {
        let table = Table::new(["Region", "Amount"]);
        let bytes = encode_workbook(&Workbook::new().with_sheet("Empty", table.clone())).unwrap();
        let decoded = decode_sheet(&bytes, "Empty").unwrap();
        assert_eq!(decoded, table);
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_trailing_empty_rows_are_dropped() {
        let table = Table::new(["A", "B"])
            .with_row([CellValue::Int(1), CellValue::Empty])
            .with_row([CellValue::Empty, CellValue::Empty]);
        let bytes = encode_workbook(&Workbook::new().with_sheet("S", table)).unwrap();
        assert_eq!(decode_sheet(&bytes, "S").unwrap().row_count(), 1);
    }

    #[test]
    fn test_integers_beyond_f64_precision_are_written_as_text() {
        let table = Table::new(["Id"])
            .with_row([CellValue::Int(9_007_199_254_740_993)])
            .with_row([CellValue::Int(-9_007_199_254_740_993)])
            .with_row([CellValue::Int(9_007_199_254_740_992)]);
        let bytes = encode_workbook(&Workbook::new().with_sheet("Ids", table)).unwrap();

        let decoded = decode_sheet(&bytes, "Ids").unwrap();
        assert_eq!(
            decoded.get(0, "Id"),
            Some(&CellValue::from("9007199254740993"))
        );
        assert_eq!(
            decoded.get(1, "Id").and_then(CellValue::as_str),
            Some("-9007199254740993")
        );
        assert_eq!(
            decoded.get(2, "Id"),
            Some(&CellValue::Float(9_007_199_254_740_992.0))
        );
    }

    #[test]
    fn test_header_names_fill_blanks_and_dedupe() {
        let row = [
            Data::String("Region".to_string()),
            Data::Empty,
            Data::String("Region".to_string()),
            Data::Float(2024.0),
            Data::String("Region".to_string()),
        ];
        assert_eq!(
            header_names(&row),
            ["Region", "Unnamed: 1", "Region.1", "2024", "Region.2"]
        );
    }

    #[test]
    fn test_cell_value_inference() {
        assert_eq!(cell_value(&Data::Float(3.0)), CellValue::Int(3));
        assert_eq!(cell_value(&Data::Float(3.25)), CellValue::Float(3.25));
        assert_eq!(cell_value(&Data::String(String::new())), CellValue::Empty);
        assert_eq!(
            cell_value(&Data::DateTimeIso("2024-01-15T08:30:00".to_string())),
            CellValue::DateTime(when())
        );
        assert_eq!(
            cell_value(&Data::Error(calamine::CellErrorType::Div0)),
            CellValue::from("#DIV/0!")
        );
    }
}
