//! Tabular parser for uploaded import files.
//!
//! Decodes raw file bytes (CSV, or an XLSX workbook) into an ordered list of
//! header-keyed [`RawRow`]s plus the [`ColumnSet`] detected from the header.
//! Parsing is a pure single-shot transform: on failure no partial result is
//! returned and the caller decides whether to ask for a new file.

use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Local file header signature that starts every ZIP container (XLSX).
pub const ZIP_SIGNATURE: &[u8] = b"PK\x03\x04";

/// UTF-8 byte order mark written by spreadsheet "Save as CSV" exports.
pub const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Default CSV delimiter.
pub const DEFAULT_DELIMITER: u8 = b',';

/// Prefix for synthesized column names when the file has no header row.
pub const SYNTHETIC_COLUMN_PREFIX: &str = "column_";

/// Spreadsheet column limit (`XFD`).
const MAX_XLSX_COLUMNS: usize = 16_384;

const SHARED_STRINGS_PATH: &str = "xl/sharedStrings.xml";
const WORKSHEET_PREFIX: &str = "xl/worksheets/sheet";

static SHEET_DATA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<sheetData\b[^>]*?(?:/>|>(.*?)</sheetData>)").expect("valid regex"));
static ROW_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<row\b[^>]*?(?:/>|>(.*?)</row>)").expect("valid regex"));
static CELL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<c\b([^>]*?)(?:/>|>(.*?)</c>)").expect("valid regex"));
static CELL_REF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\br="([A-Z]+)[0-9]+""#).expect("valid regex"));
static CELL_TYPE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\bt="([A-Za-z]+)""#).expect("valid regex"));
static VALUE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<v>(.*?)</v>").expect("valid regex"));
static TEXT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<t(?:\s[^>]*)?>(.*?)</t>").expect("valid regex"));
static SHARED_ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<si>(.*?)</si>").expect("valid regex"));
static ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(#x[0-9A-Fa-f]+|#[0-9]+|[a-z]+);").expect("valid regex"));

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Fatal failure to read an uploaded file. No rows are processed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("the file is empty")]
    Empty,

    #[error("the header row has no columns")]
    NoHeaderColumns,

    #[error("the file is not valid UTF-8 (line {line})")]
    Encoding { line: u64 },

    #[error("the file could not be read: {0}")]
    Corrupt(String),
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Container format of an uploaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TabularFormat {
    Csv,
    Xlsx,
}

impl TabularFormat {
    /// Sniff the format from the leading bytes. Anything that is not a ZIP
    /// container is treated as CSV.
    pub fn detect(bytes: &[u8]) -> Self {
        if bytes.starts_with(ZIP_SIGNATURE) {
            Self::Xlsx
        } else {
            Self::Csv
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Xlsx => "xlsx",
        }
    }
}

impl std::fmt::Display for TabularFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options controlling [`parse`].
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Treat the first non-empty row as the header (default: `true`).
    pub has_header: bool,
    /// CSV field delimiter (ignored for XLSX).
    pub delimiter: u8,
    /// Force a format instead of sniffing the bytes.
    pub format: Option<TabularFormat>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            has_header: true,
            delimiter: DEFAULT_DELIMITER,
            format: None,
        }
    }
}

/// Ordered set of distinct column names detected from the header row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnSet {
    names: Vec<String>,
}

impl ColumnSet {
    /// Build a column set, dropping blank and repeated names.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self::default();
        for name in names {
            let name = name.into();
            if !name.trim().is_empty() && !set.contains(&name) {
                set.names.push(name);
            }
        }
        set
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// One data row keyed by column name.
///
/// Lookups of columns the row does not carry yield an empty string, so a
/// short row behaves as if its missing cells were blank.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRow {
    cells: HashMap<String, String>,
}

impl RawRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience constructor, mostly for tests and template round-trips.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            cells: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Raw cell value for `column`, or `""` when absent.
    pub fn get(&self, column: &str) -> &str {
        self.cells.get(column).map(String::as_str).unwrap_or("")
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<String>) {
        self.cells.insert(column.into(), value.into());
    }

    pub fn contains(&self, column: &str) -> bool {
        self.cells.contains_key(column)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.cells.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// `true` when every cell is empty or whitespace.
    pub fn is_blank(&self) -> bool {
        self.cells.values().all(|v| v.trim().is_empty())
    }
}

/// Successful parser output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedTable {
    pub format: TabularFormat,
    pub columns: ColumnSet,
    /// Data rows in file order; `rows[i]` is user-visible row `i + 1`.
    pub rows: Vec<RawRow>,
}

impl ParsedTable {
    /// Iterate rows paired with their 1-based row index.
    pub fn indexed_rows(&self) -> impl Iterator<Item = (usize, &RawRow)> {
        self.rows.iter().enumerate().map(|(i, row)| (i + 1, row))
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse an uploaded file into rows and columns.
pub fn parse(bytes: &[u8], options: &ParseOptions) -> Result<ParsedTable, ParseError> {
    if bytes.is_empty() {
        return Err(ParseError::Empty);
    }

    let format = options
        .format
        .unwrap_or_else(|| TabularFormat::detect(bytes));

    let lines = match format {
        TabularFormat::Csv => read_csv_lines(bytes, options.delimiter)?,
        TabularFormat::Xlsx => read_xlsx_lines(bytes)?,
    };

    build_table(lines, options.has_header, format)
}

/// Zip raw lines into keyed rows, skipping empty lines.
fn build_table(
    lines: Vec<Vec<String>>,
    has_header: bool,
    format: TabularFormat,
) -> Result<ParsedTable, ParseError> {
    let mut lines = lines.into_iter().filter(|cells| !is_blank_line(cells));
    let first = lines.next().ok_or(ParseError::Empty)?;

    let (slots, first_data_line) = if has_header {
        (header_slots(&first), None)
    } else {
        (synthetic_slots(first.len()), Some(first))
    };

    if slots.iter().all(Option::is_none) {
        return Err(ParseError::NoHeaderColumns);
    }

    let columns = ColumnSet::new(slots.iter().flatten().cloned());
    let rows = first_data_line
        .into_iter()
        .chain(lines)
        .map(|cells| zip_row(&slots, cells))
        .collect();

    Ok(ParsedTable {
        format,
        columns,
        rows,
    })
}

/// Map header cells to column names, one slot per cell position.
///
/// Blank header cells yield `None` (the column is ignored). A repeated name
/// gets a numeric suffix so every slot stays addressable.
fn header_slots(cells: &[String]) -> Vec<Option<String>> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    cells
        .iter()
        .map(|cell| {
            let name = cell.trim();
            if name.is_empty() {
                return None;
            }
            let count = seen.entry(name.to_string()).or_insert(0);
            *count += 1;
            if *count == 1 {
                Some(name.to_string())
            } else {
                Some(format!("{name}_{count}"))
            }
        })
        .collect()
}

fn synthetic_slots(width: usize) -> Vec<Option<String>> {
    (1..=width)
        .map(|i| Some(format!("{SYNTHETIC_COLUMN_PREFIX}{i}")))
        .collect()
}

/// Cells beyond the header width are ignored; missing cells become empty.
fn zip_row(slots: &[Option<String>], cells: Vec<String>) -> RawRow {
    let mut row = RawRow::new();
    let mut cells = cells.into_iter();
    for slot in slots {
        let value = cells.next().unwrap_or_default();
        if let Some(column) = slot {
            row.insert(column.clone(), value);
        }
    }
    row
}

fn is_blank_line(cells: &[String]) -> bool {
    cells.iter().all(|c| c.trim().is_empty())
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

fn read_csv_lines(bytes: &[u8], delimiter: u8) -> Result<Vec<Vec<String>>, ParseError> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(bytes);

    let mut lines = Vec::new();
    for result in reader.records() {
        let record = result.map_err(csv_error)?;
        lines.push(record.iter().map(str::to_string).collect());
    }
    Ok(lines)
}

fn csv_error(err: csv::Error) -> ParseError {
    let line = err.position().map(|p| p.line()).unwrap_or(0);
    match err.kind() {
        csv::ErrorKind::Utf8 { .. } => ParseError::Encoding { line },
        _ => ParseError::Corrupt(err.to_string()),
    }
}

// ---------------------------------------------------------------------------
// XLSX
// ---------------------------------------------------------------------------

type Workbook<'a> = zip::ZipArchive<Cursor<&'a [u8]>>;

/// Read the first worksheet of an XLSX workbook as lines of text cells.
fn read_xlsx_lines(bytes: &[u8]) -> Result<Vec<Vec<String>>, ParseError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ParseError::Corrupt(format!("not a valid workbook: {e}")))?;

    let shared_strings = read_entry(&mut archive, SHARED_STRINGS_PATH)?
        .map(|xml| parse_shared_strings(&xml))
        .unwrap_or_default();

    let sheet_path = first_worksheet(&archive)
        .ok_or_else(|| ParseError::Corrupt("the workbook contains no worksheet".to_string()))?;
    let sheet_xml = read_entry(&mut archive, &sheet_path)?
        .ok_or_else(|| ParseError::Corrupt(format!("missing worksheet {sheet_path}")))?;

    parse_sheet_rows(&sheet_xml, &shared_strings)
}

fn read_entry(archive: &mut Workbook<'_>, path: &str) -> Result<Option<String>, ParseError> {
    let mut entry = match archive.by_name(path) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(ParseError::Corrupt(format!("{path}: {e}"))),
    };
    let mut xml = String::new();
    entry
        .read_to_string(&mut xml)
        .map_err(|e| ParseError::Corrupt(format!("{path}: {e}")))?;
    Ok(Some(xml))
}

/// Lowest-numbered `xl/worksheets/sheetN.xml` entry.
fn first_worksheet(archive: &Workbook<'_>) -> Option<String> {
    archive
        .file_names()
        .filter_map(|name| {
            let number = name
                .strip_prefix(WORKSHEET_PREFIX)?
                .strip_suffix(".xml")?
                .parse::<u32>()
                .ok()?;
            Some((number, name.to_string()))
        })
        .min_by_key(|(number, _)| *number)
        .map(|(_, name)| name)
}

fn parse_shared_strings(xml: &str) -> Vec<String> {
    SHARED_ITEM_RE
        .captures_iter(xml)
        .map(|item| concat_text_runs(item.get(1).map_or("", |m| m.as_str())))
        .collect()
}

fn concat_text_runs(xml: &str) -> String {
    TEXT_RE
        .captures_iter(xml)
        .filter_map(|t| t.get(1))
        .map(|m| unescape_xml(m.as_str()))
        .collect()
}

fn parse_sheet_rows(xml: &str, shared_strings: &[String]) -> Result<Vec<Vec<String>>, ParseError> {
    let Some(sheet_data) = SHEET_DATA_RE
        .captures(xml)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
    else {
        return Ok(Vec::new());
    };

    ROW_RE
        .captures_iter(sheet_data)
        .map(|row| {
            let inner = row.get(1).map_or("", |m| m.as_str());
            parse_row_cells(inner, shared_strings)
        })
        .collect()
}

fn parse_row_cells(row_xml: &str, shared_strings: &[String]) -> Result<Vec<String>, ParseError> {
    let mut cells: Vec<String> = Vec::new();

    for cell in CELL_RE.captures_iter(row_xml) {
        let attrs = cell.get(1).map_or("", |m| m.as_str());
        let inner = cell.get(2).map_or("", |m| m.as_str());

        let position = match CELL_REF_RE.captures(attrs).and_then(|c| c.get(1)) {
            Some(letters) => column_index(letters.as_str()).ok_or_else(|| {
                ParseError::Corrupt(format!("cell reference out of range: {}", letters.as_str()))
            })?,
            None if cells.len() < MAX_XLSX_COLUMNS => cells.len(),
            None => {
                return Err(ParseError::Corrupt(format!(
                    "row has more than {MAX_XLSX_COLUMNS} cells"
                )))
            }
        };
        let cell_type = CELL_TYPE_RE
            .captures(attrs)
            .and_then(|c| c.get(1))
            .map_or("n", |m| m.as_str());

        let value = cell_value(cell_type, inner, shared_strings);
        if cells.len() <= position {
            cells.resize(position + 1, String::new());
        }
        cells[position] = value;
    }

    Ok(cells)
}

fn cell_value(cell_type: &str, inner: &str, shared_strings: &[String]) -> String {
    let raw = VALUE_RE
        .captures(inner)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or("");

    match cell_type {
        "s" => raw
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|i| shared_strings.get(i))
            .cloned()
            .unwrap_or_default(),
        "inlineStr" => concat_text_runs(inner),
        "b" => match raw.trim() {
            "1" => "true".to_string(),
            "0" => "false".to_string(),
            other => other.to_string(),
        },
        _ => unescape_xml(raw),
    }
}

/// Convert a spreadsheet column reference (`A`, `Z`, `AA`) to a 0-based
/// index. `None` past the last spreadsheet column (`XFD`).
fn column_index(letters: &str) -> Option<usize> {
    let number = letters.bytes().try_fold(0usize, |acc, b| {
        if !b.is_ascii_uppercase() {
            return None;
        }
        acc.checked_mul(26)?.checked_add(usize::from(b - b'A' + 1))
    })?;
    (1..=MAX_XLSX_COLUMNS).contains(&number).then(|| number - 1)
}

fn unescape_xml(text: &str) -> String {
    ENTITY_RE
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let entity = &caps[1];
            let decoded = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => entity
                    .strip_prefix("#x")
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                    .and_then(char::from_u32),
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::io::Write;

    fn parse_csv(text: &str) -> Result<ParsedTable, ParseError> {
        parse(text.as_bytes(), &ParseOptions::default())
    }

    fn xlsx(sheet_rows: &str, shared: Option<&str>) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);

        if let Some(shared) = shared {
            writer.start_file(SHARED_STRINGS_PATH, options).unwrap();
            writer
                .write_all(format!("<?xml version=\"1.0\"?><sst>{shared}</sst>").as_bytes())
                .unwrap();
        }
        writer.start_file("xl/worksheets/sheet1.xml", options).unwrap();
        writer
            .write_all(
                format!("<?xml version=\"1.0\"?><worksheet><sheetData>{sheet_rows}</sheetData></worksheet>")
                    .as_bytes(),
            )
            .unwrap();
        writer.finish().unwrap().into_inner()
    }

    // -- CSV --

    #[test]
    fn header_fixes_columns_and_rows_are_keyed() {
        let table = parse_csv("name,email\nAna Ruiz,ana@x.com\nLuis,luis@x.com\n").unwrap();
        assert_eq!(table.format, TabularFormat::Csv);
        assert_eq!(table.columns.names(), &["name", "email"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].get("name"), "Ana Ruiz");
        assert_eq!(table.rows[1].get("email"), "luis@x.com");
    }

    #[test]
    fn empty_lines_are_skipped_and_not_counted() {
        let table = parse_csv("\n\nname,email\n\nA,a@x.com\n,\n\nB,b@x.com\n").unwrap();
        assert_eq!(table.rows.len(), 2);
        let indexed: Vec<_> = table.indexed_rows().map(|(i, r)| (i, r.get("name"))).collect();
        assert_eq!(indexed, vec![(1, "A"), (2, "B")]);
    }

    #[test]
    fn short_rows_are_padded_and_long_rows_truncated() {
        let table = parse_csv("a,b,c\n1\n1,2,3,4,5\n").unwrap();
        assert_eq!(table.rows[0].get("a"), "1");
        assert_eq!(table.rows[0].get("c"), "");
        assert!(table.rows[0].contains("c"));
        assert_eq!(table.rows[1].iter().count(), 3);
    }

    #[test]
    fn quoted_fields_and_bom_are_handled() {
        let text = "\u{FEFF}name,notes\n\"Ruiz, Ana\",\"line \"\"one\"\"\"\n";
        let table = parse_csv(text).unwrap();
        assert_eq!(table.columns.names(), &["name", "notes"]);
        assert_eq!(table.rows[0].get("name"), "Ruiz, Ana");
        assert_eq!(table.rows[0].get("notes"), "line \"one\"");
    }

    #[test]
    fn repeated_and_blank_headers() {
        let table = parse_csv("email, ,email\na@x.com,ignored,b@x.com\n").unwrap();
        assert_eq!(table.columns.names(), &["email", "email_2"]);
        assert_eq!(table.rows[0].get("email_2"), "b@x.com");
        assert!(!table.rows[0].contains(" "));
    }

    #[test]
    fn no_header_synthesizes_columns() {
        let options = ParseOptions {
            has_header: false,
            ..ParseOptions::default()
        };
        let table = parse(b"x,y\nz,w\n", &options).unwrap();
        assert_eq!(table.columns.names(), &["column_1", "column_2"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].get("column_1"), "x");
    }

    #[test]
    fn custom_delimiter() {
        let options = ParseOptions {
            delimiter: b';',
            ..ParseOptions::default()
        };
        let table = parse(b"name;email\nAna;ana@x.com\n", &options).unwrap();
        assert_eq!(table.rows[0].get("email"), "ana@x.com");
    }

    #[test]
    fn empty_file_fails() {
        assert_matches!(parse_csv(""), Err(ParseError::Empty));
        assert_matches!(parse_csv("\n\n  \n"), Err(ParseError::Empty));
        assert_matches!(parse(UTF8_BOM, &ParseOptions::default()), Err(ParseError::Empty));
    }

    #[test]
    fn header_without_columns_fails() {
        assert_matches!(parse_csv(" , ,\nA,B,C\n"), Err(ParseError::NoHeaderColumns));
    }

    #[test]
    fn invalid_utf8_fails_with_encoding_error() {
        let bytes = b"name\n\xff\xfe\n";
        assert_matches!(
            parse(bytes, &ParseOptions::default()),
            Err(ParseError::Encoding { .. })
        );
    }

    #[test]
    fn header_only_file_has_no_rows() {
        let table = parse_csv("name,email\n").unwrap();
        assert!(table.rows.is_empty());
        assert_eq!(table.columns.len(), 2);
    }

    // -- XLSX --

    #[test]
    fn detects_zip_container() {
        assert_eq!(TabularFormat::detect(b"PK\x03\x04rest"), TabularFormat::Xlsx);
        assert_eq!(TabularFormat::detect(b"name,email"), TabularFormat::Csv);
    }

    #[test]
    fn reads_shared_inline_and_numeric_cells() {
        let shared = "<si><t>name</t></si><si><t>email</t></si><si><r><t>Ana </t></r><r><t>Ruiz</t></r></si>";
        let rows = concat!(
            r#"<row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c><c r="C1" t="inlineStr"><is><t>age</t></is></c></row>"#,
            r#"<row r="2"/>"#,
            r#"<row r="3"><c r="A3" t="s"><v>2</v></c><c r="B3" t="str"><v>ana@x.com</v></c><c r="C3"><v>42</v></c></row>"#,
        );
        let table = parse(&xlsx(rows, Some(shared)), &ParseOptions::default()).unwrap();
        assert_eq!(table.format, TabularFormat::Xlsx);
        assert_eq!(table.columns.names(), &["name", "email", "age"]);
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].get("name"), "Ana Ruiz");
        assert_eq!(table.rows[0].get("email"), "ana@x.com");
        assert_eq!(table.rows[0].get("age"), "42");
    }

    #[test]
    fn sparse_cells_are_positioned_by_reference() {
        let rows = concat!(
            r#"<row r="1"><c r="A1" t="inlineStr"><is><t>a</t></is></c><c r="B1" t="inlineStr"><is><t>b</t></is></c><c r="C1" t="inlineStr"><is><t>c</t></is></c></row>"#,
            r#"<row r="2"><c r="C2" t="inlineStr"><is><t>Tom &amp; Jerry</t></is></c><c r="A2" t="b"><v>1</v></c></row>"#,
        );
        let table = parse(&xlsx(rows, None), &ParseOptions::default()).unwrap();
        assert_eq!(table.rows[0].get("a"), "true");
        assert_eq!(table.rows[0].get("b"), "");
        assert_eq!(table.rows[0].get("c"), "Tom & Jerry");
    }

    #[test]
    fn corrupt_container_fails() {
        let bytes = b"PK\x03\x04garbage that is not a zip";
        assert_matches!(
            parse(bytes, &ParseOptions::default()),
            Err(ParseError::Corrupt(_))
        );
    }

    #[test]
    fn column_letters_to_index() {
        assert_eq!(column_index("A"), Some(0));
        assert_eq!(column_index("Z"), Some(25));
        assert_eq!(column_index("AA"), Some(26));
        assert_eq!(column_index("AB"), Some(27));
        assert_eq!(column_index("XFD"), Some(16_383));
        assert_eq!(column_index("XFE"), None);
        assert_eq!(column_index("ZZZZZZZZZZZZZZ"), None);
        assert_eq!(column_index(""), None);
    }

    #[test]
    fn out_of_range_cell_reference_is_corrupt() {
        for reference in ["ZZZZZZZZZZZZZZ2", "ZZZZZZ2", "XFE2"] {
            let rows = format!(
                r#"<row r="1"><c r="A1" t="inlineStr"><is><t>name</t></is></c></row><row r="2"><c r="{reference}" t="inlineStr"><is><t>x</t></is></c></row>"#
            );
            assert_matches!(
                parse(&xlsx(&rows, None), &ParseOptions::default()),
                Err(ParseError::Corrupt(msg)) if msg.contains("out of range")
            );
        }
    }

    #[test]
    fn last_spreadsheet_column_is_accepted() {
        let rows = concat!(
            r#"<row r="1"><c r="A1" t="inlineStr"><is><t>name</t></is></c></row>"#,
            r#"<row r="2"><c r="A2" t="inlineStr"><is><t>Ana</t></is></c><c r="XFD2" t="inlineStr"><is><t>far</t></is></c></row>"#,
        );
        let table = parse(&xlsx(rows, None), &ParseOptions::default()).unwrap();
        assert_eq!(table.rows[0].get("name"), "Ana");
    }

    #[test]
    fn xml_entities_are_decoded() {
        assert_eq!(unescape_xml("a &lt;b&gt; &#233; &#x41;"), "a <b> é A");
        assert_eq!(unescape_xml("&unknown;"), "&unknown;");
    }
}
