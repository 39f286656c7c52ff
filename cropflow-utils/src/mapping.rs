//! Spreadsheet ingestion for output-name mapping.
//!
//! A mapping file associates uploaded image filenames with desired output
//! names. CSV and Excel workbooks are supported; the loaded entries are
//! materialised into a [`NameMap`] that resolves a filename with fallback
//! matching (exact, then stem without extension, then case-insensitive
//! partial match).

use anyhow::{Context, Result, anyhow};
use calamine::{Data as ExcelData, Reader as _, open_workbook_auto};
use csv::ReaderBuilder;
use std::path::Path;

struct MappingTable {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

/// Supported mapping formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MappingFormat {
    Csv,
    Excel,
}

impl MappingFormat {
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Csv => "CSV / Delimited",
            Self::Excel => "Excel",
        }
    }
}

/// Column selector used to resolve user selections to a zero-based index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ColumnSelector {
    Index(usize),
    Name(String),
}

impl ColumnSelector {
    pub fn describe(&self) -> String {
        match self {
            Self::Index(idx) => format!("column #{idx}"),
            Self::Name(name) => format!("column \"{name}\""),
        }
    }

    /// Parses a CLI-style token (`#3` or `3` for indices, any other value for names).
    pub fn parse_token(token: &str) -> Result<Self> {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            anyhow::bail!("column selector cannot be empty");
        }
        let digits = trimmed.strip_prefix('#').unwrap_or(trimmed);
        if digits.chars().all(|c| c.is_ascii_digit()) {
            let idx: usize = digits.parse()?;
            return Ok(Self::Index(idx));
        }
        Ok(Self::Name(trimmed.to_string()))
    }
}

/// Options that influence how a mapping file is read.
#[derive(Clone, Debug)]
pub struct MappingReadOptions {
    pub format: Option<MappingFormat>,
    pub has_headers: bool,
    pub delimiter: Option<u8>,
    pub sheet_name: Option<String>,
}

impl Default for MappingReadOptions {
    fn default() -> Self {
        Self {
            format: None,
            has_headers: true,
            delimiter: None,
            sheet_name: None,
        }
    }
}

/// A single source-filename / output-name pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MappingEntry {
    pub source_name: String,
    pub output_name: String,
}

/// Detects a mapping format from the file extension.
pub fn detect_format(path: &Path) -> MappingFormat {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|s| s.to_ascii_lowercase())
        .unwrap_or_default()
        .as_str()
    {
        "xlsx" | "xls" | "xlsm" | "ods" => MappingFormat::Excel,
        _ => MappingFormat::Csv,
    }
}

/// Loads every mapping entry, resolving the selected columns to name pairs.
pub fn load_mapping_entries(
    path: &Path,
    options: &MappingReadOptions,
    source: &ColumnSelector,
    output: &ColumnSelector,
) -> Result<Vec<MappingEntry>> {
    let format = options.format.unwrap_or_else(|| detect_format(path));
    let table = match format {
        MappingFormat::Csv => table_csv(path, options)?,
        MappingFormat::Excel => table_excel(path, options)?,
    };

    let source_idx = resolve_selector(&table.columns, source)?;
    let output_idx = resolve_selector(&table.columns, output)?;

    let entries = table
        .rows
        .into_iter()
        .filter_map(|row| {
            let source_value = row.get(source_idx)?.trim();
            let output_value = row.get(output_idx)?.trim();
            if source_value.is_empty() || output_value.is_empty() {
                return None;
            }
            Some(MappingEntry {
                source_name: source_value.to_string(),
                output_name: output_value.to_string(),
            })
        })
        .collect();
    Ok(entries)
}

/// Filename to output-name lookup with fallback matching.
#[derive(Clone, Debug, Default)]
pub struct NameMap {
    entries: Vec<MappingEntry>,
}

impl NameMap {
    pub fn new(entries: Vec<MappingEntry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve the output name for an uploaded filename.
    ///
    /// Matching order: exact filename, then filename without extension, then
    /// case-insensitive partial match (either value containing the other).
    pub fn resolve(&self, filename: &str) -> Option<&str> {
        if let Some(entry) = self
            .entries
            .iter()
            .find(|entry| entry.source_name == filename)
        {
            return Some(&entry.output_name);
        }

        let stem = strip_extension(filename);
        if let Some(entry) = self
            .entries
            .iter()
            .find(|entry| strip_extension(&entry.source_name) == stem)
        {
            return Some(&entry.output_name);
        }

        let lower = filename.to_lowercase();
        self.entries
            .iter()
            .find(|entry| {
                let candidate = entry.source_name.to_lowercase();
                lower.contains(&candidate) || candidate.contains(&lower)
            })
            .map(|entry| entry.output_name.as_str())
    }
}

fn strip_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) if idx > 0 => &name[..idx],
        _ => name,
    }
}

// ---------------------------------------------------------------------------
// CSV

fn table_csv(path: &Path, options: &MappingReadOptions) -> Result<MappingTable> {
    let delimiter = options.delimiter.unwrap_or(b',');
    let mut reader = ReaderBuilder::new()
        .has_headers(options.has_headers)
        .delimiter(delimiter)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let mut columns = if options.has_headers {
        reader
            .headers()
            .context("failed to read CSV headers")?
            .iter()
            .enumerate()
            .map(|(idx, raw)| format_header(raw, idx))
            .collect::<Vec<_>>()
    } else {
        Vec::new()
    };

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let mut row: Vec<String> = record.iter().map(|v| v.trim().to_string()).collect();
        if row.iter().all(|v| v.is_empty()) {
            continue;
        }
        ensure_columns(&mut columns, row.len());
        row.resize(columns.len(), String::new());
        rows.push(row);
    }

    Ok(MappingTable { columns, rows })
}

// ---------------------------------------------------------------------------
// Excel

fn table_excel(path: &Path, options: &MappingReadOptions) -> Result<MappingTable> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("failed to open workbook {}", path.display()))?;
    let sheet_name = match options
        .sheet_name
        .as_ref()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
    {
        Some(explicit) => explicit.to_string(),
        None => workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| anyhow!("workbook {} has no sheets", path.display()))?,
    };

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| anyhow!("failed to read sheet {sheet_name}: {e}"))?;

    let mut rows_iter = range.rows();
    let mut columns = if options.has_headers {
        rows_iter
            .next()
            .map(|header_row| {
                header_row
                    .iter()
                    .enumerate()
                    .map(|(idx, cell)| format_header(&format_excel_cell(cell), idx))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default()
    } else {
        Vec::new()
    };

    let mut rows = Vec::new();
    for row in rows_iter {
        let mut values: Vec<String> = row.iter().map(format_excel_cell).collect();
        if values.iter().all(|v| v.is_empty()) {
            continue;
        }
        ensure_columns(&mut columns, values.len());
        values.resize(columns.len(), String::new());
        rows.push(values);
    }

    Ok(MappingTable { columns, rows })
}

// ---------------------------------------------------------------------------
// Common helpers

fn resolve_selector(columns: &[String], selector: &ColumnSelector) -> Result<usize> {
    match selector {
        ColumnSelector::Index(idx) => {
            if *idx >= columns.len() {
                anyhow::bail!(
                    "{} is out of range ({} column(s) detected)",
                    selector.describe(),
                    columns.len()
                );
            }
            Ok(*idx)
        }
        ColumnSelector::Name(name) => columns
            .iter()
            .position(|col| col.eq_ignore_ascii_case(name))
            .ok_or_else(|| {
                anyhow!(
                    "column named \"{name}\" not found (available: {})",
                    columns.join(", ")
                )
            }),
    }
}

fn format_header(raw: &str, idx: usize) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        format!("Column {}", idx + 1)
    } else {
        trimmed.to_string()
    }
}

fn ensure_columns(columns: &mut Vec<String>, desired: usize) {
    let current = columns.len();
    for idx in current..desired {
        columns.push(format!("Column {}", idx + 1));
    }
}

fn format_excel_cell(cell: &ExcelData) -> String {
    match cell {
        ExcelData::Empty => String::new(),
        ExcelData::String(s) => s.trim().to_string(),
        ExcelData::Float(f) => {
            if f.fract() == 0.0 {
                format!("{:.0}", f)
            } else {
                f.to_string()
            }
        }
        ExcelData::Int(i) => i.to_string(),
        ExcelData::Bool(b) => b.to_string(),
        ExcelData::Error(_) => String::new(),
        ExcelData::DateTime(dt) => dt.to_string(),
        ExcelData::DateTimeIso(s) => s.to_string(),
        ExcelData::DurationIso(s) => s.to_string(),
    }
}
