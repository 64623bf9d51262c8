// src/spreadsheet.rs

use crate::config::ColumnsConfig;
use crate::error::MatchError;
use crate::transaction::excel_serial;
use calamine::{Data, Reader};
use rust_xlsxwriter::{Format, Formula, Workbook as XlsxWorkbook};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// On-disk flavour of the input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetFormat {
    /// Rewritten in place as xlsx.
    Xlsx,
    Csv,
    /// Not rewritable without loss (xlsm, xls, xlsb, ods); saved beside the
    /// input as `.xlsx`.
    ReadOnly,
}

impl SheetFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "xlsx" => Some(SheetFormat::Xlsx),
            "csv" => Some(SheetFormat::Csv),
            "xlsm" | "xls" | "xlsb" | "ods" => Some(SheetFormat::ReadOnly),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Sheet {
    pub name: String,
    /// Absolute (row, col) of the first stored cell.
    pub origin: (u32, u32),
    pub rows: Vec<Vec<Data>>,
    /// Formula text (without `=`) keyed by absolute (row, col).
    pub formulas: HashMap<(u32, u32), String>,
}

impl Sheet {
    pub fn header(&self) -> &[Data] {
        self.rows.first().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of rows below the header.
    pub fn data_len(&self) -> usize {
        self.rows.len().saturating_sub(1)
    }

    pub fn data_row(&self, idx: usize) -> &[Data] {
        self.rows.get(idx + 1).map(Vec::as_slice).unwrap_or(&[])
    }

    /// 1-based row number of a data row as a spreadsheet program shows it.
    pub fn row_number(&self, idx: usize) -> u32 {
        self.origin.0 + idx as u32 + 2
    }

    pub fn set(&mut self, idx: usize, col: usize, value: Data) {
        let Some(row) = self.rows.get_mut(idx + 1) else {
            return;
        };
        if row.len() <= col {
            row.resize(col + 1, Data::Empty);
        }
        row[col] = value;
        // A written value replaces whatever formula the cell held.
        let at = (self.origin.0 + idx as u32 + 1, self.origin.1 + col as u32);
        self.formulas.remove(&at);
    }
}

/// Logical field -> column index within the sheet rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMap {
    pub date: usize,
    pub amount: usize,
    pub invoice: Option<usize>,
    pub found: usize,
}

fn normalize_header(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn header_text(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.clone(),
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

impl ColumnMap {
    /// Locate every column by header name. Missing required fields are
    /// returned by their logical name.
    pub fn resolve(header: &[Data], cfg: &ColumnsConfig) -> Result<Self, Vec<&'static str>> {
        let names: Vec<String> = header.iter().map(|c| normalize_header(&header_text(c))).collect();
        let find = |aliases: &[String]| {
            aliases.iter().find_map(|alias| {
                let wanted = normalize_header(alias);
                names.iter().position(|n| *n == wanted)
            })
        };

        let date = find(cfg.date.as_slice());
        let amount = find(cfg.amount.as_slice());
        let found = find(cfg.found.as_slice());
        let invoice = find(cfg.invoice.as_slice());

        match (date, amount, found) {
            (Some(date), Some(amount), Some(found)) => Ok(Self {
                date,
                amount,
                invoice,
                found,
            }),
            _ => Err([("date", date), ("amount", amount), ("found", found)]
                .into_iter()
                .filter(|(_, idx)| idx.is_none())
                .map(|(name, _)| name)
                .collect()),
        }
    }
}

/// Every sheet of the input file, held in memory for one run.
#[derive(Debug, Clone)]
pub struct Workbook {
    path: PathBuf,
    format: SheetFormat,
    sheets: Vec<Sheet>,
    active: usize,
}

impl Workbook {
    pub fn load(path: &Path, sheet: Option<&str>) -> Result<Self, MatchError> {
        let format = SheetFormat::from_path(path)
            .ok_or_else(|| MatchError::input(path, "unsupported file type"))?;
        let sheets = match format {
            SheetFormat::Csv => vec![read_csv(path)?],
            SheetFormat::Xlsx | SheetFormat::ReadOnly => read_workbook(path)?,
        };

        let active = match sheet {
            Some(name) => sheets
                .iter()
                .position(|s| s.name == name)
                .ok_or_else(|| MatchError::input(path, format!("no sheet named '{name}'")))?,
            None => 0,
        };
        if sheets.is_empty() {
            return Err(MatchError::input(path, "workbook has no sheets"));
        }

        info!(
            path = %path.display(),
            sheets = sheets.len(),
            active = %sheets[active].name,
            rows = sheets[active].data_len(),
            "Spreadsheet loaded"
        );
        Ok(Self {
            path: path.to_path_buf(),
            format,
            sheets,
            active,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn active(&self) -> &Sheet {
        &self.sheets[self.active]
    }

    pub fn active_mut(&mut self) -> &mut Sheet {
        &mut self.sheets[self.active]
    }

    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    /// Where `save` writes.
    pub fn output_path(&self) -> PathBuf {
        match self.format {
            SheetFormat::ReadOnly => self.path.with_extension("xlsx"),
            SheetFormat::Xlsx | SheetFormat::Csv => self.path.clone(),
        }
    }

    /// Write the whole workbook at once: encode, write a temporary sibling, rename over.
    pub fn save(&self) -> Result<PathBuf, MatchError> {
        let target = self.output_path();
        if self.format == SheetFormat::ReadOnly {
            warn!(
                input = %self.path.display(),
                output = %target.display(),
                "Input format cannot be rewritten, saving as xlsx"
            );
        }

        let bytes = match self.format {
            SheetFormat::Csv => encode_csv(self.active()).map_err(|e| MatchError::write(&target, e))?,
            SheetFormat::Xlsx | SheetFormat::ReadOnly => {
                encode_xlsx(self.sheets()).map_err(|e| MatchError::write(&target, e))?
            }
        };

        write_atomically(&target, &bytes)?;
        info!(path = %target.display(), bytes = bytes.len(), "Spreadsheet saved");
        Ok(target)
    }
}

fn read_workbook(path: &Path) -> Result<Vec<Sheet>, MatchError> {
    let mut workbook = calamine::open_workbook_auto(path).map_err(|e| MatchError::input(path, e))?;

    let mut sheets = Vec::new();
    for name in workbook.sheet_names() {
        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| MatchError::input(path, format!("sheet '{name}': {e}")))?;
        let origin = range.start().unwrap_or((0, 0));
        let rows = range.rows().map(|r| r.to_vec()).collect();

        let formulas = match workbook.worksheet_formula(&name) {
            Ok(formulas) => {
                let (row0, col0) = formulas.start().unwrap_or((0, 0));
                formulas
                    .used_cells()
                    .map(|(r, c, f)| ((row0 + r as u32, col0 + c as u32), f.clone()))
                    .collect()
            }
            Err(e) => {
                warn!(sheet = %name, error = %e, "Formulas unavailable, keeping cached values only");
                HashMap::new()
            }
        };
        sheets.push(Sheet {
            name,
            origin,
            rows,
            formulas,
        });
    }
    Ok(sheets)
}

fn read_csv(path: &Path) -> Result<Sheet, MatchError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| MatchError::input(path, e))?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| MatchError::input(path, e))?;
        rows.push(
            record
                .iter()
                .map(|field| {
                    if field.is_empty() {
                        Data::Empty
                    } else {
                        Data::String(field.to_string())
                    }
                })
                .collect(),
        );
    }

    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Sheet1")
        .to_string();
    Ok(Sheet {
        name,
        origin: (0, 0),
        rows,
        formulas: HashMap::new(),
    })
}

fn encode_csv(sheet: &Sheet) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::new());
    for row in &sheet.rows {
        writer.write_record(row.iter().map(|cell| match cell {
            Data::Empty => String::new(),
            other => other.to_string(),
        }))?;
    }
    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::DateTime(dt) => excel_serial(dt).to_string(),
        other => other.to_string(),
    }
}

fn encode_xlsx(sheets: &[Sheet]) -> Result<Vec<u8>, rust_xlsxwriter::XlsxError> {
    let mut workbook = XlsxWorkbook::new();
    let date_format = Format::new().set_num_format("dd/mm/yyyy");

    for sheet in sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(&sheet.name)?;

        for (r, row) in sheet.rows.iter().enumerate() {
            let row_idx = sheet.origin.0 + r as u32;
            for (c, cell) in row.iter().enumerate() {
                let col_idx = sheet.origin.1 + c as u32;
                if sheet.formulas.contains_key(&(row_idx, col_idx)) {
                    continue;
                }
                let col_idx = col_idx as u16;
                match cell {
                    Data::Empty => {}
                    Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => {
                        worksheet.write_string(row_idx, col_idx, s)?;
                    }
                    Data::Float(f) => {
                        worksheet.write_number(row_idx, col_idx, *f)?;
                    }
                    Data::Int(i) => {
                        worksheet.write_number(row_idx, col_idx, *i as f64)?;
                    }
                    Data::Bool(b) => {
                        worksheet.write_boolean(row_idx, col_idx, *b)?;
                    }
                    Data::DateTime(dt) => {
                        worksheet.write_number_with_format(row_idx, col_idx, excel_serial(dt), &date_format)?;
                    }
                    Data::Error(e) => {
                        worksheet.write_string(row_idx, col_idx, e.to_string())?;
                    }
                }
            }
        }

        // Formulas go back with their cached result so readers that never
        // recalculate still see the old value.
        for (&(row_idx, col_idx), text) in &sheet.formulas {
            let cached = row_idx
                .checked_sub(sheet.origin.0)
                .zip(col_idx.checked_sub(sheet.origin.1))
                .and_then(|(r, c)| sheet.rows.get(r as usize)?.get(c as usize))
                .map(cell_text)
                .unwrap_or_default();
            worksheet.write_formula(row_idx, col_idx as u16, Formula::new(text).set_result(cached))?;
        }
    }

    workbook.save_to_buffer()
}

/// Write through a temporary sibling so a failed save never leaves a half-written file.
pub fn write_atomically(target: &Path, bytes: &[u8]) -> Result<(), MatchError> {
    let file_name = target
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| MatchError::write(target, "path has no file name"))?;
    let tmp = target.with_file_name(format!(".{file_name}.tmp"));

    fs::write(&tmp, bytes).map_err(|e| MatchError::write(target, e))?;
    if let Err(e) = fs::rename(&tmp, target) {
        let _ = fs::remove_file(&tmp);
        return Err(MatchError::write(target, e));
    }
    Ok(())
}
