use crate::error::RowFailure;
use crate::search::SearchKey;
use crate::search::currency::parse_amount_text;
use crate::spreadsheet::ColumnMap;
use calamine::{Data, ExcelDateTime, ExcelDateTimeType};
use time::macros::format_description;
use time::{Date, Duration, Month, PrimitiveDateTime};

/// One spreadsheet row to reconcile.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    /// Row number as shown by spreadsheet programs (header included).
    pub row: u32,
    pub date: Date,
    pub invoice: Option<String>,
    pub amount: Option<f64>,
    pub found: Option<bool>,
}

impl Transaction {
    pub fn from_row(row: u32, cells: &[Data], columns: &ColumnMap) -> Result<Self, RowFailure> {
        let date_cell = cell(cells, columns.date);
        let date = parse_date(date_cell).ok_or_else(|| RowFailure::InvalidDate(date_cell.to_string()))?;
        Ok(Self {
            row,
            date,
            invoice: columns.invoice.and_then(|idx| parse_invoice(cell(cells, idx))),
            amount: parse_amount(cell(cells, columns.amount)),
            found: None,
        })
    }

    pub fn search_key(&self, cells: &[Data], columns: &ColumnMap) -> Result<SearchKey, RowFailure> {
        SearchKey::choose(self.invoice.as_deref(), self.amount)
            .ok_or_else(|| RowFailure::InvalidAmount(cell(cells, columns.amount).to_string()))
    }
}

static EMPTY: Data = Data::Empty;

fn cell(cells: &[Data], idx: usize) -> &Data {
    cells.get(idx).unwrap_or(&EMPTY)
}

pub fn is_blank(cells: &[Data]) -> bool {
    cells.iter().all(|c| match c {
        Data::Empty => true,
        Data::String(s) => s.trim().is_empty(),
        _ => false,
    })
}

/// Excel serial day 0 is 1899-12-30 once the 1900 leap-year bug is accounted for.
pub fn excel_serial_to_date(serial: f64) -> Option<Date> {
    if !serial.is_finite() || serial < 1.0 {
        return None;
    }
    let base = Date::from_calendar_date(1899, Month::December, 30).ok()?;
    base.checked_add(Duration::days(serial.trunc() as i64))
}

/// Days between the 1900 and 1904 date systems.
const EPOCH_1904_OFFSET: f64 = 1462.0;

/// Serial of a date cell in the 1900 date system, whichever system the
/// workbook uses. Durations are left as they are.
pub fn excel_serial(dt: &ExcelDateTime) -> f64 {
    let in_1904 = dt.is_datetime() && *dt == ExcelDateTime::new(dt.as_f64(), ExcelDateTimeType::DateTime, true);
    if in_1904 {
        dt.as_f64() + EPOCH_1904_OFFSET
    } else {
        dt.as_f64()
    }
}

pub fn parse_date(cell: &Data) -> Option<Date> {
    match cell {
        Data::DateTime(dt) => excel_serial_to_date(excel_serial(dt)),
        Data::Float(f) => excel_serial_to_date(*f),
        Data::Int(i) => excel_serial_to_date(*i as f64),
        Data::String(s) | Data::DateTimeIso(s) => parse_date_text(s),
        _ => None,
    }
}

/// ISO dates (with or without a time part) or day-first `dd/mm/yyyy`.
pub fn parse_date_text(raw: &str) -> Option<Date> {
    let s = raw.trim();
    let iso = format_description!("[year]-[month]-[day]");
    let iso_time = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    let day_first = format_description!("[day]/[month]/[year]");

    if let Ok(d) = Date::parse(s, iso) {
        return Some(d);
    }
    if let Ok(dt) = PrimitiveDateTime::parse(&s.replacen('T', " ", 1), iso_time) {
        return Some(dt.date());
    }
    if let Some(head) = s.get(..10) {
        if let Ok(d) = Date::parse(head, iso) {
            return Some(d);
        }
    }
    let slashed = s.split_whitespace().next()?.replace(['-', '.'], "/");
    Date::parse(&slashed, day_first).ok()
}

pub fn parse_amount(cell: &Data) -> Option<f64> {
    match cell {
        Data::Float(f) if f.is_finite() => Some(*f),
        Data::Int(i) => Some(*i as f64),
        Data::String(s) => parse_amount_text(s),
        _ => None,
    }
}

/// Numeric invoice cells lose their `.0`; text is trimmed.
pub fn parse_invoice(cell: &Data) -> Option<String> {
    let text = match cell {
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}
