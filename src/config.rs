use crate::error::MatchError;
use crate::layout::Template;
use serde::Deserialize;
use std::{fs, path::Path};

/// Looked up when no `--config` is given.
pub const DEFAULT_CONFIG_PATH: &str = ".config/receipt_matcher.toml";

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Config {
    /// Worksheet holding the transactions; the first sheet when unset.
    #[serde(default)]
    pub sheet: Option<String>,
    #[serde(default)]
    pub columns: ColumnsConfig,
    #[serde(default)]
    pub layout: LayoutConfig,
    #[serde(default)]
    pub currency: CurrencyConfig,
    #[serde(default)]
    pub flags: FlagConfig,
}

/// Accepted header names for each logical column.
#[derive(Deserialize, Debug, Clone)]
pub struct ColumnsConfig {
    #[serde(default = "default_date_columns")]
    pub date: Vec<String>,
    #[serde(default = "default_amount_columns")]
    pub amount: Vec<String>,
    #[serde(default = "default_invoice_columns")]
    pub invoice: Vec<String>,
    #[serde(default = "default_found_columns")]
    pub found: Vec<String>,
}

fn default_date_columns() -> Vec<String> {
    strings(&["Vencimento", "Data de Pagamento", "Date"])
}

fn default_amount_columns() -> Vec<String> {
    strings(&["( R$ )", "Valor pagamento líquido (R$)", "Amount"])
}

fn default_invoice_columns() -> Vec<String> {
    strings(&["Número da Fatura", "Invoice"])
}

fn default_found_columns() -> Vec<String> {
    strings(&["Encontrado", "Found"])
}

impl Default for ColumnsConfig {
    fn default() -> Self {
        Self {
            date: default_date_columns(),
            amount: default_amount_columns(),
            invoice: default_invoice_columns(),
            found: default_found_columns(),
        }
    }
}

/// Where receipts live and where extracted pages go, relative to the base folder.
#[derive(Deserialize, Debug, Clone)]
pub struct LayoutConfig {
    #[serde(default = "default_receipt")]
    pub receipt: String,
    #[serde(default = "default_notes_dir")]
    pub notes_dir: String,
    #[serde(default = "default_note_name")]
    pub note_name: String,
    #[serde(default = "default_month_names")]
    pub month_names: Vec<String>,
}

fn default_receipt() -> String {
    "{year}/{month}.pdf".to_string()
}

fn default_notes_dir() -> String {
    "Notas".to_string()
}

fn default_note_name() -> String {
    "{row} {key}".to_string()
}

fn default_month_names() -> Vec<String> {
    strings(&[
        "Janeiro", "Fevereiro", "Março", "Abril", "Maio", "Junho", "Julho", "Agosto", "Setembro",
        "Outubro", "Novembro", "Dezembro",
    ])
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            receipt: default_receipt(),
            notes_dir: default_notes_dir(),
            note_name: default_note_name(),
            month_names: default_month_names(),
        }
    }
}

/// How amounts are printed on the receipts.
#[derive(Deserialize, Debug, Clone)]
pub struct CurrencyConfig {
    #[serde(default = "default_symbol")]
    pub symbol: String,
    #[serde(default = "default_thousands")]
    pub thousands: String,
    #[serde(default = "default_decimal")]
    pub decimal: String,
}

fn default_symbol() -> String {
    "R$".to_string()
}

fn default_thousands() -> String {
    ".".to_string()
}

fn default_decimal() -> String {
    ",".to_string()
}

impl Default for CurrencyConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            thousands: default_thousands(),
            decimal: default_decimal(),
        }
    }
}

/// Values written to the found column.
#[derive(Deserialize, Debug, Clone)]
pub struct FlagConfig {
    #[serde(default = "default_found_label")]
    pub found: String,
    #[serde(default = "default_not_found_label")]
    pub not_found: String,
}

fn default_found_label() -> String {
    "Sim".to_string()
}

fn default_not_found_label() -> String {
    "Não".to_string()
}

impl Default for FlagConfig {
    fn default() -> Self {
        Self {
            found: default_found_label(),
            not_found: default_not_found_label(),
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MatchError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| MatchError::Config(format!("{}: {e}", path.display())))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, MatchError> {
        let cfg: Config = toml::from_str(content).map_err(|e| MatchError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Explicit path first, then the default location, then built-in defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, MatchError> {
        match path {
            Some(p) => Self::load(p),
            None if Path::new(DEFAULT_CONFIG_PATH).is_file() => Self::load(DEFAULT_CONFIG_PATH),
            None => Ok(Self::default()),
        }
    }

    fn validate(&self) -> Result<(), MatchError> {
        let date_vars = ["year", "month", "day", "month_name"];
        let name_vars = ["year", "month", "day", "month_name", "row", "key"];

        Template::new(&self.layout.receipt).check(&date_vars)?;
        Template::new(&self.layout.notes_dir).check(&date_vars)?;
        Template::new(&self.layout.note_name).check(&name_vars)?;

        if self.layout.month_names.len() != 12 {
            return Err(MatchError::Config(format!(
                "layout.month_names needs 12 entries, got {}",
                self.layout.month_names.len()
            )));
        }

        let columns = [
            ("date", &self.columns.date),
            ("amount", &self.columns.amount),
            ("found", &self.columns.found),
        ];
        for (field, names) in columns {
            if names.is_empty() {
                return Err(MatchError::Config(format!("columns.{field} cannot be empty")));
            }
        }

        if self.flags.found == self.flags.not_found {
            return Err(MatchError::Config(
                "flags.found and flags.not_found must differ".to_string(),
            ));
        }
        Ok(())
    }
}
