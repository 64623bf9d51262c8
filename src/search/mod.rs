// src/search/mod.rs

pub mod currency;

use crate::config::CurrencyConfig;
use regex::Regex;
use std::fmt;

/// What a receipt page must contain to count as the proof for a row.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchKey {
    Invoice(String),
    Amount(f64),
}

impl SearchKey {
    /// Invoice number wins; the amount is the fallback.
    pub fn choose(invoice: Option<&str>, amount: Option<f64>) -> Option<Self> {
        match (invoice.map(str::trim).filter(|s| !s.is_empty()), amount) {
            (Some(inv), _) => Some(SearchKey::Invoice(inv.to_string())),
            (None, Some(value)) => Some(SearchKey::Amount(value)),
            (None, None) => None,
        }
    }

    /// Text as it should appear on the receipt.
    pub fn needle(&self, cfg: &CurrencyConfig) -> String {
        match self {
            SearchKey::Invoice(inv) => inv.clone(),
            SearchKey::Amount(value) => currency::format_amount(*value, cfg),
        }
    }

    /// Short form used in output file names.
    pub fn file_key(&self) -> String {
        match self {
            SearchKey::Invoice(inv) => inv.clone(),
            SearchKey::Amount(value) => currency::plain_amount(*value),
        }
    }

    pub fn matcher(&self, cfg: &CurrencyConfig) -> Result<PageMatcher, regex::Error> {
        PageMatcher::new(&self.needle(cfg))
    }
}

impl fmt::Display for SearchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchKey::Invoice(inv) => write!(f, "invoice '{inv}'"),
            SearchKey::Amount(value) => write!(f, "amount {}", currency::plain_amount(*value)),
        }
    }
}

/// Compiled needle. Gaps between words match any whitespace run, including none,
/// so `R$ 89,90` also hits `R$89,90` or a value split across lines.
#[derive(Debug, Clone)]
pub struct PageMatcher {
    needle: String,
    re: Regex,
}

impl PageMatcher {
    pub fn new(needle: &str) -> Result<Self, regex::Error> {
        let pattern = needle
            .split_whitespace()
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(r"\s*");
        Ok(Self {
            needle: needle.to_string(),
            re: Regex::new(&pattern)?,
        })
    }

    pub fn needle(&self) -> &str {
        &self.needle
    }

    pub fn is_match(&self, page_text: &str) -> bool {
        if self.needle.trim().is_empty() {
            return false;
        }
        let folded = page_text.replace(['\r', '\n'], " ");
        self.re.is_match(&folded)
    }
}
