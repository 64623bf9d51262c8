// src/layout.rs

use crate::config::LayoutConfig;
use crate::error::MatchError;
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use time::Date;

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([A-Za-z_]+)\}").expect("static placeholder pattern"))
}

/// A path fragment with `{name}` placeholders.
#[derive(Debug, Clone)]
pub struct Template(String);

impl Template {
    pub fn new(raw: &str) -> Self {
        Self(raw.to_string())
    }

    /// Reject placeholders outside `allowed`.
    pub fn check(&self, allowed: &[&str]) -> Result<(), MatchError> {
        for cap in placeholder_re().captures_iter(&self.0) {
            if !allowed.contains(&&cap[1]) {
                return Err(MatchError::Config(format!(
                    "unknown placeholder {{{}}} in '{}' (allowed: {})",
                    &cap[1],
                    self.0,
                    allowed.join(", ")
                )));
            }
        }
        Ok(())
    }

    pub fn render(&self, vars: &HashMap<&str, String>) -> String {
        placeholder_re()
            .replace_all(&self.0, |cap: &Captures| {
                vars.get(&cap[1]).cloned().unwrap_or_default()
            })
            .into_owned()
    }
}

/// Resolved folder convention for one run.
#[derive(Debug, Clone)]
pub struct Layout {
    receipt: Template,
    notes_dir: Template,
    note_name: Template,
    month_names: Vec<String>,
}

impl Layout {
    pub fn from_config(cfg: &LayoutConfig) -> Self {
        Self {
            receipt: Template::new(&cfg.receipt),
            notes_dir: Template::new(&cfg.notes_dir),
            note_name: Template::new(&cfg.note_name),
            month_names: cfg.month_names.clone(),
        }
    }

    fn date_vars(&self, date: Date) -> HashMap<&'static str, String> {
        let month = u8::from(date.month());
        let month_name = self
            .month_names
            .get(usize::from(month) - 1)
            .cloned()
            .unwrap_or_default();
        HashMap::from([
            ("year", date.year().to_string()),
            ("month", format!("{month:02}")),
            ("day", format!("{:02}", date.day())),
            ("month_name", month_name),
        ])
    }

    /// Receipt PDF expected for a transaction date.
    pub fn receipt_path(&self, base: &Path, date: Date) -> PathBuf {
        join_relative(base, &self.receipt.render(&self.date_vars(date)))
    }

    /// Output file for an extracted page.
    pub fn note_path(&self, base: &Path, date: Date, row: u32, key: &str) -> PathBuf {
        let mut vars = self.date_vars(date);
        let dir = join_relative(base, &self.notes_dir.render(&vars));
        vars.insert("row", row.to_string());
        vars.insert("key", key.to_string());
        let name = sanitize_file_name(&self.note_name.render(&vars));
        dir.join(format!("{name}.pdf"))
    }
}

/// Join a `/`-separated template result onto `base`, one component at a time.
fn join_relative(base: &Path, rel: &str) -> PathBuf {
    rel.split(['/', '\\'])
        .filter(|part| !part.is_empty() && *part != "." && *part != "..")
        .fold(base.to_path_buf(), |acc, part| acc.join(part))
}

pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim().trim_end_matches('.');
    if trimmed.is_empty() {
        "_".to_string()
    } else {
        trimmed.to_string()
    }
}
