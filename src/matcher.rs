// src/matcher.rs

use crate::config::Config;
use crate::error::{MatchError, RowFailure};
use crate::layout::Layout;
use crate::receipt::{self, ReceiptDocument, WriteStatus};
use crate::report::{RowOutcome, RunSummary};
use crate::spreadsheet::{ColumnMap, Workbook};
use crate::transaction::{self, Transaction};
use calamine::Data;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, info_span, warn};

/// Owns the spreadsheet table for the duration of one run.
pub struct Matcher<'a> {
    config: &'a Config,
    layout: Layout,
    base: PathBuf,
    workbook: Workbook,
    columns: ColumnMap,
}

impl<'a> Matcher<'a> {
    /// Load the spreadsheet and resolve its columns. Nothing is processed yet.
    pub fn new(config: &'a Config, spreadsheet: &Path, base: &Path) -> Result<Self, MatchError> {
        let workbook = Workbook::load(spreadsheet, config.sheet.as_deref())?;

        let header = workbook.active().header();
        let columns = ColumnMap::resolve(header, &config.columns).map_err(|missing| {
            let found: Vec<String> = header.iter().map(|c| c.to_string()).collect();
            MatchError::input(
                spreadsheet,
                format!(
                    "missing column(s) {} (header has: {})",
                    missing.join(", "),
                    found.join(" | ")
                ),
            )
        })?;
        info!(?columns, "Columns resolved");

        Ok(Self {
            config,
            layout: Layout::from_config(&config.layout),
            base: base.to_path_buf(),
            workbook,
            columns,
        })
    }

    /// Process every row in order, then rewrite the spreadsheet once.
    pub fn run(mut self) -> Result<RunSummary, MatchError> {
        let mut summary = RunSummary::default();
        let rows = self.workbook.active().data_len();
        info!(
            rows,
            spreadsheet = %self.workbook.path().display(),
            base = %self.base.display(),
            "Starting reconciliation"
        );

        for idx in 0..rows {
            let row = self.workbook.active().row_number(idx);
            let span = info_span!("row", row);
            let _guard = span.enter();

            let cells = self.workbook.active().data_row(idx).to_vec();
            if transaction::is_blank(&cells) {
                summary.skipped += 1;
                continue;
            }

            let outcome = self.process_row(row, &cells)?;
            let found = matches!(outcome, RowOutcome::Found { .. });
            let label = if found {
                &self.config.flags.found
            } else {
                &self.config.flags.not_found
            };
            self.workbook
                .active_mut()
                .set(idx, self.columns.found, Data::String(label.clone()));
            summary.record(row, outcome);
        }

        summary.spreadsheet = Some(self.workbook.save()?);
        info!(
            found = summary.found_count(),
            not_found = summary.not_found_count(),
            skipped = summary.skipped,
            "Reconciliation complete"
        );
        Ok(summary)
    }

    /// Per-row failures become a not-found outcome; only a failed page write
    /// comes back as an error.
    fn process_row(&self, row: u32, cells: &[Data]) -> Result<RowOutcome, MatchError> {
        let mut tx = match Transaction::from_row(row, cells, &self.columns) {
            Ok(tx) => tx,
            Err(failure) => return Ok(self.not_found(failure)),
        };
        info!(date = %tx.date, invoice = ?tx.invoice, amount = ?tx.amount, "Processing");

        let outcome = match self.locate(&tx, cells) {
            Ok((receipt, page, key)) => {
                let target = self.layout.note_path(&self.base, tx.date, tx.row, &key);
                self.extract(&receipt, page, &target)?;
                RowOutcome::Found {
                    page,
                    receipt: receipt.path().to_path_buf(),
                    output: target,
                }
            }
            Err(failure) => self.not_found(failure),
        };
        tx.found = Some(matches!(outcome, RowOutcome::Found { .. }));
        debug!(found = ?tx.found, "Row processed");
        Ok(outcome)
    }

    /// Find the receipt and the page proving this transaction.
    fn locate(&self, tx: &Transaction, cells: &[Data]) -> Result<(ReceiptDocument, u32, String), RowFailure> {
        let key = tx.search_key(cells, &self.columns)?;
        let path = self.layout.receipt_path(&self.base, tx.date);
        let receipt = ReceiptDocument::open(&path)?;

        let matcher = key
            .matcher(&self.config.currency)
            .map_err(|e| RowFailure::NoPageMatch {
                path: path.clone(),
                key: format!("{key} ({e})"),
            })?;
        let page = receipt.find_page(&matcher).ok_or_else(|| RowFailure::NoPageMatch {
            path: path.clone(),
            key: key.to_string(),
        })?;
        Ok((receipt, page, key.file_key()))
    }

    fn extract(&self, receipt: &ReceiptDocument, page: u32, target: &Path) -> Result<(), MatchError> {
        let bytes = receipt.single_page_bytes(page).map_err(|e| {
            error!(page, error = %e, "Could not build single-page PDF");
            MatchError::write(target, e)
        })?;
        match receipt::write_page(target, &bytes)? {
            WriteStatus::Written => info!(output = %target.display(), page, "Page exported"),
            WriteStatus::Unchanged => info!(output = %target.display(), page, "Page already exported"),
        }
        Ok(())
    }

    fn not_found(&self, failure: RowFailure) -> RowOutcome {
        warn!(reason = %failure, "Transaction not found");
        RowOutcome::NotFound(failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receipt::fixtures::pdf_with_pages;
    use lopdf::Document;
    use std::fs;
    use tempfile::{TempDir, tempdir};

    const HEADER: &str = "Vencimento,Número da Fatura,( R$ ),Encontrado";

    struct Setup {
        _dir: TempDir,
        sheet: PathBuf,
        base: PathBuf,
    }

    fn setup(rows: &[&str]) -> Setup {
        let dir = tempdir().unwrap();
        let base = dir.path().join("comprovantes");
        fs::create_dir_all(&base).unwrap();
        let sheet = dir.path().join("pagamentos.csv");
        let mut text = format!("{HEADER}\n");
        for row in rows {
            text.push_str(row);
            text.push('\n');
        }
        fs::write(&sheet, text).unwrap();
        Setup {
            _dir: dir,
            sheet,
            base,
        }
    }

    fn put_receipt(base: &Path, rel: &str, pages: &[&str]) {
        let path = base.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, pdf_with_pages(pages)).unwrap();
    }

    fn run(s: &Setup, cfg: &Config) -> RunSummary {
        Matcher::new(cfg, &s.sheet, &s.base).unwrap().run().unwrap()
    }

    fn flags(s: &Setup) -> Vec<String> {
        fs::read_to_string(&s.sheet)
            .unwrap()
            .lines()
            .skip(1)
            .map(|l| l.rsplit(',').next().unwrap().to_string())
            .collect()
    }

    fn notes(s: &Setup) -> Vec<String> {
        let dir = s.base.join("Notas");
        let Ok(entries) = fs::read_dir(&dir) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_invoice_found_on_page_two() {
        let s = setup(&["2023-05-10,INV-447,150.00,"]);
        put_receipt(&s.base, "2023/05.pdf", &["Pagamento INV-100", "Pagamento INV-447", "Outro"]);

        let summary = run(&s, &Config::default());
        assert_eq!(summary.found_count(), 1);
        assert_eq!(summary.not_found_count(), 0);
        assert_eq!(flags(&s), vec!["Sim"]);
        assert_eq!(notes(&s), vec!["2 INV-447.pdf"]);

        let out = Document::load(s.base.join("Notas/2 INV-447.pdf")).unwrap();
        assert_eq!(out.get_pages().len(), 1);
        let text = out.extract_text(&[1]).unwrap();
        assert!(text.contains("INV-447"));
        assert!(!text.contains("INV-100"));
    }

    #[test]
    fn test_invoice_absent_from_receipt() {
        let s = setup(&["2023-05-10,INV-447,150.00,"]);
        put_receipt(&s.base, "2023/05.pdf", &["INV-100", "INV-200", "INV-300"]);

        let summary = run(&s, &Config::default());
        assert_eq!(summary.found_count(), 0);
        assert!(matches!(
            summary.outcomes[0].1,
            RowOutcome::NotFound(RowFailure::NoPageMatch { .. })
        ));
        assert_eq!(flags(&s), vec!["Não"]);
        assert!(notes(&s).is_empty());
    }

    #[test]
    fn test_missing_receipt_does_not_stop_later_rows() {
        let s = setup(&[
            "2023-04-02,INV-1,10.00,",
            "2023-05-10,INV-447,150.00,",
        ]);
        put_receipt(&s.base, "2023/05.pdf", &["INV-447"]);

        let summary = run(&s, &Config::default());
        assert!(matches!(
            summary.outcomes[0].1,
            RowOutcome::NotFound(RowFailure::MissingDocument(_))
        ));
        assert_eq!(summary.found_count(), 1);
        assert_eq!(flags(&s), vec!["Não", "Sim"]);
        assert_eq!(notes(&s), vec!["3 INV-447.pdf"]);
    }

    #[test]
    fn test_amount_match_without_invoice() {
        let s = setup(&["10/05/2023,,\"89,90\","]);
        put_receipt(&s.base, "2023/05.pdf", &["Total R$ 10,00", "Valor pago R$ 89,90"]);

        let summary = run(&s, &Config::default());
        assert_eq!(summary.found_count(), 1);
        match &summary.outcomes[0].1 {
            RowOutcome::Found { page, output, .. } => {
                assert_eq!(*page, 2);
                assert!(output.ends_with("Notas/2 89.90.pdf"));
            }
            other => panic!("expected a match, got {other:?}"),
        }
        assert_eq!(flags(&s), vec!["Sim"]);
    }

    #[test]
    fn test_unreadable_receipt_is_not_fatal() {
        let s = setup(&["2023-05-10,INV-447,150.00,"]);
        fs::create_dir_all(s.base.join("2023")).unwrap();
        fs::write(s.base.join("2023/05.pdf"), b"%PDF-1.4 garbage").unwrap();

        let summary = run(&s, &Config::default());
        assert!(matches!(
            summary.outcomes[0].1,
            RowOutcome::NotFound(RowFailure::UnreadableDocument { .. })
        ));
        assert_eq!(flags(&s), vec!["Não"]);
    }

    #[test]
    fn test_bad_date_and_blank_rows() {
        let s = setup(&["someday,INV-1,1.00,", ",,,", "2023-05-10,,,"]);
        put_receipt(&s.base, "2023/05.pdf", &["nothing here"]);

        let summary = run(&s, &Config::default());
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.outcomes.len(), 2);
        assert!(matches!(
            summary.outcomes[0].1,
            RowOutcome::NotFound(RowFailure::InvalidDate(_))
        ));
        assert!(matches!(
            summary.outcomes[1].1,
            RowOutcome::NotFound(RowFailure::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_zero_rows() {
        let s = setup(&[]);
        let before = fs::read_to_string(&s.sheet).unwrap();

        let summary = run(&s, &Config::default());
        assert_eq!(summary.found_count(), 0);
        assert_eq!(summary.not_found_count(), 0);
        assert_eq!(fs::read_to_string(&s.sheet).unwrap(), before);
    }

    #[test]
    fn test_xlsx_formulas_survive_a_run_without_matches() {
        use calamine::Reader;
        use rust_xlsxwriter::{Formula, Workbook as XlsxWorkbook};

        let dir = tempdir().unwrap();
        let base = dir.path().join("comprovantes");
        fs::create_dir_all(&base).unwrap();
        let sheet = dir.path().join("pagamentos.xlsx");
        let mut book = XlsxWorkbook::new();
        let ws = book.add_worksheet();
        for (col, title) in HEADER.split(',').enumerate() {
            ws.write_string(0, col as u16, title).unwrap();
        }
        ws.write_string(0, 4, "Dobro").unwrap();
        ws.write_string(1, 0, "2023-05-10").unwrap();
        ws.write_string(1, 1, "INV-447").unwrap();
        ws.write_number(1, 2, 150.0).unwrap();
        ws.write_formula(1, 4, Formula::new("=C2*2").set_result("300")).unwrap();
        book.save(&sheet).unwrap();

        let summary = Matcher::new(&Config::default(), &sheet, &base).unwrap().run().unwrap();
        assert_eq!(summary.not_found_count(), 1);

        let mut reread = calamine::open_workbook_auto(&sheet).unwrap();
        let name = reread.sheet_names()[0].clone();
        let formulas = reread.worksheet_formula(&name).unwrap();
        assert_eq!(formulas.get_value((1, 4)).map(String::as_str), Some("C2*2"));
        let values = reread.worksheet_range(&name).unwrap();
        assert_eq!(values.get_value((1, 3)), Some(&Data::String("Não".to_string())));
    }

    #[test]
    fn test_second_run_is_identical() {
        let s = setup(&["2023-05-10,INV-447,150.00,", "2023-06-01,INV-9,1.00,"]);
        put_receipt(&s.base, "2023/05.pdf", &["a", "INV-447"]);

        run(&s, &Config::default());
        let sheet_first = fs::read(&s.sheet).unwrap();
        let note_first = fs::read(s.base.join("Notas/2 INV-447.pdf")).unwrap();

        run(&s, &Config::default());
        assert_eq!(fs::read(&s.sheet).unwrap(), sheet_first);
        assert_eq!(fs::read(s.base.join("Notas/2 INV-447.pdf")).unwrap(), note_first);
        assert_eq!(notes(&s), vec!["2 INV-447.pdf"]);
    }

    #[test]
    fn test_missing_found_column_is_fatal() {
        let dir = tempdir().unwrap();
        let sheet = dir.path().join("p.csv");
        fs::write(&sheet, "Vencimento,( R$ )\n2023-05-10,1\n").unwrap();
        let cfg = Config::default();
        let err = Matcher::new(&cfg, &sheet, dir.path()).err().unwrap();
        assert!(matches!(err, MatchError::FatalInput { ref reason, .. } if reason.contains("found")));
        assert_eq!(fs::read_to_string(&sheet).unwrap(), "Vencimento,( R$ )\n2023-05-10,1\n");
    }

    #[test]
    fn test_page_write_failure_aborts_before_saving_sheet() {
        let s = setup(&["2023-05-10,INV-447,150.00,"]);
        put_receipt(&s.base, "2023/05.pdf", &["INV-447"]);
        // A file where the output folder should be.
        fs::write(s.base.join("Notas"), b"not a folder").unwrap();
        let before = fs::read_to_string(&s.sheet).unwrap();

        let cfg = Config::default();
        let err = Matcher::new(&cfg, &s.sheet, &s.base).unwrap().run().unwrap_err();
        assert!(matches!(err, MatchError::WriteFailure { .. }));
        assert_eq!(fs::read_to_string(&s.sheet).unwrap(), before);
    }

    #[test]
    fn test_custom_layout_and_labels() {
        let cfg = Config::parse(
            r#"
            [layout]
            receipt = "Comprovantes de pagamento - {year}/{month}.{year}/{day} {month}.pdf"
            notes_dir = "Comprovantes de pagamento - {year}/{month}.{year}/Notas"
            note_name = "Comprov_nf {key}_{day} {month}"

            [flags]
            found = "yes"
            not_found = "no"
            "#,
        )
        .unwrap();
        let s = setup(&["2024-03-15,NF 12,1.00,"]);
        put_receipt(
            &s.base,
            "Comprovantes de pagamento - 2024/03.2024/15 03.pdf",
            &["Nota NF 12 paga"],
        );

        let summary = run(&s, &cfg);
        assert_eq!(summary.found_count(), 1);
        assert_eq!(flags(&s), vec!["yes"]);
        assert!(
            s.base
                .join("Comprovantes de pagamento - 2024/03.2024/Notas/Comprov_nf NF 12_15 03.pdf")
                .is_file()
        );
    }
}
