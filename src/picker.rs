use rfd::FileDialog;
use std::path::PathBuf;

pub fn pick_spreadsheet() -> Option<PathBuf> {
    println!("Select the transactions spreadsheet...");
    FileDialog::new()
        .add_filter("Spreadsheets", &["xlsx", "xlsm", "xls", "xlsb", "ods", "csv"])
        .set_title("Select the transactions spreadsheet")
        .pick_file()
}

pub fn pick_base_folder() -> Option<PathBuf> {
    println!("Select the base folder holding the receipt PDFs...");
    FileDialog::new()
        .set_title("Select the receipts base folder")
        .pick_folder()
}
