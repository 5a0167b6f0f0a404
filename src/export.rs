use std::fs;
use std::io::{self, Write};
use std::path::Path;

use rust_xlsxwriter::{Workbook, XlsxError};

use crate::report::{ReportBody, RunSummary};

pub const SHEET_NAME: &str = "Incumplimientos";
const COLUMN_WIDTH: f64 = 25.0;
/// Data rows that fit below the header in one worksheet.
const MAX_SHEET_ROWS: usize = 1_048_575;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to write output")]
    Io(#[from] io::Error),
    #[error("failed to write CSV")]
    Csv(#[from] csv::Error),
    #[error("failed to serialize summary")]
    Json(#[from] serde_json::Error),
    #[error("failed to write spreadsheet")]
    Xlsx(#[from] XlsxError),
    #[error("{0} rows do not fit in one worksheet")]
    TooManyRows(usize),
}

/// Spreadsheet when `path` ends in `.xlsx`, delimited text otherwise.
pub fn write_report_path(body: &ReportBody, delimiter: u8, path: &Path) -> Result<usize, ExportError> {
    let is_xlsx = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("xlsx"));
    if is_xlsx {
        let (buf, n) = write_xlsx(body)?;
        fs::write(path, buf)?;
        Ok(n)
    } else {
        write_csv_path(body, delimiter, path)
    }
}

/// One `Incumplimientos` sheet: header row, then every cell as text.
/// Returns the workbook bytes and the number of data rows.
pub fn write_xlsx(body: &ReportBody) -> Result<(Vec<u8>, usize), ExportError> {
    let (columns, rows) = match body {
        ReportBody::AllCompliant => (&[][..], &[][..]),
        ReportBody::Findings { columns, rows } => (columns.as_slice(), rows.as_slice()),
    };
    if rows.len() > MAX_SHEET_ROWS {
        return Err(ExportError::TooManyRows(rows.len()));
    }

    let mut workbook = Workbook::new();
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name(SHEET_NAME)?;
        for (c, name) in columns.iter().enumerate() {
            let col = c as u16;
            sheet.set_column_width(col, COLUMN_WIDTH)?;
            sheet.write_string(0, col, name)?;
        }
        for (r, row) in rows.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                sheet.write_string(r as u32 + 1, c as u16, cell)?;
            }
        }
    }
    Ok((workbook.save_to_buffer()?, rows.len()))
}

/// Header plus rows. Returns the number of data rows written; an all-compliant
/// body writes nothing.
pub fn write_csv<W: Write>(body: &ReportBody, delimiter: u8, out: W) -> Result<usize, ExportError> {
    let ReportBody::Findings { columns, rows } = body else {
        return Ok(0);
    };

    let mut wtr = csv::WriterBuilder::new().delimiter(delimiter).from_writer(out);
    wtr.write_record(columns)?;
    for row in rows {
        wtr.write_record(row)?;
    }
    wtr.flush()?;
    Ok(rows.len())
}

pub fn write_csv_path(body: &ReportBody, delimiter: u8, path: &Path) -> Result<usize, ExportError> {
    let file = fs::File::create(path)?;
    write_csv(body, delimiter, io::BufWriter::new(file))
}

pub fn write_summary_json<W: Write>(summary: &RunSummary, mut out: W) -> Result<(), ExportError> {
    serde_json::to_writer_pretty(&mut out, summary)?;
    out.write_all(b"\n")?;
    Ok(())
}

pub fn write_summary_path(summary: &RunSummary, path: &Path) -> Result<(), ExportError> {
    let file = fs::File::create(path)?;
    write_summary_json(summary, io::BufWriter::new(file))
}
