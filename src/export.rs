// src/export.rs

use rust_xlsxwriter::{Format, Workbook};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use tracing::info;

use crate::reconcile::{LedgerRow, format_cents};

pub const SHEET_NAME: &str = "Comissões";

pub const HEADER: [&str; 7] = [
    "Ano",
    "Mês",
    "Consultor",
    "Peças (R$)",
    "Serviços (R$)",
    "Total Geral (R$)",
    "Comissão (R$)",
];

const BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("export I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("XLSX error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("line {line}: cannot parse {value:?} as an amount")]
    Amount { line: usize, value: String },
}

/// Amount columns of one exported row, in centavos.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedAmounts {
    pub consultant: String,
    pub parts_cents: i64,
    pub services_cents: i64,
    pub total_cents: i64,
    pub commission_cents: i64,
}

impl ExportedAmounts {
    /// Same consultant and same figures, to the centavo.
    pub fn matches(&self, row: &LedgerRow) -> bool {
        self.consultant == row.consultant()
            && self.parts_cents == row.parts_cents()
            && self.services_cents == row.services_cents()
            && self.total_cents == row.total_cents()
            && self.commission_cents == row.commission_cents()
    }
}

/// Write rows as UTF-8 CSV with a byte-order mark, so spreadsheet tools
/// pick up the accented headers.
pub fn write_csv<W: Write>(mut out: W, rows: &[LedgerRow]) -> Result<(), ExportError> {
    out.write_all(BOM)?;
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(HEADER)?;
    for row in rows {
        let period = row.period();
        writer.write_record([
            period.year.to_string(),
            period.month.name().to_string(),
            row.consultant().to_string(),
            format_cents(row.parts_cents()),
            format_cents(row.services_cents()),
            format_cents(row.total_cents()),
            format_cents(row.commission_cents()),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn save_csv(path: impl AsRef<Path>, rows: &[LedgerRow]) -> Result<(), ExportError> {
    let path = path.as_ref();
    create_parent(path)?;
    write_csv(BufWriter::new(File::create(path)?), rows)?;
    info!(path = %path.display(), rows = rows.len(), "CSV exported");
    Ok(())
}

/// One sheet named `Comissões`, amounts as numbers with two decimals.
pub fn save_xlsx(path: impl AsRef<Path>, rows: &[LedgerRow]) -> Result<(), ExportError> {
    let path = path.as_ref();
    create_parent(path)?;

    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let money = Format::new().set_num_format("0.00");

    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;
    for (col, title) in HEADER.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *title, &bold)?;
    }

    for (i, row) in rows.iter().enumerate() {
        let r = i as u32 + 1;
        let period = row.period();
        sheet.write_number(r, 0, f64::from(period.year))?;
        sheet.write_string(r, 1, period.month.name())?;
        sheet.write_string(r, 2, row.consultant())?;
        let amounts = [
            row.parts_cents(),
            row.services_cents(),
            row.total_cents(),
            row.commission_cents(),
        ];
        for (offset, cents) in amounts.into_iter().enumerate() {
            sheet.write_number_with_format(r, 3 + offset as u16, cents as f64 / 100.0, &money)?;
        }
    }

    workbook.save(path)?;
    info!(path = %path.display(), rows = rows.len(), "XLSX exported");
    Ok(())
}

/// Read the amount columns back from an exported CSV.
pub fn read_csv_amounts<R: Read>(mut input: R) -> Result<Vec<ExportedAmounts>, ExportError> {
    let mut bytes = Vec::new();
    input.read_to_end(&mut bytes)?;
    let body = bytes.strip_prefix(BOM).unwrap_or(&bytes[..]);

    let mut reader = csv::Reader::from_reader(body);
    let mut out = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record?;
        let line = idx + 2;
        let cents = |col: usize| -> Result<i64, ExportError> {
            let value = record.get(col).unwrap_or_default();
            parse_export_cents(value).ok_or_else(|| ExportError::Amount {
                line,
                value: value.to_string(),
            })
        };
        out.push(ExportedAmounts {
            consultant: record.get(2).unwrap_or_default().to_string(),
            parts_cents: cents(3)?,
            services_cents: cents(4)?,
            total_cents: cents(5)?,
            commission_cents: cents(6)?,
        });
    }
    Ok(out)
}

fn parse_export_cents(value: &str) -> Option<i64> {
    let v: f64 = value.trim().parse().ok()?;
    v.is_finite().then(|| (v * 100.0).round() as i64)
}

fn create_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::{Month, Period};

    fn rows() -> Vec<LedgerRow> {
        let p = Period::new(2025, Month::Marco);
        vec![
            LedgerRow::new(p, "TIAGO FERNANDES DE LIMA", 150_000, 20_050, 0.01),
            LedgerRow::new(p, "ROSEANE CRUZ", 0, 99_999, 0.01),
            LedgerRow::new(p, "ANA SOUZA", 0, 0, 0.01),
        ]
    }

    #[test]
    fn test_csv_has_bom_and_header() {
        let mut buf = Vec::new();
        write_csv(&mut buf, &rows()).unwrap();
        assert!(buf.starts_with(BOM));
        let text = String::from_utf8(buf[BOM.len()..].to_vec()).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("Ano,Mês,Consultor,Peças (R$),Serviços (R$),Total Geral (R$),Comissão (R$)")
        );
        assert_eq!(
            lines.next(),
            Some("2025,Março,TIAGO FERNANDES DE LIMA,1500.00,200.50,1700.50,17.01")
        );
    }

    #[test]
    fn test_csv_amounts_round_trip() {
        let original = rows();
        let mut buf = Vec::new();
        write_csv(&mut buf, &original).unwrap();

        let back = read_csv_amounts(buf.as_slice()).unwrap();
        assert_eq!(back.len(), original.len());
        for (row, amounts) in original.iter().zip(&back) {
            assert!(amounts.matches(row), "{amounts:?} vs {row:?}");
        }
    }

    #[test]
    fn test_bad_amount_reported() {
        let csv = "Ano,Mês,Consultor,P,S,T,C\n2025,Março,ANA,abc,0,0,0\n";
        let err = read_csv_amounts(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, ExportError::Amount { line: 2, .. }));
    }

    #[test]
    fn test_save_files() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("out/comissao.csv");
        let xlsx_path = dir.path().join("out/comissao.xlsx");

        save_csv(&csv_path, &rows()).unwrap();
        save_xlsx(&xlsx_path, &rows()).unwrap();

        let back = read_csv_amounts(File::open(&csv_path).unwrap()).unwrap();
        assert_eq!(back.len(), 3);
        let xlsx = std::fs::read(&xlsx_path).unwrap();
        assert!(xlsx.starts_with(b"PK"));
    }
}
