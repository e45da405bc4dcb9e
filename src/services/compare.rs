use serde::Serialize;
use tracing::info;

use crate::error::{AppError, Result};
use crate::models::{CompareJobDto, CompareLineItem, CompareResultDto};
use crate::services::fake_backend::FakeBackend;

pub const CSV_HEADER: [&str; 4] = ["Proveedor", "Subtotal", "IVA", "Total"];

/// Totals row paired with its difference from the baseline.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareRow {
    pub invoice_id: String,
    pub vendor: String,
    pub subtotal: f64,
    pub tax: f64,
    pub total: f64,
    pub is_baseline: bool,
    pub delta: String,
}

pub struct CompareService {
    backend: FakeBackend,
}

impl CompareService {
    pub fn new(backend: FakeBackend) -> Self {
        CompareService { backend }
    }

    pub async fn create_job(&self, invoice_ids: &[String]) -> Result<CompareJobDto> {
        if invoice_ids.is_empty() {
            return Err(AppError::Validation("select at least one invoice".into()));
        }
        let job = self.backend.create_compare_job(invoice_ids).await;
        info!(job = %job.id, count = invoice_ids.len(), "Compare job created");
        Ok(job)
    }

    pub async fn get_result(
        &self,
        baseline_id: &str,
        invoice_ids: &[String],
    ) -> Result<CompareResultDto> {
        self.backend.get_compare_result(baseline_id, invoice_ids).await
    }
}

fn signed(value: f64, decimals: usize) -> String {
    let sign = if value >= 0.0 { "+" } else { "" };
    format!("{}{:.*}", sign, decimals, value)
}

/// `"+12.40 (+3.1%)"`. The percentage is 0 when the baseline total is 0.
pub fn format_total_delta(baseline_total: f64, total: f64) -> String {
    let diff = total - baseline_total;
    let pct = if baseline_total == 0.0 {
        0.0
    } else {
        diff / baseline_total * 100.0
    };
    let sign = if diff >= 0.0 { "+" } else { "" };
    format!("{}{:.2} ({}{:.1}%)", sign, diff, sign, pct)
}

/// Average of the per-invoice totals minus the baseline's own total.
pub fn format_line_delta(line: &CompareLineItem, baseline_id: &str) -> String {
    if line.by_invoice.is_empty() {
        return "-".to_string();
    }
    let base = line.by_invoice.get(baseline_id).map(|v| v.total).unwrap_or(0.0);
    let sum = line.by_invoice.values().map(|v| v.total).sum::<f64>();
    let avg = sum / line.by_invoice.len() as f64;
    signed(avg - base, 2)
}

pub fn compare_rows(result: &CompareResultDto) -> Vec<CompareRow> {
    let baseline_total = result
        .totals
        .iter()
        .find(|t| t.invoice_id == result.baseline_id)
        .map(|t| t.total);

    result
        .totals
        .iter()
        .map(|row| CompareRow {
            invoice_id: row.invoice_id.clone(),
            vendor: row.vendor.clone(),
            subtotal: row.subtotal,
            tax: row.tax,
            total: row.total,
            is_baseline: row.invoice_id == result.baseline_id,
            delta: baseline_total
                .map(|base| format_total_delta(base, row.total))
                .unwrap_or_else(|| "-".to_string()),
        })
        .collect()
}

pub fn export_csv(result: &CompareResultDto) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;
    for row in &result.totals {
        writer.write_record([
            row.vendor.clone(),
            row.subtotal.to_string(),
            row.tax.to_string(),
            row.total.to_string(),
        ])?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| AppError::Export(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| AppError::Export(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CompareTotalsRow, LineValues};
    use std::collections::BTreeMap;

    fn totals(id: &str, vendor: &str, total: f64) -> CompareTotalsRow {
        CompareTotalsRow {
            invoice_id: id.to_string(),
            vendor: vendor.to_string(),
            subtotal: total,
            tax: 0.0,
            total,
        }
    }

    fn result() -> CompareResultDto {
        CompareResultDto {
            baseline_id: "a".to_string(),
            has_line_items: false,
            vendors: vec!["Acme Corp".into(), "Café Central, S.L.".into()],
            currency: "EUR".to_string(),
            totals: vec![totals("a", "Acme Corp", 110.0), totals("b", "Café Central, S.L.", 121.0)],
            line_items: None,
        }
    }

    #[test]
    fn total_delta_matches_display_format() {
        assert_eq!(format_total_delta(110.0, 121.0), "+11.00 (+10.0%)");
        assert_eq!(format_total_delta(121.0, 110.0), "-11.00 (-9.1%)");
        assert_eq!(format_total_delta(0.0, 5.0), "+5.00 (+0.0%)");
        assert_eq!(format_total_delta(50.0, 50.0), "+0.00 (+0.0%)");
    }

    #[test]
    fn line_delta_uses_average_of_present_invoices() {
        let mut by_invoice = BTreeMap::new();
        let values = |total: f64| LineValues {
            unit_price: total,
            quantity: 1.0,
            total,
        };
        by_invoice.insert("a".to_string(), values(10.0));
        by_invoice.insert("b".to_string(), values(14.0));
        let line = CompareLineItem {
            description: "Pan".into(),
            unit_price: 10.0,
            quantity: 1.0,
            total: 10.0,
            by_invoice,
        };
        assert_eq!(format_line_delta(&line, "a"), "+2.00");
        assert_eq!(format_line_delta(&line, "b"), "-2.00");
    }

    #[test]
    fn rows_flag_the_baseline() {
        let rows = compare_rows(&result());
        assert!(rows[0].is_baseline);
        assert_eq!(rows[0].delta, "+0.00 (+0.0%)");
        assert_eq!(rows[1].delta, "+11.00 (+10.0%)");
    }

    #[test]
    fn csv_has_header_and_quotes_commas() {
        let csv = export_csv(&result()).unwrap();
        let lines = csv.lines().collect::<Vec<_>>();
        assert_eq!(lines[0], "Proveedor,Subtotal,IVA,Total");
        assert_eq!(lines[1], "Acme Corp,110,0,110");
        assert_eq!(lines[2], "\"Café Central, S.L.\",121,0,121");
    }
}
