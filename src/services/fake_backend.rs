use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::{AppError, Result};
use crate::models::{
    CompareJobDto, CompareJobStatus, CompareLineItem, CompareResultDto, CompareTotalsRow,
    InvoiceDto, InvoiceFilters, InvoiceLineDto, InvoiceListResponse, InvoiceStatus, LineValues,
    SortDirection, SortField, SortSpec,
};
use crate::utils::{next_timestamp, round2};

const VENDORS: [&str; 5] = [
    "Acme Corp",
    "Logística Norte",
    "IberFoods",
    "Café Central",
    "Electricidad Sur",
];
const CURRENCIES: [&str; 2] = ["EUR", "USD"];
const SEED_STATUSES: [InvoiceStatus; 4] = [
    InvoiceStatus::Parsed,
    InvoiceStatus::Parsed,
    InvoiceStatus::Processing,
    InvoiceStatus::Uploaded,
];
const TAX_RATE: f64 = 0.21;
const SEED_COUNT: usize = 18;

/// Simulated network delay per operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencyProfile {
    pub list: Duration,
    pub get: Duration,
    pub delete: Duration,
    pub statuses: Duration,
    pub compare_job: Duration,
    pub compare_result: Duration,
    pub retry: Duration,
    pub upload: Duration,
}

impl LatencyProfile {
    pub fn standard() -> Self {
        LatencyProfile {
            list: Duration::from_millis(300),
            get: Duration::from_millis(200),
            delete: Duration::from_millis(200),
            statuses: Duration::from_millis(300),
            compare_job: Duration::from_millis(400),
            compare_result: Duration::from_millis(600),
            retry: Duration::from_millis(1200),
            upload: Duration::from_millis(1500),
        }
    }

    pub fn instant() -> Self {
        LatencyProfile {
            list: Duration::ZERO,
            get: Duration::ZERO,
            delete: Duration::ZERO,
            statuses: Duration::ZERO,
            compare_job: Duration::ZERO,
            compare_result: Duration::ZERO,
            retry: Duration::ZERO,
            upload: Duration::ZERO,
        }
    }
}

impl Default for LatencyProfile {
    fn default() -> Self {
        Self::standard()
    }
}

struct Generator {
    rng: StdRng,
}

impl Generator {
    fn money(&mut self, min: f64, max: f64) -> f64 {
        round2(min + self.rng.gen::<f64>() * (max - min))
    }

    fn lines(&mut self) -> Vec<InvoiceLineDto> {
        let count = self.rng.gen_range(2..=5);
        (0..count)
            .map(|i| {
                let quantity = f64::from(self.rng.gen_range(1..=4u32));
                let unit_price = self.money(6.0, 42.0);
                InvoiceLineDto {
                    id: format!("line-{}", uuid::Uuid::new_v4()),
                    description: format!("Concepto {}", i + 1),
                    quantity,
                    unit_price,
                    tax_rate: Some(TAX_RATE),
                    total: round2(quantity * unit_price),
                }
            })
            .collect()
    }

    fn invoice(&mut self, id: &str, now: DateTime<Utc>) -> InvoiceDto {
        let lines = self.lines();
        let (subtotal, tax, total) = totals_for(&lines);
        let issued_at = now - ChronoDuration::days(self.rng.gen_range(0..20));
        let issue_date = issued_at.date_naive();
        let status = SEED_STATUSES[self.rng.gen_range(0..SEED_STATUSES.len())];
        let notes = if self.rng.gen::<f64>() > 0.7 {
            Some("Revisar cargos de transporte.".to_string())
        } else {
            None
        };

        InvoiceDto {
            id: id.to_string(),
            number: format!("INV-{}", self.rng.gen_range(1000..10000)),
            vendor: VENDORS[self.rng.gen_range(0..VENDORS.len())].to_string(),
            currency: CURRENCIES[self.rng.gen_range(0..CURRENCIES.len())].to_string(),
            status,
            issue_date,
            due_date: Some(issue_date + ChronoDuration::days(14)),
            confidence: Some(round2(0.72 + self.rng.gen::<f64>() * 0.26)),
            subtotal,
            tax,
            total,
            notes,
            original_file_name: format!("factura-{}.pdf", id),
            original_url: Some("/assets/mock/invoice.pdf".to_string()),
            lines: Some(lines),
            created_at: issued_at,
            updated_at: now,
        }
    }

    /// Fresh extraction result for an existing record.
    fn reparse(&mut self, invoice: &mut InvoiceDto) {
        let lines = self.lines();
        let (subtotal, tax, total) = totals_for(&lines);
        invoice.subtotal = subtotal;
        invoice.tax = tax;
        invoice.total = total;
        invoice.lines = Some(lines);
        invoice.confidence = Some(round2(0.72 + self.rng.gen::<f64>() * 0.26));
        invoice.status = InvoiceStatus::Parsed;
    }
}

/// Subtotal, tax and total, rounded after every step.
pub fn totals_for(lines: &[InvoiceLineDto]) -> (f64, f64, f64) {
    let subtotal = lines.iter().fold(0.0, |acc, line| round2(acc + line.total));
    let tax = round2(subtotal * TAX_RATE);
    let total = round2(subtotal + tax);
    (subtotal, tax, total)
}

fn active(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

pub fn matches_filters(invoice: &InvoiceDto, filters: &InvoiceFilters) -> bool {
    if let Some(vendor) = active(&filters.vendor) {
        if !invoice.vendor.to_lowercase().contains(&vendor.to_lowercase()) {
            return false;
        }
    }
    if let Some(status) = filters.status {
        if invoice.status != status {
            return false;
        }
    }
    if let Some(currency) = active(&filters.currency) {
        if invoice.currency != currency {
            return false;
        }
    }
    if let Some(from) = filters.date_from {
        if invoice.issue_date < from {
            return false;
        }
    }
    if let Some(to) = filters.date_to {
        if invoice.issue_date > to {
            return false;
        }
    }
    if let Some(min) = filters.total_min {
        if invoice.total < min {
            return false;
        }
    }
    if let Some(max) = filters.total_max {
        if invoice.total > max {
            return false;
        }
    }
    if let Some(query) = active(&filters.query) {
        let haystack = format!(
            "{} {} {}",
            invoice.number, invoice.vendor, invoice.original_file_name
        )
        .to_lowercase();
        if !haystack.contains(&query.to_lowercase()) {
            return false;
        }
    }
    true
}

enum SortKey<'a> {
    Text(&'a str),
    Date(NaiveDate),
    Time(DateTime<Utc>),
    Number(f64),
}

impl SortKey<'_> {
    fn compare(&self, other: &SortKey<'_>) -> Ordering {
        match (self, other) {
            (SortKey::Text(a), SortKey::Text(b)) => a.cmp(b),
            (SortKey::Date(a), SortKey::Date(b)) => a.cmp(b),
            (SortKey::Time(a), SortKey::Time(b)) => a.cmp(b),
            (SortKey::Number(a), SortKey::Number(b)) => a.total_cmp(b),
            _ => Ordering::Equal,
        }
    }
}

fn sort_key(invoice: &InvoiceDto, field: SortField) -> Option<SortKey<'_>> {
    Some(match field {
        SortField::Number => SortKey::Text(&invoice.number),
        SortField::Vendor => SortKey::Text(&invoice.vendor),
        SortField::Currency => SortKey::Text(&invoice.currency),
        SortField::Status => SortKey::Text(invoice.status.as_str()),
        SortField::IssueDate => SortKey::Date(invoice.issue_date),
        SortField::DueDate => SortKey::Date(invoice.due_date?),
        SortField::Confidence => SortKey::Number(invoice.confidence?),
        SortField::Subtotal => SortKey::Number(invoice.subtotal),
        SortField::Tax => SortKey::Number(invoice.tax),
        SortField::Total => SortKey::Number(invoice.total),
        SortField::OriginalFileName => SortKey::Text(&invoice.original_file_name),
        SortField::CreatedAt => SortKey::Time(invoice.created_at),
        SortField::UpdatedAt => SortKey::Time(invoice.updated_at),
    })
}

/// Stable sort; records missing the sort field go last in either direction.
pub fn sort_invoices(items: &mut [InvoiceDto], sort: SortSpec) {
    let descending = match sort.direction {
        SortDirection::None => return,
        SortDirection::Asc => false,
        SortDirection::Desc => true,
    };
    items.sort_by(|a, b| match (sort_key(a, sort.active), sort_key(b, sort.active)) {
        (Some(left), Some(right)) => {
            let ordering = left.compare(&right);
            if descending {
                ordering.reverse()
            } else {
                ordering
            }
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

pub fn build_compare_result(
    invoices: &[InvoiceDto],
    baseline_id: &str,
    invoice_ids: &[String],
) -> Result<CompareResultDto> {
    let wanted = invoice_ids.iter().map(String::as_str).collect::<HashSet<_>>();
    let selected = invoices
        .iter()
        .filter(|i| wanted.contains(i.id.as_str()))
        .collect::<Vec<_>>();
    let Some(first) = selected.first() else {
        return Err(AppError::NotFound(format!(
            "no invoices to compare among [{}]",
            invoice_ids.join(", ")
        )));
    };

    let baseline = selected
        .iter()
        .find(|i| i.id == baseline_id)
        .copied()
        .unwrap_or(*first);
    let has_line_items = selected.iter().all(|i| i.has_lines());

    let totals = selected
        .iter()
        .map(|i| CompareTotalsRow {
            invoice_id: i.id.clone(),
            vendor: i.vendor.clone(),
            subtotal: i.subtotal,
            tax: i.tax,
            total: i.total,
        })
        .collect();

    let line_items = if has_line_items {
        let baseline_lines = baseline.lines.as_deref().unwrap_or_default();
        Some(
            baseline_lines
                .iter()
                .map(|line| {
                    let mut by_invoice = BTreeMap::new();
                    for invoice in &selected {
                        let matched = invoice
                            .lines
                            .iter()
                            .flatten()
                            .find(|candidate| candidate.description == line.description);
                        // Invoices without a line of the same description are left out.
                        if let Some(matched) = matched {
                            by_invoice.insert(
                                invoice.id.clone(),
                                LineValues {
                                    unit_price: matched.unit_price,
                                    quantity: matched.quantity,
                                    total: matched.total,
                                },
                            );
                        }
                    }
                    CompareLineItem {
                        description: line.description.clone(),
                        unit_price: line.unit_price,
                        quantity: line.quantity,
                        total: line.total,
                        by_invoice,
                    }
                })
                .collect(),
        )
    } else {
        None
    };

    Ok(CompareResultDto {
        baseline_id: baseline.id.clone(),
        has_line_items,
        vendors: selected.iter().map(|i| i.vendor.clone()).collect(),
        currency: first.currency.clone(),
        totals,
        line_items,
    })
}

struct Inner {
    invoices: watch::Sender<Arc<Vec<InvoiceDto>>>,
    latency: Mutex<LatencyProfile>,
    generator: Mutex<Generator>,
}

/// In-memory stand-in for the invoice-processing service.
#[derive(Clone)]
pub struct FakeBackend {
    inner: Arc<Inner>,
}

impl FakeBackend {
    pub fn new(latency: LatencyProfile) -> Self {
        Self::from_rng(StdRng::from_entropy(), latency)
    }

    pub fn seeded(seed: u64, latency: LatencyProfile) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed), latency)
    }

    fn from_rng(rng: StdRng, latency: LatencyProfile) -> Self {
        let mut generator = Generator { rng };
        let now = Utc::now();
        let invoices = (1..=SEED_COUNT)
            .map(|i| generator.invoice(&format!("inv-{}", i), now))
            .collect();
        Self::build(invoices, generator, latency)
    }

    pub fn with_invoices(invoices: Vec<InvoiceDto>, latency: LatencyProfile) -> Self {
        let generator = Generator {
            rng: StdRng::from_entropy(),
        };
        Self::build(invoices, generator, latency)
    }

    fn build(invoices: Vec<InvoiceDto>, generator: Generator, latency: LatencyProfile) -> Self {
        let (tx, _) = watch::channel(Arc::new(invoices));
        FakeBackend {
            inner: Arc::new(Inner {
                invoices: tx,
                latency: Mutex::new(latency),
                generator: Mutex::new(generator),
            }),
        }
    }

    pub fn snapshot(&self) -> Arc<Vec<InvoiceDto>> {
        self.inner.invoices.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<InvoiceDto>>> {
        self.inner.invoices.subscribe()
    }

    pub async fn list_invoices(
        &self,
        filters: &InvoiceFilters,
        page_index: usize,
        page_size: usize,
        sort: SortSpec,
    ) -> InvoiceListResponse {
        let snapshot = self.snapshot();
        let mut filtered = snapshot
            .iter()
            .filter(|i| matches_filters(i, filters))
            .cloned()
            .collect::<Vec<_>>();
        sort_invoices(&mut filtered, sort);

        let total = filtered.len();
        let start = page_index.saturating_mul(page_size);
        let items = filtered.into_iter().skip(start).take(page_size).collect();

        tokio::time::sleep(self.latency().list).await;
        debug!(total, page_index, page_size, "Listed invoices");
        InvoiceListResponse { items, total }
    }

    pub async fn get_invoice(&self, id: &str) -> Result<InvoiceDto> {
        let found = self.snapshot().iter().find(|i| i.id == id).cloned();
        tokio::time::sleep(self.latency().get).await;
        found.ok_or_else(|| AppError::NotFound(id.to_string()))
    }

    pub async fn delete_invoice(&self, id: &str) -> Result<()> {
        let removed = self.write(|list| {
            let index = list.iter().position(|i| i.id == id)?;
            Some(list.remove(index))
        });
        tokio::time::sleep(self.latency().delete).await;
        match removed {
            Some(_) => {
                info!(id, "Invoice deleted");
                Ok(())
            }
            None => Err(AppError::NotFound(id.to_string())),
        }
    }

    /// Flips the record to `processing` now and to `parsed` after the retry delay.
    pub async fn retry_extraction(&self, id: &str) -> Result<InvoiceDto> {
        let updated = self
            .update_invoice(id, |invoice| invoice.status = InvoiceStatus::Processing)
            .ok_or_else(|| AppError::NotFound(id.to_string()))?;
        info!(id, "Extraction retry started");

        let backend = self.clone();
        let id = id.to_string();
        let delay = self.latency().retry;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            backend.complete_extraction(&id);
        });
        Ok(updated)
    }

    /// Inserts a `processing` record for an uploaded file and resolves it later.
    pub async fn register_upload(&self, file_name: &str, size: u64, mime_type: &str) -> InvoiceDto {
        let id = format!("inv-{}", uuid::Uuid::new_v4());
        let now = Utc::now();
        let mut created = self.with_generator(|g| g.invoice(&id, now));
        created.status = InvoiceStatus::Processing;
        created.original_file_name = file_name.to_string();
        created.lines = None;
        created.subtotal = 0.0;
        created.tax = 0.0;
        created.total = 0.0;
        created.created_at = now;

        let inserted = created.clone();
        self.write(move |list| {
            list.insert(0, inserted);
            Some(())
        });
        info!(id = %created.id, file_name, size, mime_type, "Upload registered");

        let backend = self.clone();
        let id = created.id.clone();
        let delay = self.latency().upload;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            backend.complete_extraction(&id);
        });
        created
    }

    pub async fn get_processing_statuses(&self, ids: &[String]) -> Vec<InvoiceDto> {
        let wanted = ids.iter().map(String::as_str).collect::<HashSet<_>>();
        let items = self
            .snapshot()
            .iter()
            .filter(|i| wanted.contains(i.id.as_str()))
            .cloned()
            .collect();
        tokio::time::sleep(self.latency().statuses).await;
        items
    }

    pub async fn create_compare_job(&self, invoice_ids: &[String]) -> CompareJobDto {
        tokio::time::sleep(self.latency().compare_job).await;
        CompareJobDto {
            id: format!("cmp-{}", uuid::Uuid::new_v4()),
            invoice_ids: invoice_ids.to_vec(),
            status: CompareJobStatus::Processing,
            errors: None,
        }
    }

    pub async fn get_compare_result(
        &self,
        baseline_id: &str,
        invoice_ids: &[String],
    ) -> Result<CompareResultDto> {
        let result = build_compare_result(&self.snapshot(), baseline_id, invoice_ids);
        tokio::time::sleep(self.latency().compare_result).await;
        result
    }

    fn complete_extraction(&self, id: &str) {
        let mut parsed = match self.snapshot().iter().find(|i| i.id == id) {
            Some(invoice) => invoice.clone(),
            None => {
                debug!(id, "Invoice removed before extraction finished");
                return;
            }
        };
        self.with_generator(|g| g.reparse(&mut parsed));
        let applied = self.update_invoice(id, move |invoice| {
            let updated_at = invoice.updated_at;
            *invoice = parsed;
            invoice.updated_at = updated_at;
        });
        if applied.is_some() {
            info!(id, "Extraction finished");
        }
    }

    pub fn latency(&self) -> LatencyProfile {
        match self.inner.latency.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Replaces the delays used by calls started from now on.
    pub fn set_latency(&self, latency: LatencyProfile) {
        match self.inner.latency.lock() {
            Ok(mut guard) => *guard = latency,
            Err(poisoned) => *poisoned.into_inner() = latency,
        }
    }

    fn with_generator<T>(&self, f: impl FnOnce(&mut Generator) -> T) -> T {
        let mut guard = match self.inner.generator.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    /// Applies `f` to a record and bumps its `updated_at`. Returns the updated record.
    fn update_invoice(&self, id: &str, f: impl FnOnce(&mut InvoiceDto)) -> Option<InvoiceDto> {
        self.write(|list| {
            let invoice = list.iter_mut().find(|i| i.id == id)?;
            let previous = invoice.updated_at;
            f(invoice);
            invoice.updated_at = next_timestamp(Some(previous));
            Some(invoice.clone())
        })
    }

    /// Copy-on-write mutation of the whole collection. Subscribers are notified only
    /// when `f` returns `Some`.
    fn write<T>(&self, f: impl FnOnce(&mut Vec<InvoiceDto>) -> Option<T>) -> Option<T> {
        let mut outcome = None;
        self.inner.invoices.send_if_modified(|current| {
            let mut next = current.as_ref().clone();
            match f(&mut next) {
                Some(value) => {
                    *current = Arc::new(next);
                    outcome = Some(value);
                    true
                }
                None => false,
            }
        });
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(description: &str, quantity: f64, unit_price: f64) -> InvoiceLineDto {
        InvoiceLineDto {
            id: format!("line-{}", description),
            description: description.to_string(),
            quantity,
            unit_price,
            tax_rate: Some(TAX_RATE),
            total: round2(quantity * unit_price),
        }
    }

    fn invoice(id: &str, total: f64, lines: Option<Vec<InvoiceLineDto>>) -> InvoiceDto {
        let now = Utc::now();
        InvoiceDto {
            id: id.to_string(),
            number: format!("INV-{}", id),
            vendor: format!("Vendor {}", id),
            currency: "EUR".to_string(),
            status: InvoiceStatus::Parsed,
            issue_date: NaiveDate::from_ymd_opt(2025, 1, 10).unwrap(),
            due_date: None,
            confidence: None,
            subtotal: total,
            tax: 0.0,
            total,
            notes: None,
            original_file_name: format!("{}.pdf", id),
            original_url: None,
            lines,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn totals_round_at_each_step() {
        let lines = vec![line("a", 2.0, 3.0), line("b", 1.0, 4.0)];
        let (subtotal, tax, total) = totals_for(&lines);
        assert_eq!(subtotal, 10.0);
        assert_eq!(tax, 2.1);
        assert_eq!(total, 12.1);
    }

    #[test]
    fn seeded_backend_is_deterministic_apart_from_ids() {
        let a = FakeBackend::seeded(7, LatencyProfile::instant()).snapshot();
        let b = FakeBackend::seeded(7, LatencyProfile::instant()).snapshot();
        assert_eq!(a.len(), SEED_COUNT);
        let summary = |v: &Vec<InvoiceDto>| {
            v.iter()
                .map(|i| (i.id.clone(), i.vendor.clone(), i.total))
                .collect::<Vec<_>>()
        };
        assert_eq!(summary(&a), summary(&b));
        for inv in a.iter() {
            let (subtotal, tax, total) = totals_for(inv.lines.as_deref().unwrap());
            assert_eq!((inv.subtotal, inv.tax, inv.total), (subtotal, tax, total));
        }
    }

    #[test]
    fn missing_sort_values_go_last() {
        let mut items = vec![
            invoice("a", 1.0, None),
            invoice("b", 2.0, None),
            invoice("c", 3.0, None),
        ];
        items[1].confidence = Some(0.9);
        items[2].confidence = Some(0.8);
        let sort = SortSpec {
            active: SortField::Confidence,
            direction: SortDirection::Desc,
        };
        sort_invoices(&mut items, sort);
        let ids = items.iter().map(|i| i.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[test]
    fn compare_omits_unmatched_lines() {
        let base = invoice("base", 10.0, Some(vec![line("Pan", 1.0, 2.0), line("Leche", 2.0, 1.0)]));
        let other = invoice("other", 12.0, Some(vec![line("Pan", 1.0, 2.5)]));
        let ids = vec!["base".to_string(), "other".to_string()];
        let result = build_compare_result(&[base, other], "base", &ids).unwrap();

        let items = result.line_items.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].by_invoice.len(), 2);
        assert_eq!(items[0].by_invoice["other"].unit_price, 2.5);
        assert_eq!(items[1].by_invoice.len(), 1);
        assert!(items[1].by_invoice.contains_key("base"));
    }

    #[test]
    fn unknown_baseline_falls_back_to_first_selected() {
        let a = invoice("a", 10.0, None);
        let b = invoice("b", 11.0, None);
        let ids = vec!["b".to_string(), "a".to_string()];
        let result = build_compare_result(&[a, b], "zzz", &ids).unwrap();
        assert_eq!(result.baseline_id, "a");
        assert!(!result.has_line_items);
        assert!(result.line_items.is_none());
    }

    #[test]
    fn compare_without_matches_is_not_found() {
        let ids = vec!["nope".to_string()];
        let err = build_compare_result(&[invoice("a", 1.0, None)], "nope", &ids).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn failed_write_does_not_notify() {
        let backend = FakeBackend::seeded(1, LatencyProfile::instant());
        let rx = backend.subscribe();
        assert!(backend.delete_invoice("missing").await.is_err());
        assert!(!rx.has_changed().unwrap());
        backend.delete_invoice("inv-1").await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(backend.snapshot().len(), SEED_COUNT - 1);
    }
}
