use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::models::{
    CompareJobDto, CompareResultDto, InvoiceDto, InvoiceFilters, InvoiceListResponse,
    InvoiceStatus, SortDirection, SortField, SortSpec, UploadItemDto,
};
use crate::services::compare::{compare_rows, export_csv, format_line_delta, CompareRow};
use crate::services::poller::StatusPoller;
use crate::services::state::AppState;
use crate::services::upload::{validate_file, UploadFile};
use crate::utils::parse_date;

#[derive(Debug, Default, Deserialize)]
pub struct InvoiceQuery {
    pub vendor: Option<String>,
    pub status: Option<String>,
    pub currency: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub total_min: Option<f64>,
    pub total_max: Option<f64>,
    pub query: Option<String>,
    pub page: Option<usize>,
    pub page_size: Option<usize>,
    pub sort: Option<String>,
    pub direction: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSummary {
    pub uploads: Vec<UploadItemDto>,
    pub statuses: Vec<InvoiceDto>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineDelta {
    pub description: String,
    pub baseline_total: Option<f64>,
    pub delta: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareReport {
    pub job: CompareJobDto,
    pub result: CompareResultDto,
    pub rows: Vec<CompareRow>,
    pub line_deltas: Vec<LineDelta>,
}

fn optional_date(raw: Option<String>, field: &str) -> Result<Option<chrono::NaiveDate>, String> {
    match raw.filter(|v| !v.trim().is_empty()) {
        None => Ok(None),
        Some(value) => parse_date(&value)
            .map(Some)
            .ok_or_else(|| format!("Invalid {}: {}", field, value)),
    }
}

fn to_filters(query: &mut InvoiceQuery) -> Result<InvoiceFilters, String> {
    let status = match query.status.take() {
        Some(raw) => InvoiceStatus::parse_filter(&raw)?,
        None => None,
    };
    Ok(InvoiceFilters {
        vendor: query.vendor.take(),
        status,
        date_from: optional_date(query.date_from.take(), "date_from")?,
        date_to: optional_date(query.date_to.take(), "date_to")?,
        total_min: query.total_min,
        total_max: query.total_max,
        currency: query.currency.take(),
        query: query.query.take(),
    })
}

fn to_sort(query: &InvoiceQuery) -> Result<SortSpec, String> {
    let mut sort = SortSpec::default();
    if let Some(field) = &query.sort {
        sort.active = field.parse::<SortField>()?;
    }
    if let Some(direction) = &query.direction {
        sort.direction = direction.parse::<SortDirection>()?;
    }
    Ok(sort)
}

pub async fn list_invoices(
    state: &AppState,
    mut query: InvoiceQuery,
) -> Result<InvoiceListResponse, String> {
    let filters = to_filters(&mut query)?;
    let sort = to_sort(&query)?;
    let page_size = match query.page_size {
        Some(size) => size,
        None => state.settings().map_err(|e| e.to_string())?.page_size,
    };
    state
        .invoices
        .list(&filters, query.page.unwrap_or(0), page_size, sort)
        .await
        .map_err(|e| e.to_string())
}

pub async fn get_invoice(state: &AppState, id: &str) -> Result<InvoiceDto, String> {
    state.invoices.get_by_id(id).await.map_err(|e| e.to_string())
}

pub async fn delete_invoice(state: &AppState, id: &str) -> Result<(), String> {
    state.invoices.delete(id).await.map_err(|e| e.to_string())
}

/// Polls until every invoice in `ids` is parsed or failed and returns the last statuses.
pub async fn wait_for_statuses(state: &AppState, ids: Vec<String>) -> Vec<InvoiceDto> {
    let (poller, mut updates) = StatusPoller::start(state.invoices.clone(), ids);
    let mut last = Vec::new();
    while let Some(statuses) = updates.recv().await {
        last = statuses;
    }
    poller.join().await;
    last
}

pub async fn retry_extraction(state: &AppState, id: &str, wait: bool) -> Result<InvoiceDto, String> {
    let updated = state
        .invoices
        .retry_extraction(id)
        .await
        .map_err(|e| e.to_string())?;
    if !wait {
        return Ok(updated);
    }
    wait_for_statuses(state, vec![updated.id.clone()])
        .await
        .into_iter()
        .next()
        .ok_or_else(|| format!("Invoice not found: {}", id))
}

pub async fn upload_files(
    state: &AppState,
    paths: Vec<PathBuf>,
    remote: bool,
    wait: bool,
) -> Result<UploadSummary, String> {
    let mut files = Vec::with_capacity(paths.len());
    for path in &paths {
        let file = UploadFile::from_path(path).await.map_err(|e| e.to_string())?;
        validate_file(&file).map_err(|e| e.to_string())?;
        files.push(file);
    }

    let remote_service = if remote {
        Some(state.remote_uploads().map_err(|e| e.to_string())?)
    } else {
        None
    };
    let service = remote_service.as_ref().unwrap_or(&state.uploads);

    let mut tickets = files
        .into_iter()
        .map(|file| service.create_upload(file))
        .collect::<Vec<_>>();
    let mut uploads = Vec::with_capacity(tickets.len());
    for ticket in tickets.iter_mut() {
        let mut last = None;
        while let Some(item) = ticket.updates.recv().await {
            last = Some(item);
        }
        if let Some(item) = last {
            uploads.push(item);
        }
    }

    let ids = uploads
        .iter()
        .filter_map(|u| u.invoice_id.clone())
        .collect::<Vec<_>>();
    let statuses = if wait && !remote {
        wait_for_statuses(state, ids).await
    } else {
        Vec::new()
    };
    Ok(UploadSummary { uploads, statuses })
}

pub async fn compare_invoices(
    state: &AppState,
    ids: Vec<String>,
    baseline: Option<String>,
) -> Result<CompareReport, String> {
    let job = state.compare.create_job(&ids).await.map_err(|e| e.to_string())?;
    let baseline = baseline
        .or_else(|| ids.first().cloned())
        .unwrap_or_default();
    let result = state
        .compare
        .get_result(&baseline, &job.invoice_ids)
        .await
        .map_err(|e| e.to_string())?;

    let rows = compare_rows(&result);
    let line_deltas = result
        .line_items
        .iter()
        .flatten()
        .map(|line| LineDelta {
            description: line.description.clone(),
            baseline_total: line.by_invoice.get(&result.baseline_id).map(|v| v.total),
            delta: format_line_delta(line, &result.baseline_id),
        })
        .collect();
    Ok(CompareReport {
        job,
        result,
        rows,
        line_deltas,
    })
}

pub fn compare_csv(report: &CompareReport) -> Result<String, String> {
    export_csv(&report.result).map_err(|e| e.to_string())
}
