use chrono::{NaiveDate, TimeZone, Utc};
use menu_diario::models::{
    InvoiceDto, InvoiceFilters, InvoiceLineDto, InvoiceStatus, SortDirection, SortField, SortSpec,
};
use menu_diario::services::fake_backend::{FakeBackend, LatencyProfile};

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, day).unwrap()
}

fn invoice(id: &str, vendor: &str, status: InvoiceStatus, currency: &str, day: u32, total: f64) -> InvoiceDto {
    let stamp = Utc.with_ymd_and_hms(2025, 3, day, 9, 0, 0).unwrap();
    InvoiceDto {
        id: id.to_string(),
        number: format!("INV-{}", 1000 + day),
        vendor: vendor.to_string(),
        currency: currency.to_string(),
        status,
        issue_date: date(day),
        due_date: None,
        confidence: None,
        subtotal: total,
        tax: 0.0,
        total,
        notes: None,
        original_file_name: format!("factura-{}.pdf", id),
        original_url: None,
        lines: Some(vec![InvoiceLineDto {
            id: format!("{}-l1", id),
            description: "Servicio".to_string(),
            quantity: 1.0,
            unit_price: total,
            tax_rate: None,
            total,
        }]),
        created_at: stamp,
        updated_at: stamp,
    }
}

fn backend() -> FakeBackend {
    FakeBackend::with_invoices(
        vec![
            invoice("a", "Acme Corp", InvoiceStatus::Parsed, "EUR", 3, 120.0),
            invoice("b", "IberFoods", InvoiceStatus::Processing, "USD", 8, 45.5),
            invoice("c", "Café Central", InvoiceStatus::Parsed, "EUR", 12, 300.0),
            invoice("d", "acme corp", InvoiceStatus::Error, "EUR", 15, 80.0),
            invoice("e", "Electricidad Sur", InvoiceStatus::Uploaded, "USD", 20, 210.25),
        ],
        LatencyProfile::instant(),
    )
}

fn no_sort() -> SortSpec {
    SortSpec {
        active: SortField::IssueDate,
        direction: SortDirection::None,
    }
}

async fn ids(backend: &FakeBackend, filters: InvoiceFilters, sort: SortSpec) -> Vec<String> {
    backend
        .list_invoices(&filters, 0, 100, sort)
        .await
        .items
        .into_iter()
        .map(|i| i.id)
        .collect()
}

#[tokio::test]
async fn vendor_filter_is_case_insensitive_substring() {
    let filters = InvoiceFilters {
        vendor: Some("ACME".into()),
        ..Default::default()
    };
    assert_eq!(ids(&backend(), filters, no_sort()).await, vec!["a", "d"]);
}

#[tokio::test]
async fn status_and_currency_match_exactly() {
    let backend = backend();
    let by_status = InvoiceFilters {
        status: Some(InvoiceStatus::Parsed),
        ..Default::default()
    };
    assert_eq!(ids(&backend, by_status, no_sort()).await, vec!["a", "c"]);

    let by_currency = InvoiceFilters {
        currency: Some("USD".into()),
        ..Default::default()
    };
    assert_eq!(ids(&backend, by_currency, no_sort()).await, vec!["b", "e"]);
}

#[tokio::test]
async fn date_and_total_ranges_are_inclusive() {
    let backend = backend();
    let dates = InvoiceFilters {
        date_from: Some(date(8)),
        date_to: Some(date(15)),
        ..Default::default()
    };
    assert_eq!(ids(&backend, dates, no_sort()).await, vec!["b", "c", "d"]);

    let totals = InvoiceFilters {
        total_min: Some(80.0),
        total_max: Some(210.25),
        ..Default::default()
    };
    assert_eq!(ids(&backend, totals, no_sort()).await, vec!["a", "d", "e"]);
}

#[tokio::test]
async fn query_searches_number_vendor_and_file_name() {
    let backend = backend();
    let by_file = InvoiceFilters {
        query: Some("FACTURA-C".into()),
        ..Default::default()
    };
    assert_eq!(ids(&backend, by_file, no_sort()).await, vec!["c"]);

    let by_number = InvoiceFilters {
        query: Some("inv-1020".into()),
        ..Default::default()
    };
    assert_eq!(ids(&backend, by_number, no_sort()).await, vec!["e"]);
}

#[tokio::test]
async fn combined_filters_intersect() {
    let filters = InvoiceFilters {
        vendor: Some("acme".into()),
        currency: Some("EUR".into()),
        total_min: Some(100.0),
        ..Default::default()
    };
    assert_eq!(ids(&backend(), filters, no_sort()).await, vec!["a"]);
}

#[tokio::test]
async fn empty_strings_do_not_filter() {
    let filters = InvoiceFilters {
        vendor: Some(String::new()),
        currency: Some(String::new()),
        query: Some(String::new()),
        ..Default::default()
    };
    assert_eq!(ids(&backend(), filters, no_sort()).await.len(), 5);
}

#[tokio::test]
async fn sort_directions() {
    let backend = backend();
    let asc = SortSpec {
        active: SortField::Total,
        direction: SortDirection::Asc,
    };
    assert_eq!(
        ids(&backend, InvoiceFilters::default(), asc).await,
        vec!["b", "d", "a", "e", "c"]
    );

    let desc = SortSpec {
        active: SortField::Vendor,
        direction: SortDirection::Desc,
    };
    assert_eq!(
        ids(&backend, InvoiceFilters::default(), desc).await,
        vec!["d", "b", "e", "c", "a"]
    );

    assert_eq!(
        ids(&backend, InvoiceFilters::default(), no_sort()).await,
        vec!["a", "b", "c", "d", "e"]
    );
}

#[tokio::test]
async fn pages_reconstruct_the_filtered_set() {
    let backend = FakeBackend::seeded(99, LatencyProfile::instant());
    let filters = InvoiceFilters {
        currency: Some("EUR".into()),
        ..Default::default()
    };
    let sort = SortSpec::default();
    let full = backend.list_invoices(&filters, 0, 1000, sort).await;

    let mut collected = Vec::new();
    let mut page_index = 0;
    loop {
        let page = backend.list_invoices(&filters, page_index, 4, sort).await;
        assert_eq!(page.total, full.total);
        if page.items.is_empty() {
            break;
        }
        assert!(page.items.len() <= 4);
        collected.extend(page.items);
        page_index += 1;
    }
    assert_eq!(collected, full.items);
}

#[tokio::test]
async fn page_past_the_end_is_empty_with_total() {
    let page = backend()
        .list_invoices(&InvoiceFilters::default(), 10, 10, no_sort())
        .await;
    assert!(page.items.is_empty());
    assert_eq!(page.total, 5);
}

#[tokio::test]
async fn compare_matches_lines_by_description() {
    let backend = backend();
    let ids = vec!["a".to_string(), "c".to_string()];
    let result = backend.get_compare_result("c", &ids).await.unwrap();
    assert_eq!(result.baseline_id, "c");
    assert!(result.has_line_items);
    let lines = result.line_items.unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].by_invoice.len(), 2);
    assert_eq!(result.totals.len(), 2);
}
