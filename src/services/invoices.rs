use async_trait::async_trait;
use tracing::debug;

use crate::error::Result;
use crate::models::{InvoiceDto, InvoiceFilters, InvoiceListResponse, SortSpec};
use crate::services::fake_backend::FakeBackend;

/// Query surface over stored invoices.
#[async_trait]
pub trait InvoiceApi: Send + Sync {
    async fn list(
        &self,
        filters: &InvoiceFilters,
        page_index: usize,
        page_size: usize,
        sort: SortSpec,
    ) -> Result<InvoiceListResponse>;

    async fn get_by_id(&self, id: &str) -> Result<InvoiceDto>;

    async fn delete(&self, id: &str) -> Result<()>;

    async fn retry_extraction(&self, id: &str) -> Result<InvoiceDto>;

    async fn get_statuses(&self, ids: &[String]) -> Result<Vec<InvoiceDto>>;
}

pub struct InvoicesService {
    backend: FakeBackend,
}

impl InvoicesService {
    pub fn new(backend: FakeBackend) -> Self {
        InvoicesService { backend }
    }
}

#[async_trait]
impl InvoiceApi for InvoicesService {
    async fn list(
        &self,
        filters: &InvoiceFilters,
        page_index: usize,
        page_size: usize,
        sort: SortSpec,
    ) -> Result<InvoiceListResponse> {
        Ok(self
            .backend
            .list_invoices(filters, page_index, page_size, sort)
            .await)
    }

    async fn get_by_id(&self, id: &str) -> Result<InvoiceDto> {
        self.backend.get_invoice(id).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.backend.delete_invoice(id).await
    }

    async fn retry_extraction(&self, id: &str) -> Result<InvoiceDto> {
        debug!(id, "Retrying extraction");
        self.backend.retry_extraction(id).await
    }

    async fn get_statuses(&self, ids: &[String]) -> Result<Vec<InvoiceDto>> {
        Ok(self.backend.get_processing_statuses(ids).await)
    }
}
