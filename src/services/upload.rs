use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::error::{AppError, Result};
use crate::models::{UploadItemDto, UploadStatus};
use crate::services::fake_backend::FakeBackend;

pub const ACCEPTED_TYPES: [&str; 3] = ["application/pdf", "image/jpeg", "image/png"];
pub const MAX_UPLOAD_SIZE: u64 = 15 * 1024 * 1024;
const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    /// Reads a file from disk, guessing the media type from its extension.
    pub async fn from_path(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| AppError::FileRead {
                path: path.display().to_string(),
                source,
            })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload".to_string());
        let mime_type = match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .as_deref()
        {
            Some("pdf") => "application/pdf",
            Some("jpg") | Some("jpeg") => "image/jpeg",
            Some("png") => "image/png",
            _ => "application/octet-stream",
        };
        Ok(UploadFile {
            name,
            mime_type: mime_type.to_string(),
            bytes,
        })
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    pub loaded: u64,
    pub total: Option<u64>,
}

impl TransferProgress {
    pub fn percent(&self) -> u8 {
        match self.total {
            Some(total) if total > 0 => {
                let ratio = self.loaded as f64 / total as f64;
                (ratio * 100.0).round().clamp(0.0, 100.0) as u8
            }
            _ => 0,
        }
    }
}

pub fn validate_file(file: &UploadFile) -> Result<()> {
    if !ACCEPTED_TYPES.contains(&file.mime_type.as_str()) {
        return Err(AppError::Validation(format!("Tipo no permitido: {}", file.name)));
    }
    if file.size() > MAX_UPLOAD_SIZE {
        return Err(AppError::Validation(format!(
            "Archivo demasiado grande: {}",
            file.name
        )));
    }
    Ok(())
}

/// Moves one file to the invoice service and returns the created invoice id.
#[async_trait]
pub trait UploadTransport: Send + Sync {
    async fn send(
        &self,
        file: &UploadFile,
        progress: mpsc::UnboundedSender<TransferProgress>,
    ) -> Result<String>;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    invoice_id: String,
}

pub struct HttpUploadTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpUploadTransport {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), endpoint)
    }

    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        HttpUploadTransport {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl UploadTransport for HttpUploadTransport {
    async fn send(
        &self,
        file: &UploadFile,
        progress: mpsc::UnboundedSender<TransferProgress>,
    ) -> Result<String> {
        let total = file.size();
        let chunks = file
            .bytes
            .chunks(CHUNK_SIZE)
            .map(|c| c.to_vec())
            .collect::<Vec<_>>();

        let mut loaded = 0u64;
        let body = stream::iter(chunks).map(move |chunk| {
            loaded += chunk.len() as u64;
            let _ = progress.send(TransferProgress {
                loaded,
                total: Some(total),
            });
            Ok::<_, std::io::Error>(chunk)
        });

        let part = Part::stream_with_length(reqwest::Body::wrap_stream(body), total)
            .file_name(file.name.clone())
            .mime_str(&file.mime_type)?;
        let form = Form::new().part("files", part);

        debug!(endpoint = %self.endpoint, name = %file.name, total, "Uploading file");
        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?;
        let body: UploadResponse = response.json().await?;
        Ok(body.invoice_id)
    }
}

/// Hands files straight to the in-process mock backend.
pub struct BackendUploadTransport {
    backend: FakeBackend,
}

impl BackendUploadTransport {
    pub fn new(backend: FakeBackend) -> Self {
        BackendUploadTransport { backend }
    }
}

#[async_trait]
impl UploadTransport for BackendUploadTransport {
    async fn send(
        &self,
        file: &UploadFile,
        progress: mpsc::UnboundedSender<TransferProgress>,
    ) -> Result<String> {
        let total = file.size();
        let mut loaded = 0u64;
        for chunk in file.bytes.chunks(CHUNK_SIZE) {
            loaded += chunk.len() as u64;
            let _ = progress.send(TransferProgress {
                loaded,
                total: Some(total),
            });
            tokio::task::yield_now().await;
        }
        let invoice = self
            .backend
            .register_upload(&file.name, total, &file.mime_type)
            .await;
        Ok(invoice.id)
    }
}

/// A started upload. `updates` yields every state until a terminal one.
pub struct UploadTicket {
    pub id: String,
    pub updates: mpsc::UnboundedReceiver<UploadItemDto>,
}

pub struct UploadService {
    transport: Arc<dyn UploadTransport>,
    cancels: Arc<Mutex<HashMap<String, oneshot::Sender<()>>>>,
}

enum Outcome {
    Finished(Result<String>),
    Canceled,
}

impl UploadService {
    pub fn new(transport: Arc<dyn UploadTransport>) -> Self {
        UploadService {
            transport,
            cancels: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn create_upload(&self, file: UploadFile) -> UploadTicket {
        let id = format!("upl-{}", uuid::Uuid::new_v4());
        let (tx, rx) = mpsc::unbounded_channel();
        let (cancel_tx, mut cancel_rx) = oneshot::channel();
        if let Ok(mut cancels) = self.cancels.lock() {
            cancels.insert(id.clone(), cancel_tx);
        }

        let mut item = UploadItemDto {
            id: id.clone(),
            name: file.name.clone(),
            size: file.size(),
            mime_type: file.mime_type.clone(),
            progress: 0,
            status: UploadStatus::Queued,
            error: None,
            invoice_id: None,
        };
        let _ = tx.send(item.clone());

        let transport = self.transport.clone();
        let cancels = self.cancels.clone();
        tokio::spawn(async move {
            item.status = UploadStatus::Uploading;
            let _ = tx.send(item.clone());

            let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
            let transfer = transport.send(&file, progress_tx);
            tokio::pin!(transfer);

            let outcome = loop {
                tokio::select! {
                    biased;
                    _ = &mut cancel_rx => break Outcome::Canceled,
                    Some(progress) = progress_rx.recv() => {
                        let percent = progress.percent();
                        if percent != item.progress {
                            item.progress = percent;
                            let _ = tx.send(item.clone());
                        }
                    }
                    result = &mut transfer => break Outcome::Finished(result),
                }
            };

            if let Ok(mut cancels) = cancels.lock() {
                cancels.remove(&item.id);
            }

            match outcome {
                Outcome::Finished(Ok(invoice_id)) => {
                    info!(id = %item.id, invoice_id = %invoice_id, "Upload finished");
                    item.status = UploadStatus::Uploaded;
                    item.progress = 100;
                    item.invoice_id = Some(invoice_id);
                }
                Outcome::Finished(Err(err)) => {
                    warn!(id = %item.id, error = %err, "Upload failed");
                    item.status = UploadStatus::Error;
                    item.progress = 0;
                    item.error = Some(err.to_string());
                }
                Outcome::Canceled => {
                    info!(id = %item.id, "Upload canceled");
                    item.status = UploadStatus::Canceled;
                }
            }
            let _ = tx.send(item);
        });

        UploadTicket { id, updates: rx }
    }

    /// Signals the in-flight transfer. Unknown or finished ids are ignored.
    pub fn cancel_upload(&self, id: &str) {
        let sender = match self.cancels.lock() {
            Ok(mut cancels) => cancels.remove(id),
            Err(_) => None,
        };
        match sender {
            Some(sender) => {
                let _ = sender.send(());
            }
            None => debug!(id, "No active upload to cancel"),
        }
    }

    pub fn active_uploads(&self) -> usize {
        self.cancels.lock().map(|c| c.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::fake_backend::LatencyProfile;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn pdf(size: usize) -> UploadFile {
        UploadFile {
            name: "factura.pdf".into(),
            mime_type: "application/pdf".into(),
            bytes: vec![0u8; size],
        }
    }

    struct StalledTransport;

    #[async_trait]
    impl UploadTransport for StalledTransport {
        async fn send(
            &self,
            file: &UploadFile,
            progress: mpsc::UnboundedSender<TransferProgress>,
        ) -> Result<String> {
            let _ = progress.send(TransferProgress {
                loaded: file.size() / 2,
                total: Some(file.size()),
            });
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("never".into())
        }
    }

    struct FailingTransport;

    #[async_trait]
    impl UploadTransport for FailingTransport {
        async fn send(&self, _: &UploadFile, _: mpsc::UnboundedSender<TransferProgress>) -> Result<String> {
            Err(AppError::Sync("server rejected file".into()))
        }
    }

    async fn drain(ticket: &mut UploadTicket) -> Vec<UploadItemDto> {
        let mut states = Vec::new();
        while let Some(item) = ticket.updates.recv().await {
            states.push(item);
        }
        states
    }

    #[test]
    fn percent_is_zero_without_total() {
        let unknown = TransferProgress { loaded: 10, total: None };
        assert_eq!(unknown.percent(), 0);
        let half = TransferProgress { loaded: 1, total: Some(3) };
        assert_eq!(half.percent(), 33);
    }

    #[test]
    fn validation_checks_type_and_size() {
        assert!(validate_file(&pdf(10)).is_ok());
        let gif = UploadFile {
            mime_type: "image/gif".into(),
            ..pdf(10)
        };
        assert!(matches!(validate_file(&gif), Err(AppError::Validation(_))));
        assert!(validate_file(&pdf(MAX_UPLOAD_SIZE as usize + 1)).is_err());
    }

    #[tokio::test]
    async fn backend_upload_reaches_uploaded() {
        let backend = FakeBackend::seeded(3, LatencyProfile::instant());
        let service = UploadService::new(Arc::new(BackendUploadTransport::new(backend.clone())));
        let mut ticket = service.create_upload(pdf(200_000));
        let states = drain(&mut ticket).await;

        assert_eq!(states.first().unwrap().status, UploadStatus::Queued);
        assert_eq!(states[1].status, UploadStatus::Uploading);
        let last = states.last().unwrap();
        assert_eq!(last.status, UploadStatus::Uploaded);
        assert_eq!(last.progress, 100);
        let invoice_id = last.invoice_id.clone().unwrap();
        assert_eq!(backend.snapshot()[0].id, invoice_id);
        assert_eq!(service.active_uploads(), 0);
    }

    #[tokio::test]
    async fn transport_error_ends_sequence() {
        let service = UploadService::new(Arc::new(FailingTransport));
        let mut ticket = service.create_upload(pdf(10));
        let states = drain(&mut ticket).await;
        let last = states.last().unwrap();
        assert_eq!(last.status, UploadStatus::Error);
        assert_eq!(last.error.as_deref(), Some("Sync failed: server rejected file"));
        assert_eq!(service.active_uploads(), 0);
    }

    #[tokio::test]
    async fn cancel_ends_with_canceled() {
        let service = UploadService::new(Arc::new(StalledTransport));
        let mut ticket = service.create_upload(pdf(100));

        let mut seen = Vec::new();
        while let Some(item) = ticket.updates.recv().await {
            let progressed = item.progress == 50;
            seen.push(item);
            if progressed {
                break;
            }
        }
        assert_eq!(service.active_uploads(), 1);
        service.cancel_upload(&ticket.id);
        service.cancel_upload("upl-unknown");

        seen.extend(drain(&mut ticket).await);
        assert_eq!(seen.last().unwrap().status, UploadStatus::Canceled);
        assert_eq!(service.active_uploads(), 0);
    }

    fn request_complete(request: &[u8]) -> bool {
        let text = String::from_utf8_lossy(request);
        let head_end = match text.find("\r\n\r\n") {
            Some(end) => end,
            None => return false,
        };
        let head = text[..head_end].to_lowercase();
        match head.lines().find_map(|l| l.strip_prefix("content-length:")) {
            Some(len) => request.len() >= head_end + 4 + len.trim().parse::<usize>().unwrap(),
            None => text.ends_with("0\r\n\r\n"),
        }
    }

    /// Accepts one request, answers with `status` and `body`, and returns the raw request.
    async fn serve_once(listener: TcpListener, status: &'static str, body: &'static str) -> String {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 16 * 1024];
        while !request_complete(&request) {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }
        let response = format!(
            "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        String::from_utf8_lossy(&request).to_string()
    }

    async fn local_transport(
        status: &'static str,
        body: &'static str,
    ) -> (HttpUploadTransport, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve_once(listener, status, body));
        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        let endpoint = format!("http://{}/api/invoices/upload", addr);
        (HttpUploadTransport::with_client(client, endpoint), server)
    }

    #[tokio::test]
    async fn http_transport_posts_multipart_and_reports_progress() {
        let (transport, server) = local_transport("200 OK", r#"{"invoiceId":"inv-remote-1"}"#).await;
        let file = UploadFile {
            name: "factura.pdf".into(),
            mime_type: "application/pdf".into(),
            bytes: vec![b'x'; 150_000],
        };

        let (tx, mut rx) = mpsc::unbounded_channel();
        let invoice_id = transport.send(&file, tx).await.unwrap();
        assert_eq!(invoice_id, "inv-remote-1");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /api/invoices/upload"));
        assert!(request.contains("name=\"files\""));
        assert!(request.contains("filename=\"factura.pdf\""));
        assert!(request.to_lowercase().contains("content-type: application/pdf"));

        let mut percents = Vec::new();
        while let Ok(progress) = rx.try_recv() {
            percents.push(progress.percent());
        }
        assert_eq!(percents, vec![44, 87, 100]);
    }

    #[tokio::test]
    async fn http_transport_surfaces_server_errors() {
        let (transport, server) = local_transport("500 Internal Server Error", "{}").await;
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = transport.send(&pdf(10), tx).await.unwrap_err();
        assert!(matches!(err, AppError::Network(_)));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn missing_file_is_a_read_error() {
        let err = UploadFile::from_path(Path::new("/nonexistent/factura.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::FileRead { .. }));
    }
}
