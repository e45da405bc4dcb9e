use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::models::InvoiceDto;
use crate::services::invoices::InvoiceApi;

const INITIAL_DELAY_MS: u64 = 2000;
const MAX_DELAY_MS: u64 = 5000;
const GROWTH: f64 = 1.3;

/// Delay schedule between status checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollBackoff {
    next_ms: u64,
}

impl PollBackoff {
    pub fn new() -> Self {
        PollBackoff {
            next_ms: INITIAL_DELAY_MS,
        }
    }

    /// Returns the delay to wait now and grows the following one.
    pub fn advance(&mut self) -> Duration {
        let current = self.next_ms;
        let grown = (current as f64 * GROWTH).round() as u64;
        self.next_ms = grown.min(MAX_DELAY_MS);
        Duration::from_millis(current)
    }
}

impl Default for PollBackoff {
    fn default() -> Self {
        Self::new()
    }
}

fn all_settled(statuses: &[InvoiceDto]) -> bool {
    statuses.iter().all(|i| i.status.is_terminal())
}

/// Background loop that re-reads invoice statuses until all of them settle.
pub struct StatusPoller {
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl StatusPoller {
    pub fn start(
        api: Arc<dyn InvoiceApi>,
        ids: Vec<String>,
    ) -> (Self, mpsc::UnboundedReceiver<Vec<InvoiceDto>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (cancel, mut cancel_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            if ids.is_empty() {
                return;
            }
            let mut backoff = PollBackoff::new();
            loop {
                let delay = backoff.advance();
                tokio::select! {
                    biased;
                    _ = cancel_rx.changed() => {
                        debug!("Status polling canceled");
                        return;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }

                match api.get_statuses(&ids).await {
                    Ok(statuses) => {
                        let settled = all_settled(&statuses);
                        if tx.send(statuses).is_err() {
                            return;
                        }
                        if settled {
                            debug!(count = ids.len(), "All invoices settled, polling stopped");
                            return;
                        }
                    }
                    Err(err) => warn!(error = %err, "Status poll failed"),
                }
            }
        });

        (StatusPoller { cancel, handle }, rx)
    }

    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    pub async fn join(self) {
        if let Err(err) = self.handle.await {
            warn!(error = %err, "Status poller task failed");
        }
    }
}
