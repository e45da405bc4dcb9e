use anyhow::{anyhow, Result};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::db::{Database, KeyValueStore, SqliteStore};
use crate::models::Settings;
use crate::services::auth::AuthService;
use crate::services::compare::CompareService;
use crate::services::fake_backend::{FakeBackend, LatencyProfile};
use crate::services::invoices::{InvoiceApi, InvoicesService};
use crate::services::menu_library::MenuLibraryStore;
use crate::services::menu_store::MenuStore;
use crate::services::sheets::{SheetsApi, SheetsClient};
use crate::services::upload::{BackendUploadTransport, HttpUploadTransport, UploadService};

/// Seed for the demo invoice set, so ids and amounts line up between runs.
const DEMO_SEED: u64 = 20_240_501;

pub struct AppState {
    pub db: Arc<Mutex<Database>>,
    pub settings: Arc<Mutex<Settings>>,
    pub menu: MenuStore,
    pub library: MenuLibraryStore,
    pub backend: FakeBackend,
    pub invoices: Arc<dyn InvoiceApi>,
    pub compare: CompareService,
    pub uploads: UploadService,
    pub auth: AuthService,
    sheets: Mutex<Option<Arc<dyn SheetsApi>>>,
}

impl AppState {
    pub fn new(db: Database, settings: Settings) -> Self {
        let db = Arc::new(Mutex::new(db));
        let store: Arc<dyn KeyValueStore> = Arc::new(SqliteStore::new(db.clone()));
        Self::assemble(db, store, settings)
    }

    /// Wires every service over `store`. `db` only carries settings and sync logs.
    pub fn assemble(db: Arc<Mutex<Database>>, store: Arc<dyn KeyValueStore>, settings: Settings) -> Self {
        let backend = FakeBackend::seeded(DEMO_SEED, latency_for(&settings));

        let menu = MenuStore::load(store.clone());
        let library = MenuLibraryStore::load(store.clone());
        if let Err(err) = library.bootstrap_from_state(&menu.state()) {
            warn!(error = %err, "Could not seed suggestion library");
        }

        let sheets = build_sheets(&db, &settings);
        AppState {
            invoices: Arc::new(InvoicesService::new(backend.clone())),
            compare: CompareService::new(backend.clone()),
            uploads: UploadService::new(Arc::new(BackendUploadTransport::new(backend.clone()))),
            auth: AuthService::new(store, &settings.allowed_emails),
            settings: Arc::new(Mutex::new(settings)),
            sheets: Mutex::new(sheets),
            db,
            menu,
            library,
            backend,
        }
    }

    pub fn settings(&self) -> Result<Settings> {
        Ok(self
            .settings
            .lock()
            .map_err(|_| anyhow!("Settings lock"))?
            .clone())
    }

    /// Applies new settings to every live service that depends on them.
    pub fn update_settings(&self, settings: Settings) -> Result<()> {
        let sheets = build_sheets(&self.db, &settings);
        self.auth.set_allowed_emails(&settings.allowed_emails)?;
        self.backend.set_latency(latency_for(&settings));
        {
            let mut locked = self.settings.lock().map_err(|_| anyhow!("Settings lock"))?;
            *locked = settings;
        }
        *self.sheets.lock().map_err(|_| anyhow!("Sheets lock"))? = sheets;
        Ok(())
    }

    /// The remote sheet client, or `None` while no endpoint is configured.
    pub fn sheets(&self) -> Option<Arc<dyn SheetsApi>> {
        self.sheets.lock().ok().and_then(|s| s.clone())
    }

    /// Uploader posting to the configured HTTP endpoint instead of the mock backend.
    pub fn remote_uploads(&self) -> Result<UploadService> {
        let endpoint = self.settings()?.upload_endpoint;
        Ok(UploadService::new(Arc::new(HttpUploadTransport::new(endpoint))))
    }
}

fn latency_for(settings: &Settings) -> LatencyProfile {
    if settings.simulate_latency {
        LatencyProfile::standard()
    } else {
        LatencyProfile::instant()
    }
}

fn build_sheets(db: &Arc<Mutex<Database>>, settings: &Settings) -> Option<Arc<dyn SheetsApi>> {
    let endpoint = settings
        .sheets_endpoint
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())?;
    debug!(endpoint, "Remote sheet configured");
    Some(Arc::new(SheetsClient::new(endpoint).with_journal(db.clone())))
}
