//! HTTP serving layer for the retrieval service.

pub mod error;
pub mod routes;

pub use error::AppError;
pub use routes::{router, AppState};

use std::sync::Arc;

use ragdb_admin::{LanceMatrixStore, PermissionMatrixService};
use ragdb_core::config::Settings;
use ragdb_core::Result;
use ragdb_hybrid::RagService;

/// Wires every service from settings. Unconfigured sections degrade to no-op
/// behaviour rather than failing startup.
pub async fn build_state(settings: &Settings) -> Result<AppState> {
    let rag = RagService::from_settings(settings).await?;
    let admin = if settings.store.is_configured() {
        let store = LanceMatrixStore::open(&settings.store.uri_path().to_string_lossy()).await?;
        PermissionMatrixService::new(Arc::new(store))
    } else {
        PermissionMatrixService::unconfigured()
    };
    Ok(AppState { rag: Arc::new(rag), admin: Arc::new(admin), request_timeout: settings.server.request_timeout() })
}
