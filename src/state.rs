use crate::{
    config::AppConfig,
    services::{signing::UrlSigner, storage_service::StorageService},
};

/// Shared services handed to CLI commands and HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub storage: StorageService,
    pub signer: UrlSigner,
}

impl AppState {
    pub fn new(storage: StorageService, signer: UrlSigner) -> Self {
        Self { storage, signer }
    }

    /// Open storage and build the signer described by `cfg`.
    pub async fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        let storage = StorageService::open(&cfg.database_url, cfg.storage_dir.clone()).await?;
        Ok(Self::new(storage, UrlSigner::new(&cfg.signing)))
    }
}
