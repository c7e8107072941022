use std::sync::Arc;

use anyhow::anyhow;
use tracing::error;

use vidtube_db::Database;

use crate::config::Config;
use crate::error::ApiError;
use crate::media::MediaStore;
use crate::tokens::TokenService;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub tokens: TokenService,
    pub media: MediaStore,
    pub config: Config,
}

impl AppStateInner {
    pub fn new(config: Config, db: Database, media: MediaStore) -> AppState {
        Arc::new(Self {
            db: Arc::new(db),
            tokens: TokenService::new(config.tokens.clone()),
            media,
            config,
        })
    }

    /// Run blocking DB (and password hashing) work off the async runtime.
    pub async fn blocking<F, T, E>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&Database, &TokenService) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Into<ApiError> + Send + 'static,
    {
        let db = self.db.clone();
        let tokens = self.tokens.clone();
        tokio::task::spawn_blocking(move || f(&db, &tokens).map_err(Into::into))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                ApiError::Internal(anyhow!("blocking task failed"))
            })?
    }
}
