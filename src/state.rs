use crate::auth::jwt::TokenIssuer;
use crate::config::AppConfig;
use crate::db;
use crate::users::repo::{MemoryUserRepo, PgUserRepo, UserRepo};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn UserRepo>,
    pub config: Arc<AppConfig>,
    pub tokens: TokenIssuer,
}

impl AppState {
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let pool = db::connect(&config).await?;
        db::migrate(&pool).await?;
        let repo = Arc::new(PgUserRepo::new(pool)) as Arc<dyn UserRepo>;
        Ok(Self::from_parts(repo, Arc::new(config)))
    }

    pub fn from_parts(repo: Arc<dyn UserRepo>, config: Arc<AppConfig>) -> Self {
        let tokens = TokenIssuer::new(&config.jwt);
        Self {
            repo,
            config,
            tokens,
        }
    }

    /// In-memory store with `AppConfig::fake()`.
    pub fn fake() -> Self {
        Self::from_parts(Arc::new(MemoryUserRepo::new()), Arc::new(AppConfig::fake()))
    }
}
