use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rand::Rng;

use crate::auth::tokens::TokenSigner;
use crate::config::Config;
use crate::error::AppResult;
use crate::mail::Mailer;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub tokens: TokenSigner,
    pub mailer: Mailer,
}

impl AppState {
    pub fn new(db: DbPool, config: Config) -> AppResult<Self> {
        let mailer = Mailer::from_config(&config.mail)?;
        Ok(Self::with_mailer(db, config, mailer))
    }

    pub fn with_mailer(db: DbPool, config: Config, mailer: Mailer) -> Self {
        let secret = match config.auth.secret_key.as_deref() {
            Some(key) if !key.is_empty() => key.to_string(),
            _ => {
                tracing::warn!(
                    "SECRET_KEY not configured; generating a random key, tokens will not survive a restart"
                );
                let bytes: [u8; 32] = rand::thread_rng().gen();
                hex::encode(bytes)
            }
        };

        Self {
            db,
            tokens: TokenSigner::new(&secret),
            config,
            mailer,
        }
    }
}
