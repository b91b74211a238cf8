//! Server configuration, read from the environment (and a `.env` file when present).
//!
//! # Environment Variables
//!
//! - `HOST`: Host to bind to (default: 127.0.0.1)
//! - `PORT`: Port to bind to (default: 3000)
//! - `DATA_DIR`: Directory holding `users.json` and `courses.json` (default: data)
//! - `JWT_SECRET`: Secret key for token signing (required, at least 32 characters)
//! - `JWT_ISSUER`: Issuer stamped into and required of every token (default: course-portal)
//! - `TOKEN_LIFETIME_SECS`: How long issued tokens stay valid (default: 86400)
//! - `RUST_LOG`: Log filter (default: course_portal=debug,warp=info)

use std::{env, fmt, net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use tokio::sync::Mutex;

use crate::{
    auth::AuthConfig,
    storage::{JsonCourseStore, JsonUserStore},
};

pub const USERS_FILE: &str = "users.json";
pub const COURSES_FILE: &str = "courses.json";

#[derive(Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub token_lifetime: Duration,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("data_dir", &self.data_dir)
            .field("jwt_secret", &"<redacted>")
            .field("jwt_issuer", &self.jwt_issuer)
            .field("token_lifetime", &self.token_lifetime)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present (for development)
        dotenvy::dotenv().ok();

        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable is required"))?;

        if jwt_secret.len() < 32 {
            anyhow::bail!("JWT_SECRET must be at least 32 characters long");
        }

        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".into()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".into())
                .parse()?,
            data_dir: env::var("DATA_DIR")
                .unwrap_or_else(|_| "data".into())
                .into(),
            jwt_secret,
            jwt_issuer: env::var("JWT_ISSUER").unwrap_or_else(|_| "course-portal".into()),
            token_lifetime: Duration::from_secs(
                env::var("TOKEN_LIFETIME_SECS")
                    .unwrap_or_else(|_| "86400".into())
                    .parse()?,
            ),
        })
    }

    pub fn bind_address(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }

    pub fn users_path(&self) -> PathBuf {
        self.data_dir.join(USERS_FILE)
    }

    pub fn courses_path(&self) -> PathBuf {
        self.data_dir.join(COURSES_FILE)
    }

    /// Token settings plus a JSON credential store under `data_dir`.
    pub fn auth_config(&self) -> AuthConfig {
        AuthConfig {
            auth_token_issuer: self.jwt_issuer.clone(),
            auth_token_secret: self.jwt_secret.clone(),
            auth_token_lifetime: self.token_lifetime,
            user_repository: Arc::new(Mutex::new(JsonUserStore::new(self.users_path()))),
        }
    }

    pub fn course_store(&self) -> JsonCourseStore {
        JsonCourseStore::new(self.courses_path())
    }
}
