use std::{
    error::Error,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    error::AppError,
    types::{Claims, HashedPassword, Identity, PublicUser, Role, User, UserID, UserMap},
};

#[async_trait]
pub trait UserRepository: Send + Sync + 'static {
    /// Load every stored account. Returns `None` if no credential store exists yet,
    /// which is distinct from a store that exists but holds no users.
    async fn load_all(&self) -> Result<Option<UserMap>, Box<dyn Error + Send + Sync>>;

    /// Replace the stored accounts with `users`.
    async fn save_all(&mut self, users: &UserMap) -> Result<(), Box<dyn Error + Send + Sync>>;
}

#[derive(Clone)]
pub struct AuthConfig {
    /// The issuer for auth tokens. We will validate that all auth tokens match the given issuer.
    pub auth_token_issuer: String,
    /// The secret used to sign JWT authorization tokens.
    /// If the secret changes, all currently authenticated sessions will be terminated.
    pub auth_token_secret: String,
    /// How long auth tokens should remain valid for. After this interval, the client will have to re-login.
    pub auth_token_lifetime: Duration,
    pub user_repository: Arc<Mutex<dyn UserRepository>>,
}

/// A successful login: the account and a freshly issued bearer token.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: PublicUser,
    pub access_token: String,
    pub expires_in: u64,
}

pub(crate) struct AuthInternal {
    config: AuthConfig,
}

impl AuthInternal {
    /// Runs on the blocking pool.
    pub async fn hash(&self, password: &str) -> Result<HashedPassword, AppError> {
        let password = password.to_owned();
        let encoded = tokio::task::spawn_blocking(move || {
            let salt = Uuid::new_v4();
            argon2::hash_encoded(password.as_bytes(), salt.as_bytes(), &Default::default())
        })
        .await??;

        Ok(HashedPassword(encoded))
    }

    pub async fn verify_hash(
        &self,
        password: &str,
        hash: &HashedPassword,
    ) -> Result<bool, AppError> {
        let password = password.to_owned();
        let encoded = hash.0.clone();
        let matches = tokio::task::spawn_blocking(move || {
            argon2::verify_encoded(&encoded, password.as_bytes())
        })
        .await??;

        Ok(matches)
    }

    pub fn token_lifetime(&self) -> Duration {
        self.config.auth_token_lifetime
    }

    /// Sign an identity assertion for the given account, valid for the configured lifetime.
    pub fn generate_token(&self, user_id: &UserID, email: &str, role: Role) -> Result<String, AppError> {
        let iat = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        let claims = Claims {
            user_id: user_id.0.clone(),
            email: email.to_string(),
            role,
            iat,
            exp: iat + self.config.auth_token_lifetime.as_secs(),
            iss: self.config.auth_token_issuer.clone(),
            sub: user_id.0.clone(),
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.config.auth_token_secret.as_ref()),
        )?;

        Ok(token)
    }

    /// Check signature, expiry and issuer. Every failure is reported as
    /// `Unauthorized`; the underlying reason only reaches the log.
    pub fn verify_token(&self, token: &str) -> Result<Identity, AppError> {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.config.auth_token_issuer]);

        let token = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.auth_token_secret.as_ref()),
            &validation,
        )
        .map_err(|err| {
            tracing::debug!(error = %err, "token verification failed");
            AppError::Unauthorized
        })?;

        Ok(token.claims.into())
    }

    /// Verify the value of an `Authorization` header of the form `Bearer <token>`.
    pub fn verify_bearer(&self, header: Option<&str>) -> Result<Identity, AppError> {
        let header = header.ok_or(AppError::Unauthorized)?;
        let token = strip_bearer(header).ok_or(AppError::Unauthorized)?;

        self.verify_token(token)
    }

    pub async fn register_user(
        &self,
        email: &str,
        password: &str,
        role: Role,
    ) -> Result<PublicUser, AppError> {
        let mut repository = self.config.user_repository.lock().await;
        let mut users = repository.load_all().await?.unwrap_or_default();

        if users.values().any(|user| user.email == email) {
            return Err(AppError::EmailAlreadyTaken);
        }

        let user = User {
            id: UserID(Uuid::new_v4().to_string()),
            email: email.to_string(),
            password_hash: self.hash(password).await?,
            role,
            created_at: Utc::now().to_rfc3339(),
        };
        users.insert(user.id.clone(), user.clone());

        repository.save_all(&users).await?;

        tracing::info!(user_id = %user.id, role = role.as_str(), "user registered");

        Ok(PublicUser::from(&user))
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Session, AppError> {
        let users = self
            .config
            .user_repository
            .lock()
            .await
            .load_all()
            .await?
            .ok_or(AppError::NoUsers)?;

        let user = users
            .values()
            .find(|user| user.email == email)
            .ok_or(AppError::LoginFailed)?;

        // A hash argon2 cannot decode never matches.
        let matches = match self.verify_hash(password, &user.password_hash).await {
            Ok(matches) => matches,
            Err(AppError::Password { source }) => {
                tracing::warn!(user_id = %user.id, error = %source, "stored password hash is unreadable");
                false
            }
            Err(err) => return Err(err),
        };
        if !matches {
            tracing::warn!(user_id = %user.id, "login rejected: wrong password");
            return Err(AppError::LoginFailed);
        }

        let access_token = self.generate_token(&user.id, &user.email, user.role)?;

        tracing::info!(user_id = %user.id, "user logged in");

        Ok(Session {
            user: PublicUser::from(user),
            access_token,
            expires_in: self.token_lifetime().as_secs(),
        })
    }
}

fn strip_bearer(header: &str) -> Option<&str> {
    const SCHEME: &str = "bearer ";

    let prefix = header.get(..SCHEME.len())?;
    if !prefix.eq_ignore_ascii_case(SCHEME) {
        return None;
    }

    let token = header[SCHEME.len()..].trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Shared handle to token and account operations. The inner state is read
/// only; account writes are serialized by the repository's own lock.
#[derive(Clone)]
pub struct Auth {
    pub(crate) internal: Arc<AuthInternal>,
}

impl Auth {
    pub fn new(config: AuthConfig) -> Self {
        Self {
            internal: Arc::new(AuthInternal { config }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryUserStore;

    const SECRET: &str = "test-secret-key-at-least-32-bytes-long";

    fn internal() -> AuthInternal {
        AuthInternal {
            config: AuthConfig {
                auth_token_issuer: "course-portal".into(),
                auth_token_secret: SECRET.into(),
                auth_token_lifetime: Duration::from_secs(24 * 60 * 60),
                user_repository: Arc::new(Mutex::new(MemoryUserStore::default())),
            },
        }
    }

    #[test]
    fn issued_token_verifies_to_same_identity() {
        let auth = internal();
        let user_id = UserID("u-1".into());

        let token = auth
            .generate_token(&user_id, "u1@x.com", Role::Learner)
            .unwrap();
        let identity = auth.verify_token(&token).unwrap();

        assert_eq!(identity.user_id, user_id);
        assert_eq!(identity.email, "u1@x.com");
        assert_eq!(identity.role, Role::Learner);
        assert_eq!(identity.issuer, "course-portal");
        assert_eq!(identity.expires_at - identity.issued_at, 24 * 60 * 60);
    }

    #[test]
    fn rejects_expired_token() {
        let auth = internal();
        let claims = Claims {
            user_id: "u-1".into(),
            email: "u1@x.com".into(),
            role: Role::Learner,
            iat: 1_000,
            exp: 2_000,
            iss: "course-portal".into(),
            sub: "u-1".into(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_ref()),
        )
        .unwrap();

        assert!(matches!(
            auth.verify_token(&token),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn rejects_foreign_signature_and_issuer() {
        let auth = internal();
        let mut other = internal();
        other.config.auth_token_secret = "a-completely-different-signing-secret".into();
        let forged = other
            .generate_token(&UserID("u-1".into()), "u1@x.com", Role::Creator)
            .unwrap();
        assert!(matches!(
            auth.verify_token(&forged),
            Err(AppError::Unauthorized)
        ));

        let mut foreign = internal();
        foreign.config.auth_token_issuer = "someone-else".into();
        let token = foreign
            .generate_token(&UserID("u-1".into()), "u1@x.com", Role::Creator)
            .unwrap();
        assert!(matches!(
            auth.verify_token(&token),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn bearer_header_parsing() {
        let auth = internal();
        let token = auth
            .generate_token(&UserID("u-1".into()), "u1@x.com", Role::Learner)
            .unwrap();

        assert!(auth.verify_bearer(Some(&format!("Bearer {}", token))).is_ok());
        assert!(auth.verify_bearer(Some(&format!("bearer {}", token))).is_ok());
        assert!(matches!(
            auth.verify_bearer(None),
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(
            auth.verify_bearer(Some(&token)),
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(
            auth.verify_bearer(Some("Bearer ")),
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(
            auth.verify_bearer(Some("Basic dXNlcjpwYXNz")),
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(
            auth.verify_bearer(Some("Bearer not.a.jwt")),
            Err(AppError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn register_then_login() {
        let auth = internal();

        assert!(matches!(
            auth.login("u1@x.com", "secret1").await,
            Err(AppError::NoUsers)
        ));

        let user = auth
            .register_user("u1@x.com", "secret1", Role::Learner)
            .await
            .unwrap();
        assert_eq!(user.role, Role::Learner);

        assert!(matches!(
            auth.register_user("u1@x.com", "other-password", Role::Creator)
                .await,
            Err(AppError::EmailAlreadyTaken)
        ));

        assert!(matches!(
            auth.login("u1@x.com", "wrong-password").await,
            Err(AppError::LoginFailed)
        ));
        assert!(matches!(
            auth.login("nobody@x.com", "secret1").await,
            Err(AppError::LoginFailed)
        ));

        let session = auth.login("u1@x.com", "secret1").await.unwrap();
        assert_eq!(session.user.id, user.id);
        assert_eq!(session.expires_in, 86_400);

        let identity = auth.verify_token(&session.access_token).unwrap();
        assert_eq!(identity.user_id, user.id);
        assert_eq!(identity.role, Role::Learner);
    }

    #[tokio::test]
    async fn stored_hash_is_not_the_password() {
        let auth = internal();
        auth.register_user("c1@x.com", "secret1", Role::Creator)
            .await
            .unwrap();

        let users = auth
            .config
            .user_repository
            .lock()
            .await
            .load_all()
            .await
            .unwrap()
            .unwrap();
        let stored = users.values().next().unwrap();
        assert_ne!(stored.password_hash.0, "secret1");
        assert!(auth
            .verify_hash("secret1", &stored.password_hash)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn token_check_succeeds_while_accounts_are_being_written() {
        let auth = Auth::new(internal().config);
        let token = auth
            .internal
            .generate_token(&UserID("u-1".into()), "u1@x.com", Role::Learner)
            .unwrap();

        let _writer = auth.internal.config.user_repository.lock().await;
        let identity = auth
            .internal
            .verify_bearer(Some(&format!("Bearer {}", token)))
            .unwrap();
        assert_eq!(identity.user_id, UserID("u-1".into()));
    }

    #[tokio::test]
    async fn unreadable_stored_hash_fails_login_as_unauthorized() {
        let auth = internal();
        let user = User {
            id: UserID("u-legacy".into()),
            email: "old@x.com".into(),
            password_hash: HashedPassword(
                "$2a$12$R9h/cIPz0gi.URNNX3kh2OPST9/PgBkqquzi.Ss7KIUgO2t0jWMUW".into(),
            ),
            role: Role::Learner,
            created_at: "2024-01-01T00:00:00Z".into(),
        };
        let mut users = UserMap::new();
        users.insert(user.id.clone(), user);
        auth.config
            .user_repository
            .lock()
            .await
            .save_all(&users)
            .await
            .unwrap();

        assert!(matches!(
            auth.login("old@x.com", "secret1").await,
            Err(AppError::LoginFailed)
        ));
    }
}
