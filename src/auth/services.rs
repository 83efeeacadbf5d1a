pub(crate) use crate::auth::dto::{Claims, JwtKeys, TokenKind};
use crate::auth::repo::{UserStore, UserWriteError};
use crate::auth::repo_types::{ProfileChanges, User};
use crate::config::JwtConfig;
use crate::images::{detached, CompensationFailed, ImageStore, ImageUpload, UploadFailed};
use crate::state::AppState;
use anyhow::anyhow;
use argon2::{
    password_hash::{Error as HashError, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::{IntoResponse, Response},
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use lazy_static::lazy_static;
use rand::rngs::OsRng;
use regex::Regex;
use std::{convert::Infallible, sync::Arc};
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tokio::task::JoinError;
use tracing::{debug, error, info};
use uuid::Uuid;

pub const MIN_PASSWORD_LEN: usize = 8;

lazy_static! {
    static ref EMAIL_RE: Regex =
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern compiles");
}

/// Trimmed, lowercased address, or `None` if it does not look like one.
pub fn normalize_email(raw: &str) -> Option<String> {
    let email = raw.trim().to_lowercase();
    EMAIL_RE.is_match(&email).then_some(email)
}

pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| anyhow!("hash password: {e}"))
}

/// `Ok(false)` for a wrong password; errors only for an unreadable hash.
pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| anyhow!("stored hash unreadable: {e}"))?;
    match Argon2::default().verify_password(plain.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(HashError::Password) => Ok(false),
        Err(e) => Err(anyhow!("verify password: {e}")),
    }
}

impl From<&JwtConfig> for JwtKeys {
    fn from(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            access_ttl: Duration::minutes(cfg.ttl_minutes.max(0)),
            refresh_ttl: Duration::minutes(cfg.refresh_ttl_minutes.max(0)),
        }
    }
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        JwtKeys::from(&state.config.jwt)
    }
}

/// Why a request carries no usable owner identity.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing Authorization header")]
    MissingCredentials,
    #[error("Invalid Authorization header")]
    MalformedHeader,
    #[error("Invalid or expired token")]
    InvalidToken(#[source] jsonwebtoken::errors::Error),
    #[error("{expected:?} token required")]
    WrongKind { expected: TokenKind },
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (StatusCode::UNAUTHORIZED, self.to_string()).into_response()
    }
}

impl JwtKeys {
    pub fn issue(&self, user_id: Uuid, kind: TokenKind) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let claims = Claims {
            sub: user_id,
            iat: now.unix_timestamp() as usize,
            exp: (now + ttl).unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            kind,
        };
        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    /// Validates signature, expiry, issuer and audience, then the token kind.
    pub fn decode(&self, token: &str, expected: TokenKind) -> Result<Claims, AuthError> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let claims = decode::<Claims>(token, &self.decoding, &validation)
            .map_err(AuthError::InvalidToken)?
            .claims;
        if claims.kind != expected {
            return Err(AuthError::WrongKind { expected });
        }
        Ok(claims)
    }
}

/// Owner id carried by the request's bearer access token.
fn bearer_owner(parts: &Parts, keys: &JwtKeys) -> Result<Uuid, AuthError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingCredentials)?;
    let token = header
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(AuthError::MalformedHeader)?;
    keys.decode(token.trim(), TokenKind::Access).map(|c| c.sub)
}

/// Authenticated owner; rejects the request with 401 otherwise.
pub struct AuthUser(pub Uuid);

/// Owner of the request if it is authenticated, `None` otherwise. Lets a
/// handler decide how to answer an anonymous caller.
pub struct CurrentOwner(pub Option<Uuid>);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        bearer_owner(parts, &JwtKeys::from_ref(state))
            .map(AuthUser)
            .inspect_err(|e| debug!(reason = %e, "request rejected"))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentOwner
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let owner = bearer_owner(parts, &JwtKeys::from_ref(state))
            .inspect_err(|e| debug!(reason = %e, "no owner identity"))
            .ok();
        Ok(CurrentOwner(owner))
    }
}

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("user not found")]
    NotFound,
    #[error("email already registered")]
    EmailTaken,
    #[error(transparent)]
    AvatarUploadFailed(#[from] UploadFailed),
    #[error("profile update failed")]
    UpdateFailed {
        source: anyhow::Error,
        orphaned: Option<CompensationFailed>,
    },
    #[error("profile update cancelled")]
    Interrupted(#[from] JoinError),
}

/// Applies a profile edit. A new avatar is uploaded before the row update
/// and removed again if the update does not land; the avatar it replaces is
/// deleted once the row points at the new one.
pub async fn update_profile(
    images: ImageStore,
    users: Arc<dyn UserStore>,
    user_id: Uuid,
    mut changes: ProfileChanges,
    avatar: Option<ImageUpload>,
) -> Result<User, ProfileError> {
    detached(async move {
        changes.avatar = images.upload(user_id, avatar).await?;
        let uploaded_key = changes.avatar.as_ref().map(|a| a.path.clone());

        let failure = match users.update(user_id, changes).await {
            Ok(Some(updated)) => {
                if let (Some(_), Some(old_key)) = (&uploaded_key, &updated.previous_avatar) {
                    images.retire(old_key).await;
                }
                info!(%user_id, "profile updated");
                return Ok(updated.user);
            }
            Ok(None) => ProfileError::NotFound,
            Err(UserWriteError::EmailTaken) => ProfileError::EmailTaken,
            Err(UserWriteError::Other(source)) => {
                error!(error = %source, %user_id, "profile update failed");
                ProfileError::UpdateFailed {
                    source,
                    orphaned: None,
                }
            }
        };

        let Some(key) = uploaded_key else {
            return Err(failure);
        };
        let orphaned = images.discard(key).await;
        Err(match failure {
            ProfileError::UpdateFailed { source, .. } => {
                ProfileError::UpdateFailed { source, orphaned }
            }
            other => other,
        })
    })
    .await
}
