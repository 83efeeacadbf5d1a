use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::{
            AuthResponse, LoginRequest, PublicUser, RefreshRequest, RegisterRequest,
            UpdateProfileRequest,
        },
        repo::UserWriteError,
        repo_types::{NewUser, ProfileChanges, User},
        services::{
            hash_password, normalize_email, update_profile, verify_password, AuthUser, JwtKeys,
            ProfileError, TokenKind, MIN_PASSWORD_LEN,
        },
    },
    extract::{FormFields, JsonOrForm},
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me).put(update_me))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, (StatusCode, String)> {
    let email = normalize_email(&payload.email).ok_or_else(|| {
        warn!(email = %payload.email, "invalid email");
        (StatusCode::BAD_REQUEST, "Invalid email".to_string())
    })?;

    if payload.password.len() < MIN_PASSWORD_LEN {
        warn!("password too short");
        return Err((StatusCode::BAD_REQUEST, "Password too short".into()));
    }

    let password_hash = hash_password(&payload.password).map_err(|e| {
        error!(error = %e, "hash_password failed");
        (StatusCode::INTERNAL_SERVER_ERROR, "Registration failed".to_string())
    })?;

    let new_user = NewUser {
        email,
        password_hash,
        first_name: non_blank(payload.first_name),
        last_name: non_blank(payload.last_name),
        gender: non_blank(payload.gender),
    };
    let user = match state.users.create(new_user).await {
        Ok(user) => user,
        Err(UserWriteError::EmailTaken) => {
            warn!("email already registered");
            return Err((StatusCode::CONFLICT, "Email already registered".into()));
        }
        Err(UserWriteError::Other(e)) => {
            error!(error = %e, "create user failed");
            return Err((StatusCode::INTERNAL_SERVER_ERROR, "Registration failed".into()));
        }
    };

    info!(user_id = %user.id, email = %user.email, "user registered");
    issue_tokens(&state, user).map(Json)
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, (StatusCode, String)> {
    let email = normalize_email(&payload.email)
        .ok_or((StatusCode::BAD_REQUEST, "Invalid email".to_string()))?;

    let user = match state.users.find_by_email(&email).await {
        Ok(Some(u)) => u,
        Ok(None) => {
            warn!(%email, "login unknown email");
            return Err((StatusCode::UNAUTHORIZED, "Invalid credentials".into()));
        }
        Err(e) => {
            error!(error = %e, "find_by_email failed");
            return Err((StatusCode::INTERNAL_SERVER_ERROR, "Login failed".into()));
        }
    };

    match verify_password(&payload.password, &user.password_hash) {
        Ok(true) => {}
        Ok(false) => {
            warn!(user_id = %user.id, "login invalid password");
            return Err((StatusCode::UNAUTHORIZED, "Invalid credentials".into()));
        }
        Err(e) => {
            error!(error = %e, user_id = %user.id, "verify_password failed");
            return Err((StatusCode::INTERNAL_SERVER_ERROR, "Login failed".into()));
        }
    }

    info!(user_id = %user.id, "user logged in");
    issue_tokens(&state, user).map(Json)
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, (StatusCode, String)> {
    let claims = JwtKeys::from_ref(&state)
        .decode(&payload.refresh_token, TokenKind::Refresh)
        .map_err(|e| (StatusCode::UNAUTHORIZED, e.to_string()))?;

    let user = load_user(&state, claims.sub).await?;
    issue_tokens(&state, user).map(Json)
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<PublicUser>, (StatusCode, String)> {
    let user = load_user(&state, user_id).await?;
    Ok(Json(PublicUser::from(user)))
}

/// PUT /me
/// JSON `{email?, password?, first_name?, last_name?, gender?}`, or a
/// multipart form with the same fields and an optional `image` avatar.
#[instrument(skip(state, body))]
pub async fn update_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    body: JsonOrForm<UpdateProfileRequest>,
) -> Result<Json<PublicUser>, (StatusCode, String)> {
    let (req, avatar) = match body {
        JsonOrForm::Json(req) => (req, None),
        JsonOrForm::Form(mut mp) => {
            let mut form = FormFields::read(&mut mp).await?;
            let req = UpdateProfileRequest {
                email: form.take("email"),
                password: form.take("password"),
                first_name: form.take("first_name"),
                last_name: form.take("last_name"),
                gender: form.take("gender"),
            };
            (req, form.image)
        }
    };
    let changes = profile_changes(req)?;

    let user = update_profile(state.images(), state.users.clone(), user_id, changes, avatar)
        .await
        .map_err(|e| match e {
            ProfileError::NotFound => (StatusCode::UNAUTHORIZED, "User not found".to_string()),
            ProfileError::EmailTaken => {
                (StatusCode::CONFLICT, "Email already registered".to_string())
            }
            ProfileError::AvatarUploadFailed(_) => {
                error!(error = ?e, "update_me failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to upload image.".to_string())
            }
            _ => {
                error!(error = ?e, "update_me failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to update profile.".to_string())
            }
        })?;
    Ok(Json(PublicUser::from(user)))
}

/// Validates an edit. Blank fields mean "unchanged", as an untouched form
/// input sends them; a new password is hashed here.
fn profile_changes(req: UpdateProfileRequest) -> Result<ProfileChanges, (StatusCode, String)> {
    let email = match non_blank(req.email) {
        Some(raw) => Some(
            normalize_email(&raw)
                .ok_or((StatusCode::BAD_REQUEST, "Invalid email".to_string()))?,
        ),
        None => None,
    };
    let password_hash = match req.password.filter(|p| !p.is_empty()) {
        Some(p) if p.len() < MIN_PASSWORD_LEN => {
            return Err((StatusCode::BAD_REQUEST, "Password too short".into()))
        }
        Some(p) => Some(hash_password(&p).map_err(|e| {
            error!(error = %e, "hash_password failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to update profile.".to_string())
        })?),
        None => None,
    };
    Ok(ProfileChanges {
        email,
        password_hash,
        first_name: non_blank(req.first_name),
        last_name: non_blank(req.last_name),
        gender: non_blank(req.gender),
        avatar: None,
    })
}

async fn load_user(state: &AppState, user_id: Uuid) -> Result<User, (StatusCode, String)> {
    match state.users.find_by_id(user_id).await {
        Ok(Some(user)) => Ok(user),
        Ok(None) => {
            warn!(%user_id, "user not found");
            Err((StatusCode::UNAUTHORIZED, "User not found".into()))
        }
        Err(e) => {
            error!(error = %e, %user_id, "load user failed");
            Err((StatusCode::INTERNAL_SERVER_ERROR, "Failed to load user".into()))
        }
    }
}

fn issue_tokens(state: &AppState, user: User) -> Result<AuthResponse, (StatusCode, String)> {
    let keys = JwtKeys::from_ref(state);
    let signed = keys
        .issue(user.id, TokenKind::Access)
        .and_then(|access| Ok((access, keys.issue(user.id, TokenKind::Refresh)?)));
    let (access_token, refresh_token) = signed.map_err(|e| {
        error!(error = %e, user_id = %user.id, "jwt sign failed");
        (StatusCode::INTERNAL_SERVER_ERROR, "Failed to issue tokens".to_string())
    })?;

    Ok(AuthResponse {
        access_token,
        refresh_token,
        user: PublicUser::from(user),
    })
}

fn non_blank(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}
