use axum::{extract::State, http::StatusCode, response::Json};
use serde_json::json;

use crate::{
    auth::PasswordService,
    database::queries::AccountQueries,
    error::{AppError, Result},
    handlers::AppState,
    middleware::auth::AuthenticatedAccount,
    models::{AccountResponse, AuthResponse, LoginRequest, RegisterRequest},
};

fn validate_username(username: &str) -> Result<()> {
    let len = username.chars().count();
    if !(3..=50).contains(&len) {
        return Err(AppError::Validation(
            "Username must be between 3 and 50 characters".to_string(),
        ));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<()> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err(AppError::Validation("Invalid email format".to_string()));
    }
    Ok(())
}

/// Registration issues a token straight away, same response shape as login.
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>)> {
    validate_username(&request.username)?;
    validate_email(&request.email)?;
    PasswordService::validate_password(&request.password)?;

    let password_hash = PasswordService::hash_password(&request.password)?;

    // Uniqueness is enforced by the database constraints; a duplicate
    // surfaces as Conflict rather than being pre-checked racily.
    let account = AccountQueries::create_account(
        state.database.pool(),
        &request.username,
        &request.email,
        &password_hash,
        state.config.default_quota_bytes,
    )
    .await?;

    tracing::info!(account_id = account.id, username = %account.username, "account registered");

    let token = state.jwt.generate_token(account.id, &account.username)?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            user: AccountResponse::from(account),
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<AuthResponse>> {
    // Unknown username and wrong password are the same Unauthorized, so
    // responses don't reveal which usernames exist.
    let account = AccountQueries::find_by_username(state.database.pool(), &request.username)
        .await?
        .ok_or(AppError::Unauthorized)?;

    if PasswordService::is_bcrypt_hash(&account.password_hash) {
        if !PasswordService::verify_password(&request.password, &account.password_hash)? {
            return Err(AppError::Unauthorized);
        }
    } else {
        // Legacy plaintext verifier: accept an exact match once and
        // immediately upgrade it to a bcrypt hash.
        if account.password_hash != request.password {
            return Err(AppError::Unauthorized);
        }
        let upgraded = PasswordService::hash_password(&request.password)?;
        AccountQueries::update_password_hash(state.database.pool(), account.id, &upgraded).await?;
        tracing::warn!(
            account_id = account.id,
            "plaintext credential upgraded to bcrypt on login"
        );
    }

    let token = state.jwt.generate_token(account.id, &account.username)?;

    Ok(Json(AuthResponse {
        token,
        user: AccountResponse::from(account),
    }))
}

pub async fn me(AuthenticatedAccount(account): AuthenticatedAccount) -> Json<AccountResponse> {
    Json(AccountResponse::from(account))
}

/// Tokens are stateless and stay valid until natural expiry; logout only
/// acknowledges so clients can discard theirs.
pub async fn logout() -> Json<serde_json::Value> {
    Json(json!({
        "message": "Logged out successfully"
    }))
}
