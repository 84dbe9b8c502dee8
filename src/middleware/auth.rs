use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};

use crate::{
    database::queries::AccountQueries,
    error::AppError,
    handlers::AppState,
    models::Account,
};

/// Extractor run on every protected route. Resolves the bearer token to a
/// live account before any handler logic executes: missing header, wrong
/// scheme, bad signature, expiry, and a vanished account are all the same
/// Unauthorized to the client.
#[derive(Debug, Clone)]
pub struct AuthenticatedAccount(pub Account);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedAccount {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|header| header.to_str().ok())
            .ok_or(AppError::Unauthorized)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(AppError::Unauthorized)?;

        let claims = state.jwt.verify_token(token)?;
        let account_id = claims.account_id()?;

        // Signature and expiry held up; the account must still exist.
        let account = AccountQueries::find_by_id(state.database.pool(), account_id)
            .await?
            .ok_or(AppError::Unauthorized)?;

        Ok(AuthenticatedAccount(account))
    }
}
