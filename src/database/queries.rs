use sqlx::PgPool;

use crate::error::{AppError, Result};
use crate::models::{Account, StoredFile};

const PG_UNIQUE_VIOLATION: &str = "23505";

fn map_unique_violation(err: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.code().as_deref() == Some(PG_UNIQUE_VIOLATION) {
            let message = if db_err.constraint().is_some_and(|c| c.contains("email")) {
                "Email already registered"
            } else {
                "Username already taken"
            };
            return AppError::Conflict(message.to_string());
        }
    }
    AppError::Database(err)
}

pub struct AccountQueries;

impl AccountQueries {
    pub async fn create_account(
        pool: &PgPool,
        username: &str,
        email: &str,
        password_hash: &str,
        storage_quota: i64,
    ) -> Result<Account> {
        sqlx::query_as::<_, Account>(
            r#"
            INSERT INTO accounts (username, email, password_hash, storage_used, storage_quota)
            VALUES ($1, $2, $3, 0, $4)
            RETURNING id, username, email, password_hash, storage_used, storage_quota, created_at
            "#,
        )
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .bind(storage_quota)
        .fetch_one(pool)
        .await
        .map_err(map_unique_violation)
    }

    pub async fn find_by_username(pool: &PgPool, username: &str) -> Result<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(
            "SELECT id, username, email, password_hash, storage_used, storage_quota, created_at \
             FROM accounts WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(pool)
        .await?;

        Ok(account)
    }

    pub async fn find_by_id(pool: &PgPool, id: i64) -> Result<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(
            "SELECT id, username, email, password_hash, storage_used, storage_quota, created_at \
             FROM accounts WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(account)
    }

    pub async fn update_password_hash(pool: &PgPool, id: i64, password_hash: &str) -> Result<()> {
        sqlx::query("UPDATE accounts SET password_hash = $2 WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Atomically reserves `bytes` of storage if and only if the account
    /// stays within quota afterwards. Returns false when the reservation
    /// would overshoot; `storage_used` is untouched in that case. Two
    /// concurrent reservations cannot both pass the check because the
    /// condition and the increment are a single conditional UPDATE.
    pub async fn try_reserve_storage(pool: &PgPool, id: i64, bytes: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE accounts SET storage_used = storage_used + $2 \
             WHERE id = $1 AND storage_used + $2 <= storage_quota",
        )
        .bind(id)
        .bind(bytes)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Gives back a reservation, or accounts for a deleted file. Clamped at
    /// zero so a counter skew can never drive the value negative.
    pub async fn release_storage(pool: &PgPool, id: i64, bytes: i64) -> Result<()> {
        sqlx::query(
            "UPDATE accounts SET storage_used = GREATEST(storage_used - $2, 0) WHERE id = $1",
        )
        .bind(id)
        .bind(bytes)
        .execute(pool)
        .await?;

        Ok(())
    }
}

pub struct FileQueries;

impl FileQueries {
    pub async fn insert_file(
        pool: &PgPool,
        account_id: i64,
        stored_name: &str,
        original_name: &str,
        size: i64,
        mime_type: &str,
        folder: &str,
    ) -> Result<StoredFile> {
        let file = sqlx::query_as::<_, StoredFile>(
            r#"
            INSERT INTO files (account_id, stored_name, original_name, size, mime_type, folder)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, account_id, stored_name, original_name, size, mime_type, folder, uploaded_at
            "#,
        )
        .bind(account_id)
        .bind(stored_name)
        .bind(original_name)
        .bind(size)
        .bind(mime_type)
        .bind(folder)
        .fetch_one(pool)
        .await?;

        Ok(file)
    }

    /// Ownership-scoped lookup. A file id belonging to another account is
    /// indistinguishable from a missing one.
    pub async fn find_owned(pool: &PgPool, account_id: i64, file_id: i64) -> Result<Option<StoredFile>> {
        let file = sqlx::query_as::<_, StoredFile>(
            "SELECT id, account_id, stored_name, original_name, size, mime_type, folder, uploaded_at \
             FROM files WHERE id = $1 AND account_id = $2",
        )
        .bind(file_id)
        .bind(account_id)
        .fetch_optional(pool)
        .await?;

        Ok(file)
    }

    pub async fn list_files(
        pool: &PgPool,
        account_id: i64,
        folder: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<StoredFile>> {
        let files = match folder {
            Some(folder) => {
                sqlx::query_as::<_, StoredFile>(
                    "SELECT id, account_id, stored_name, original_name, size, mime_type, folder, uploaded_at \
                     FROM files WHERE account_id = $1 AND folder = $2 \
                     ORDER BY uploaded_at DESC LIMIT $3 OFFSET $4",
                )
                .bind(account_id)
                .bind(folder)
                .bind(limit)
                .bind(offset)
                .fetch_all(pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, StoredFile>(
                    "SELECT id, account_id, stored_name, original_name, size, mime_type, folder, uploaded_at \
                     FROM files WHERE account_id = $1 \
                     ORDER BY uploaded_at DESC LIMIT $2 OFFSET $3",
                )
                .bind(account_id)
                .bind(limit)
                .bind(offset)
                .fetch_all(pool)
                .await?
            }
        };

        Ok(files)
    }

    pub async fn count_and_total_size(pool: &PgPool, account_id: i64) -> Result<(i64, i64)> {
        let row = sqlx::query_as::<_, (i64, i64)>(
            "SELECT COUNT(*), COALESCE(SUM(size), 0)::BIGINT FROM files WHERE account_id = $1",
        )
        .bind(account_id)
        .fetch_one(pool)
        .await?;

        Ok(row)
    }

    /// Returns false when the row was already gone, so concurrent deletes
    /// of the same file can be told apart: only the caller that actually
    /// removed the row may decrement the owner's storage counter.
    pub async fn delete_file(pool: &PgPool, file_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM files WHERE id = $1")
            .bind(file_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }
}
