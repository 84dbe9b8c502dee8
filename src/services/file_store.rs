use std::sync::Arc;
use tokio::io::AsyncRead;

use crate::{
    database::{
        queries::{AccountQueries, FileQueries},
        Database,
    },
    error::{AppError, Result},
    models::{Account, FileListResponse, FileResponse, StoredFile},
    storage::Storage,
    utils::file::{generate_stored_name, resolve_mime_type, storage_key},
};

const DEFAULT_LIST_LIMIT: i64 = 50;
const MAX_LIST_LIMIT: i64 = 200;

/// Quota-enforced file store. The quota check and the counter increment are
/// one conditional UPDATE, so concurrent uploads against the same account
/// cannot jointly overshoot the quota. Byte-store and metadata writes have
/// no shared transaction; partial failures are rolled back by compensating
/// actions, and a failed compensation is logged with enough detail to
/// reconcile state by hand.
pub struct FileStore {
    database: Database,
    storage: Arc<dyn Storage>,
    max_file_size: usize,
}

impl FileStore {
    pub fn new(database: Database, storage: Arc<dyn Storage>, max_file_size: usize) -> Self {
        Self {
            database,
            storage,
            max_file_size,
        }
    }

    pub async fn upload(
        &self,
        account: &Account,
        data: Vec<u8>,
        original_name: &str,
        declared_mime: Option<&str>,
        folder: &str,
    ) -> Result<FileResponse> {
        if data.is_empty() {
            return Err(AppError::Validation("Uploaded file is empty".to_string()));
        }
        // Hard per-file ceiling, independent of the account quota.
        if data.len() > self.max_file_size {
            return Err(AppError::FileTooLarge);
        }

        let size = data.len() as i64;
        let pool = self.database.pool();

        if !AccountQueries::try_reserve_storage(pool, account.id, size).await? {
            return Err(AppError::QuotaExceeded);
        }

        let stored_name = generate_stored_name(original_name);
        let key = storage_key(account.id, &stored_name);
        let mime_type = resolve_mime_type(declared_mime, original_name);

        if let Err(write_err) = self.storage.put(&key, &data).await {
            self.release_or_log(account.id, size, &key, "byte-store write")
                .await?;
            return Err(write_err);
        }

        let file = match FileQueries::insert_file(
            pool,
            account.id,
            &stored_name,
            original_name,
            size,
            &mime_type,
            folder,
        )
        .await
        {
            Ok(file) => file,
            Err(insert_err) => {
                // Remove the bytes written in the step before, then give the
                // reservation back.
                if let Err(cleanup_err) = self.storage.delete(&key).await {
                    tracing::error!(
                        account_id = account.id,
                        key,
                        size,
                        %insert_err,
                        %cleanup_err,
                        "metadata insert failed and orphaned bytes could not be removed"
                    );
                    return Err(AppError::Inconsistent(format!(
                        "orphaned bytes at {} after failed metadata insert",
                        key
                    )));
                }
                self.release_or_log(account.id, size, &key, "metadata insert")
                    .await?;
                return Err(insert_err);
            }
        };

        tracing::info!(
            account_id = account.id,
            file_id = file.id,
            size,
            folder,
            "file uploaded"
        );

        Ok(FileResponse::from(file))
    }

    pub async fn list(
        &self,
        account: &Account,
        folder: Option<&str>,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<FileListResponse> {
        let pool = self.database.pool();

        // "all" (and absence) means no folder filter; anything else is an
        // exact match.
        let folder = folder.filter(|f| *f != "all");
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
        let offset = offset.unwrap_or(0).max(0);

        let files = FileQueries::list_files(pool, account.id, folder, limit, offset).await?;
        let (total, used) = FileQueries::count_and_total_size(pool, account.id).await?;

        Ok(FileListResponse {
            files: files.into_iter().map(FileResponse::from).collect(),
            total,
            used,
            quota: account.storage_quota,
            available: (account.storage_quota - used).max(0),
        })
    }

    /// Resolves a file to its record and a byte stream. Missing backing
    /// bytes are reported as the same NotFound a missing record gets, but
    /// logged, since the record says they should exist.
    pub async fn download(
        &self,
        account: &Account,
        file_id: i64,
    ) -> Result<(StoredFile, Box<dyn AsyncRead + Send + Unpin>)> {
        let file = FileQueries::find_owned(self.database.pool(), account.id, file_id)
            .await?
            .ok_or(AppError::NotFound)?;

        let key = storage_key(account.id, &file.stored_name);
        match self.storage.open(&key).await {
            Ok(reader) => Ok((file, reader)),
            Err(err) => {
                tracing::error!(
                    account_id = account.id,
                    file_id,
                    key,
                    %err,
                    "file record exists but backing bytes are unreadable"
                );
                Err(AppError::NotFound)
            }
        }
    }

    pub async fn delete(&self, account: &Account, file_id: i64) -> Result<()> {
        let pool = self.database.pool();

        let file = FileQueries::find_owned(pool, account.id, file_id)
            .await?
            .ok_or(AppError::NotFound)?;

        let key = storage_key(account.id, &file.stored_name);

        // Bytes first; an already-absent key counts as removed.
        self.storage.delete(&key).await?;

        // A concurrent delete of the same id may have removed the row
        // between the lookup and here. Exactly one caller sees the row
        // disappear; only that one decrements the counter.
        if !FileQueries::delete_file(pool, file.id).await? {
            return Err(AppError::NotFound);
        }

        if let Err(err) = AccountQueries::release_storage(pool, account.id, file.size).await {
            tracing::error!(
                account_id = account.id,
                file_id = file.id,
                key,
                size = file.size,
                %err,
                "record deleted but storage_used decrement failed; counter is now skewed"
            );
            return Err(AppError::Inconsistent(format!(
                "storage_used not decremented by {} for account {} after deleting file {}",
                file.size, account.id, file.id
            )));
        }

        tracing::info!(
            account_id = account.id,
            file_id = file.id,
            size = file.size,
            "file deleted"
        );

        Ok(())
    }

    /// Undo a quota reservation after a failed upload step. If even the
    /// release fails the counter is left skewed, which is fatal for this
    /// request and logged for manual reconciliation.
    async fn release_or_log(
        &self,
        account_id: i64,
        size: i64,
        key: &str,
        failed_step: &str,
    ) -> Result<()> {
        if let Err(err) =
            AccountQueries::release_storage(self.database.pool(), account_id, size).await
        {
            tracing::error!(
                account_id,
                key,
                size,
                failed_step,
                %err,
                "could not roll back quota reservation"
            );
            return Err(AppError::Inconsistent(format!(
                "quota reservation of {} bytes for account {} not rolled back after failed {}",
                size, account_id, failed_step
            )));
        }
        Ok(())
    }
}
