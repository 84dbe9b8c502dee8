use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct StoredFile {
    pub id: i64,
    pub account_id: i64,
    pub stored_name: String,
    pub original_name: String,
    pub size: i64,
    pub mime_type: String,
    pub folder: String,
    pub uploaded_at: DateTime<Utc>,
}

impl StoredFile {
    /// 1024-based human-readable size, e.g. "1.5 MB".
    pub fn size_human(&self) -> String {
        const UNIT: i64 = 1024;
        if self.size < UNIT {
            return format!("{} B", self.size);
        }
        let mut div = UNIT;
        let mut exp: usize = 0;
        let mut n = self.size / UNIT;
        while n >= UNIT {
            div *= UNIT;
            exp += 1;
            n /= UNIT;
        }
        format!(
            "{:.1} {}B",
            self.size as f64 / div as f64,
            ['K', 'M', 'G', 'T', 'P', 'E'][exp]
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct ListFilesQuery {
    pub folder: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct FileResponse {
    pub id: i64,
    pub original_name: String,
    pub size: i64,
    pub size_human: String,
    pub mime_type: String,
    pub folder: String,
    pub uploaded_at: DateTime<Utc>,
    pub url: String,
}

impl From<StoredFile> for FileResponse {
    fn from(file: StoredFile) -> Self {
        Self {
            url: format!("/api/files/{}/download", file.id),
            size_human: file.size_human(),
            id: file.id,
            original_name: file.original_name,
            size: file.size,
            mime_type: file.mime_type,
            folder: file.folder,
            uploaded_at: file.uploaded_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FileListResponse {
    pub files: Vec<FileResponse>,
    pub total: i64,
    pub used: i64,
    pub quota: i64,
    pub available: i64,
}
