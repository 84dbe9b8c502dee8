use std::path::Path;
use uuid::Uuid;

/// Derives a collision-resistant stored name from the client filename:
/// the stem with spaces replaced, an 8-char uuid fragment, the original
/// extension. "my report.pdf" -> "my_report_1a2b3c4d.pdf".
pub fn generate_stored_name(original_name: &str) -> String {
    let path = Path::new(original_name);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("file");
    let ext = path.extension().and_then(|e| e.to_str());

    let fragment = &Uuid::new_v4().simple().to_string()[..8];
    let stem = stem.replace(' ', "_");

    match ext {
        Some(ext) => format!("{}_{}.{}", stem, fragment, ext),
        None => format!("{}_{}", stem, fragment),
    }
}

/// Key under which an account's file lives in the byte store.
pub fn storage_key(account_id: i64, stored_name: &str) -> String {
    format!("user_{}/{}", account_id, stored_name)
}

/// MIME type for an upload: the multipart part's declared type when
/// present, otherwise guessed from the filename extension.
pub fn resolve_mime_type(declared: Option<&str>, original_name: &str) -> String {
    match declared {
        Some(mime) if !mime.is_empty() => mime.to_string(),
        _ => mime_guess::from_path(original_name)
            .first_raw()
            .unwrap_or("application/octet-stream")
            .to_string(),
    }
}
