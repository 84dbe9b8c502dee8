//! Database-backed integration tests. They run against the Postgres
//! instance named by TEST_DATABASE_URL and skip (with a note) when the
//! variable is unset, so the unit suite stays runnable anywhere.

use std::env;
use std::sync::Arc;

use axum::extract::{Json, State};
use serial_test::serial;
use tempfile::TempDir;

use portfolio_storage_server::{
    auth::{JwtService, PasswordService},
    config::Config,
    database::{
        queries::{AccountQueries, FileQueries},
        Database,
    },
    error::AppError,
    handlers::{auth as auth_handlers, AppState},
    models::{Account, LoginRequest, RegisterRequest},
    services::FileStore,
    storage::LocalStorage,
};

async fn setup_test_db() -> Option<Database> {
    let database_url = match env::var("TEST_DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("TEST_DATABASE_URL not set; skipping database-backed test");
            return None;
        }
    };

    let db = Database::new(&database_url)
        .await
        .expect("failed to connect to test database");
    db.migrate().await.expect("failed to run migrations");

    sqlx::query("TRUNCATE TABLE files, accounts RESTART IDENTITY CASCADE")
        .execute(db.pool())
        .await
        .expect("failed to clean test database");

    Some(db)
}

struct TestEnv {
    db: Database,
    store: FileStore,
    // Held so the upload directory outlives the test body.
    _upload_dir: TempDir,
}

fn test_env(db: Database) -> TestEnv {
    let upload_dir = TempDir::new().unwrap();
    let storage = Arc::new(LocalStorage::new(upload_dir.path()).unwrap());
    let store = FileStore::new(db.clone(), storage, 50 * 1024 * 1024);
    TestEnv {
        db,
        store,
        _upload_dir: upload_dir,
    }
}

fn test_state(db: Database) -> (AppState, TempDir) {
    let config = Config {
        database_url: String::new(),
        port: 0,
        jwt_secret: "test-secret".to_string(),
        token_ttl_hours: 24,
        upload_dir: String::new(),
        max_file_size: 50 * 1024 * 1024,
        default_quota_bytes: 1000,
    };
    let upload_dir = TempDir::new().unwrap();
    let storage = Arc::new(LocalStorage::new(upload_dir.path()).unwrap());
    let state = AppState {
        database: db.clone(),
        jwt: Arc::new(JwtService::new("test-secret", 24)),
        file_store: Arc::new(FileStore::new(db, storage, 50 * 1024 * 1024)),
        config,
    };
    (state, upload_dir)
}

async fn make_account(db: &Database, username: &str, quota: i64) -> Account {
    let hash = PasswordService::hash_password("secret123").unwrap();
    AccountQueries::create_account(
        db.pool(),
        username,
        &format!("{}@example.com", username),
        &hash,
        quota,
    )
    .await
    .unwrap()
}

async fn storage_used(db: &Database, account_id: i64) -> i64 {
    AccountQueries::find_by_id(db.pool(), account_id)
        .await
        .unwrap()
        .unwrap()
        .storage_used
}

#[tokio::test]
#[serial]
async fn test_duplicate_registration_conflicts_without_new_row() {
    let Some(db) = setup_test_db().await else {
        return;
    };

    make_account(&db, "alice", 1000).await;

    let hash = PasswordService::hash_password("other456").unwrap();
    let err = AccountQueries::create_account(db.pool(), "alice", "other@example.com", &hash, 1000)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let err = AccountQueries::create_account(db.pool(), "alice2", "alice@example.com", &hash, 1000)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM accounts")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
#[serial]
async fn test_register_then_login_round_trip() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let (state, _upload_dir) = test_state(db.clone());

    let (_status, Json(registered)) = auth_handlers::register(
        State(state.clone()),
        Json(RegisterRequest {
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password: "secret123".to_string(),
        }),
    )
    .await
    .unwrap();

    assert_eq!(registered.user.username, "alice");
    assert_eq!(registered.user.storage_used, 0);
    assert_eq!(registered.user.storage_quota, 1000);

    // The freshly issued token resolves back to the account.
    let claims = state.jwt.verify_token(&registered.token).unwrap();
    assert_eq!(claims.account_id().unwrap(), registered.user.id);

    let Json(logged_in) = auth_handlers::login(
        State(state.clone()),
        Json(LoginRequest {
            username: "alice".to_string(),
            password: "secret123".to_string(),
        }),
    )
    .await
    .unwrap();
    assert_eq!(logged_in.user.id, registered.user.id);

    let err = auth_handlers::login(
        State(state.clone()),
        Json(LoginRequest {
            username: "alice".to_string(),
            password: "wrong-password".to_string(),
        }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Unauthorized));

    // Unknown usernames get the same answer as bad passwords.
    let err = auth_handlers::login(
        State(state),
        Json(LoginRequest {
            username: "nobody".to_string(),
            password: "secret123".to_string(),
        }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Unauthorized));
}

#[tokio::test]
#[serial]
async fn test_plaintext_credential_upgraded_on_login() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let (state, _upload_dir) = test_state(db.clone());

    // Seed a legacy account whose verifier is the plaintext password.
    let account =
        AccountQueries::create_account(db.pool(), "legacy", "legacy@example.com", "admin123", 1000)
            .await
            .unwrap();

    let Json(response) = auth_handlers::login(
        State(state.clone()),
        Json(LoginRequest {
            username: "legacy".to_string(),
            password: "admin123".to_string(),
        }),
    )
    .await
    .unwrap();
    assert_eq!(response.user.id, account.id);

    let stored = AccountQueries::find_by_id(db.pool(), account.id)
        .await
        .unwrap()
        .unwrap()
        .password_hash;
    assert!(PasswordService::is_bcrypt_hash(&stored));
    assert!(PasswordService::verify_password("admin123", &stored).unwrap());

    // The upgraded hash still works for the next login.
    auth_handlers::login(
        State(state),
        Json(LoginRequest {
            username: "legacy".to_string(),
            password: "admin123".to_string(),
        }),
    )
    .await
    .unwrap();
}

#[tokio::test]
#[serial]
async fn test_quota_arithmetic_at_the_boundary() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let env = test_env(db.clone());
    let account = make_account(&env.db, "alice", 1000).await;

    // Bring the account to 900/1000.
    assert!(
        AccountQueries::try_reserve_storage(env.db.pool(), account.id, 900)
            .await
            .unwrap()
    );

    let err = env
        .store
        .upload(&account, vec![0u8; 150], "big.bin", None, "root")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::QuotaExceeded));
    assert_eq!(storage_used(&env.db, account.id).await, 900);

    env.store
        .upload(&account, vec![0u8; 90], "small.bin", None, "root")
        .await
        .unwrap();
    assert_eq!(storage_used(&env.db, account.id).await, 990);
}

#[tokio::test]
#[serial]
async fn test_concurrent_uploads_cannot_jointly_overshoot() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let env = test_env(db.clone());
    let account = make_account(&env.db, "alice", 1000).await;

    let (first, second) = tokio::join!(
        env.store
            .upload(&account, vec![0u8; 600], "a.bin", None, "root"),
        env.store
            .upload(&account, vec![0u8; 600], "b.bin", None, "root"),
    );

    let successes = [&first, &second].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one of the two uploads may win");

    let loser = if first.is_err() { first } else { second };
    assert!(matches!(loser.unwrap_err(), AppError::QuotaExceeded));

    assert_eq!(storage_used(&env.db, account.id).await, 600);
}

#[tokio::test]
#[serial]
async fn test_concurrent_deletes_decrement_once() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let env = test_env(db.clone());
    let account = make_account(&env.db, "alice", 10_000).await;

    let kept = env
        .store
        .upload(&account, vec![0u8; 100], "keep.bin", None, "root")
        .await
        .unwrap();

    for round in 0..3 {
        let victim = env
            .store
            .upload(&account, vec![0u8; 100], "victim.bin", None, "root")
            .await
            .unwrap();
        assert_eq!(storage_used(&env.db, account.id).await, 200);

        let (first, second) = tokio::join!(
            env.store.delete(&account, victim.id),
            env.store.delete(&account, victim.id),
        );

        // Exactly one delete wins; the loser gets NotFound and must not
        // touch the counter a second time.
        let successes = [&first, &second].iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1, "round {}: exactly one delete may win", round);

        let loser = if first.is_err() { first } else { second };
        assert!(matches!(loser.unwrap_err(), AppError::NotFound));

        // The cached counter still matches the real file-size sum.
        let (_count, total_size) = FileQueries::count_and_total_size(env.db.pool(), account.id)
            .await
            .unwrap();
        assert_eq!(total_size, 100);
        assert_eq!(storage_used(&env.db, account.id).await, 100);
    }

    assert!(
        FileQueries::find_owned(env.db.pool(), account.id, kept.id)
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
#[serial]
async fn test_upload_list_download_delete_cycle() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let env = test_env(db.clone());
    let account = make_account(&env.db, "alice", 10_000).await;

    let uploaded = env
        .store
        .upload(
            &account,
            b"hello world".to_vec(),
            "notes.txt",
            Some("text/plain"),
            "docs",
        )
        .await
        .unwrap();
    assert_eq!(uploaded.size, 11);
    assert_eq!(uploaded.mime_type, "text/plain");
    assert_eq!(uploaded.folder, "docs");
    assert_eq!(storage_used(&env.db, account.id).await, 11);

    // Folder filter is an exact match; "all" clears it.
    let listed = env
        .store
        .list(&account, Some("docs"), None, None)
        .await
        .unwrap();
    assert_eq!(listed.files.len(), 1);
    assert_eq!(listed.total, 1);
    assert_eq!(listed.used, 11);

    let empty = env
        .store
        .list(&account, Some("other"), None, None)
        .await
        .unwrap();
    assert!(empty.files.is_empty());

    let (record, mut reader) = env.store.download(&account, uploaded.id).await.unwrap();
    assert_eq!(record.original_name, "notes.txt");
    let mut body = Vec::new();
    tokio::io::AsyncReadExt::read_to_end(&mut reader, &mut body)
        .await
        .unwrap();
    assert_eq!(body, b"hello world");

    env.store.delete(&account, uploaded.id).await.unwrap();
    assert_eq!(storage_used(&env.db, account.id).await, 0);
    assert!(
        FileQueries::find_owned(env.db.pool(), account.id, uploaded.id)
            .await
            .unwrap()
            .is_none()
    );

    // Deleting again is NotFound, and the counter never goes negative.
    let err = env.store.delete(&account, uploaded.id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound));
    assert_eq!(storage_used(&env.db, account.id).await, 0);
}

#[tokio::test]
#[serial]
async fn test_cross_account_access_is_not_found() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let env = test_env(db.clone());
    let alice = make_account(&env.db, "alice", 10_000).await;
    let bob = make_account(&env.db, "bob", 10_000).await;

    let uploaded = env
        .store
        .upload(&alice, b"private".to_vec(), "secret.txt", None, "root")
        .await
        .unwrap();

    let err = env
        .store
        .download(&bob, uploaded.id)
        .await
        .map(|_| ())
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound));

    let err = env.store.delete(&bob, uploaded.id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound));

    // Alice's file and counter are untouched by the attempts.
    assert!(
        FileQueries::find_owned(env.db.pool(), alice.id, uploaded.id)
            .await
            .unwrap()
            .is_some()
    );
    assert_eq!(storage_used(&env.db, alice.id).await, 7);

    let listed = env.store.list(&bob, None, None, None).await.unwrap();
    assert!(listed.files.is_empty());
}

#[tokio::test]
#[serial]
async fn test_same_filename_gets_distinct_stored_names() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let env = test_env(db.clone());
    let account = make_account(&env.db, "alice", 10_000).await;

    let a = env
        .store
        .upload(&account, b"v1".to_vec(), "report.pdf", None, "root")
        .await
        .unwrap();
    let b = env
        .store
        .upload(&account, b"v2".to_vec(), "report.pdf", None, "root")
        .await
        .unwrap();
    assert_ne!(a.id, b.id);

    let listed = env.store.list(&account, None, None, None).await.unwrap();
    assert_eq!(listed.files.len(), 2);
    assert_eq!(listed.used, 4);

    let stored_a = FileQueries::find_owned(env.db.pool(), account.id, a.id)
        .await
        .unwrap()
        .unwrap();
    let stored_b = FileQueries::find_owned(env.db.pool(), account.id, b.id)
        .await
        .unwrap()
        .unwrap();
    assert_ne!(stored_a.stored_name, stored_b.stored_name);
}

#[tokio::test]
#[serial]
async fn test_per_file_ceiling_is_independent_of_quota() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let upload_dir = TempDir::new().unwrap();
    let storage = Arc::new(LocalStorage::new(upload_dir.path()).unwrap());
    // A tiny per-file ceiling with a huge quota.
    let store = FileStore::new(db.clone(), storage, 16);
    let account = make_account(&db, "alice", 1_000_000).await;

    let err = store
        .upload(&account, vec![0u8; 17], "big.bin", None, "root")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::FileTooLarge));
    assert_eq!(storage_used(&db, account.id).await, 0);

    store
        .upload(&account, vec![0u8; 16], "ok.bin", None, "root")
        .await
        .unwrap();
    assert_eq!(storage_used(&db, account.id).await, 16);
}
