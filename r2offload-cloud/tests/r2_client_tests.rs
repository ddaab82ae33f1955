use pretty_assertions::assert_eq;
use r2offload_cloud::{
    CloudConfig, CloudError, MAX_UPLOAD_BYTES, ObjectStore, R2Client, R2Credentials,
};
use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::{any, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn creds() -> R2Credentials {
    R2Credentials::new("acct-1", "AKIDEXAMPLE", "s3cr3t-value", "media")
}

fn config_for(endpoint: &str) -> CloudConfig {
    CloudConfig {
        endpoint_override: Some(endpoint.to_string()),
        connect_timeout_secs: 2,
        operation_timeout_secs: 5,
        max_attempts: 1,
        ..CloudConfig::default()
    }
}

fn setup(server: &MockServer) -> R2Client {
    R2Client::new(creds(), config_for(&server.uri())).unwrap()
}

fn error_xml(code: &str, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(403)
        .insert_header("content-type", "application/xml")
        .set_body_string(format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
             <Error><Code>{code}</Code><Message>{message}</Message></Error>"
        ))
}

fn write_file(dir: &TempDir, name: &str, contents: &[u8]) -> std::path::PathBuf {
    let p = dir.path().join(name);
    std::fs::write(&p, contents).unwrap();
    p
}

fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

// ── Construction ────────────────────────────────────────────────

#[test]
fn missing_credentials_fail_before_any_network_call() {
    let mut c = creds();
    c.access_key_id.clear();
    let err = R2Client::new(c, CloudConfig::default()).unwrap_err();
    assert!(matches!(err, CloudError::MissingCredential("access_key_id")));
}

#[test]
fn invalid_config_is_rejected() {
    let config = CloudConfig {
        max_attempts: 0,
        ..CloudConfig::default()
    };
    assert!(matches!(
        R2Client::new(creds(), config),
        Err(CloudError::Config(_))
    ));
}

#[test]
fn debug_does_not_leak_the_secret() {
    let client = R2Client::new(creds(), CloudConfig::default()).unwrap();
    let rendered = format!("{client:?}");
    assert!(rendered.contains("media"));
    assert!(!rendered.contains("s3cr3t"));
}

// ── Public URLs ─────────────────────────────────────────────────

#[test]
fn public_url_defaults_to_account_endpoint() {
    let client = R2Client::new(creds(), CloudConfig::default()).unwrap();
    assert_eq!(
        client.public_url_for("uploads/2024/05/a.jpg"),
        "https://acct-1.r2.cloudflarestorage.com/media/uploads/2024/05/a.jpg"
    );
}

#[test]
fn public_url_uses_custom_domain() {
    let config = CloudConfig {
        public_base_url: Some("https://cdn.example.com/".into()),
        ..CloudConfig::default()
    };
    let client = R2Client::new(creds(), config).unwrap();
    assert_eq!(
        client.public_url_for("uploads/a.jpg"),
        "https://cdn.example.com/uploads/a.jpg"
    );
}

// ── Upload ──────────────────────────────────────────────────────

#[tokio::test]
async fn oversized_upload_fails_without_network() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let client = setup(&server);

    let dir = TempDir::new().unwrap();
    let big = dir.path().join("big.mp4");
    let file = std::fs::File::create(&big).unwrap();
    file.set_len(MAX_UPLOAD_BYTES + 1).unwrap();

    match client.upload(&big, "uploads/big.mp4").await {
        Err(CloudError::FileTooLarge { size, limit }) => {
            assert_eq!(size, MAX_UPLOAD_BYTES + 1);
            assert_eq!(limit, MAX_UPLOAD_BYTES);
        }
        other => panic!("expected FileTooLarge, got {other:?}"),
    }
}

#[tokio::test]
async fn upload_of_missing_file_fails_without_network() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let client = setup(&server);

    let err = client
        .upload(Path::new("/nonexistent/r2offload/a.jpg"), "uploads/a.jpg")
        .await
        .unwrap_err();
    assert!(matches!(err, CloudError::FileMissing(_)));
}

#[tokio::test]
async fn upload_puts_object_at_key() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/media/uploads/2024/photo.jpg"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    let client = setup(&server);

    let dir = TempDir::new().unwrap();
    let local = write_file(&dir, "photo.jpg", b"jpeg bytes");
    let uploaded = client.upload(&local, "uploads/2024/photo.jpg").await.unwrap();

    assert_eq!(uploaded.key, "uploads/2024/photo.jpg");
    assert_eq!(uploaded.size, 10);
    assert_eq!(uploaded.content_type, "image/jpeg");
    assert_eq!(
        uploaded.url,
        format!("{}/media/uploads/2024/photo.jpg", server.uri())
    );
}

#[tokio::test]
async fn upload_failure_carries_provider_message() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(error_xml("AccessDenied", "Access Denied"))
        .mount(&server)
        .await;
    let client = setup(&server);

    let dir = TempDir::new().unwrap();
    let local = write_file(&dir, "a.png", b"png");
    let err = client.upload(&local, "uploads/a.png").await.unwrap_err();
    match err {
        CloudError::S3(msg) => {
            assert!(msg.contains("Access Denied"), "{msg}");
            assert!(!msg.contains("s3cr3t"));
        }
        other => panic!("expected S3 error, got {other:?}"),
    }
}

// ── Download ────────────────────────────────────────────────────

#[tokio::test]
async fn download_writes_file_and_creates_parents() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/media/uploads/a.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello r2".to_vec()))
        .mount(&server)
        .await;
    let client = setup(&server);

    let dir = TempDir::new().unwrap();
    let target = dir.path().join("2024/05/a.txt");
    client.download("uploads/a.txt", &target).await.unwrap();

    assert_eq!(std::fs::read(&target).unwrap(), b"hello r2");
    assert_eq!(dir_entries(target.parent().unwrap()), vec!["a.txt".to_string()]);
}

#[tokio::test]
async fn failed_download_leaves_nothing_behind() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(error_xml("NoSuchKey", "The specified key does not exist."))
        .mount(&server)
        .await;
    let client = setup(&server);

    let dir = TempDir::new().unwrap();
    let target = dir.path().join("missing.txt");
    let err = client.download("uploads/missing.txt", &target).await.unwrap_err();

    assert!(matches!(err, CloudError::S3(_)));
    assert!(!target.exists());
    assert!(dir_entries(dir.path()).is_empty());
}

// ── Delete ──────────────────────────────────────────────────────

#[tokio::test]
async fn delete_succeeds_on_no_content() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/media/uploads/a.jpg"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    let client = setup(&server);
    client.delete("uploads/a.jpg").await.unwrap();
}

#[tokio::test]
async fn delete_of_missing_key_is_idempotent() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .respond_with(
            ResponseTemplate::new(404)
                .insert_header("content-type", "application/xml")
                .set_body_string(
                    "<Error><Code>NoSuchKey</Code><Message>gone</Message></Error>",
                ),
        )
        .mount(&server)
        .await;
    let client = setup(&server);
    client.delete("uploads/gone.jpg").await.unwrap();
}

#[tokio::test]
async fn delete_denied_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .respond_with(error_xml("AccessDenied", "Access Denied"))
        .mount(&server)
        .await;
    let client = setup(&server);
    assert!(matches!(
        client.delete("uploads/a.jpg").await,
        Err(CloudError::S3(_))
    ));
}

// ── Exists ──────────────────────────────────────────────────────

#[tokio::test]
async fn exists_is_true_for_present_object() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/media/uploads/a.jpg"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    let client = setup(&server);
    assert!(client.exists("uploads/a.jpg").await);
}

#[tokio::test]
async fn exists_is_false_for_missing_object() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let client = setup(&server);
    assert!(!client.exists("uploads/nope.jpg").await);
}

#[tokio::test]
async fn exists_is_false_when_unreachable() {
    let client = R2Client::new(creds(), config_for("http://127.0.0.1:9")).unwrap();
    assert!(!client.exists("uploads/a.jpg").await);
}

// ── Connection test ─────────────────────────────────────────────

#[tokio::test]
async fn connection_test_succeeds_when_bucket_answers() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    let client = setup(&server);
    let status = client.test_connection().await;
    assert!(status.success, "{}", status.message);
    assert!(status.message.contains("media"));
}

#[tokio::test]
async fn connection_test_reports_missing_bucket() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let client = setup(&server);
    let status = client.test_connection().await;
    assert!(!status.success);
}

#[tokio::test]
async fn connection_test_failure_is_not_a_panic_or_leak() {
    let client = R2Client::new(creds(), config_for("http://127.0.0.1:9")).unwrap();
    let status = client.test_connection().await;
    assert!(!status.success);
    assert!(!status.message.is_empty());
    assert!(!status.message.contains("s3cr3t"));
}
