use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use extension_gatekeeper::client::{BlocklistApi, HttpBlocklistClient};
use extension_gatekeeper::gatekeeper::error::{GatekeeperError, RemoteError};
use extension_gatekeeper::gatekeeper::extension::FileCandidate;
use extension_gatekeeper::gatekeeper::{Gatekeeper, Notice, Notifier, SelectionDecision};
use extension_gatekeeper::web::{AppState, create_router};
use sha2::{Digest, Sha256};
use tempfile::TempDir;
use tokio::net::TcpListener;

const CSRF_SECRET: &str = "integration-secret";

#[derive(Default, Clone)]
struct Recorder {
    notices: Arc<Mutex<Vec<Notice>>>,
}

impl Notifier for Recorder {
    fn notify(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }
}

impl Recorder {
    fn take(&self) -> Vec<Notice> {
        std::mem::take(&mut *self.notices.lock().unwrap())
    }
}

async fn spawn_server() -> (String, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let upload_dir = temp_dir.path().join("data");
    std::fs::create_dir(&upload_dir).unwrap();
    let state = AppState::new(
        upload_dir,
        temp_dir.path().join("block_config.json"),
        CSRF_SECRET.to_string(),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, create_router(state)).await });

    (format!("http://{address}"), temp_dir)
}

async fn connect(base_url: &str) -> (Gatekeeper<HttpBlocklistClient, Recorder>, Recorder) {
    let recorder = Recorder::default();
    let client = HttpBlocklistClient::new(base_url).unwrap();
    let gatekeeper = Gatekeeper::connect(client, recorder.clone()).await.unwrap();
    (gatekeeper, recorder)
}

/// A correctly signed token issued two hours ago.
fn expired_token() -> String {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
    let payload = format!("{}:4242", now - 7200);
    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    hasher.update(CSRF_SECRET.as_bytes());
    format!("{payload}:{}", hex::encode(hasher.finalize()))
}

fn names(files: &[FileCandidate]) -> Vec<&str> {
    files.iter().map(|file| file.name.as_str()).collect()
}

#[tokio::test]
async fn test_blocklist_changes_reach_the_server_and_the_filter() {
    let (base_url, _temp_dir) = spawn_server().await;
    let (gatekeeper, recorder) = connect(&base_url).await;

    // nothing blocked by default
    assert!(gatekeeper.compute_blocklist().is_empty());

    gatekeeper.toggle_fixed_extension("bat", true).await.unwrap();
    assert_eq!(gatekeeper.add_custom_extension(" .SH ").await.unwrap(), "sh");

    let selection = ["a.txt", "b.BAT", "c.sh", "d"]
        .into_iter()
        .map(FileCandidate::new)
        .collect();
    let decision = gatekeeper.filter_selection(selection, &gatekeeper.compute_blocklist());
    assert_eq!(names(decision.accepted()), vec!["a.txt", "d"]);
    assert_eq!(
        recorder.take(),
        vec![
            Notice::Rejected {
                file_name: "b.BAT".to_string()
            },
            Notice::Rejected {
                file_name: "c.sh".to_string()
            },
        ]
    );

    // a fresh client sees what the first one stored
    let (other, _) = connect(&base_url).await;
    let list = other.compute_blocklist();
    assert!(list.contains("bat"));
    assert!(list.contains("sh"));
}

#[tokio::test]
async fn test_server_duplicate_is_reported() {
    let (base_url, _temp_dir) = spawn_server().await;
    let (first, _) = connect(&base_url).await;
    let (second, recorder) = connect(&base_url).await;

    first.add_custom_extension("php").await.unwrap();

    // the second client has not seen "php" yet, so only the server catches it
    let err = second.add_custom_extension("php").await.unwrap_err();
    assert!(matches!(err, GatekeeperError::Remote(RemoteError::Duplicate)));
    assert_eq!(recorder.take(), vec![Notice::CreateFailed(RemoteError::Duplicate)]);
    second.with_state(|state| assert!(state.custom().is_empty()));
}

#[tokio::test]
async fn test_remove_and_cancelled_selection() {
    let (base_url, _temp_dir) = spawn_server().await;
    let (gatekeeper, _) = connect(&base_url).await;

    gatekeeper.add_custom_extension("exe").await.unwrap();
    let mut selection = vec![FileCandidate::new("setup.exe")];
    assert!(!gatekeeper.handle_selection(&mut selection));

    gatekeeper.remove_custom_extension("exe").await.unwrap();
    gatekeeper.with_state(|state| assert!(state.custom().is_empty()));

    let snapshot = gatekeeper.api().fetch_blocklist().await.unwrap();
    assert!(snapshot.custom.is_empty());

    let decision = gatekeeper.filter_selection(
        vec![FileCandidate::new("setup.exe")],
        &gatekeeper.compute_blocklist(),
    );
    assert_eq!(
        decision,
        SelectionDecision::Proceed(vec![FileCandidate::new("setup.exe")])
    );
}

#[tokio::test]
async fn test_missing_token_is_fetched_on_demand() {
    let (base_url, _temp_dir) = spawn_server().await;
    let client = HttpBlocklistClient::new(&base_url).unwrap();

    // no fetch yet, so the first attempt is refused and retried with a token
    assert!(client.create_custom("sh").await.unwrap().success);
    assert_eq!(client.fetch_blocklist().await.unwrap().custom, vec!["sh"]);
}

#[tokio::test]
async fn test_expired_token_is_renewed() {
    let (base_url, _temp_dir) = spawn_server().await;
    let (gatekeeper, recorder) = connect(&base_url).await;

    gatekeeper.api().set_csrf_token(Some(expired_token()));
    assert_eq!(gatekeeper.add_custom_extension("sh").await.unwrap(), "sh");

    gatekeeper.api().set_csrf_token(Some(expired_token()));
    gatekeeper.toggle_fixed_extension("exe", true).await.unwrap();

    gatekeeper.api().set_csrf_token(Some(expired_token()));
    gatekeeper.remove_custom_extension("sh").await.unwrap();

    assert!(recorder.take().is_empty());
    let snapshot = gatekeeper.api().fetch_blocklist().await.unwrap();
    assert!(snapshot.custom.is_empty());
    assert_eq!(snapshot.fixed.get("exe"), Some(&true));
}

#[tokio::test]
async fn test_forged_token_is_replaced() {
    let (base_url, _temp_dir) = spawn_server().await;
    let client = HttpBlocklistClient::new(&base_url).unwrap();
    client.set_csrf_token(Some("1:2:forged".to_string()));

    assert!(client.set_fixed("bat", true).await.unwrap().success);
}

#[tokio::test]
async fn test_unreachable_server_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    drop(listener);

    let client = HttpBlocklistClient::new(&format!("http://{address}")).unwrap();
    let err = client.fetch_blocklist().await.unwrap_err();
    assert!(matches!(err, GatekeeperError::Transport(_)));
}
