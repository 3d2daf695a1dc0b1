//! End-to-end tests of the HTTP lock source and lock watch against a real
//! oplock server on a loopback socket.

use std::net::SocketAddr;
use std::sync::Arc;

use oplock_client::{
    ClientError, HttpLockSource, LockQuery, LockSource, OperationKind, OperationLockWatch,
    SaveSession, SaveState, WatchConfig,
};
use oplock_server::coordinator::AcquireOutcome;
use oplock_server::router::build_router;
use oplock_server::state::AppState;
use oplock_store::ResourceKey;

async fn start_server() -> (SocketAddr, AppState) {
    let state = AppState::in_memory();
    let app = build_router(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

fn acquire(state: &AppState, kpi: &str, dept: i64, holder: &str, reason: &str) {
    let key = ResourceKey::new(OperationKind::Delete, Some(kpi), Some(dept));
    let outcome = state
        .coordinator
        .acquire(&key, holder, Some(reason.to_string()))
        .unwrap();
    assert!(matches!(outcome, AcquireOutcome::Acquired(_)));
}

#[tokio::test]
async fn test_http_source_reads_server_status() {
    let (addr, state) = start_server().await;
    let source = HttpLockSource::new(format!("http://{addr}"));
    let query = LockQuery::new(OperationKind::Delete, Some("5.4.1"), Some(3));

    let status = source.check(&query).await.unwrap();
    assert!(!status.is_locked);
    assert_eq!(status.lock_reason, None);

    acquire(&state, "5.4.1", 3, "userA", "editing");
    let status = source.check(&query).await.unwrap();
    assert!(status.is_locked);
    assert_eq!(status.lock_reason.as_deref(), Some("editing"));
}

#[tokio::test]
async fn test_http_source_treats_non_success_as_error() {
    let (addr, _state) = start_server().await;
    let source = HttpLockSource::new(format!("http://{addr}/missing-prefix"));
    let query = LockQuery::new(OperationKind::Add, Some("1.1"), None);

    match source.check(&query).await {
        Err(ClientError::Status { status, .. }) => assert_eq!(status, 404),
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_watch_fails_closed_when_server_unreachable() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let source = Arc::new(HttpLockSource::new(format!("http://{addr}")));
    let watch = OperationLockWatch::spawn(
        source,
        LockQuery::new(OperationKind::Delete, Some("5.4.1"), Some(3)),
        WatchConfig::default(),
    );

    let view = watch.refresh().await;
    assert!(view.is_locked);
    assert!(view.error.is_some());
}

#[tokio::test]
async fn test_gated_save_is_refused_while_locked() {
    let (addr, state) = start_server().await;
    acquire(&state, "5.4.1", 3, "userA", "userA editing");

    let watch = OperationLockWatch::spawn(
        Arc::new(HttpLockSource::new(format!("http://{addr}"))),
        LockQuery::new(OperationKind::Delete, Some("5.4.1"), Some(3)),
        WatchConfig::default(),
    );
    watch.refresh().await;

    let session = SaveSession::default();
    session.mark_unsaved();
    let gate = watch.gate();
    session.save(move || {
        let gate = gate.clone();
        async move { gate.map(|_| ()) }
    })
    .await;

    assert_eq!(session.state(), SaveState::Error);
    assert_eq!(session.error().unwrap().message(), "locked: userA editing");
    assert!(session.has_unsaved_changes());
}
