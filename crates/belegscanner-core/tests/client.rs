//! Integration tests for the dual-connection client and connection slots.

#![allow(clippy::unwrap_used)]

mod common;

use std::sync::Arc;

use belegscanner_core::{DualConnectionClient, Error, MailConnection, Role};

use common::{ARCHIVE, INBOX, ScriptedConnector, Server, credentials};

#[tokio::test]
async fn test_operations_fail_fast_when_disconnected() {
    let server = Server::new();
    let id = server.deliver(INBOX, "shop@example.com", "Rechnung");
    let client = DualConnectionClient::new(ScriptedConnector::new(&server));

    assert_eq!(
        client.fetch_message(&id).await.unwrap_err(),
        Error::NotConnected(Role::Primary)
    );
    assert_eq!(
        client.fetch_message_prefetch(&id).await.unwrap_err(),
        Error::NotConnected(Role::Prefetch)
    );
    assert!(client.list_summaries(INBOX).await.unwrap_err().is_not_connected());
    assert!(
        client
            .move_message(&id, INBOX, ARCHIVE)
            .await
            .unwrap_err()
            .is_not_connected()
    );

    assert_eq!(server.connect_attempts(), 0);
    assert_eq!(server.total_calls(), 0);
}

#[tokio::test]
async fn test_roles_use_separate_connections() {
    let server = Server::new();
    let id = server.deliver(INBOX, "shop@example.com", "Rechnung");
    let client = DualConnectionClient::new(ScriptedConnector::new(&server));

    client.connect_primary(&credentials()).await.unwrap();
    client.connect_prefetch(&credentials()).await.unwrap();
    assert!(client.is_connected(Role::Primary));
    assert!(client.is_connected(Role::Prefetch));

    client.fetch_message(&id).await.unwrap();
    client.fetch_message_prefetch(&id).await.unwrap();
    client.fetch_message_prefetch(&id).await.unwrap();

    assert_eq!(server.connection(1).fetches(), 1);
    assert_eq!(server.connection(2).fetches(), 2);
}

#[tokio::test]
async fn test_failed_connect_keeps_existing_session() {
    let server = Server::new();
    let id = server.deliver(INBOX, "shop@example.com", "Rechnung");
    let client = DualConnectionClient::new(ScriptedConnector::new(&server));
    client.connect_primary(&credentials()).await.unwrap();

    server.set_fail_connect(true);
    let err = client.connect_primary(&credentials()).await.unwrap_err();
    assert!(matches!(err, Error::Protocol(_)));

    assert!(client.is_connected(Role::Primary));
    assert!(!server.connection(1).is_closed());
    client.fetch_message(&id).await.unwrap();
    assert_eq!(server.connection(1).fetches(), 1);
}

#[tokio::test]
async fn test_reconnect_closes_replaced_session() {
    let server = Server::new();
    let client = DualConnectionClient::new(ScriptedConnector::new(&server));

    client.connect_primary(&credentials()).await.unwrap();
    client.connect_primary(&credentials()).await.unwrap();

    assert!(server.connection(1).is_closed());
    assert!(!server.connection(2).is_closed());
    client.list_summaries(INBOX).await.unwrap();
    assert_eq!(server.connection(2).lists(), 1);
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let server = Server::new();
    let client = DualConnectionClient::new(ScriptedConnector::new(&server));
    client.connect_primary(&credentials()).await.unwrap();
    client.connect_prefetch(&credentials()).await.unwrap();

    client.disconnect().await;
    client.disconnect().await;

    assert!(!client.is_connected(Role::Primary));
    assert!(!client.is_connected(Role::Prefetch));
    for id in 1..=2 {
        let stats = server.connection(id);
        assert!(stats.is_closed());
        assert_eq!(stats.close_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}

#[tokio::test]
async fn test_disconnect_prefetch_keeps_primary() {
    let server = Server::new();
    let client = DualConnectionClient::new(ScriptedConnector::new(&server));
    client.connect_primary(&credentials()).await.unwrap();
    client.connect_prefetch(&credentials()).await.unwrap();

    client.disconnect_prefetch().await;

    assert!(client.is_connected(Role::Primary));
    assert!(!client.is_connected(Role::Prefetch));
    client.list_summaries(INBOX).await.unwrap();
}

#[tokio::test]
async fn test_move_updates_server() {
    let server = Server::new();
    let id = server.deliver(INBOX, "shop@example.com", "Rechnung");
    let client = DualConnectionClient::new(ScriptedConnector::new(&server));
    client.connect_primary(&credentials()).await.unwrap();

    client.move_message(&id, INBOX, ARCHIVE).await.unwrap();

    assert!(server.mailbox_uids(INBOX).is_empty());
    assert_eq!(server.mailbox_uids(ARCHIVE).len(), 1);
}

#[tokio::test]
async fn test_captured_handle_outlives_clear() {
    use belegscanner_core::ConnectionSlot;
    use belegscanner_core::MailConnector;

    let server = Server::new();
    let id = server.deliver(INBOX, "shop@example.com", "Rechnung");
    let connector = ScriptedConnector::new(&server);
    let slot = ConnectionSlot::new(Role::Prefetch);
    slot.set(connector.connect(&credentials()).await.unwrap())
        .await;

    let before = slot.capture().unwrap();
    slot.clear().await;
    let after = slot.capture();

    assert!(after.is_none());
    assert_eq!(Arc::strong_count(&before), 1);
    // The snapshot is still a usable object; the closed session reports the failure
    let err = before.fetch_message(&id).await.unwrap_err();
    assert_eq!(err, Error::ConnectionLost("connection closed".into()));
}

#[tokio::test]
async fn test_lost_primary_is_removed_and_closed() {
    let server = Server::new();
    let client = DualConnectionClient::new(ScriptedConnector::new(&server));
    client.connect_primary(&credentials()).await.unwrap();
    client.connect_prefetch(&credentials()).await.unwrap();

    server.lose_connection(1);
    let err = client.list_summaries(INBOX).await.unwrap_err();
    assert!(err.is_connection_lost());

    assert!(!client.is_connected(Role::Primary));
    assert!(server.connection(1).is_closed());
    assert_eq!(
        client.list_summaries(INBOX).await.unwrap_err(),
        Error::NotConnected(Role::Primary)
    );
    assert!(client.is_connected(Role::Prefetch));

    client.connect_primary(&credentials()).await.unwrap();
    client.list_summaries(INBOX).await.unwrap();
}

#[tokio::test]
async fn test_lost_prefetch_keeps_newer_session() {
    let server = Server::new();
    let id = server.deliver(INBOX, "shop@example.com", "Rechnung");
    let client = Arc::new(DualConnectionClient::new(ScriptedConnector::new(&server)));
    client.connect_prefetch(&credentials()).await.unwrap();

    server.hold_fetches_on(1);
    let fetch = tokio::spawn({
        let client = Arc::clone(&client);
        let id = id.clone();
        async move { client.fetch_message_prefetch(&id).await }
    });
    server.fetch_held.notified().await;

    // Reconnect while the old session is still busy; this closes connection 1
    client.connect_prefetch(&credentials()).await.unwrap();
    server.release_fetches_on(1, 1);

    assert!(fetch.await.unwrap().unwrap_err().is_connection_lost());
    assert!(client.is_connected(Role::Prefetch));
    assert!(!server.connection(2).is_closed());
    assert_eq!(client.fetch_message_prefetch(&id).await.unwrap().subject, "Rechnung");
}
