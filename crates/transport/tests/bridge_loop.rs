//! Integration test: boots an in-process WebSocket server that plays the
//! bridge side of the protocol, opens a real [`BridgeTransport`] session
//! against it, and walks the pairing lifecycle:
//!
//! - `open_session` carries stored credentials (or none)
//! - `session_ready` unblocks `ready()` and sets the registered flag
//! - pairing code and message requests are correlated by `request_id`
//! - `creds_update` lands atomically in the workspace
//! - `connection_update` surfaces as `ConnectionEvent`s
//! - a dropped socket surfaces as a transient close
//! - `close()` sends `close_session`

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use pl_protocol::{AccountInfo, BridgeMessage, ConnectionState, ErrorInfo, MessageKey};
use pl_transport::bridge::BRIDGE_LOST_STATUS;
use pl_transport::{BridgeTransport, ConnectionEvent, OutgoingMessage, Transport};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

// ── Mini bridge: in-process WS server ───────────────────────────────────

/// One accepted connection: the `open_session` it started with plus
/// channels to talk to the client.
struct BridgeConn {
    hello: BridgeMessage,
    send: mpsc::Sender<BridgeMessage>,
    recv: mpsc::Receiver<BridgeMessage>,
}

impl BridgeConn {
    async fn push(&self, msg: BridgeMessage) {
        self.send.send(msg).await.unwrap();
    }

    async fn next(&mut self) -> BridgeMessage {
        within(self.recv.recv()).await.expect("bridge connection closed")
    }
}

async fn within<F: std::future::Future>(fut: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), fut)
        .await
        .expect("timed out")
}

async fn start_mini_bridge() -> (String, mpsc::Receiver<BridgeConn>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (conn_tx, conn_rx) = mpsc::channel(4);

    tokio::spawn(async move {
        while let Ok((stream, _peer)) = listener.accept().await {
            let conn_tx = conn_tx.clone();
            tokio::spawn(async move {
                let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                let (mut sink, mut stream) = ws.split();

                let hello = match stream.next().await {
                    Some(Ok(Message::Text(text))) => {
                        serde_json::from_str::<BridgeMessage>(&text).unwrap()
                    }
                    _ => return,
                };

                let (to_client_tx, mut to_client_rx) = mpsc::channel::<BridgeMessage>(16);
                let (from_client_tx, from_client_rx) = mpsc::channel::<BridgeMessage>(16);
                let _ = conn_tx
                    .send(BridgeConn {
                        hello,
                        send: to_client_tx,
                        recv: from_client_rx,
                    })
                    .await;

                loop {
                    tokio::select! {
                        outgoing = to_client_rx.recv() => match outgoing {
                            Some(msg) => {
                                let json = serde_json::to_string(&msg).unwrap();
                                if sink.send(Message::Text(json)).await.is_err() {
                                    break;
                                }
                            }
                            // Test dropped its sender: hang up.
                            None => break,
                        },
                        incoming = stream.next() => match incoming {
                            Some(Ok(Message::Text(text))) => {
                                if let Ok(msg) = serde_json::from_str(&text) {
                                    let _ = from_client_tx.send(msg).await;
                                }
                            }
                            Some(Ok(_)) => {}
                            _ => break,
                        },
                    }
                }
                let _ = sink.close().await;
            });
        }
    });

    (format!("ws://{addr}/v1/session"), conn_rx)
}

// ── Tests ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn full_pairing_lifecycle_over_the_bridge() {
    let (url, mut conns) = start_mini_bridge().await;
    let dir = tempfile::tempdir().unwrap();
    let workspace = dir.path().join("s1");
    std::fs::create_dir(&workspace).unwrap();

    let transport = BridgeTransport::new(url, Some("secret".into()), "creds.json");
    let opened = within(transport.open("s1", &workspace)).await.unwrap();
    let session = opened.session.clone();
    let mut events = opened.events;

    let mut conn = within(conns.recv()).await.unwrap();
    match &conn.hello {
        BridgeMessage::OpenSession {
            session_id,
            credentials,
            ..
        } => {
            assert_eq!(session_id, "s1");
            assert!(credentials.is_none());
        }
        other => panic!("expected open_session, got {other:?}"),
    }

    // ── Ready ─────────────────────────────────────────────────────
    conn.push(BridgeMessage::SessionReady { registered: false }).await;
    within(session.ready()).await.unwrap();
    assert!(!session.is_registered());

    // ── Pairing code ──────────────────────────────────────────────
    let requester = session.clone();
    let code_task =
        tokio::spawn(async move { requester.request_pairing_code("15551234567").await });
    let request_id = match conn.next().await {
        BridgeMessage::RequestPairingCode {
            request_id,
            phone_number,
        } => {
            assert_eq!(phone_number, "15551234567");
            request_id
        }
        other => panic!("expected request_pairing_code, got {other:?}"),
    };
    conn.push(BridgeMessage::PairingCode {
        request_id,
        code: "ABCD-1234".into(),
    })
    .await;
    assert_eq!(within(code_task).await.unwrap().unwrap(), "ABCD-1234");

    // ── Credentials then open ─────────────────────────────────────
    conn.push(BridgeMessage::CredsUpdate {
        credentials: serde_json::json!({ "noise_key": "k", "registered": true }),
        registered: true,
        me: Some(AccountInfo {
            id: "15551234567:4@s.whatsapp.net".into(),
            name: Some("Ada".into()),
        }),
    })
    .await;
    conn.push(BridgeMessage::ConnectionUpdate {
        connection: ConnectionState::Open,
        error: None,
    })
    .await;
    assert_eq!(within(events.recv()).await, Some(ConnectionEvent::Open));

    // The reader persists credentials before forwarding the next event.
    let stored: serde_json::Value =
        serde_json::from_slice(&std::fs::read(workspace.join("creds.json")).unwrap()).unwrap();
    assert_eq!(stored["noise_key"], "k");
    assert!(session.is_registered());
    let me = session.own_identity().unwrap();
    assert_eq!(me.user, "15551234567");
    assert_eq!(me.address, "15551234567@s.whatsapp.net");

    // ── Send message ──────────────────────────────────────────────
    let sender = session.clone();
    let send_task = tokio::spawn(async move {
        sender
            .send_message("15551234567@s.whatsapp.net", OutgoingMessage::text("TOKEN"))
            .await
    });
    let request_id = match conn.next().await {
        BridgeMessage::SendMessage {
            request_id,
            to,
            message,
        } => {
            assert_eq!(to, "15551234567@s.whatsapp.net");
            assert_eq!(message.text, "TOKEN");
            request_id
        }
        other => panic!("expected send_message, got {other:?}"),
    };
    let key = MessageKey {
        id: "MSG1".into(),
        remote: "15551234567@s.whatsapp.net".into(),
    };
    conn.push(BridgeMessage::MessageSent {
        request_id,
        key: key.clone(),
    })
    .await;
    assert_eq!(within(send_task).await.unwrap().unwrap(), key);

    // ── Close ─────────────────────────────────────────────────────
    session.close().await;
    session.close().await;
    assert!(matches!(conn.next().await, BridgeMessage::CloseSession));
    assert!(session.request_pairing_code("1").await.is_err());
}

#[tokio::test]
async fn stored_credentials_are_sent_on_open() {
    let (url, mut conns) = start_mini_bridge().await;
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("creds.json"),
        serde_json::to_vec(&serde_json::json!({ "registered": true })).unwrap(),
    )
    .unwrap();

    let transport = BridgeTransport::new(url, None, "creds.json");
    let _opened = within(transport.open("s2", dir.path())).await.unwrap();
    let conn = within(conns.recv()).await.unwrap();
    match conn.hello {
        BridgeMessage::OpenSession { credentials, .. } => {
            assert_eq!(credentials, Some(serde_json::json!({ "registered": true })));
        }
        other => panic!("expected open_session, got {other:?}"),
    }
}

#[tokio::test]
async fn request_failed_surfaces_as_error() {
    let (url, mut conns) = start_mini_bridge().await;
    let dir = tempfile::tempdir().unwrap();
    let transport = BridgeTransport::new(url, None, "creds.json");
    let opened = within(transport.open("s3", dir.path())).await.unwrap();
    let mut conn = within(conns.recv()).await.unwrap();

    let session = opened.session.clone();
    let task = tokio::spawn(async move { session.request_pairing_code("15551234567").await });
    let request_id = match conn.next().await {
        BridgeMessage::RequestPairingCode { request_id, .. } => request_id,
        other => panic!("expected request_pairing_code, got {other:?}"),
    };
    conn.push(BridgeMessage::RequestFailed {
        request_id,
        error: "rate limited".into(),
    })
    .await;

    let err = within(task).await.unwrap().unwrap_err();
    assert!(err.to_string().contains("rate limited"));
}

#[tokio::test]
async fn close_with_reason_and_dropped_socket_become_events() {
    let (url, mut conns) = start_mini_bridge().await;
    let dir = tempfile::tempdir().unwrap();
    let transport = BridgeTransport::new(url, None, "creds.json");
    let opened = within(transport.open("s4", dir.path())).await.unwrap();
    let mut events = opened.events;
    let conn = within(conns.recv()).await.unwrap();

    conn.push(BridgeMessage::ConnectionUpdate {
        connection: ConnectionState::Close,
        error: Some(ErrorInfo::new(401, "logged out")),
    })
    .await;
    assert_eq!(
        within(events.recv()).await,
        Some(ConnectionEvent::Close {
            reason: Some(ErrorInfo::new(401, "logged out"))
        })
    );

    // Hang up without a connection_update.
    drop(conn);
    match within(events.recv()).await {
        Some(ConnectionEvent::Close { reason: Some(info) }) => {
            assert_eq!(info.status_code, BRIDGE_LOST_STATUS);
        }
        other => panic!("expected synthetic close, got {other:?}"),
    }
    // The session never became ready.
    assert!(opened.session.ready().await.is_err());
}
