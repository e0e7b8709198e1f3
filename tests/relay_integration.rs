//! End-to-end session tests
//!
//! Each client is a pair of in-memory channels standing in for the socket
//! halves, driven through the same `run_session` the WebSocket handler uses.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{close_code, Message};
use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use futures::{SinkExt, StreamExt};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::json;
use tokio::task::JoinHandle;

use argo_relay::auth::{Claims, JwtValidator};
use argo_relay::config::{JwtConfig, RelayConfig};
use argo_relay::connection_manager::ConnectionRegistry;
use argo_relay::conversation::{
    ChatMessage, Conversation, ConversationStore, MemoryConversationStore,
};
use argo_relay::shutdown::{GracefulShutdown, ShutdownConfig};
use argo_relay::websocket::{run_session, MessageRelay, RelayStats, SessionContext};

const SECRET: &str = "relay-test-secret";

fn mint_token(user: &str, secret: &str) -> String {
    let claims = Claims {
        username: Some(user.to_string()),
        sub: None,
        exp: chrono::Utc::now().timestamp() + 3600,
        iat: None,
        extra: Default::default(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

struct TestEnv {
    ctx: SessionContext,
    registry: Arc<ConnectionRegistry>,
    store: Arc<MemoryConversationStore>,
}

impl TestEnv {
    fn new(config: RelayConfig) -> Self {
        let jwt = JwtConfig {
            secret: SECRET.to_string(),
            issuer: None,
            audience: None,
        };
        let registry = Arc::new(ConnectionRegistry::new());
        let store = Arc::new(MemoryConversationStore::new());
        let relay = Arc::new(MessageRelay::new(
            registry.clone(),
            store.clone(),
            config.send_timeout,
        ));

        Self {
            ctx: SessionContext {
                registry: registry.clone(),
                relay,
                verifier: Arc::new(JwtValidator::new(&jwt)),
                config,
            },
            registry,
            store,
        }
    }

    fn token(&self, user: &str) -> String {
        mint_token(user, SECRET)
    }

    fn connect(&self) -> TestClient {
        let (client_tx, server_rx) = mpsc::unbounded::<Result<Message, String>>();
        let (server_tx, client_rx) = mpsc::unbounded::<Message>();
        let session = tokio::spawn(run_session(server_tx, server_rx, self.ctx.clone()));

        TestClient {
            outbound: client_tx,
            inbound: client_rx,
            session,
        }
    }

    /// Connect and authenticate, returning once the registry holds the connection.
    async fn login(&self, user: &str) -> TestClient {
        let previous = self.registry.get(user).map(|h| h.id);
        let mut client = self.connect();
        client.send_json(json!({ "token": self.token(user) })).await;

        wait_until(|| self.registry.get(user).map(|h| h.id).is_some_and(|id| Some(id) != previous))
            .await;
        client
    }

    fn relay_stats(&self) -> RelayStats {
        self.ctx.relay.stats()
    }

    /// Poll the store until the conversation holds `count` messages.
    async fn wait_for_stored(&self, conversation_id: &str, count: usize) -> Conversation {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let conversation = self.store.conversation(conversation_id).await.unwrap().unwrap();
                if conversation.messages.len() >= count {
                    return conversation;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("message was not stored in time")
    }

    async fn conversation(&self, participants: &[&str]) -> String {
        self.store
            .create_conversation(participants.iter().map(|p| p.to_string()).collect())
            .await
            .unwrap()
            .id
    }
}

struct TestClient {
    outbound: UnboundedSender<Result<Message, String>>,
    inbound: UnboundedReceiver<Message>,
    session: JoinHandle<()>,
}

impl TestClient {
    async fn send(&mut self, message: Message) {
        self.outbound.send(Ok(message)).await.unwrap();
    }

    async fn send_json(&mut self, value: serde_json::Value) {
        self.send(Message::Text(value.to_string().into())).await;
    }

    async fn chat(&mut self, conversation_id: &str, to: &str, from: &str, content: &str) {
        self.send_json(json!({
            "conversationId": conversation_id,
            "to": to,
            "from": from,
            "content": content,
        }))
        .await;
    }

    /// Next frame from the server, skipping heartbeat pings
    async fn recv(&mut self) -> Message {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(2), self.inbound.next())
                .await
                .expect("timed out waiting for a frame")
                .expect("server side closed");
            if !matches!(frame, Message::Ping(_)) {
                return frame;
            }
        }
    }

    async fn recv_chat(&mut self) -> ChatMessage {
        match self.recv().await {
            Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
            other => panic!("expected chat frame, got {:?}", other),
        }
    }

    async fn expect_close(&mut self) -> (u16, String) {
        match self.recv().await {
            Message::Close(Some(frame)) => (frame.code, frame.reason.as_str().to_string()),
            other => panic!("expected close frame, got {:?}", other),
        }
    }

    async fn finished(self) {
        tokio::time::timeout(Duration::from_secs(2), self.session)
            .await
            .expect("session did not end")
            .unwrap();
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

fn quiet_config() -> RelayConfig {
    RelayConfig {
        heartbeat_interval: Duration::from_secs(60),
        pong_timeout: Duration::from_secs(120),
        send_timeout: Duration::from_millis(50),
        auth_timeout: Some(Duration::from_secs(2)),
        channel_capacity: 16,
    }
}

// ============================================================================
// Admission
// ============================================================================

#[tokio::test]
async fn test_valid_token_registers_connection() {
    let env = TestEnv::new(quiet_config());
    let _alice = env.login("alice").await;

    assert_eq!(env.registry.len(), 1);
    assert_eq!(env.registry.get("alice").unwrap().user_id, "alice");
}

#[tokio::test]
async fn test_malformed_auth_message_is_rejected() {
    let env = TestEnv::new(quiet_config());
    let mut client = env.connect();
    client.send(Message::Text("hello".into())).await;

    let (code, reason) = client.expect_close().await;
    assert_eq!(code, close_code::POLICY);
    assert_eq!(reason, "Invalid authentication message");
    client.finished().await;
    assert!(env.registry.is_empty());
}

#[tokio::test]
async fn test_invalid_token_is_rejected() {
    let env = TestEnv::new(quiet_config());
    let mut client = env.connect();
    client.send_json(json!({ "token": "not-a-jwt" })).await;

    let (code, reason) = client.expect_close().await;
    assert_eq!(code, close_code::POLICY);
    assert_eq!(reason, "Invalid token");
    client.finished().await;
    assert!(env.registry.is_empty());
}

#[tokio::test]
async fn test_token_signed_with_other_secret_is_rejected() {
    let env = TestEnv::new(quiet_config());
    let forged = mint_token("alice", "someone-else");

    let mut client = env.connect();
    client.send_json(json!({ "token": forged })).await;

    assert_eq!(client.expect_close().await.1, "Invalid token");
    assert!(env.registry.get("alice").is_none());
}

#[tokio::test]
async fn test_silent_client_times_out_before_auth() {
    let env = TestEnv::new(RelayConfig {
        auth_timeout: Some(Duration::from_millis(50)),
        ..quiet_config()
    });
    let mut client = env.connect();

    let (code, reason) = client.expect_close().await;
    assert_eq!(code, close_code::POLICY);
    assert_eq!(reason, "Authentication timeout");
    client.finished().await;
}

// ============================================================================
// Registry: last connection wins
// ============================================================================

#[tokio::test]
async fn test_second_login_supersedes_first() {
    let env = TestEnv::new(quiet_config());
    let mut first = env.login("alice").await;
    let first_id = env.registry.get("alice").unwrap().id;

    let _second = env.login("alice").await;
    let second_id = env.registry.get("alice").unwrap().id;
    assert_ne!(first_id, second_id);

    let (code, reason) = first.expect_close().await;
    assert_eq!(code, close_code::AWAY);
    assert_eq!(reason, "Superseded by new connection");

    // The superseded session tears down without removing its replacement
    first.finished().await;
    assert_eq!(env.registry.len(), 1);
    assert_eq!(env.registry.get("alice").unwrap().id, second_id);
}

#[tokio::test]
async fn test_peer_close_unregisters() {
    let env = TestEnv::new(quiet_config());
    let mut alice = env.login("alice").await;

    alice.send(Message::Close(None)).await;

    let (code, _) = alice.expect_close().await;
    assert_eq!(code, close_code::NORMAL);
    alice.finished().await;
    assert!(env.registry.is_empty());
}

#[tokio::test]
async fn test_dropped_transport_unregisters() {
    let env = TestEnv::new(quiet_config());
    let alice = env.login("alice").await;

    alice.outbound.close_channel();
    alice.finished().await;
    assert!(env.registry.get("alice").is_none());
}

// ============================================================================
// Relay
// ============================================================================

#[tokio::test]
async fn test_chat_delivered_to_both_sides_and_persisted() {
    let env = TestEnv::new(quiet_config());
    let conversation_id = env.conversation(&["alice", "bob"]).await;
    let mut alice = env.login("alice").await;
    let mut bob = env.login("bob").await;

    alice.chat(&conversation_id, "bob", "alice", "hello bob").await;

    let to_bob = bob.recv_chat().await;
    let echo = alice.recv_chat().await;
    assert_eq!(to_bob.content, "hello bob");
    assert_eq!(to_bob.from, "alice");
    assert!(to_bob.is_normalized());
    assert_eq!(to_bob, echo);

    let stored = env.wait_for_stored(&conversation_id, 1).await;
    assert_eq!(stored.messages.len(), 1);
    assert_eq!(stored.messages[0].id, to_bob.id);
    assert_eq!(stored.messages[0].timestamp, to_bob.timestamp);
}

#[tokio::test]
async fn test_client_supplied_id_is_kept() {
    let env = TestEnv::new(quiet_config());
    let conversation_id = env.conversation(&["alice", "bob"]).await;
    let mut alice = env.login("alice").await;
    let mut bob = env.login("bob").await;

    alice
        .send_json(json!({
            "id": "client-id-1",
            "conversationId": conversation_id,
            "to": "bob",
            "from": "alice",
            "content": "with id",
            "timestamp": "2024-05-01T12:00:00Z",
        }))
        .await;

    let to_bob = bob.recv_chat().await;
    assert_eq!(to_bob.id, "client-id-1");
    assert_eq!(
        to_bob.timestamp.unwrap().to_rfc3339(),
        "2024-05-01T12:00:00+00:00"
    );
}

#[tokio::test]
async fn test_offline_recipient_message_still_persisted() {
    let env = TestEnv::new(quiet_config());
    let conversation_id = env.conversation(&["alice", "bob"]).await;
    let mut alice = env.login("alice").await;

    alice.chat(&conversation_id, "bob", "alice", "are you there?").await;

    let echo = alice.recv_chat().await;
    assert_eq!(echo.to, "bob");

    assert_eq!(env.relay_stats().recipients_offline, 1);
    let stored = env.wait_for_stored(&conversation_id, 1).await;
    assert_eq!(stored.messages[0].content, "are you there?");
}

#[tokio::test]
async fn test_unknown_conversation_does_not_close_connection() {
    let env = TestEnv::new(quiet_config());
    let conversation_id = env.conversation(&["alice", "bob"]).await;
    let mut alice = env.login("alice").await;
    let mut bob = env.login("bob").await;

    alice.chat("no-such-conversation", "bob", "alice", "first").await;
    alice.chat(&conversation_id, "bob", "alice", "second").await;

    assert_eq!(bob.recv_chat().await.content, "first");
    assert_eq!(bob.recv_chat().await.content, "second");
    assert!(env.registry.get("alice").is_some());
}

#[tokio::test]
async fn test_malformed_frames_are_skipped() {
    let env = TestEnv::new(quiet_config());
    let conversation_id = env.conversation(&["alice", "bob"]).await;
    let mut alice = env.login("alice").await;
    let mut bob = env.login("bob").await;

    alice.send(Message::Text("{ not json".into())).await;
    alice.send_json(json!({ "conversationId": conversation_id, "content": "no recipient" })).await;
    alice.chat(&conversation_id, "bob", "alice", "valid").await;

    assert_eq!(bob.recv_chat().await.content, "valid");
    assert_eq!(env.relay_stats().invalid_frames, 2);
}

#[tokio::test]
async fn test_binary_frames_relayed_as_binary() {
    let env = TestEnv::new(quiet_config());
    let conversation_id = env.conversation(&["alice", "bob"]).await;
    let mut alice = env.login("alice").await;
    let mut bob = env.login("bob").await;

    let payload = json!({
        "conversationId": conversation_id,
        "to": "bob",
        "from": "alice",
        "content": "binary",
    })
    .to_string();
    alice.send(Message::Binary(payload.into_bytes().into())).await;

    match bob.recv().await {
        Message::Binary(data) => {
            let message: ChatMessage = serde_json::from_slice(&data).unwrap();
            assert_eq!(message.content, "binary");
        }
        other => panic!("expected binary frame, got {:?}", other),
    }
}

#[tokio::test]
async fn test_stalled_recipient_is_evicted() {
    let env = TestEnv::new(RelayConfig {
        channel_capacity: 1,
        ..quiet_config()
    });
    let conversation_id = env.conversation(&["alice", "bob"]).await;
    let mut alice = env.login("alice").await;

    // Bob's transport accepts one frame and is never read again
    let (mut bob_tx, bob_rx) = mpsc::unbounded::<Result<Message, String>>();
    let (bob_sink, _bob_inbound) = mpsc::channel::<Message>(0);
    let bob_session = tokio::spawn(run_session(bob_sink, bob_rx, env.ctx.clone()));
    bob_tx
        .send(Ok(Message::Text(json!({ "token": env.token("bob") }).to_string().into())))
        .await
        .unwrap();
    wait_until(|| env.registry.get("bob").is_some()).await;

    for i in 0..10 {
        if env.registry.get("bob").is_none() {
            break;
        }
        alice.chat(&conversation_id, "bob", "alice", &format!("msg {}", i)).await;
        alice.recv_chat().await;
    }

    assert!(env.registry.get("bob").is_none());
    assert!(env.registry.get("alice").is_some());
    assert!(env.relay_stats().delivery_failures >= 1);

    tokio::time::timeout(Duration::from_secs(2), bob_session)
        .await
        .expect("stalled session did not end")
        .unwrap();
}

// ============================================================================
// Heartbeat
// ============================================================================

#[tokio::test]
async fn test_unresponsive_peer_closed_after_read_deadline() {
    let env = TestEnv::new(RelayConfig {
        heartbeat_interval: Duration::from_millis(20),
        pong_timeout: Duration::from_millis(100),
        ..quiet_config()
    });
    let mut alice = env.login("alice").await;

    // Never answers pings
    let (code, _) = alice.expect_close().await;
    assert_eq!(code, close_code::NORMAL);
    alice.finished().await;
    assert!(env.registry.get("alice").is_none());
}

#[tokio::test]
async fn test_pongs_keep_connection_alive() {
    let env = TestEnv::new(RelayConfig {
        heartbeat_interval: Duration::from_millis(20),
        pong_timeout: Duration::from_millis(100),
        ..quiet_config()
    });
    let alice = env.login("alice").await;

    let TestClient {
        mut outbound,
        mut inbound,
        session,
    } = alice;
    let responder = tokio::spawn(async move {
        let mut pings = 0;
        while let Some(frame) = inbound.next().await {
            if let Message::Ping(payload) = frame {
                pings += 1;
                if outbound.send(Ok(Message::Pong(payload))).await.is_err() {
                    break;
                }
            }
        }
        pings
    });

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(env.registry.get("alice").is_some());
    assert!(!session.is_finished());

    env.registry.get("alice").unwrap().close(close_code::NORMAL, "");
    tokio::time::timeout(Duration::from_secs(2), session)
        .await
        .unwrap()
        .unwrap();
    let pings = responder.await.unwrap();
    assert!(pings >= 3);
}

// ============================================================================
// Shutdown
// ============================================================================

#[tokio::test]
async fn test_shutdown_closes_all_sessions() {
    let env = TestEnv::new(quiet_config());
    let mut alice = env.login("alice").await;
    let mut bob = env.login("bob").await;

    let result = GracefulShutdown::with_config(
        env.registry.clone(),
        ShutdownConfig {
            drain_timeout: Duration::from_secs(2),
            poll_interval: Duration::from_millis(10),
        },
    )
    .execute()
    .await;

    assert!(result.success);
    assert_eq!(result.connections_closed, 2);
    for client in [&mut alice, &mut bob] {
        let (code, reason) = client.expect_close().await;
        assert_eq!(code, close_code::AWAY);
        assert_eq!(reason, "Server shutting down");
    }
    assert!(env.registry.is_empty());
}
