use std::sync::Arc;
use std::time::Duration;

use cvmweb_protocol::{CallbackRole, ErrorCode, Frame, SessionId};
use serde_json::{Value, json};

use super::*;
use crate::transport::{MemoryPeer, MemoryTransport};

fn create_test_connection() -> (Connection, MemoryPeer) {
	let (parts, peer) = MemoryTransport::pair();
	(Connection::new(parts), peer)
}

fn start_test_connection() -> (Arc<Connection>, MemoryPeer) {
	let (connection, peer) = create_test_connection();
	let connection = Arc::new(connection);
	let conn_for_loop = Arc::clone(&connection);
	tokio::spawn(async move { conn_for_loop.run().await });
	(connection, peer)
}

fn frame(value: Value) -> Frame {
	serde_json::from_value(value).unwrap()
}

#[test]
fn test_request_id_increments() {
	let (connection, _peer) = create_test_connection();

	let id1 = connection.last_id.fetch_add(1, Ordering::SeqCst);
	let id2 = connection.last_id.fetch_add(1, Ordering::SeqCst);
	let id3 = connection.last_id.fetch_add(1, Ordering::SeqCst);

	assert_eq!(id1, 0);
	assert_eq!(id2, 1);
	assert_eq!(id3, 2);
}

#[tokio::test]
async fn test_dispatch_response_success() {
	let (connection, _peer) = create_test_connection();

	let request = connection.send_action("handshake", Some(json!({}))).unwrap();
	let id = request.id().to_string();

	connection.dispatch(frame(json!({"type": "response", "id": id, "data": {"version": "2.0.4"}})));

	let result = request.outcome().await.unwrap();
	assert_eq!(result["version"], "2.0.4");
	assert_eq!(connection.pending_count(), 0);
}

#[tokio::test]
async fn test_dispatch_failed_callback() {
	let (connection, _peer) = create_test_connection();

	let request = connection
		.send_action("requestSession", Some(json!({"vmcp": "https://example.org/vmcp"})))
		.unwrap();
	let id = request.id().to_string();

	connection.dispatch(frame(json!({
		"type": "event",
		"name": "failed",
		"id": id,
		"data": ["The domain is not trusted", -11]
	})));

	let err = request.outcome().await.unwrap_err();
	match &err {
		Error::Remote { message, code } => {
			assert_eq!(message, "The domain is not trusted");
			assert_eq!(*code, ErrorCode::NotTrusted);
		}
		other => panic!("Expected Remote error, got: {other:?}"),
	}
	assert!(err.is_access_denied());
}

#[tokio::test]
async fn test_dispatch_error_frame() {
	let (connection, _peer) = create_test_connection();

	let request = connection.send_action("requestSession", None).unwrap();
	let id = request.id().to_string();

	connection.dispatch(frame(json!({"type": "error", "id": id, "error": "Missing 'vmcp' parameter"})));

	let err = request.outcome().await.unwrap_err();
	assert!(matches!(err, Error::Rejected(ref msg) if msg == "Missing 'vmcp' parameter"));
}

#[tokio::test]
async fn test_progress_then_succeed() {
	let (connection, _peer) = create_test_connection();

	let mut request = connection.send_action("requestSession", None).unwrap();
	let id = request.id().to_string();

	connection.dispatch(frame(json!({"type": "event", "name": "started", "id": id, "data": ["Starting"]})));
	connection.dispatch(frame(json!({"type": "event", "name": "progress", "id": id, "data": ["Downloading", 40]})));
	connection.dispatch(frame(json!({"type": "event", "name": "succeed", "id": id, "data": ["Session open successfully", 12]})));

	let mut roles = Vec::new();
	while let Some(reply) = request.next().await.unwrap() {
		match reply {
			Reply::Callback { role, .. } => roles.push(role),
			other => panic!("Unexpected reply: {other:?}"),
		}
	}

	assert_eq!(
		roles,
		vec![CallbackRole::Started, CallbackRole::Progress, CallbackRole::Succeed]
	);
	assert_eq!(connection.pending_count(), 0);
}

#[tokio::test]
async fn test_notify_registers_nothing() {
	let (connection, mut peer) = start_test_connection();

	connection.notify("stopService", None).unwrap();

	let sent = peer.recv().await.unwrap();
	assert_eq!(sent, json!({"type": "action", "name": "stopService", "id": "0"}));
	assert_eq!(connection.pending_count(), 0);
	assert!(peer.try_recv().is_none());
}

#[tokio::test]
async fn test_dropped_request_is_unregistered() {
	let (connection, _peer) = create_test_connection();

	let request = connection.send_action("enumSessions", None).unwrap();
	assert_eq!(connection.pending_count(), 1);

	drop(request);
	assert_eq!(connection.pending_count(), 0);
}

#[tokio::test]
async fn test_session_route_receives_events() {
	let (connection, _peer) = create_test_connection();

	let mut events = connection.register_route(SessionId::new("12"));
	assert!(connection.has_route("12"));

	connection.dispatch(frame(json!({"type": "event", "name": "stateChanged", "id": 12, "data": [5]})));

	let event = events.recv().await.unwrap();
	assert_eq!(event.name, "stateChanged");
	assert_eq!(event.arg_i64(0), Some(5));

	assert!(connection.unregister_route("12"));
	assert!(events.recv().await.is_none());
	assert_eq!(connection.route_count(), 0);
}

#[tokio::test]
async fn test_role_names_prefer_pending_request() {
	let (connection, _peer) = create_test_connection();

	// A session id that collides with the next request id.
	let mut session_events = connection.register_route(SessionId::new("0"));
	let request = connection.send_action("requestSession", None).unwrap();
	assert_eq!(request.id(), "0");

	connection.dispatch(frame(json!({"type": "event", "name": "stateVariables", "id": "0", "data": {"cpus": 1}})));
	connection.dispatch(frame(json!({"type": "event", "name": "succeed", "id": "0", "data": ["ok"]})));

	assert_eq!(session_events.recv().await.unwrap().name, "stateVariables");
	assert_eq!(request.outcome().await.unwrap(), json!(["ok"]));
}

#[tokio::test]
async fn test_connection_events_are_broadcast() {
	let (connection, _peer) = create_test_connection();
	let mut events = connection.subscribe();

	connection.dispatch(frame(json!({"type": "event", "name": "privileged", "data": [true]})));

	let event = events.recv().await.unwrap();
	assert_eq!(event.name, "privileged");
	assert_eq!(event.arg_bool(0), Some(true));
}

#[tokio::test]
async fn test_unknown_ids_are_ignored() {
	let (connection, _peer) = create_test_connection();
	connection.dispatch(frame(json!({"type": "event", "name": "succeed", "id": "99", "data": []})));
	connection.dispatch(frame(json!({"type": "response", "id": "98", "data": {}})));
	assert_eq!(connection.pending_count(), 0);
	assert_eq!(connection.route_count(), 0);
}

#[tokio::test]
async fn test_round_trip_through_run_loop() {
	let (connection, mut peer) = start_test_connection();

	let conn = Arc::clone(&connection);
	let call = tokio::spawn(async move { conn.call("handshake", Some(json!({"auth": "k"}))).await });

	let sent = peer.recv().await.unwrap();
	assert_eq!(sent["type"], "action");
	assert_eq!(sent["name"], "handshake");
	assert_eq!(sent["data"]["auth"], "k");

	peer.send(json!({"type": "response", "id": sent["id"], "data": {"version": "2.0.4"}}));

	let data = call.await.unwrap().unwrap();
	assert_eq!(data["version"], "2.0.4");
}

#[tokio::test]
async fn test_close_fails_pending_and_drops_routes() {
	let (connection, mut peer) = start_test_connection();

	let request = connection.send_action("requestSession", None).unwrap();
	let mut route = connection.register_route(SessionId::new("3"));
	let _ = peer.recv().await;

	drop(peer);
	tokio::time::timeout(Duration::from_secs(1), connection.closed())
		.await
		.unwrap();

	assert!(connection.is_closed());
	assert!(matches!(request.outcome().await, Err(Error::ChannelClosed)));
	assert!(route.recv().await.is_none());
	assert!(matches!(
		connection.send_action("sync", None),
		Err(Error::ChannelClosed)
	));
}

#[tokio::test]
async fn test_client_close_drops_transport() {
	let (connection, mut peer) = start_test_connection();
	let request = connection.send_action("handshake", Some(json!({}))).unwrap();
	assert_eq!(peer.recv().await.unwrap()["name"], "handshake");

	connection.close();

	tokio::time::timeout(Duration::from_secs(5), connection.closed())
		.await
		.expect("run loop did not stop");
	assert!(connection.is_closed());
	assert!(matches!(request.outcome().await, Err(Error::ChannelClosed)));
	assert!(peer.recv().await.is_none());
	assert!(!peer.send(json!({"type": "event", "name": "privileged", "data": [true]})));
}

#[test]
fn test_non_terminal_reply_is_not_an_outcome() {
	let reply = Reply::Callback {
		role: CallbackRole::Progress,
		event: cvmweb_protocol::EventFrame {
			name: "progress".to_string(),
			id: Some("1".to_string()),
			data: json!(["x", 1]),
		},
	};
	assert!(!reply.is_terminal());
	assert!(matches!(reply.into_result(), Err(Error::ProtocolError(_))));
}
