use std::time::Duration;

use serde_json::{Value, json};

use super::*;

fn create_test_connection() -> (Arc<CdpConnection>, mpsc::UnboundedReceiver<String>) {
	CdpConnection::unconnected(Duration::from_secs(5))
}

async fn next_request(outbound: &mut mpsc::UnboundedReceiver<String>) -> Value {
	let text = outbound.recv().await.unwrap();
	serde_json::from_str(&text).unwrap()
}

#[tokio::test]
async fn test_request_ids_increment_and_session_is_attached() {
	let (connection, mut outbound) = create_test_connection();

	let first = tokio::spawn({
		let connection = connection.clone();
		async move { connection.send("Target.getTargets", json!({}), None).await }
	});
	let request = next_request(&mut outbound).await;
	assert_eq!(request["id"], 1);
	assert_eq!(request["method"], "Target.getTargets");
	assert!(request.get("sessionId").is_none());
	connection.handle_text(r#"{"id":1,"result":{"targetInfos":[]}}"#);
	assert_eq!(first.await.unwrap().unwrap(), json!({"targetInfos": []}));

	let second = tokio::spawn({
		let connection = connection.clone();
		async move { connection.send("Performance.getMetrics", json!({}), Some("S1")).await }
	});
	let request = next_request(&mut outbound).await;
	assert_eq!(request["id"], 2);
	assert_eq!(request["sessionId"], "S1");
	connection.handle_text(r#"{"id":2,"result":{},"sessionId":"S1"}"#);
	assert_eq!(second.await.unwrap().unwrap(), json!({}));
}

#[tokio::test]
async fn test_dispatch_response_error() {
	let (connection, mut outbound) = create_test_connection();

	let call = tokio::spawn({
		let connection = connection.clone();
		async move { connection.send("Target.getTargetInfo", json!({"targetId": "gone"}), None).await }
	});
	let request = next_request(&mut outbound).await;
	let id = request["id"].as_u64().unwrap();
	connection.handle_text(&format!(r#"{{"id":{id},"error":{{"code":-32602,"message":"No target with given id found"}}}}"#));

	let err = call.await.unwrap().unwrap_err();
	assert!(matches!(err, Error::Protocol { code: -32602, .. }));
	assert!(err.is_target_missing());
}

#[tokio::test]
async fn test_events_are_broadcast() {
	let (connection, _outbound) = create_test_connection();
	let mut events = connection.subscribe();

	connection.handle_text(r#"{"method":"Target.detachedFromTarget","params":{"sessionId":"S9","targetId":"T9"}}"#);

	let event = events.recv().await.unwrap();
	assert_eq!(event.method, "Target.detachedFromTarget");
	assert_eq!(event.params["sessionId"], "S9");
	assert_eq!(event.session_id, None);
}

#[tokio::test]
async fn test_unknown_and_garbage_frames_are_ignored() {
	let (connection, _outbound) = create_test_connection();
	connection.handle_text(r#"{"id":99,"result":{}}"#);
	connection.handle_text("not json");
	assert!(connection.pending.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_timeout_removes_pending_entry() {
	let (connection, mut outbound) = CdpConnection::unconnected(Duration::from_millis(100));

	let call = tokio::spawn({
		let connection = connection.clone();
		async move { connection.send("Page.navigate", json!({"url": "https://example.com"}), Some("S1")).await }
	});
	next_request(&mut outbound).await;

	let err = call.await.unwrap().unwrap_err();
	assert!(matches!(err, Error::Timeout { ref method, after_ms: 100 } if method == "Page.navigate"));
	assert!(connection.pending.lock().is_empty());
}

#[tokio::test]
async fn test_closed_connection_fails_pending_requests() {
	let (connection, mut outbound) = create_test_connection();

	let call = tokio::spawn({
		let connection = connection.clone();
		async move { connection.send("Target.getTargets", json!({}), None).await }
	});
	next_request(&mut outbound).await;
	connection.fail_pending();

	assert!(matches!(call.await.unwrap(), Err(Error::ChannelClosed)));
}

#[tokio::test]
async fn test_send_after_writer_gone_is_channel_closed() {
	let (connection, outbound) = create_test_connection();
	drop(outbound);
	assert!(connection.is_closed());
	assert!(matches!(connection.send("Target.getTargets", json!({}), None).await, Err(Error::ChannelClosed)));
}
