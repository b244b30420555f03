use minitel_neural::{
    ApiError, ChatBackend, ChatRequest, FragmentStream, OpenAiClient, Role, Turn,
};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

fn request(stream: bool) -> ChatRequest {
    ChatRequest {
        model: "test-model".to_string(),
        system: Some("Sois bref.".to_string()),
        history: vec![Turn::user("Salut"), Turn::assistant("Bonjour !")],
        prompt: "Quelle heure est-il ?".to_string(),
        stream,
    }
}

// ============================================================================
// ChatRequest Tests
// ============================================================================

#[test]
fn test_messages_order() {
    let messages = request(true).messages();
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[0]["role"], "system");
    assert_eq!(messages[1]["role"], "user");
    assert_eq!(messages[1]["content"], "Salut");
    assert_eq!(messages[2]["role"], "assistant");
    assert_eq!(messages[3]["content"], "Quelle heure est-il ?");
}

#[test]
fn test_messages_without_system() {
    let mut req = request(false);
    req.system = None;
    req.history.clear();
    let messages = req.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["role"], "user");
}

#[test]
fn test_body_carries_model_and_stream_flag() {
    let body = request(true).body();
    assert_eq!(body["model"], "test-model");
    assert_eq!(body["stream"], true);
    assert_eq!(request(false).body()["stream"], false);
}

#[test]
fn test_role_round_trip() {
    for role in [Role::System, Role::User, Role::Assistant] {
        assert_eq!(Role::parse(role.as_str()), Some(role));
    }
    assert_eq!(Role::parse("tool"), None);
}

// ============================================================================
// FragmentStream Tests
// ============================================================================

#[test]
fn test_complete_stream_yields_once() {
    let mut stream = FragmentStream::complete("tout");
    assert_eq!(stream.next().unwrap().unwrap(), "tout");
    assert!(stream.next().is_none());
    assert!(stream.next().is_none());
}

#[test]
fn test_channel_stream_preserves_order() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let (tx, rx) = tokio::sync::mpsc::channel(4);
    rt.spawn(async move {
        for word in ["un ", "deux ", "trois"] {
            tx.send(Ok(word.to_string())).await.unwrap();
        }
    });
    let text: String = FragmentStream::from_channel(rx)
        .map(|r| r.unwrap())
        .collect();
    assert_eq!(text, "un deux trois");
}

// ============================================================================
// OpenAiClient Tests (local HTTP stub)
// ============================================================================

#[test]
fn test_client_requires_key() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let err = OpenAiClient::new("http://localhost:1/v1", "  ", rt.handle().clone()).unwrap_err();
    assert!(matches!(err, ApiError::MissingKey));
}

#[test]
fn test_client_debug_hides_key() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let client =
        OpenAiClient::new("http://localhost:8000/v1/", "sk-secret", rt.handle().clone()).unwrap();
    let debug = format!("{:?}", client);
    assert!(debug.contains("localhost:8000/v1"));
    assert!(!debug.contains("sk-secret"));
    assert_eq!(client.base_url(), "http://localhost:8000/v1");
}

/// Serve one canned HTTP response per entry, in order.
async fn serve(listener: TcpListener, responses: Vec<String>) {
    for response in responses {
        let (mut sock, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = sock.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if request_complete(&buf) {
                break;
            }
        }
        sock.write_all(response.as_bytes()).await.unwrap();
        sock.shutdown().await.unwrap();
    }
}

fn request_complete(buf: &[u8]) -> bool {
    let text = String::from_utf8_lossy(buf);
    let Some(head_end) = text.find("\r\n\r\n") else {
        return false;
    };
    let length = text[..head_end]
        .lines()
        .find_map(|l| {
            let lower = l.to_ascii_lowercase();
            lower
                .strip_prefix("content-length:")
                .map(|v| v.trim().parse::<usize>().unwrap_or(0))
        })
        .unwrap_or(0);
    buf.len() >= head_end + 4 + length
}

fn http(status: &str, content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

fn start_stub(rt: &tokio::runtime::Runtime, responses: Vec<String>) -> String {
    let listener = rt
        .block_on(TcpListener::bind("127.0.0.1:0"))
        .unwrap();
    let addr = listener.local_addr().unwrap();
    rt.spawn(serve(listener, responses));
    format!("http://{}/v1", addr)
}

#[test]
fn test_client_streams_fragments() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let body = "data: {\"choices\":[{\"delta\":{\"content\":\"Bonjour\"}}]}\n\n\
                data: {\"choices\":[{\"delta\":{\"content\":\", ça va ?\"}}]}\n\n\
                data: [DONE]\n\n";
    let url = start_stub(&rt, vec![http("200 OK", "text/event-stream", body)]);
    let client = OpenAiClient::new(&url, "sk-test", rt.handle().clone()).unwrap();

    let fragments: Vec<String> = client
        .complete(&request(true))
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    assert_eq!(fragments, vec!["Bonjour", ", ça va ?"]);
}

#[test]
fn test_client_non_streaming_single_fragment() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let body = r#"{"choices":[{"message":{"content":"Réponse complète"}}]}"#;
    let url = start_stub(&rt, vec![http("200 OK", "application/json", body)]);
    let client = OpenAiClient::new(&url, "sk-test", rt.handle().clone()).unwrap();

    let fragments: Vec<String> = client
        .complete(&request(false))
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    assert_eq!(fragments, vec!["Réponse complète"]);
}

#[test]
fn test_client_retries_transient_status() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let ok = r#"{"choices":[{"message":{"content":"enfin"}}]}"#;
    let url = start_stub(
        &rt,
        vec![
            http("503 Service Unavailable", "text/plain", "busy"),
            http("200 OK", "application/json", ok),
        ],
    );
    let client = OpenAiClient::new(&url, "sk-test", rt.handle().clone())
        .unwrap()
        .with_retries(3, Duration::from_millis(10));

    let text: String = client
        .complete(&request(false))
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    assert_eq!(text, "enfin");
}

#[test]
fn test_client_auth_error_not_retried() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let url = start_stub(
        &rt,
        vec![http("401 Unauthorized", "application/json", "{}")],
    );
    let client = OpenAiClient::new(&url, "sk-bad", rt.handle().clone())
        .unwrap()
        .with_retries(3, Duration::from_millis(10));

    let results: Vec<_> = client.complete(&request(false)).unwrap().collect();
    assert_eq!(results.len(), 1);
    let err = results.into_iter().next().unwrap().unwrap_err();
    let api = err.downcast_ref::<ApiError>().unwrap();
    assert_eq!(api.kind(), "AuthError");
}

/// Send the head and one event, then hold the connection open without a word.
async fn serve_stalled(listener: TcpListener, first_event: String) {
    let (mut sock, _) = listener.accept().await.unwrap();
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    while !request_complete(&buf) {
        let n = sock.read(&mut chunk).await.unwrap();
        if n == 0 {
            return;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let head = "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nContent-Length: 4096\r\n\r\n";
    sock.write_all(head.as_bytes()).await.unwrap();
    sock.write_all(first_event.as_bytes()).await.unwrap();
    sock.flush().await.unwrap();
    tokio::time::sleep(Duration::from_secs(30)).await;
}

#[test]
fn test_client_stalled_stream_times_out() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let listener = rt
        .block_on(TcpListener::bind("127.0.0.1:0"))
        .unwrap();
    let url = format!("http://{}/v1", listener.local_addr().unwrap());
    let event = "data: {\"choices\":[{\"delta\":{\"content\":\"Bonjour\"}}]}\n\n".to_string();
    rt.spawn(serve_stalled(listener, event));

    let client = OpenAiClient::new(&url, "sk-test", rt.handle().clone())
        .unwrap()
        .with_read_timeout(Duration::from_millis(200))
        .unwrap();

    let started = Instant::now();
    let results: Vec<_> = client.complete(&request(true)).unwrap().collect();
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(results.len(), 2, "{:?}", results);
    assert_eq!(results[0].as_ref().unwrap(), "Bonjour");
    assert!(results[1].is_err());
}
