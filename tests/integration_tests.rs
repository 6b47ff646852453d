//! Integration tests for the confab crate
//!
//! These exercise the session manager against a real (in-process) HTTP stub
//! server and the speech engine against a scripted recognizer, end to end.

use confab::llm::{
    ChatCommand, ChatEngine, ChatEvent, ChatPipeline, GenerationConfig, HostedBackend,
    LocalServerBackend, Role, Session,
};
use confab::speech::{
    ListenerConfig, Recognizer, SegmenterConfig, SpeechCallbacks, SpeechListener,
};
use confab::{ConfabError, Result};
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// One canned HTTP response
struct StubResponse {
    status: u16,
    body: String,
}

impl StubResponse {
    fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }
}

/// Serve a fixed sequence of responses, one per connection, then exit
fn spawn_http_stub(responses: Vec<StubResponse>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind stub server");
    let base_url = format!("http://{}", listener.local_addr().unwrap());

    std::thread::spawn(move || {
        for response in responses {
            let (mut stream, _) = match listener.accept() {
                Ok(conn) => conn,
                Err(_) => return,
            };

            // Drain the request: headers, then content-length body bytes
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            let header_end = loop {
                match stream.read(&mut chunk) {
                    Ok(0) => break None,
                    Ok(n) => {
                        buf.extend_from_slice(&chunk[..n]);
                        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                            break Some(pos + 4);
                        }
                    }
                    Err(_) => break None,
                }
            };

            if let Some(header_end) = header_end {
                let headers = String::from_utf8_lossy(&buf[..header_end]).to_lowercase();
                let content_length: usize = headers
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(0);

                let mut body_read = buf.len() - header_end;
                while body_read < content_length {
                    match stream.read(&mut chunk) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => body_read += n,
                    }
                }
            }

            let reply = format!(
                "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                response.status,
                response.body.len(),
                response.body
            );
            let _ = stream.write_all(reply.as_bytes());
        }
    });

    base_url
}

#[tokio::test]
async fn test_generate_reply_against_local_stub() {
    init_logging();

    let base_url = spawn_http_stub(vec![StubResponse::ok(r#"{"response": "4", "done": true}"#)]);
    let backend = Arc::new(LocalServerBackend::with_base_url(base_url));
    let engine = ChatEngine::new(backend, GenerationConfig::new("test-model"));

    let mut session = Session::with_system("Be terse.");
    session.push_user("2+2?");

    let reply = engine.generate_reply(&mut session).await;

    assert_eq!(reply, "4");
    assert_eq!(session.len(), 3);
    let roles: Vec<Role> = session.turns().iter().map(|t| t.role).collect();
    assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
}

#[tokio::test]
async fn test_streaming_reply_against_local_stub() {
    init_logging();

    let body = concat!(
        "{\"response\": \"The answer \", \"done\": false}\n",
        "{\"response\": \"is 4.\", \"done\": false}\n",
        "{\"response\": \"\", \"done\": true}\n",
    );
    let base_url = spawn_http_stub(vec![StubResponse::ok(body)]);
    let backend = Arc::new(LocalServerBackend::with_base_url(base_url));
    let engine = ChatEngine::new(backend, GenerationConfig::new("test-model"));

    let mut session = Session::empty();
    session.push_user("2+2?");

    let mut stream = engine.reply_stream(&session).await.unwrap();

    let mut full = String::new();
    let mut finished = false;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.unwrap();
        full.push_str(&chunk.text);
        if chunk.done {
            finished = true;
        }
    }

    assert!(finished, "stream must end with an explicit done chunk");
    assert_eq!(full, "The answer is 4.");
}

#[tokio::test]
async fn test_stream_without_done_is_a_transport_error() {
    init_logging();

    // The connection closes without the backend ever signaling completion
    let body = "{\"response\": \"half an ans\", \"done\": false}\n";
    let base_url = spawn_http_stub(vec![StubResponse::ok(body)]);
    let backend = Arc::new(LocalServerBackend::with_base_url(base_url));
    let engine = ChatEngine::new(backend, GenerationConfig::new("test-model"));

    let mut session = Session::empty();
    session.push_user("2+2?");

    let mut stream = engine.reply_stream(&session).await.unwrap();

    let mut saw_error = false;
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(chunk) => assert!(!chunk.done),
            Err(e) => {
                assert!(matches!(e, ConfabError::TransportError(_)));
                saw_error = true;
            }
        }
    }

    assert!(saw_error, "a dropped connection must not look like completion");
}

#[tokio::test]
async fn test_hosted_backend_extracts_reply() {
    init_logging();

    let body = r#"[{"generated_text": "<|im_start|>user\n2+2?<|im_end|>\n<|im_start|>assistant\n4<|im_end|>"}]"#;
    let base_url = spawn_http_stub(vec![StubResponse::ok(body)]);
    let backend = Arc::new(HostedBackend::with_base_url(base_url, "test-token"));
    let engine = ChatEngine::new(backend, GenerationConfig::new("test-model"));

    let mut session = Session::empty();
    session.push_user("2+2?");

    let reply = engine.generate_reply(&mut session).await;
    assert_eq!(reply, "4");
}

#[tokio::test]
async fn test_hosted_backend_model_not_ready() {
    init_logging();

    let base_url = spawn_http_stub(vec![StubResponse {
        status: 503,
        body: r#"{"error": "Model is currently loading", "estimated_time": 20.0}"#.to_string(),
    }]);
    let backend = Arc::new(HostedBackend::with_base_url(base_url, "test-token"));
    let engine = ChatEngine::new(backend, GenerationConfig::new("test-model"));

    let mut session = Session::empty();
    session.push_user("hello?");

    // The boundary converts it into a displayable reply
    let reply = engine.generate_reply(&mut session).await;
    assert!(reply.starts_with("Error: "));
    assert!(reply.contains("not ready"));
    assert_eq!(session.len(), 3);
}

#[test]
fn test_pipeline_end_to_end() {
    init_logging();

    let base_url = spawn_http_stub(vec![StubResponse::ok(
        r#"{"response": "Hello back!", "done": true}"#,
    )]);
    let backend = Arc::new(LocalServerBackend::with_base_url(base_url));
    let pipeline = ChatPipeline::new(
        backend,
        GenerationConfig::new("test-model"),
        Some("You are a test assistant.".to_string()),
    );

    let cmd_tx = pipeline.command_sender();
    let event_rx = pipeline.event_receiver();
    pipeline.start_worker().unwrap();

    let request_id = Uuid::new_v4();
    cmd_tx
        .send(ChatCommand::Generate {
            user_message: "Hello!".to_string(),
            request_id,
        })
        .unwrap();

    let mut tokens = String::new();
    let mut completed = None;
    for _ in 0..50 {
        match event_rx.recv_timeout(Duration::from_millis(200)) {
            Ok(ChatEvent::Token { token, request_id: id }) => {
                assert_eq!(id, request_id);
                tokens.push_str(&token);
            }
            Ok(ChatEvent::Complete {
                full_response,
                request_id: id,
                ..
            }) => {
                assert_eq!(id, request_id);
                completed = Some(full_response);
                break;
            }
            Ok(ChatEvent::Error { error, .. }) => panic!("unexpected error event: {}", error),
            Ok(_) => {}
            Err(_) => {}
        }
    }

    assert_eq!(completed.as_deref(), Some("Hello back!"));
    assert_eq!(tokens, "Hello back!");

    cmd_tx.send(ChatCommand::Shutdown).unwrap();
    let mut shutdown = false;
    for _ in 0..50 {
        if let Ok(ChatEvent::Shutdown) = event_rx.recv_timeout(Duration::from_millis(100)) {
            shutdown = true;
            break;
        }
    }
    assert!(shutdown, "pipeline must acknowledge shutdown");
}

#[test]
fn test_pipeline_error_keeps_flowing() {
    init_logging();

    // Nothing is listening on this port
    let backend = Arc::new(LocalServerBackend::with_base_url("http://127.0.0.1:1"));
    let pipeline = ChatPipeline::new(backend, GenerationConfig::new("test-model"), None);

    let cmd_tx = pipeline.command_sender();
    let event_rx = pipeline.event_receiver();
    pipeline.start_worker().unwrap();

    let request_id = Uuid::new_v4();
    cmd_tx
        .send(ChatCommand::Generate {
            user_message: "anyone there?".to_string(),
            request_id,
        })
        .unwrap();

    let mut saw_error = false;
    for _ in 0..50 {
        match event_rx.recv_timeout(Duration::from_millis(200)) {
            Ok(ChatEvent::Error { request_id: id, .. }) => {
                assert_eq!(id, Some(request_id));
                saw_error = true;
                break;
            }
            Ok(_) => {}
            Err(_) => {}
        }
    }
    assert!(saw_error, "a failed request must surface as an Error event");

    cmd_tx.send(ChatCommand::Shutdown).unwrap();
}

/// Scripted recognizer: each accepted frame advances through a list of
/// partial transcripts
struct ScriptedRecognizer {
    partials: VecDeque<String>,
    current_partial: String,
}

impl ScriptedRecognizer {
    fn new(script: &[&str]) -> Self {
        Self {
            partials: script.iter().map(|s| s.to_string()).collect(),
            current_partial: String::new(),
        }
    }
}

impl Recognizer for ScriptedRecognizer {
    fn accept_waveform(&mut self, _audio: &[i16]) -> Result<bool> {
        if let Some(partial) = self.partials.pop_front() {
            self.current_partial = partial;
        }
        Ok(false)
    }

    fn partial_result(&mut self) -> Result<String> {
        Ok(self.current_partial.clone())
    }

    fn final_result(&mut self) -> Result<String> {
        Ok(std::mem::take(&mut self.current_partial))
    }
}

#[test]
fn test_silence_timeout_finalizes_through_listener() {
    init_logging();

    let config = ListenerConfig {
        segmenter: SegmenterConfig::default()
            .with_silence_timeout(Duration::from_millis(100))
            .with_partial_delay(Duration::from_millis(1)),
        queue_capacity: 256,
        frame_timeout: Duration::from_millis(20),
        join_timeout: Duration::from_secs(1),
    };

    let recognizer = ScriptedRecognizer::new(&["hello", "hello world"]);
    let mut listener = SpeechListener::new(recognizer, config);
    let frames = listener.frame_sender();

    let finals = Arc::new(Mutex::new(Vec::<String>::new()));
    let finals_cb = finals.clone();

    assert!(listener.start(SpeechCallbacks::new(move |text| {
        finals_cb.lock().push(text)
    })));

    // Speech: loud frames while the scripted partials accumulate
    for _ in 0..3 {
        frames.send(vec![8000i16; 160]).unwrap();
        std::thread::sleep(Duration::from_millis(20));
    }

    // Silence: quiet frames past the timeout
    for _ in 0..10 {
        frames.send(vec![0i16; 160]).unwrap();
        std::thread::sleep(Duration::from_millis(20));
    }
    std::thread::sleep(Duration::from_millis(50));

    let collected = finals.lock().clone();
    assert_eq!(collected, vec!["hello world".to_string()]);

    // Stop finds nothing further to finalize
    listener.stop();
    assert_eq!(finals.lock().len(), 1);
    assert!(!listener.is_listening());
}
