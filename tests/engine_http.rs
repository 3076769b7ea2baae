//! Engine tests against a real HTTP server
//!
//! These drive `ChatEngine` with the reqwest transport against httpmock servers, covering the
//! wire format, status handling, timeouts, redial and cancellation.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::time::{Duration, Instant};

use httpmock::prelude::*;
use ustudio_llm::{
    ChannelSink, ChatEngine, ChatRequest, Config, EngineOptions, ErrorKind, PrivacyMode,
    ProviderKind, SinkEvent, Terminal, TokenAlt,
};

const WAIT: Duration = Duration::from_secs(10);

const LOGPROBS_WIRE: &str = concat!(
    ": keepalive\n\n",
    r#"data: {"choices":[{"delta":{"content":"Hel"},"logprobs":{"content":[{"token":"Hel","logprob":-0.1,"top_logprobs":[{"token":"Hel","logprob":-0.1},{"token":"Hal","logprob":-1.2}]}]}}]}"#,
    "\r\n\r\n",
    r#"data: {"choices":[{"delta":{"content":"lo"}}]}"#,
    "\n\n",
    "data: [DONE]\n\n",
);

fn engine() -> ChatEngine {
    let options = EngineOptions {
        workers: 2,
        redial_backoff: Duration::from_millis(50),
        max_parse_errors: 4,
    };
    ChatEngine::new(options).expect("engine")
}

fn config(base_url: String) -> Config {
    Config::new(ProviderKind::OpenAiCompat, base_url, "gpt-test")
        .with_api_key("sk-test")
        .with_privacy(PrivacyMode::LocalOnly)
}

fn submit(engine: &ChatEngine, cfg: Config) -> (ustudio_llm::CancelHandle, Receiver<SinkEvent>) {
    let (tx, rx) = mpsc::channel();
    let sink = Arc::new(ChannelSink::new(1, tx));
    let handle = engine.submit(ChatRequest::new("be terse", "say hello", cfg, sink));
    (handle, rx)
}

fn collect(rx: &Receiver<SinkEvent>) -> (Vec<(String, Vec<TokenAlt>)>, Terminal) {
    let mut fragments = Vec::new();
    loop {
        match rx.recv_timeout(WAIT).expect("sink event") {
            SinkEvent::Fragment { text, alts, .. } => fragments.push((text, alts)),
            SinkEvent::Terminal { terminal, .. } => return (fragments, terminal),
        }
    }
}

#[test]
fn test_streaming_chat_with_logprobs() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/chat/completions")
            .header("authorization", "Bearer sk-test")
            .body_contains("\"stream\":true")
            .body_contains("\"top_logprobs\":2");
        then.status(200)
            .header("content-type", "text/event-stream")
            .body(LOGPROBS_WIRE);
    });

    let engine = engine();
    let (_handle, rx) = submit(&engine, config(server.url("/v1")).with_top_logprobs(2));
    let (fragments, terminal) = collect(&rx);

    assert_eq!(terminal, Terminal::Done);
    assert_eq!(
        fragments,
        vec![
            (
                "Hel".to_string(),
                vec![TokenAlt::new("Hel", -0.1), TokenAlt::new("Hal", -1.2)]
            ),
            ("lo".to_string(), vec![]),
        ]
    );
    mock.assert();
}

#[test]
fn test_http_error_status_is_terminal() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/v1/chat/completions");
        then.status(500).body("upstream exploded for Bearer sk-test");
    });

    let engine = engine();
    let (_handle, rx) = submit(&engine, config(server.url("/v1")));
    let (fragments, terminal) = collect(&rx);

    assert!(fragments.is_empty());
    match terminal {
        Terminal::Failed { kind, message } => {
            assert_eq!(kind, ErrorKind::HttpStatus(500));
            assert!(message.contains("upstream exploded"), "{message}");
            assert!(!message.contains("sk-test"), "{message}");
        }
        other => panic!("expected failure, got {other:?}"),
    }
    // Status errors are not transient: no redial.
    assert_eq!(mock.hits(), 1);
}

#[test]
fn test_first_byte_timeout_redials_once_then_fails() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/v1/chat/completions");
        then.status(200)
            .delay(Duration::from_millis(1500))
            .body("data: [DONE]\n\n");
    });

    let engine = engine();
    let (_handle, rx) = submit(&engine, config(server.url("/v1")).with_timeout_ms(200));
    let (_, terminal) = collect(&rx);

    match terminal {
        Terminal::Failed { kind, .. } => assert_eq!(kind, ErrorKind::Timeout),
        other => panic!("expected timeout, got {other:?}"),
    }
    let until = Instant::now() + Duration::from_secs(2);
    while mock.hits() < 2 && Instant::now() < until {
        std::thread::sleep(Duration::from_millis(20));
    }
    assert_eq!(mock.hits(), 2);
}

#[test]
fn test_connect_refused_fails_with_connect() {
    let engine = engine();
    // Port 9 (discard) is closed on loopback in test environments.
    let (_handle, rx) = submit(&engine, config("http://127.0.0.1:9/v1".into()));
    let (fragments, terminal) = collect(&rx);
    assert!(fragments.is_empty());
    match terminal {
        Terminal::Failed { kind, .. } => assert_eq!(kind, ErrorKind::Connect),
        other => panic!("expected connect failure, got {other:?}"),
    }
}

#[test]
fn test_cancel_while_waiting_for_headers() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/v1/chat/completions");
        then.status(200)
            .delay(Duration::from_secs(3))
            .body("data: [DONE]\n\n");
    });

    let engine = engine();
    let (handle, rx) = submit(&engine, config(server.url("/v1")));
    std::thread::sleep(Duration::from_millis(150));
    let cancelled_at = Instant::now();
    engine.cancel(&handle);

    let (fragments, terminal) = collect(&rx);
    assert!(fragments.is_empty());
    assert_eq!(terminal, Terminal::Cancelled);
    assert!(cancelled_at.elapsed() < Duration::from_secs(2));
}

#[test]
fn test_remote_host_denied_without_network() {
    let engine = engine();
    let (_handle, rx) = submit(&engine, config("https://api.example.com/v1".into()));
    let (fragments, terminal) = collect(&rx);
    assert!(fragments.is_empty());
    assert_eq!(
        terminal,
        Terminal::Denied {
            reason: "non-local host rejected".into()
        }
    );
}

#[test]
fn test_plain_text_provider_over_http() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/completion")
            .body_contains("\"prompt\":\"be terse\\n\\nsay hello\"");
        then.status(200)
            .header("content-type", "text/event-stream")
            .body("data: Hello\n\ndata:  there\n\ndata: [DONE]\n\n");
    });

    let engine = engine();
    let cfg = Config::new(ProviderKind::PlainText, server.base_url(), "tiny");
    let (_handle, rx) = submit(&engine, cfg);
    let (fragments, terminal) = collect(&rx);

    assert_eq!(terminal, Terminal::Done);
    let text: String = fragments.iter().map(|(t, _)| t.as_str()).collect();
    assert_eq!(text, "Hello there");
    mock.assert();
}

/// Loopback server that sends error headers and a partial body, then holds the socket open.
fn stalled_error_server() -> (String, std::thread::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    let handle = std::thread::spawn(move || {
        if let Ok((mut sock, _)) = listener.accept() {
            let mut buf = [0u8; 4096];
            let _ = sock.read(&mut buf);
            let _ = sock.write_all(
                b"HTTP/1.1 500 Internal Server Error\r\nContent-Type: text/plain\r\nContent-Length: 100\r\n\r\npartial",
            );
            let _ = sock.flush();
            std::thread::sleep(Duration::from_secs(4));
        }
    });
    (format!("http://{addr}/v1"), handle)
}

#[test]
fn test_stalled_error_body_respects_deadline() {
    let (base, _server) = stalled_error_server();
    let engine = engine();
    let started = Instant::now();
    let (_handle, rx) = submit(&engine, config(base).with_timeout_ms(300));
    let (fragments, terminal) = collect(&rx);

    assert!(fragments.is_empty());
    match terminal {
        Terminal::Failed { kind, .. } => assert_eq!(kind, ErrorKind::HttpStatus(500)),
        other => panic!("expected status failure, got {other:?}"),
    }
    assert!(started.elapsed() < Duration::from_secs(2), "{:?}", started.elapsed());
}

#[test]
fn test_cancel_while_error_body_stalls() {
    let (base, _server) = stalled_error_server();
    let engine = engine();
    let (handle, rx) = submit(&engine, config(base).with_timeout_ms(10_000));
    std::thread::sleep(Duration::from_millis(300));
    let cancelled_at = Instant::now();
    engine.cancel(&handle);

    let (fragments, terminal) = collect(&rx);
    assert!(fragments.is_empty());
    assert_eq!(terminal, Terminal::Cancelled);
    assert!(cancelled_at.elapsed() < Duration::from_secs(2));
}
