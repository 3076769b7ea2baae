//! Streaming fixtures for each framing family
//!
//! Each fixture is the list of SSE lines a server sends; `join_lines` turns it into wire text.

/// OpenAI streaming fixture: role preamble, two content deltas, stop chunk.
pub fn openai_text_stream() -> Vec<&'static str> {
    vec![
        r#"data: {"id":"chatcmpl-abc123","object":"chat.completion.chunk","created":1699012345,"model":"gpt-4o-mini","choices":[{"index":0,"delta":{"role":"assistant"},"finish_reason":null}]}"#,
        r#"data: {"id":"chatcmpl-abc123","object":"chat.completion.chunk","created":1699012345,"model":"gpt-4o-mini","choices":[{"index":0,"delta":{"content":"Hello"},"finish_reason":null}]}"#,
        r#"data: {"id":"chatcmpl-abc123","object":"chat.completion.chunk","created":1699012345,"model":"gpt-4o-mini","choices":[{"index":0,"delta":{"content":"!"},"finish_reason":null}]}"#,
        r#"data: {"id":"chatcmpl-abc123","object":"chat.completion.chunk","created":1699012345,"model":"gpt-4o-mini","choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#,
        "data: [DONE]",
    ]
}

/// OpenAI stream with `logprobs: true, top_logprobs: 2`, preceded by a comment keepalive.
pub fn openai_logprobs_stream() -> Vec<&'static str> {
    vec![
        ": keepalive",
        r#"data: {"choices":[{"index":0,"delta":{"content":"Hel"},"logprobs":{"content":[{"token":"Hel","logprob":-0.1,"top_logprobs":[{"token":"Hel","logprob":-0.1},{"token":"Hal","logprob":-1.2}]}]}}]}"#,
        r#"data: {"choices":[{"index":0,"delta":{"content":"lo"},"logprobs":{"content":[{"token":"lo","logprob":-0.05,"top_logprobs":[{"token":"lo","logprob":-0.05},{"token":"p","logprob":-3.0}]}]}}]}"#,
        "data: [DONE]",
    ]
}

/// Plain-text streaming fixture (llama.cpp style `/completion`).
pub fn plain_text_stream() -> Vec<&'static str> {
    vec!["data: Once", "data:  upon", "data: ", "data:  a time", "data: [DONE]"]
}

/// Codestral FIM unary response.
pub fn codestral_fim_response() -> &'static str {
    r#"{"id":"cmpl-fim-1","object":"chat.completion","model":"codestral-latest","choices":[{"index":0,"text":"a + b;","finish_reason":"stop"}]}"#
}

/// Each line followed by a blank separator line, SSE style.
pub fn join_lines(lines: &[&str], eol: &str) -> String {
    let mut out = String::new();
    for line in lines {
        out.push_str(line);
        out.push_str(eol);
        out.push_str(eol);
    }
    out
}

/// Wire text cut into pieces of at most `size` bytes.
pub fn chunked(wire: &str, size: usize) -> Vec<Vec<u8>> {
    wire.as_bytes().chunks(size.max(1)).map(<[u8]>::to_vec).collect()
}

/// One delta event carrying `text`.
pub fn openai_delta(text: &str) -> String {
    serde_json::json!({"choices": [{"index": 0, "delta": {"content": text}}]}).to_string()
}
