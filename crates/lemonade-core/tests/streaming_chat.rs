//! End-to-end tests for the streaming chat client
//!
//! These use wiremock to stand in for the hosted chat functions, which answer
//! with an OpenAI-style `text/event-stream` body.

use lemonade_core::{
    spawn_reply, AssistantProfile, ChatClient, ChatError, ChatMessage, ChatRole, ChatSession,
    Lifecycle, ReplyEvent, StreamEnd,
};
use serde_json::json;
use tokio::sync::mpsc;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const API_KEY: &str = "pk_test_lemon";

fn sse_frame(content: &str) -> String {
    format!(
        "data: {}\n\n",
        json!({
            "id": "chatcmpl-1",
            "object": "chat.completion.chunk",
            "choices": [{ "index": 0, "delta": { "content": content }, "finish_reason": null }]
        })
    )
}

fn sse_body(fragments: &[&str]) -> String {
    let mut body = String::from(": connected\n\n");
    for fragment in fragments {
        body.push_str(&sse_frame(fragment));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

fn event_stream(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, "text/event-stream")
}

async fn mount_reply(server: &MockServer, function: &str, fragments: &[&str]) {
    Mock::given(method("POST"))
        .and(path(format!("/functions/v1/{function}")))
        .and(header("Authorization", format!("Bearer {API_KEY}").as_str()))
        .and(header("Content-Type", "application/json"))
        .respond_with(event_stream(sse_body(fragments)))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_customer_reply_streams_into_one_message() {
    let server = MockServer::start().await;
    mount_reply(&server, "customer-ai", &["Hi", " there"]).await;

    let client = ChatClient::new(&server.uri(), API_KEY);
    let mut session = ChatSession::new(AssistantProfile::Customer);
    session.set_input("Hello!");

    let lifecycle = session.send(&client).await;

    assert_eq!(lifecycle, Lifecycle::Completed);
    assert!(!session.is_loading());
    let messages = session.messages();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[1], ChatMessage::user("Hello!"));
    assert_eq!(messages[2], ChatMessage::assistant("Hi there"));
}

#[tokio::test]
async fn test_request_carries_full_transcript() {
    let server = MockServer::start().await;
    let expected = json!({
        "messages": [
            { "role": "assistant", "content": "Hey! 🍋 Looking for lemonade recommendations? I got you!" },
            { "role": "user", "content": "Something tart?" }
        ]
    });
    Mock::given(method("POST"))
        .and(path("/functions/v1/customer-ai"))
        .and(body_json(expected))
        .respond_with(event_stream(sse_body(&["Try ", "the lime twist"])))
        .expect(1)
        .mount(&server)
        .await;

    let client = ChatClient::new(&server.uri(), API_KEY);
    let mut session = ChatSession::new(AssistantProfile::Customer);
    session.set_input("Something tart?");

    assert_eq!(session.send(&client).await, Lifecycle::Completed);
    assert_eq!(
        session.messages().last().unwrap().content,
        "Try the lime twist"
    );
}

#[tokio::test]
async fn test_admin_session_uses_admin_function() {
    let server = MockServer::start().await;
    mount_reply(&server, "admin-ai", &["Restock ", "pink lemonade."]).await;

    let client = ChatClient::new(&server.uri(), API_KEY);
    let mut session = ChatSession::new(AssistantProfile::Admin);
    session.set_input("What should I restock?");

    assert_eq!(session.send(&client).await, Lifecycle::Completed);
    assert_eq!(session.messages().len(), 2);
    assert_eq!(
        session.messages()[1],
        ChatMessage::assistant("Restock pink lemonade.")
    );
}

#[tokio::test]
async fn test_non_ok_status_appends_fallback_and_unlocks() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/functions/v1/admin-ai"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "error": "AI error" })))
        .mount(&server)
        .await;

    let client = ChatClient::new(&server.uri(), API_KEY);
    let mut session = ChatSession::new(AssistantProfile::Admin);
    session.set_input("Margins?");

    assert_eq!(session.send(&client).await, Lifecycle::Failed);
    assert!(!session.is_loading());
    let last = session.messages().last().unwrap();
    assert_eq!(last.role, ChatRole::Assistant);
    assert_eq!(last.content, "Sorry, I encountered an error. Please try again.");
    assert_eq!(session.messages().len(), 2);
}

#[tokio::test]
async fn test_rate_limit_message_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/functions/v1/customer-ai"))
        .respond_with(
            ResponseTemplate::new(429)
                .set_body_json(json!({ "error": "Too many requests, chill for a sec!" })),
        )
        .mount(&server)
        .await;

    let client = ChatClient::new(&server.uri(), API_KEY);
    let result = client
        .stream_chat(AssistantProfile::Customer, &[ChatMessage::user("hi")], |_| {})
        .await;

    match result {
        Err(ChatError::Status { status, message }) => {
            assert_eq!(status.as_u16(), 429);
            assert_eq!(message.as_deref(), Some("Too many requests, chill for a sec!"));
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_empty_body_is_a_transport_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let client = ChatClient::new(&server.uri(), API_KEY);
    let result = client
        .stream_chat(AssistantProfile::Customer, &[ChatMessage::user("hi")], |_| {})
        .await;
    assert!(matches!(result, Err(ChatError::MissingBody)));

    let mut session = ChatSession::new(AssistantProfile::Customer);
    session.set_input("hi");
    assert_eq!(session.send(&client).await, Lifecycle::Failed);
    assert_eq!(
        session.messages().last().unwrap().content,
        "Oops! Something went wrong 😅 Try again?"
    );
}

#[tokio::test]
async fn test_unreachable_server_is_a_transport_failure() {
    let client = ChatClient::new("http://127.0.0.1:1", API_KEY);
    let mut session = ChatSession::new(AssistantProfile::Admin);
    session.set_input("anyone there?");

    assert_eq!(session.send(&client).await, Lifecycle::Failed);
    assert!(!session.is_loading());
    assert_eq!(session.messages().len(), 2);
}

#[tokio::test]
async fn test_blank_input_issues_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(event_stream(sse_body(&["unused"])))
        .expect(0)
        .mount(&server)
        .await;

    let client = ChatClient::new(&server.uri(), API_KEY);
    let mut session = ChatSession::new(AssistantProfile::Customer);
    let before = session.messages().to_vec();
    session.set_input("   ");

    assert_eq!(session.send(&client).await, Lifecycle::Idle);
    assert_eq!(session.messages(), before.as_slice());
}

#[tokio::test]
async fn test_close_without_done_still_completes() {
    let server = MockServer::start().await;
    let body = format!("{}{}", sse_frame("No"), sse_frame(" sentinel"));
    Mock::given(method("POST"))
        .respond_with(event_stream(body))
        .mount(&server)
        .await;

    let client = ChatClient::new(&server.uri(), API_KEY);
    let mut last = String::new();
    let end = client
        .stream_chat(AssistantProfile::Customer, &[ChatMessage::user("hi")], |text| {
            last = text.to_string()
        })
        .await
        .unwrap();

    assert_eq!(end, StreamEnd::Closed);
    assert_eq!(last, "No sentinel");
}

#[tokio::test]
async fn test_spawned_reply_delivers_events_in_order() {
    let server = MockServer::start().await;
    mount_reply(&server, "customer-ai", &["Lemon", "ade", "!"]).await;

    let client = ChatClient::new(&server.uri(), API_KEY);
    let mut session = ChatSession::new(AssistantProfile::Customer);
    session.set_input("Favorite drink?");
    let payload = session.begin_turn().unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = spawn_reply(client, session.profile(), payload, move |event| {
        let _ = tx.send(event);
    });
    handle.await.unwrap();

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event.clone());
        session.apply(event);
    }

    assert_eq!(
        events,
        vec![
            ReplyEvent::Content("Lemon".to_string()),
            ReplyEvent::Content("Lemonade".to_string()),
            ReplyEvent::Content("Lemonade!".to_string()),
            ReplyEvent::Completed(StreamEnd::Sentinel),
        ]
    );
    assert_eq!(session.lifecycle(), Lifecycle::Completed);
    assert_eq!(session.messages().last().unwrap().content, "Lemonade!");
}
