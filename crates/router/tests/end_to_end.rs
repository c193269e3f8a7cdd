//! End-to-end routing tests against a real in-process backend server and a
//! recording transport.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use {
    anyhow::bail,
    async_trait::async_trait,
    axum::{Json, Router, extract::Multipart, routing::post},
    base64::{Engine as _, engine::general_purpose::STANDARD as BASE64},
    serde_json::json,
    tokio::net::TcpListener,
};

use {
    consult_backend::BackendClient,
    consult_channels::{Allowlist, ChannelTransport, InboundMessage, MediaPayload, MediaRef},
    consult_router::{MessageRouter, Outcome, reply},
    consult_sessions::SessionStore,
};

const EXPIRY: Duration = Duration::from_secs(30 * 60);
const SENDER: &str = "60123456789@c.us";

#[derive(Default)]
struct MockTransport {
    sent: Mutex<Vec<(String, String)>>,
    media: Option<MediaPayload>,
    fail_send: bool,
}

impl MockTransport {
    fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChannelTransport for MockTransport {
    async fn send_text(&self, to: &str, text: &str) -> anyhow::Result<()> {
        if self.fail_send {
            bail!("transport rejected the message");
        }
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), text.to_string()));
        Ok(())
    }

    async fn download_media(&self, _media_id: &str) -> anyhow::Result<MediaPayload> {
        match &self.media {
            Some(payload) => Ok(payload.clone()),
            None => bail!("no such media"),
        }
    }
}

async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn router_for(base_url: &str, allowlist: &str) -> MessageRouter {
    let store = SessionStore::new(EXPIRY, None);
    let backend = BackendClient::new(base_url, Duration::from_secs(5)).unwrap();
    MessageRouter::new(store, Allowlist::from_config_str(allowlist), backend)
        .with_chunk_delay(Duration::ZERO)
}

fn text_message(body: &str) -> InboundMessage {
    InboundMessage {
        from: SENDER.to_string(),
        body: body.to_string(),
        media: None,
    }
}

fn media_message(mime_type: &str) -> InboundMessage {
    InboundMessage {
        from: SENDER.to_string(),
        body: String::new(),
        media: Some(MediaRef {
            media_id: "media-1".to_string(),
            mime_type: mime_type.to_string(),
        }),
    }
}

/// Chat backend that echoes the request history plus one assistant turn.
fn echo_chat(reply_text: &'static str, hits: Arc<AtomicUsize>) -> Router {
    Router::new().route(
        "/api/chat",
        post(move |Json(body): Json<serde_json::Value>| async move {
            hits.fetch_add(1, Ordering::SeqCst);
            let mut messages = body["messages"].as_array().unwrap().clone();
            messages.push(json!({"role": "assistant", "content": reply_text}));
            Json(json!({ "messages": messages }))
        }),
    )
}

#[tokio::test]
async fn disallowed_sender_is_dropped_without_any_traffic() {
    let hits = Arc::new(AtomicUsize::new(0));
    let base = serve(echo_chat("hi", Arc::clone(&hits))).await;
    let router = router_for(&base, "+19999999999");
    let transport = MockTransport::default();

    let outcome = router.handle(&transport, &text_message("hello")).await;

    assert_eq!(outcome, Outcome::RejectedSilently);
    assert!(transport.sent().is_empty());
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    // Admission happens before session creation.
    assert_eq!(router.store().stats().total, 0);
}

#[tokio::test]
async fn empty_event_is_dropped_silently() {
    let base = serve(echo_chat("hi", Arc::new(AtomicUsize::new(0)))).await;
    let router = router_for(&base, "");
    let transport = MockTransport::default();

    let outcome = router.handle(&transport, &text_message("   ")).await;

    assert_eq!(outcome, Outcome::RejectedSilently);
    assert!(transport.sent().is_empty());
}

#[tokio::test]
async fn chat_reply_is_sanitized_and_session_updated() {
    let hits = Arc::new(AtomicUsize::new(0));
    let base = serve(echo_chat(
        "Drink **warm water** and *rest*.",
        Arc::clone(&hits),
    ))
    .await;
    let router = router_for(&base, "+60123456789");
    let transport = MockTransport::default();

    let outcome = router.handle(&transport, &text_message("I have a sore throat")).await;

    assert_eq!(outcome, Outcome::Delivered);
    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, SENDER);
    assert_eq!(sent[0].1, "Drink warm water and rest.");

    // The backend's full returned history is persisted, not just the reply.
    let session = router.store().get_or_create("+60123456789");
    assert_eq!(session.history.len(), 2);
    assert_eq!(session.turn_count, 1);
}

#[tokio::test]
async fn second_turn_carries_prior_history() {
    let hits = Arc::new(AtomicUsize::new(0));
    let turn_lengths = Arc::new(Mutex::new(Vec::new()));
    let lengths = Arc::clone(&turn_lengths);
    let app = Router::new().route(
        "/api/chat",
        post(move |Json(body): Json<serde_json::Value>| async move {
            hits.fetch_add(1, Ordering::SeqCst);
            let mut messages = body["messages"].as_array().unwrap().clone();
            lengths.lock().unwrap().push(messages.len());
            messages.push(json!({"role": "assistant", "content": "noted."}));
            Json(json!({ "messages": messages }))
        }),
    );
    let base = serve(app).await;
    let router = router_for(&base, "");
    let transport = MockTransport::default();

    router.handle(&transport, &text_message("first question")).await;
    router.handle(&transport, &text_message("second question")).await;

    // Turn one sends just the user message; turn two sends the stored
    // user/assistant pair plus the new user message.
    assert_eq!(*turn_lengths.lock().unwrap(), vec![1, 3]);
    assert_eq!(router.store().get_or_create("+60123456789").turn_count, 2);
}

#[tokio::test]
async fn backend_down_yields_one_notice_and_leaves_session_untouched() {
    // Bind then drop to get a connection-refused port.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let router = router_for(&format!("http://{addr}"), "");
    let transport = MockTransport::default();

    let outcome = router.handle(&transport, &text_message("anyone there?")).await;

    assert_eq!(outcome, Outcome::Delivered);
    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1, reply::SERVICE_UNAVAILABLE);

    // The failed turn never reached the session history.
    let session = router.store().get_or_create("+60123456789");
    assert!(session.history.is_empty());
    assert_eq!(session.turn_count, 0);

    // The relay keeps servicing events after a backend failure.
    let outcome = router.handle(&transport, &text_message("still there?")).await;
    assert_eq!(outcome, Outcome::Delivered);
    assert_eq!(transport.sent().len(), 2);
}

#[tokio::test]
async fn image_goes_to_vision_without_touching_sessions() {
    let vision_hits = Arc::new(AtomicUsize::new(0));
    let hits = Arc::clone(&vision_hits);
    let app = Router::new().route(
        "/api/vision",
        post(move |mut multipart: Multipart| async move {
            hits.fetch_add(1, Ordering::SeqCst);
            let field = multipart.next_field().await.unwrap().unwrap();
            assert_eq!(field.name(), Some("image"));
            assert_eq!(field.content_type(), Some("image/jpeg"));
            let data = field.bytes().await.unwrap();
            assert_eq!(&data[..], b"fake jpeg bytes");
            Json(json!({"analysis": "Pale coating with teeth marks."}))
        }),
    );
    let base = serve(app).await;
    let router = router_for(&base, "");
    let transport = MockTransport {
        media: Some(MediaPayload {
            mime_type: "image/jpeg".to_string(),
            data: BASE64.encode(b"fake jpeg bytes"),
        }),
        ..Default::default()
    };

    let outcome = router.handle(&transport, &media_message("image/jpeg")).await;

    assert_eq!(outcome, Outcome::Delivered);
    assert_eq!(vision_hits.load(Ordering::SeqCst), 1);
    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1, "Pale coating with teeth marks.");
    // Diagnosis is stateless.
    assert_eq!(router.store().stats().total, 0);
}

#[tokio::test]
async fn non_image_media_gets_the_images_only_notice() {
    let hits = Arc::new(AtomicUsize::new(0));
    let base = serve(echo_chat("unused", Arc::clone(&hits))).await;
    let router = router_for(&base, "");
    let transport = MockTransport::default();

    let outcome = router.handle(&transport, &media_message("application/pdf")).await;

    assert_eq!(outcome, Outcome::Delivered);
    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1, reply::IMAGES_ONLY);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failed_media_download_yields_the_download_notice() {
    let base = serve(echo_chat("unused", Arc::new(AtomicUsize::new(0)))).await;
    let router = router_for(&base, "");
    let transport = MockTransport::default(); // no media payload configured

    let outcome = router.handle(&transport, &media_message("image/jpeg")).await;

    assert_eq!(outcome, Outcome::Delivered);
    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1, reply::MEDIA_DOWNLOAD_FAILED);
}

#[tokio::test]
async fn long_reply_is_delivered_in_order_as_chunks() {
    let long_reply: &'static str = Box::leak(
        "This is a fairly long sentence that pads out the reply body. "
            .repeat(120)
            .into_boxed_str(),
    );
    assert!(long_reply.len() > 4096);

    let base = serve(echo_chat(long_reply, Arc::new(AtomicUsize::new(0)))).await;
    let router = router_for(&base, "");
    let transport = MockTransport::default();

    let outcome = router.handle(&transport, &text_message("tell me everything")).await;

    assert_eq!(outcome, Outcome::Delivered);
    let sent = transport.sent();
    assert!(sent.len() > 1, "expected chunked delivery");
    for (_, chunk) in &sent {
        assert!(chunk.len() <= 4096);
    }
    let rejoined = sent
        .iter()
        .map(|(_, c)| c.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let normalize = |s: &str| s.split_whitespace().collect::<Vec<_>>().join(" ");
    assert_eq!(normalize(&rejoined), normalize(long_reply));
}

#[tokio::test]
async fn transport_refusal_is_reported_as_delivery_failed() {
    let base = serve(echo_chat("hi", Arc::new(AtomicUsize::new(0)))).await;
    let router = router_for(&base, "");
    let transport = MockTransport {
        fail_send: true,
        ..Default::default()
    };

    let outcome = router.handle(&transport, &text_message("hello")).await;
    assert_eq!(outcome, Outcome::DeliveryFailed);
}
