//! Tests for the AnkiConnect client, retry policy and card assembly.

mod common;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use common::{RecordingRpc, TINY_PNG_B64, tiny_png_data_url};
use lexideck::anki::card::{card_back, media_filename};
use lexideck::anki::rpc::call_with_retry;
use lexideck::anki::{
    self, AnkiConnect, CardOptions, CardWriter, FlashcardRpc, MediaData, RetryPolicy, envelope,
};
use lexideck::error::Error;
use serde_json::{Value, json};

fn instant_retries() -> RetryPolicy {
    RetryPolicy {
        initial_delay: Duration::ZERO,
        backoff_step: Duration::from_millis(1),
        max_retries: 2,
    }
}

fn writer(rpc: Arc<RecordingRpc>) -> CardWriter {
    CardWriter::new(rpc, CardOptions::default()).unwrap()
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

#[test]
fn envelope_omits_empty_params() {
    assert_eq!(
        envelope("version", Value::Null),
        json!({"action": "version", "version": 6})
    );
    assert_eq!(
        envelope("sync", json!({})),
        json!({"action": "sync", "version": 6})
    );
    assert_eq!(
        envelope("deckNames", json!({"x": 1})),
        json!({"action": "deckNames", "version": 6, "params": {"x": 1}})
    );
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

#[tokio::test]
async fn connection_reset_is_retried_until_success() {
    let attempts = AtomicU32::new(0);
    let result: lexideck::error::Result<u32> =
        call_with_retry(&instant_retries(), "version", |retry| {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                assert_eq!(retry, n);
                if n < 2 {
                    Err(Error::ConnectionReset("socket hang up".to_string()))
                } else {
                    Ok(6)
                }
            }
        })
        .await;

    assert_eq!(result.unwrap(), 6);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn connection_reset_gives_up_after_two_retries() {
    let attempts = AtomicU32::new(0);
    let result: lexideck::error::Result<u32> =
        call_with_retry(&instant_retries(), "addNote", |_| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::ConnectionReset("ECONNRESET".to_string())) }
        })
        .await;

    assert!(matches!(result, Err(Error::ConnectionReset(_))));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn refused_and_rpc_errors_are_not_retried() {
    for err in [
        Error::ConnectionRefused("ECONNREFUSED".to_string()),
        Error::Rpc {
            action: "addNote".to_string(),
            message: "duplicate".to_string(),
        },
    ] {
        let attempts = AtomicU32::new(0);
        let mut err = Some(err);
        let result: lexideck::error::Result<u32> =
            call_with_retry(&instant_retries(), "addNote", |_| {
                attempts.fetch_add(1, Ordering::SeqCst);
                let e = err.take().unwrap();
                async move { Err(e) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}

// ---------------------------------------------------------------------------
// HTTP client against a fake AnkiConnect
// ---------------------------------------------------------------------------

type Seen = Arc<Mutex<Vec<Value>>>;

async fn fake_anki(State(seen): State<Seen>, Json(body): Json<Value>) -> Json<Value> {
    seen.lock().unwrap().push(body.clone());
    let reply = match body["action"].as_str() {
        Some("version") => json!({"result": 6, "error": null}),
        Some("addNote") => json!({
            "result": null,
            "error": "cannot create note because it is a duplicate"
        }),
        _ => json!({"result": null, "error": null}),
    };
    Json(reply)
}

async fn tiny_jpeg() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "image/jpeg")], vec![0xFFu8, 0xD8, 0xFF, 0xD9])
}

async fn serve(seen: Seen) -> SocketAddr {
    let app = Router::new()
        .route("/", post(fake_anki))
        .route("/lucid.jpg", get(tiny_jpeg))
        .with_state(seen);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn client_sends_envelope_and_returns_result() {
    let seen = Seen::default();
    let addr = serve(seen.clone()).await;
    let client = AnkiConnect::new(format!("http://{addr}/"), instant_retries()).unwrap();

    let version = client.call("version", Value::Null).await.unwrap();

    assert_eq!(version, json!(6));
    assert_eq!(
        seen.lock().unwrap().as_slice(),
        &[json!({"action": "version", "version": 6})]
    );
}

#[tokio::test]
async fn client_surfaces_error_field() {
    let seen = Seen::default();
    let addr = serve(seen.clone()).await;
    let client = AnkiConnect::new(format!("http://{addr}/"), instant_retries()).unwrap();

    let err = client
        .call("addNote", json!({"note": {"fields": {"Front": "lucid"}}}))
        .await
        .unwrap_err();

    match err {
        Error::Rpc { action, message } => {
            assert_eq!(action, "addNote");
            assert!(message.contains("duplicate"));
        }
        other => panic!("expected Rpc error, got {other:?}"),
    }
    // Application errors are not retried.
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn client_reports_refused_connection() {
    let client = AnkiConnect::new("http://127.0.0.1:1", instant_retries()).unwrap();

    let err = client.call("version", Value::Null).await.unwrap_err();
    assert!(matches!(err, Error::ConnectionRefused(_)), "got {err:?}");
}

#[tokio::test]
async fn remote_image_is_downloaded_with_its_type() {
    let addr = serve(Seen::default()).await;
    let cards = writer(RecordingRpc::new());

    let media = cards
        .fetch_media(&format!("http://{addr}/lucid.jpg"))
        .await
        .unwrap();

    assert_eq!(media.mime, "image/jpeg");
    assert_eq!(media.extension(), "jpg");
    assert_eq!(media.bytes, vec![0xFF, 0xD8, 0xFF, 0xD9]);
}

// ---------------------------------------------------------------------------
// Status and sync
// ---------------------------------------------------------------------------

#[tokio::test]
async fn status_probe_reports_version() {
    let rpc = RecordingRpc::new();
    let status = anki::probe_status(rpc.as_ref(), "GRE Vocabulary").await;

    assert!(status.connected);
    assert_eq!(status.version, Some(6));
    assert!(status.error.is_none());
}

#[tokio::test]
async fn status_probe_reports_failure_without_erroring() {
    let rpc = RecordingRpc::with_failing_actions(&["version"]);
    let status = anki::probe_status(rpc.as_ref(), "GRE Vocabulary").await;

    assert!(!status.connected);
    assert!(!status.deck_exists);
    assert!(status.message.contains("Cannot connect to Anki"));
    assert!(status.error.is_some());
}

#[tokio::test]
async fn sync_checks_version_then_syncs() {
    let rpc = RecordingRpc::new();
    anki::sync(rpc.as_ref()).await.unwrap();

    let actions: Vec<String> = rpc
        .calls
        .lock()
        .unwrap()
        .iter()
        .map(|(a, _)| a.clone())
        .collect();
    assert_eq!(actions, vec!["version", "sync"]);
}

// ---------------------------------------------------------------------------
// Card assembly
// ---------------------------------------------------------------------------

#[test]
fn media_filename_is_sanitized_and_hashed() {
    let name = media_filename("gre", "Sui Generis", 1_700_000_000_000, "png");
    let expected_hash = format!("{:x}", md5::compute("Sui Generis1700000000000"));

    assert_eq!(name, format!("gre_sui_generis_{expected_hash}.png"));
    assert_ne!(
        name,
        media_filename("gre", "Sui Generis", 1_700_000_000_001, "png")
    );
}

#[test]
fn data_url_decodes_to_bytes() {
    let media = MediaData::from_data_url(&tiny_png_data_url()).unwrap();
    assert_eq!(media.mime, "image/png");
    assert_eq!(media.extension(), "png");
    assert_eq!(&media.bytes[1..4], b"PNG");

    assert!(MediaData::from_data_url("data:image/png,raw").is_err());
    assert!(MediaData::from_data_url("https://example.com/a.png").is_err());
}

#[test]
fn card_back_escapes_markup() {
    let back = card_back("a < b & c", "He said \"hi\" <b>loudly</b>");
    assert!(back.contains("a &lt; b &amp; c"));
    assert!(back.contains("&lt;b&gt;loudly&lt;/b&gt;"));
    assert!(!back.contains("<b>"));
}

#[tokio::test]
async fn card_with_inline_image_stores_media_first() {
    let rpc = RecordingRpc::new();
    let cards = writer(rpc.clone());

    let id = cards
        .create_card("lucid", "clear", "A lucid essay.", Some(&tiny_png_data_url()))
        .await
        .unwrap();
    assert!(id > 0);

    let stored = rpc.calls_to("storeMediaFile");
    assert_eq!(stored.len(), 1);
    let filename = stored[0]["filename"].as_str().unwrap().to_string();
    assert!(filename.starts_with("gre_lucid_"));
    assert!(filename.ends_with(".png"));
    assert_eq!(stored[0]["data"], json!(TINY_PNG_B64));

    let notes = rpc.calls_to("addNote");
    let note = &notes[0]["note"];
    assert_eq!(note["deckName"], json!("GRE Vocabulary"));
    assert_eq!(note["modelName"], json!("Basic"));
    assert_eq!(note["fields"]["Front"], json!("lucid"));
    assert_eq!(note["tags"], json!(["gre", "vocabulary", "ai-generated"]));
    let back = note["fields"]["Back"].as_str().unwrap();
    assert!(back.contains(&format!("<img src=\"{filename}\"")));
    assert!(back.ends_with("</div>"));
}

#[tokio::test]
async fn card_without_image_has_no_media_call() {
    let rpc = RecordingRpc::new();
    writer(rpc.clone())
        .create_card("lucid", "clear", "A lucid essay.", None)
        .await
        .unwrap();

    assert!(rpc.calls_to("storeMediaFile").is_empty());
    let back = rpc.calls_to("addNote")[0]["note"]["fields"]["Back"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(!back.contains("<img"));
    assert!(!back.contains("Note: AI image"));
}

#[tokio::test]
async fn undecodable_image_becomes_a_note_on_the_card() {
    let rpc = RecordingRpc::new();
    let id = writer(rpc.clone())
        .create_card(
            "lucid",
            "clear",
            "A lucid essay.",
            Some("data:image/png;base64,@@not-base64@@"),
        )
        .await
        .unwrap();
    assert!(id > 0);

    assert!(rpc.calls_to("storeMediaFile").is_empty());
    let back = rpc.calls_to("addNote")[0]["note"]["fields"]["Back"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(back.contains("Note: AI image could not be downloaded"));
    assert!(!back.contains("<img"));
}

fn back_of_only_note(rpc: &RecordingRpc) -> String {
    let notes = rpc.calls_to("addNote");
    assert_eq!(notes.len(), 1);
    notes[0]["note"]["fields"]["Back"]
        .as_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn missing_remote_image_becomes_a_note_on_the_card() {
    let addr = serve(Seen::default()).await;
    let rpc = RecordingRpc::new();

    let id = writer(rpc.clone())
        .create_card(
            "lucid",
            "clear",
            "A lucid essay.",
            Some(&format!("http://{addr}/gone.png")),
        )
        .await
        .unwrap();
    assert!(id > 0);

    assert!(rpc.calls_to("storeMediaFile").is_empty());
    let back = back_of_only_note(&rpc);
    assert!(back.contains("Note: AI image could not be downloaded"));
    assert!(!back.contains("<img"));
}

#[tokio::test]
async fn unreachable_image_host_becomes_a_note_on_the_card() {
    let rpc = RecordingRpc::new();

    let id = writer(rpc.clone())
        .create_card(
            "lucid",
            "clear",
            "A lucid essay.",
            Some("http://127.0.0.1:1/lucid.png"),
        )
        .await
        .unwrap();
    assert!(id > 0);

    let back = back_of_only_note(&rpc);
    assert!(back.contains("Note: AI image could not be downloaded"));
    assert!(!back.contains("<img"));
}

#[tokio::test]
async fn media_upload_failure_becomes_a_note_on_the_card() {
    let rpc = RecordingRpc::with_failing_actions(&["storeMediaFile"]);
    writer(rpc.clone())
        .create_card("lucid", "clear", "A lucid essay.", Some(&tiny_png_data_url()))
        .await
        .unwrap();

    let back = rpc.calls_to("addNote")[0]["note"]["fields"]["Back"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(back.contains("Note: AI image could not be stored"));
}

#[tokio::test]
async fn add_note_failure_is_returned() {
    let rpc = RecordingRpc::with_failing_words(&["lucid"]);
    let err = writer(rpc)
        .create_card("lucid", "clear", "A lucid essay.", None)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Rpc { .. }));
}
