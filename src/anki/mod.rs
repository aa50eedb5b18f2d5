//! Anki integration over the AnkiConnect add-on's local RPC endpoint.
//!
//! [`rpc`] owns the wire protocol and retry policy; [`card`] assembles
//! notes and uploads their illustrations. The [`FlashcardRpc`] trait is
//! the seam between them so card assembly can run against any endpoint.

pub mod card;
pub mod rpc;

pub use card::{CardOptions, CardWriter, MediaData, NoteId};
pub use rpc::{AnkiConnect, RetryPolicy};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::Result;

/// Protocol version spoken by AnkiConnect.
pub const ANKI_CONNECT_VERSION: u64 = 6;

/// One RPC round trip to the flashcard application.
#[async_trait]
pub trait FlashcardRpc: Send + Sync {
    /// Invoke `action`. `params` is omitted from the envelope when null or empty.
    async fn call(&self, action: &str, params: Value) -> Result<Value>;
}

/// Build the request body: `{action, version: 6, params?}`.
pub fn envelope(action: &str, params: Value) -> Value {
    let mut body = serde_json::json!({
        "action": action,
        "version": ANKI_CONNECT_VERSION,
    });
    let empty = match &params {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    };
    if !empty {
        body["params"] = params;
    }
    body
}

/// Connectivity report for the status command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlashcardStatus {
    pub connected: bool,
    pub version: Option<u64>,
    /// Assumed true once connected; deck listing is not probed.
    pub deck_exists: bool,
    pub deck_name: String,
    pub message: String,
    pub error: Option<String>,
}

/// Probe the endpoint with a `version` call.
pub async fn probe_status(rpc: &dyn FlashcardRpc, deck_name: &str) -> FlashcardStatus {
    match rpc.call("version", Value::Null).await {
        Ok(version) => FlashcardStatus {
            connected: true,
            version: version.as_u64(),
            deck_exists: true,
            deck_name: deck_name.to_string(),
            message: "AnkiConnect is reachable".to_string(),
            error: None,
        },
        Err(e) => {
            warn!(error = %e, "AnkiConnect status probe failed");
            FlashcardStatus {
                connected: false,
                version: None,
                deck_exists: false,
                deck_name: deck_name.to_string(),
                message: "Cannot connect to Anki. Ensure Anki is running with the AnkiConnect add-on installed.".to_string(),
                error: Some(e.to_string()),
            }
        }
    }
}

/// Ask Anki to sync its collection with AnkiWeb.
pub async fn sync(rpc: &dyn FlashcardRpc) -> Result<()> {
    rpc.call("version", Value::Null).await?;
    rpc.call("sync", Value::Null).await?;
    info!("Anki sync completed");
    Ok(())
}
