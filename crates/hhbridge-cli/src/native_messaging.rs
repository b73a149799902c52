//! Browser native messaging transport.
//!
//! Each message is a 32-bit little-endian length followed by that many bytes
//! of UTF-8 JSON, in both directions.

use std::sync::Arc;

use anyhow::{Context, Result};
use hhbridge_core::{Dispatcher, Reply};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

/// Largest message accepted from the browser
pub const MAX_MESSAGE_BYTES: u32 = 64 * 1024 * 1024;

/// Read one message. `Ok(None)` means the browser closed the pipe.
pub async fn read_message<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Value>> {
    let length = match reader.read_u32_le().await {
        Ok(length) => length,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e).context("Failed to read message length"),
    };
    if length > MAX_MESSAGE_BYTES {
        anyhow::bail!("Message of {} bytes exceeds the {} byte limit", length, MAX_MESSAGE_BYTES);
    }

    let mut buffer = vec![0u8; length as usize];
    reader
        .read_exact(&mut buffer)
        .await
        .context("Failed to read message body")?;
    let message = serde_json::from_slice(&buffer).context("Message is not valid JSON")?;
    Ok(Some(message))
}

pub async fn write_message<W: AsyncWrite + Unpin>(writer: &mut W, reply: &Reply) -> Result<()> {
    let payload = serde_json::to_vec(reply)?;
    let length = u32::try_from(payload.len()).context("Reply too large")?;
    writer.write_u32_le(length).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Answer messages until the reader closes. Messages are handled
/// concurrently; replies are written one at a time.
pub async fn serve<R, W>(dispatcher: Dispatcher, mut reader: R, writer: W) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let writer = Arc::new(Mutex::new(writer));
    let (done_tx, mut done_rx) = mpsc::channel::<()>(1);

    info!("Native messaging host ready");
    loop {
        let message = match read_message(&mut reader).await {
            Ok(Some(message)) => message,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Dropping unreadable message");
                let mut writer = writer.lock().await;
                write_message(&mut *writer, &Reply::failure(format!("{:#}", e))).await?;
                // A bad frame leaves the stream position unknown
                break;
            }
        };

        let dispatcher = dispatcher.clone();
        let writer = Arc::clone(&writer);
        let done_tx = done_tx.clone();
        tokio::spawn(async move {
            let reply = dispatcher.handle(message).await;
            {
                let mut out = writer.lock().await;
                if let Err(e) = write_message(&mut *out, &reply).await {
                    warn!(error = %e, "Failed to write reply");
                }
            }
            drop(writer);
            drop(done_tx);
        });
    }

    // Wait for in-flight replies before exiting
    drop(done_tx);
    let _ = done_rx.recv().await;
    debug!("Native messaging host stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use hhbridge_core::auth::{Credential, MemoryTokenStore};
    use hhbridge_core::config::{Config, ConfigStore, MemoryConfigStore};
    use hhbridge_core::{BitrixClient, HhClient};

    use crate::sign_in::LoopbackSignIn;

    fn frame(message: &Value) -> Vec<u8> {
        let body = serde_json::to_vec(message).unwrap();
        let mut framed = (body.len() as u32).to_le_bytes().to_vec();
        framed.extend_from_slice(&body);
        framed
    }

    fn offline_dispatcher() -> Dispatcher {
        let config: Arc<dyn ConfigStore> = Arc::new(MemoryConfigStore::new(Config::default()));
        let tokens = Arc::new(MemoryTokenStore::with_credential(Credential::new("cached")));
        let launcher = Arc::new(LoopbackSignIn::new("http://127.0.0.1:8735/oauth").unwrap());
        let hh = HhClient::builder()
            .build(config.clone(), tokens, launcher)
            .unwrap();
        let bitrix = BitrixClient::new(config.clone()).unwrap();
        Dispatcher::new(hh, bitrix, config)
    }

    /// Run the host over `input` and collect every framed reply it wrote.
    async fn serve_frames(input: Vec<u8>) -> Vec<Value> {
        let (writer, mut output) = tokio::io::duplex(64 * 1024);
        serve(offline_dispatcher(), &input[..], writer).await.unwrap();

        let mut replies = Vec::new();
        while let Some(reply) = read_message(&mut output).await.unwrap() {
            replies.push(reply);
        }
        replies
    }

    #[tokio::test]
    async fn test_read_message_frames() {
        let body = br#"{"type":"HH_GET_ME"}"#;
        let mut input = (body.len() as u32).to_le_bytes().to_vec();
        input.extend_from_slice(body);

        let mut reader = &input[..];
        let message = read_message(&mut reader).await.unwrap();
        assert_eq!(message, Some(json!({"type": "HH_GET_ME"})));
        assert_eq!(read_message(&mut reader).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_read_message_rejects_oversized_frame() {
        let input = (MAX_MESSAGE_BYTES + 1).to_le_bytes();
        let mut reader = &input[..];
        assert!(read_message(&mut reader).await.is_err());
    }

    #[tokio::test]
    async fn test_write_message_prefixes_length() {
        let mut output = Vec::new();
        write_message(&mut output, &Reply::unknown_command())
            .await
            .unwrap();

        let length = u32::from_le_bytes(output[..4].try_into().unwrap()) as usize;
        assert_eq!(length, output.len() - 4);
        let reply: Value = serde_json::from_slice(&output[4..]).unwrap();
        assert_eq!(reply, json!({"ok": false, "error": "unknown_command"}));
    }

    #[tokio::test]
    async fn test_serve_answers_every_message_once() {
        let mut input = Vec::new();
        input.extend(frame(&json!({ "type": "CONFIG_GET", "id": 1 })));
        input.extend(frame(&json!({ "type": "NOT_A_COMMAND", "id": 2 })));
        input.extend(frame(&json!({ "type": "HH_GET_PERSON_RESUME", "id": 3 })));
        input.extend(frame(&json!({ "type": "HH_LOGOUT", "id": 4 })));

        let replies = serve_frames(input).await;
        assert_eq!(replies.len(), 4);

        let by_id = |id: i64| {
            replies
                .iter()
                .find(|reply| reply["id"] == json!(id))
                .unwrap_or_else(|| panic!("no reply for id {}", id))
        };
        assert_eq!(by_id(1)["ok"], true);
        assert!(by_id(1)["data"]["HH_REDIRECT_URI"].is_string());
        assert_eq!(by_id(2)["error"], "unknown_command");
        assert_eq!(by_id(3)["ok"], false);
        assert_eq!(by_id(4)["ok"], true);
    }

    #[tokio::test]
    async fn test_serve_stops_after_bad_frame() {
        let mut input = frame(&json!({ "type": "CONFIG_GET", "id": 1 }));
        input.extend((MAX_MESSAGE_BYTES + 1).to_le_bytes());
        // Never read: the stream position is lost after the bad frame
        input.extend(frame(&json!({ "type": "CONFIG_GET", "id": 2 })));

        let replies = serve_frames(input).await;
        assert_eq!(replies.len(), 2);
        assert!(replies.iter().any(|reply| reply["id"] == json!(1) && reply["ok"] == true));
        assert!(replies
            .iter()
            .any(|reply| reply["ok"] == false && reply.get("id").is_none()));
    }
}
