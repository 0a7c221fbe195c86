//! Native messaging transport: length-prefixed JSON over a byte stream.
//!
//! Every frame is a UTF-8 JSON document preceded by its length as a 32-bit
//! integer in native byte order. Frames are handled concurrently and each
//! one gets exactly one reply; an `id` field on the request is copied onto
//! its reply so the extension can match them up.

use std::sync::Arc;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::bytes::Bytes;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

use crate::gateway::{ApiOutcome, Failure};
use crate::messages::{Reply, Router};

/// Largest message the browser accepts from a host.
pub const MAX_REPLY_BYTES: usize = 1024 * 1024;

/// Largest message the browser sends to a host.
pub const MAX_REQUEST_BYTES: usize = 64 * 1024 * 1024;

pub fn codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(4)
        .native_endian()
        .max_frame_length(MAX_REQUEST_BYTES)
        .new_codec()
}

/// Serve requests from `reader` until it reaches EOF, then flush the
/// replies still in flight.
pub async fn serve<R, W>(router: Arc<Router>, reader: R, writer: W) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut frames = FramedRead::new(reader, codec());
    let mut sink = FramedWrite::new(writer, codec());
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<Bytes>();
    let mut reply_tx = Some(reply_tx);

    loop {
        tokio::select! {
            frame = frames.next(), if reply_tx.is_some() => match frame {
                Some(Ok(frame)) => {
                    if let Some(tx) = reply_tx.clone() {
                        let router = Arc::clone(&router);
                        tokio::spawn(async move {
                            let reply = respond(&router, &frame).await;
                            // Receiver only goes away when the session is over.
                            let _ = tx.send(reply);
                        });
                    }
                }
                Some(Err(e)) => return Err(e).context("failed to read native message frame"),
                None => {
                    tracing::debug!("input closed, draining pending replies");
                    reply_tx = None;
                }
            },
            Some(reply) = reply_rx.recv() => {
                sink.send(reply).await.context("failed to write native message reply")?;
            }
            else => break,
        }
    }

    Ok(())
}

/// Handle one frame and encode its reply.
async fn respond(router: &Router, frame: &[u8]) -> Bytes {
    let (id, reply) = match serde_json::from_slice::<Value>(frame) {
        Ok(mut value) => {
            let id = value.as_object_mut().and_then(|obj| obj.remove("id"));
            (id, router.handle_value(value).await)
        }
        Err(e) => {
            tracing::warn!("undecodable message: {e}");
            (
                None,
                Reply::Rejected {
                    error: format!("malformed request: {e}"),
                },
            )
        }
    };

    encode_reply(id, &reply)
}

fn encode_reply(id: Option<Value>, reply: &Reply) -> Bytes {
    let mut bytes = to_json(id.clone(), reply);
    if bytes.len() > MAX_REPLY_BYTES {
        tracing::warn!(len = bytes.len(), "reply exceeds native messaging limit");
        let oversized = Reply::Api(ApiOutcome::Failure(Failure::bare(
            "Response too large to deliver to the extension",
        )));
        bytes = to_json(id, &oversized);
    }
    Bytes::from(bytes)
}

fn to_json(id: Option<Value>, reply: &Reply) -> Vec<u8> {
    let mut value = serde_json::to_value(reply).unwrap_or_else(|e| {
        serde_json::json!({ "error": format!("failed to encode reply: {e}") })
    });
    if let (Some(id), Some(obj)) = (id, value.as_object_mut()) {
        obj.insert("id".to_string(), id);
    }
    // Serializing a `Value` cannot fail.
    serde_json::to_vec(&value).unwrap_or_default()
}
