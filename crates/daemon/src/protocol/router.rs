//! Request/reply endpoint.
//!
//! Each inbound message carries three parts: a client address, an empty
//! delimiter, and a JSON request envelope. The reply echoes the address and
//! delimiter around the JSON response. Malformed messages (wrong part
//! count, non-empty delimiter, invalid JSON) are logged and dropped
//! without a reply; the connection stays open for later requests.

use crate::protocol::framing::{Multipart, MultipartCodec};
use crate::protocol::message::{RequestMessage, ResponseMessage};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::future::Future;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

/// Run the request/reply endpoint until shutdown.
///
/// `handler` is invoked once per well-formed request; its response is sent
/// back to the requesting client.
pub async fn run_router<H, F>(listener: TcpListener, handler: H, shutdown: CancellationToken)
where
    H: Fn(RequestMessage) -> F + Clone + Send + 'static,
    F: Future<Output = ResponseMessage> + Send + 'static,
{
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,

            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        tracing::debug!(%peer, "client connected");
                        tokio::spawn(serve_connection(
                            stream,
                            handler.clone(),
                            shutdown.clone(),
                        ));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to accept client");
                    }
                }
            }
        }
    }
}

async fn serve_connection<H, F>(stream: TcpStream, handler: H, shutdown: CancellationToken)
where
    H: Fn(RequestMessage) -> F,
    F: Future<Output = ResponseMessage>,
{
    let mut framed = Framed::new(stream, MultipartCodec::default());

    loop {
        let frame = tokio::select! {
            _ = shutdown.cancelled() => break,
            frame = framed.next() => frame,
        };

        let parts = match frame {
            Some(Ok(parts)) => parts,
            Some(Err(e)) => {
                tracing::warn!(error = %e, "framing error; closing connection");
                break;
            }
            None => break,
        };

        let Some(request) = parse_request(&parts) else {
            continue;
        };
        let address = parts[0].clone();

        let response = handler(request).await;
        let payload = match serde_json::to_vec(&response) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize response");
                continue;
            }
        };

        let reply: Multipart = vec![address, Bytes::new(), Bytes::from(payload)];
        if framed.send(reply).await.is_err() {
            break;
        }
    }
}

/// Validate the three-part shape and parse the request envelope.
fn parse_request(parts: &Multipart) -> Option<RequestMessage> {
    if parts.len() != 3 {
        tracing::warn!(parts = parts.len(), "dropping request with wrong part count");
        return None;
    }
    if !parts[1].is_empty() {
        tracing::warn!("dropping request with non-empty delimiter");
        return None;
    }

    match serde_json::from_slice::<RequestMessage>(&parts[2]) {
        Ok(request) => Some(request),
        Err(e) => {
            tracing::warn!(error = %e, "dropping unparseable request");
            None
        }
    }
}
