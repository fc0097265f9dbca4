//! WebSocket connection handling
//!
//! Each accepted connection gets two tasks joined by the session's bounded
//! outbound queue:
//!
//! - the **reader** decodes inbound frames and drives the dispatcher; it
//!   owns the [`Session`] state, so no lock guards the initialized flag
//! - the **writer** drains the queue into the socket, which is the single
//!   point that serializes all outbound traffic and gives the per-connection
//!   FIFO guarantee
//!
//! Responses and decode errors go out through the awaited send path; only
//! the router's realtime notifications use the dropping path. When either
//! task ends the other is aborted and the connection is unregistered, which
//! also cancels any realtime delivery still trying to enqueue here.

use crate::methods;
use crate::session::{Session, SessionHandle};
use crate::HubContext;
use futures::{SinkExt, StreamExt};
use mcpe_core::{codec, Error, Result, RpcMessage, RpcResponse};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// Handle one connection from accept to cleanup
#[tracing::instrument(skip(stream, ctx), fields(conn_id = conn_id))]
pub async fn handle_connection(
    stream: TcpStream,
    conn_id: u64,
    ctx: Arc<HubContext>,
) -> Result<()> {
    let ws_stream = accept_async(stream)
        .await
        .map_err(|e| Error::WebSocket(e.to_string()))?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let (tx, mut rx) = mpsc::channel::<Message>(ctx.config.outbound_queue_capacity);
    let handle = SessionHandle::new(conn_id, tx);
    ctx.registry.register(handle.clone()).await;

    if let Some(m) = &ctx.metrics {
        m.record_connection(ctx.registry.connection_count().await as i64);
    }

    let mut send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if let Err(e) = ws_sender.send(message).await {
                tracing::debug!(error = %e, "Outbound write failed");
                break;
            }
        }
    });

    let recv_ctx = Arc::clone(&ctx);
    let mut recv_task = tokio::spawn(async move {
        let mut session = Session::new(conn_id);
        while let Some(message) = ws_receiver.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    if let Err(e) = handle_frame(&recv_ctx, &mut session, &handle, &text).await {
                        // Send-path failure means the connection is going away
                        tracing::debug!(error = %e, "Dropping connection after send failure");
                        break;
                    }
                }
                Ok(Message::Close(_)) => {
                    tracing::info!("Connection closed by client");
                    break;
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(error = %e, "WebSocket receive error");
                    if let Some(m) = &recv_ctx.metrics {
                        m.record_error("websocket");
                    }
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => { recv_task.abort(); }
        _ = &mut recv_task => { send_task.abort(); }
    }

    // Handles become invalid first, so in-flight routing observes the
    // disconnect; subscriptions survive for reconnect by client id
    ctx.registry.unregister(conn_id).await;

    if let Some(m) = &ctx.metrics {
        m.record_disconnection(ctx.registry.connection_count().await as i64);
    }
    tracing::info!("Connection cleaned up");

    Ok(())
}

/// Decode and dispatch one inbound frame
async fn handle_frame(
    ctx: &Arc<HubContext>,
    session: &mut Session,
    handle: &SessionHandle,
    text: &str,
) -> Result<()> {
    match codec::decode(text) {
        Ok(RpcMessage::Request(request)) => {
            let response = methods::dispatch(ctx, session, request).await;
            send_response(handle, &response).await
        }
        Ok(RpcMessage::Notification(notification)) => {
            // Clients have no notification-only operations; log and move on
            tracing::debug!(method = %notification.method, "Ignoring client notification");
            Ok(())
        }
        Ok(RpcMessage::Response(_)) => {
            tracing::warn!("Ignoring unexpected response frame from client");
            Ok(())
        }
        Err(e) => {
            if let Some(m) = &ctx.metrics {
                m.record_error("decode");
            }
            // Answer with the request id when it survived the damage
            let id = codec::recover_id(text);
            let response = RpcResponse::error(e.to_rpc(), id);
            send_response(handle, &response).await
        }
    }
}

async fn send_response(handle: &SessionHandle, response: &RpcResponse) -> Result<()> {
    let text = codec::encode_response(response)?;
    handle.send(Message::Text(text)).await
}
