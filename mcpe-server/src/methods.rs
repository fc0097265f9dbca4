//! Per-method request handling
//!
//! [`dispatch`] is the single entry point from the connection layer: it
//! routes a decoded request to its operation handler and converts any
//! [`Error`] into the JSON-RPC error response with the right stable code.
//!
//! `initialize` is the only method reachable on a fresh session; everything
//! else is gated behind the initialized flag (`-32000`). Operation handlers
//! orchestrate the subscription manager and the scheduler so that the
//! delivery contracts ("routable after create returns", "no dispatches
//! after remove returns") hold before the response is sent.

use crate::session::Session;
use crate::HubContext;
use mcpe_core::protocol::{
    methods, AcknowledgeParams, CreateParams, InitializeParams, InitializeResult, ListParams,
    ListResult, RemoveResult, ServerInfo, SubscriptionRefParams, ToggleResult, UpdateParams,
    PROTOCOL_VERSION,
};
use mcpe_core::{Error, Result, RpcRequest, RpcResponse};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

/// Handle one request end to end, producing the response to send
pub async fn dispatch(
    ctx: &Arc<HubContext>,
    session: &mut Session,
    request: RpcRequest,
) -> RpcResponse {
    let id = request.id.clone();
    let method = request.method.clone();
    let started = std::time::Instant::now();

    let result = route(ctx, session, &request.method, request.params).await;

    if let Some(m) = &ctx.metrics {
        let status = if result.is_ok() { "success" } else { "error" };
        m.record_request(&method, status, started.elapsed().as_secs_f64());
    }

    match result {
        Ok(value) => RpcResponse::success(value, id),
        Err(e) => {
            tracing::debug!(method = %method, error = %e, "Request failed");
            RpcResponse::error(e.to_rpc(), id)
        }
    }
}

async fn route(
    ctx: &Arc<HubContext>,
    session: &mut Session,
    method: &str,
    params: Option<Value>,
) -> Result<Value> {
    if method == methods::INITIALIZE {
        return handle_initialize(ctx, session, params).await;
    }

    // Initialization is a strict precondition for everything else
    if !session.initialized {
        return Err(Error::NotInitialized);
    }

    match method {
        methods::CAPABILITIES => Ok(crate::capabilities::capabilities(
            ctx.config.max_subscriptions_per_client,
        )),
        methods::SCHEMA => Ok(crate::capabilities::schema()),
        methods::SUBSCRIPTIONS_CREATE => handle_create(ctx, session, params).await,
        methods::SUBSCRIPTIONS_REMOVE => handle_remove(ctx, session, params).await,
        methods::SUBSCRIPTIONS_LIST => handle_list(ctx, session, params).await,
        methods::SUBSCRIPTIONS_UPDATE => handle_update(ctx, session, params).await,
        methods::SUBSCRIPTIONS_PAUSE => handle_pause(ctx, session, params).await,
        methods::SUBSCRIPTIONS_RESUME => handle_resume(ctx, session, params).await,
        methods::EVENTS_ACKNOWLEDGE => handle_acknowledge(params),
        unknown => Err(Error::MethodNotFound(unknown.to_string())),
    }
}

/// Deserialize params that the operation cannot do without
fn required_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T> {
    let value = params.ok_or_else(|| Error::InvalidParams("missing params".to_string()))?;
    serde_json::from_value(value).map_err(|e| Error::InvalidParams(e.to_string()))
}

/// Deserialize params for operations where omitting them entirely is fine
fn optional_params<T: DeserializeOwned + Default>(params: Option<Value>) -> Result<T> {
    match params {
        Some(value) => {
            serde_json::from_value(value).map_err(|e| Error::InvalidParams(e.to_string()))
        }
        None => Ok(T::default()),
    }
}

async fn handle_initialize(
    ctx: &Arc<HubContext>,
    session: &mut Session,
    params: Option<Value>,
) -> Result<Value> {
    let params: InitializeParams = required_params(params)?;

    if params.protocol_version != PROTOCOL_VERSION {
        return Err(Error::InvalidParams(format!(
            "unsupported protocol version '{}' (expected '{PROTOCOL_VERSION}')",
            params.protocol_version
        )));
    }

    // A presented client id reattaches the client to its surviving
    // subscriptions; otherwise a fresh identity is minted
    let client_id = params
        .client_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    session.initialized = true;
    session.client_id = Some(client_id.clone());
    session.client_info = params.client_info;
    ctx.registry.bind_client(&client_id, session.conn_id).await;

    tracing::info!(
        conn_id = session.conn_id,
        client_id = %client_id,
        "Session initialized"
    );

    let result = InitializeResult {
        protocol_version: PROTOCOL_VERSION.to_string(),
        server_info: ServerInfo {
            name: ctx.config.server_name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
        capabilities: crate::capabilities::capabilities(ctx.config.max_subscriptions_per_client),
        client_id,
    };
    serde_json::to_value(result).map_err(|e| Error::Internal(e.to_string()))
}

async fn handle_create(
    ctx: &Arc<HubContext>,
    session: &mut Session,
    params: Option<Value>,
) -> Result<Value> {
    let params: CreateParams = required_params(params)?;
    let client_id = session.client_id()?.to_string();

    let subscription = ctx.manager.create(&client_id, params).await?;
    // Armed before the response goes out, so an aggregating subscription is
    // never observable-but-unscheduled
    ctx.scheduler.watch(&subscription).await;
    session.subscription_ids.insert(subscription.id.clone());

    if let Some(m) = &ctx.metrics {
        m.record_active_subscriptions(ctx.manager.active_count().await as i64);
    }

    serde_json::to_value(&subscription).map_err(|e| Error::Internal(e.to_string()))
}

async fn handle_remove(
    ctx: &Arc<HubContext>,
    session: &mut Session,
    params: Option<Value>,
) -> Result<Value> {
    let params: SubscriptionRefParams = required_params(params)?;
    let client_id = session.client_id()?.to_string();

    ctx.manager.remove(&client_id, &params.subscription_id).await?;
    ctx.scheduler.unwatch(&params.subscription_id).await;
    session.subscription_ids.remove(&params.subscription_id);

    if let Some(m) = &ctx.metrics {
        m.record_active_subscriptions(ctx.manager.active_count().await as i64);
    }

    serde_json::to_value(RemoveResult { success: true })
        .map_err(|e| Error::Internal(e.to_string()))
}

async fn handle_list(
    ctx: &Arc<HubContext>,
    session: &mut Session,
    params: Option<Value>,
) -> Result<Value> {
    let params: ListParams = optional_params(params)?;
    let client_id = session.client_id()?.to_string();

    let subscriptions = ctx.manager.list(&client_id, params.status).await;
    serde_json::to_value(ListResult { subscriptions })
        .map_err(|e| Error::Internal(e.to_string()))
}

async fn handle_update(
    ctx: &Arc<HubContext>,
    session: &mut Session,
    params: Option<Value>,
) -> Result<Value> {
    let params: UpdateParams = required_params(params)?;
    let client_id = session.client_id()?.to_string();
    let delivery_changed = params.delivery.is_some();

    let subscription = ctx.manager.update(&client_id, params).await?;

    if delivery_changed {
        // Re-arm under the new schedule; watch() ignores realtime, so a
        // class change to realtime just detaches
        ctx.scheduler.unwatch(&subscription.id).await;
        if subscription.status == mcpe_core::model::SubscriptionStatus::Active {
            ctx.scheduler.watch(&subscription).await;
        }
    }

    serde_json::to_value(&subscription).map_err(|e| Error::Internal(e.to_string()))
}

async fn handle_pause(
    ctx: &Arc<HubContext>,
    session: &mut Session,
    params: Option<Value>,
) -> Result<Value> {
    let params: SubscriptionRefParams = required_params(params)?;
    let client_id = session.client_id()?.to_string();

    let subscription = ctx.manager.pause(&client_id, &params.subscription_id).await?;
    ctx.scheduler.unwatch(&subscription.id).await;

    if let Some(m) = &ctx.metrics {
        m.record_active_subscriptions(ctx.manager.active_count().await as i64);
    }

    serde_json::to_value(ToggleResult {
        success: true,
        status: subscription.status,
    })
    .map_err(|e| Error::Internal(e.to_string()))
}

async fn handle_resume(
    ctx: &Arc<HubContext>,
    session: &mut Session,
    params: Option<Value>,
) -> Result<Value> {
    let params: SubscriptionRefParams = required_params(params)?;
    let client_id = session.client_id()?.to_string();

    let subscription = ctx
        .manager
        .resume(&client_id, &params.subscription_id)
        .await?;
    ctx.scheduler.watch(&subscription).await;

    if let Some(m) = &ctx.metrics {
        m.record_active_subscriptions(ctx.manager.active_count().await as i64);
    }

    serde_json::to_value(ToggleResult {
        success: true,
        status: subscription.status,
    })
    .map_err(|e| Error::Internal(e.to_string()))
}

fn handle_acknowledge(params: Option<Value>) -> Result<Value> {
    // Parsed for validity, acted on not at all: realtime delivery is
    // best-effort and nothing is redelivered
    let _params: AcknowledgeParams = optional_params(params)?;
    serde_json::to_value(mcpe_core::protocol::AcknowledgeResult { success: true })
        .map_err(|e| Error::Internal(e.to_string()))
}
