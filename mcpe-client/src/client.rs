//! The hub client
//!
//! [`HubClient`] wraps one WebSocket connection to a hub: it correlates
//! requests with responses, dispatches hub notifications to registered
//! handlers, and offers typed wrappers for every hub operation.
//!
//! The client is cheaply cloneable (`Arc` internals); clones share the
//! connection. A receive loop runs in its own task from `connect` until the
//! socket closes, at which point all pending requests fail with
//! `ConnectionClosed`.

use crate::notification::NotificationHandlers;
use crate::request::RequestTracker;
use futures::{SinkExt, StreamExt};
use mcpe_core::model::{DeliveryPreferences, EventFilter, Subscription, SubscriptionStatus};
use mcpe_core::protocol::{
    methods, AcknowledgeParams, AcknowledgeResult, ClientInfo, CreateParams, InitializeParams,
    InitializeResult, ListParams, ListResult, RemoveResult, SubscriptionRefParams, ToggleResult,
    UpdateParams, PROTOCOL_VERSION,
};
use mcpe_core::{codec, Error, Result, RpcMessage, RpcNotification, RpcRequest};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type WsSink = futures::stream::SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for one hub connection
#[derive(Clone)]
pub struct HubClient {
    sender: Arc<Mutex<WsSink>>,
    requests: RequestTracker,
    notifications: NotificationHandlers,
    client_id: Arc<Mutex<Option<String>>>,
}

impl HubClient {
    /// Connect to a hub over WebSocket
    #[tracing::instrument(skip(url), fields(url = url))]
    pub async fn connect(url: &str) -> Result<Self> {
        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| Error::WebSocket(e.to_string()))?;
        let (sender, receiver) = ws_stream.split();

        let client = Self {
            sender: Arc::new(Mutex::new(sender)),
            requests: RequestTracker::new(),
            notifications: NotificationHandlers::new(),
            client_id: Arc::new(Mutex::new(None)),
        };

        tokio::spawn(receive_loop(
            receiver,
            client.requests.clone(),
            client.notifications.clone(),
        ));

        tracing::info!("Connected to hub");
        Ok(client)
    }

    /// Perform the `initialize` handshake with a fresh identity
    pub async fn initialize(&self) -> Result<InitializeResult> {
        self.initialize_with(InitializeParams {
            protocol_version: PROTOCOL_VERSION.to_string(),
            client_info: Some(ClientInfo {
                name: "mcpe-client".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
            client_id: None,
        })
        .await
    }

    /// Handshake presenting an existing client id, reattaching to its
    /// subscriptions
    pub async fn initialize_as(&self, client_id: impl Into<String>) -> Result<InitializeResult> {
        self.initialize_with(InitializeParams {
            protocol_version: PROTOCOL_VERSION.to_string(),
            client_info: Some(ClientInfo {
                name: "mcpe-client".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
            client_id: Some(client_id.into()),
        })
        .await
    }

    /// Handshake with explicit parameters
    pub async fn initialize_with(&self, params: InitializeParams) -> Result<InitializeResult> {
        let result: InitializeResult = self.request(methods::INITIALIZE, params).await?;
        *self.client_id.lock().await = Some(result.client_id.clone());
        Ok(result)
    }

    /// The identity assigned at initialize, if the handshake has run
    pub async fn client_id(&self) -> Option<String> {
        self.client_id.lock().await.clone()
    }

    /// Send one request and await its typed result
    pub async fn request<P: Serialize, R: DeserializeOwned>(
        &self,
        method: impl Into<String>,
        params: P,
    ) -> Result<R> {
        let method = method.into();
        let params =
            serde_json::to_value(params).map_err(|e| Error::Serialization(e.to_string()))?;
        let params = if params.is_null() { None } else { Some(params) };

        let id = self.requests.next_id();
        let rx = self.requests.register(id.clone()).await;

        let request = RpcRequest::new(&method, params, id.clone());
        let text = codec::encode_request(&request)?;
        if let Err(e) = self.send_text(text).await {
            self.requests.forget(&id).await;
            return Err(e);
        }

        let response = match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => return Err(Error::ConnectionClosed),
            Err(_) => {
                self.requests.forget(&id).await;
                return Err(Error::Timeout);
            }
        };

        if let Some(error) = response.error {
            return Err(Error::Rpc(error));
        }
        let result = response.result.unwrap_or(serde_json::Value::Null);
        serde_json::from_value(result).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Register a handler for a hub notification method
    pub async fn on_notification<F, Fut>(&self, method: impl Into<String>, handler: F)
    where
        F: Fn(RpcNotification) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.notifications.register(method, handler).await;
    }

    /// Fetch the hub's capability descriptor
    pub async fn capabilities(&self) -> Result<serde_json::Value> {
        self.request(methods::CAPABILITIES, serde_json::Value::Null)
            .await
    }

    /// Fetch the operation schemas
    pub async fn schema(&self) -> Result<serde_json::Value> {
        self.request(methods::SCHEMA, serde_json::Value::Null).await
    }

    /// Create a subscription from filter and delivery preferences
    pub async fn create_subscription(
        &self,
        filter: EventFilter,
        delivery: DeliveryPreferences,
    ) -> Result<Subscription> {
        self.create_subscription_with(CreateParams {
            filter,
            delivery,
            handler: None,
            expires_at: None,
        })
        .await
    }

    /// Create a subscription with full parameters (handler, expiry)
    pub async fn create_subscription_with(&self, params: CreateParams) -> Result<Subscription> {
        self.request(methods::SUBSCRIPTIONS_CREATE, params).await
    }

    pub async fn remove_subscription(&self, subscription_id: impl Into<String>) -> Result<bool> {
        let result: RemoveResult = self
            .request(
                methods::SUBSCRIPTIONS_REMOVE,
                SubscriptionRefParams {
                    subscription_id: subscription_id.into(),
                },
            )
            .await?;
        Ok(result.success)
    }

    pub async fn list_subscriptions(
        &self,
        status: Option<SubscriptionStatus>,
    ) -> Result<Vec<Subscription>> {
        let result: ListResult = self
            .request(methods::SUBSCRIPTIONS_LIST, ListParams { status })
            .await?;
        Ok(result.subscriptions)
    }

    pub async fn update_subscription(&self, params: UpdateParams) -> Result<Subscription> {
        self.request(methods::SUBSCRIPTIONS_UPDATE, params).await
    }

    pub async fn pause_subscription(
        &self,
        subscription_id: impl Into<String>,
    ) -> Result<SubscriptionStatus> {
        let result: ToggleResult = self
            .request(
                methods::SUBSCRIPTIONS_PAUSE,
                SubscriptionRefParams {
                    subscription_id: subscription_id.into(),
                },
            )
            .await?;
        Ok(result.status)
    }

    pub async fn resume_subscription(
        &self,
        subscription_id: impl Into<String>,
    ) -> Result<SubscriptionStatus> {
        let result: ToggleResult = self
            .request(
                methods::SUBSCRIPTIONS_RESUME,
                SubscriptionRefParams {
                    subscription_id: subscription_id.into(),
                },
            )
            .await?;
        Ok(result.status)
    }

    /// Acknowledge a delivery (best-effort protocol, accepted as a no-op)
    pub async fn acknowledge(
        &self,
        subscription_id: impl Into<String>,
        event_id: impl Into<String>,
    ) -> Result<bool> {
        let result: AcknowledgeResult = self
            .request(
                methods::EVENTS_ACKNOWLEDGE,
                AcknowledgeParams {
                    subscription_id: Some(subscription_id.into()),
                    event_id: Some(event_id.into()),
                },
            )
            .await?;
        Ok(result.success)
    }

    /// Close the connection
    pub async fn disconnect(&self) {
        let mut sender = self.sender.lock().await;
        let _ = sender.send(Message::Close(None)).await;
        let _ = sender.close().await;
    }

    async fn send_text(&self, text: String) -> Result<()> {
        self.sender
            .lock()
            .await
            .send(Message::Text(text))
            .await
            .map_err(|e| Error::WebSocket(e.to_string()))
    }
}

async fn receive_loop(
    mut receiver: futures::stream::SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>,
    requests: RequestTracker,
    notifications: NotificationHandlers,
) {
    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => match codec::decode(&text) {
                Ok(RpcMessage::Response(response)) => {
                    requests.complete(response).await;
                }
                Ok(RpcMessage::Notification(notification)) => {
                    notifications.dispatch(notification).await;
                }
                Ok(RpcMessage::Request(request)) => {
                    tracing::warn!(method = %request.method, "Ignoring request from hub");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Undecodable frame from hub");
                }
            },
            Ok(Message::Close(_)) => {
                tracing::info!("Hub closed the connection");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    requests.fail_all().await;
}
