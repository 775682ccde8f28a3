use crate::streamer_core::config::{RuntimeConfig, MAX_DECODING_MESSAGE_SIZE};
use async_trait::async_trait;
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::pin::Pin;
use yellowstone_grpc_client::{ClientTlsConfig, GeyserGrpcClient};
use yellowstone_grpc_proto::geyser::{SubscribeRequest, SubscribeUpdate};

#[derive(Debug, Clone, PartialEq)]
pub enum TransportError {
    Connect(String),
    Subscribe(String),
    Write(String),
    Stream(String),
    Closed,
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Connect(msg) => write!(f, "Connection error: {}", msg),
            TransportError::Subscribe(msg) => write!(f, "Subscribe error: {}", msg),
            TransportError::Write(msg) => write!(f, "Write error: {}", msg),
            TransportError::Stream(msg) => write!(f, "Stream error: {}", msg),
            TransportError::Closed => write!(f, "Channel closed"),
        }
    }
}

impl std::error::Error for TransportError {}

pub type UpdateStream =
    Pin<Box<dyn Stream<Item = Result<SubscribeUpdate, TransportError>> + Send>>;

/// Outbound half of a subscription channel.
///
/// `send` resolves once the request has been handed to the transport, so a
/// write is a single awaited step with one success and one failure branch.
#[async_trait]
pub trait RequestSink: Send {
    async fn send(&mut self, request: SubscribeRequest) -> Result<(), TransportError>;

    /// True once the transport has rejected a write or been shut down.
    fn is_closed(&self) -> bool;
}

/// One open bidirectional subscription.
pub struct DuplexChannel {
    pub sink: Box<dyn RequestSink>,
    pub updates: UpdateStream,
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self) -> Result<DuplexChannel, TransportError>;

    /// Endpoint description for logging
    fn endpoint(&self) -> String;
}

/// Transport backed by a Yellowstone gRPC endpoint.
///
/// Every `open` builds a fresh client and subscribe call; the client is kept
/// alive inside the returned sink for as long as the channel lives.
#[derive(Debug, Clone)]
pub struct YellowstoneTransport {
    geyser_url: String,
    x_token: Option<String>,
}

impl YellowstoneTransport {
    pub fn new(geyser_url: String, x_token: Option<String>) -> Self {
        Self { geyser_url, x_token }
    }

    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self::new(config.geyser_url.clone(), config.x_token.clone())
    }
}

struct YellowstoneSink<C> {
    _client: C,
    inner: Pin<Box<dyn Sink<SubscribeRequest, Error = TransportError> + Send>>,
    closed: bool,
}

#[async_trait]
impl<C: Send> RequestSink for YellowstoneSink<C> {
    async fn send(&mut self, request: SubscribeRequest) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }

        match self.inner.send(request).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.closed = true;
                Err(e)
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

#[async_trait]
impl Transport for YellowstoneTransport {
    async fn open(&self) -> Result<DuplexChannel, TransportError> {
        log::info!("🔗 Opening Yellowstone gRPC channel: {}", self.geyser_url);

        let mut builder = GeyserGrpcClient::build_from_shared(self.geyser_url.clone())
            .map_err(|e| TransportError::Connect(e.to_string()))?
            .x_token(self.x_token.clone())
            .map_err(|e| TransportError::Connect(e.to_string()))?
            .max_decoding_message_size(MAX_DECODING_MESSAGE_SIZE);

        if self.geyser_url.starts_with("https://") {
            builder = builder
                .tls_config(ClientTlsConfig::new().with_native_roots())
                .map_err(|e| TransportError::Connect(e.to_string()))?;
        }

        let mut client = builder
            .connect()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let (sink, stream) = client
            .subscribe()
            .await
            .map_err(|e| TransportError::Subscribe(e.to_string()))?;

        let sink = sink.sink_map_err(|e| TransportError::Write(e.to_string()));
        let updates = stream.map(|item| item.map_err(|status| TransportError::Stream(status.to_string())));

        Ok(DuplexChannel {
            sink: Box::new(YellowstoneSink {
                _client: client,
                inner: Box::pin(sink),
                closed: false,
            }),
            updates: Box::pin(updates),
        })
    }

    fn endpoint(&self) -> String {
        self.geyser_url.clone()
    }
}
