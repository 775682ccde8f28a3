pub mod balance_extractor;
pub mod config;
pub mod dispatcher;
pub mod error_handler;
pub mod grpc_client;
pub mod heartbeat;
pub mod output_writer;
pub mod session;
pub mod subscription;
pub mod trade_detector;
pub mod writer_backend;

pub use config::{ReconnectPolicy, RuntimeConfig, SessionSettings};
pub use dispatcher::{BuyOrder, LogDispatcher, SignalDispatcher};
pub use grpc_client::{Transport, TransportError, YellowstoneTransport};
pub use output_writer::{JsonlWriter, SignalRecord};
pub use session::{SessionCommand, SessionHandle, SessionManager, SessionState};
pub use subscription::SubscriptionFilter;
pub use trade_detector::{TradeDirection, TradeSignal};
