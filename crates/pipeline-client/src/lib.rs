//! Pipeline Client - execution sync and persistence for pipeline graphs
//!
//! Connects a [`pipeline_engine::GraphStore`] to the outside world:
//!
//! - `SyncClient`: persistent event channel to the execution engine, with a
//!   bounded fixed-interval reconnect state machine
//! - `CompositeLibrary` / `PipelineLibrary`: remote persistence with
//!   commit-on-success staging
//! - `ClientConfig`: JSON configuration with environment overrides
//!
//! # Example
//!
//! ```ignore
//! use pipeline_client::{ClientConfig, SyncClient};
//! use pipeline_engine::GraphStore;
//!
//! let config = ClientConfig::load(&config_dir).await?.with_env_overrides();
//! let store = GraphStore::with_history_depth(config.history_depth).into_shared();
//! let client = SyncClient::from_config(&config, store.clone());
//! client.connect();
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod library;
pub mod persistence;
pub mod protocol;
pub mod reconnect;
pub mod transport;

pub use client::SyncClient;
pub use config::{ClientConfig, ReconnectConfig};
pub use error::{ClientError, ConfigError, PersistenceError, Result, TransportError};
pub use library::{CompositeLibrary, PendingChange, PipelineLibrary};
pub use persistence::{CompositeService, FilePersistence, HttpPersistence, PipelineService};
pub use protocol::ClientMessage;
pub use reconnect::{
    Command, ConnectionMachine, ConnectionState, ConnectionStatus, ReconnectPolicy,
};
pub use transport::{TcpTransport, Transport, TransportChannel};
