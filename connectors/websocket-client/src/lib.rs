//! # WMS realtime websocket transport
//!
//! A [`ChangeTransport`](wms_realtime_core::ChangeTransport) for the hosted change feed, which
//! speaks Phoenix channels over a websocket. Each open joins `realtime:<channel>` with one
//! `postgres_changes` binding per routed table and reports progress to the manager:
//!
//! | feed | reported as |
//! |---|---|
//! | join reply `ok` | `subscribed` |
//! | join reply `error`, `phx_error`, socket error | `channel_error` |
//! | no join reply in time, unanswered heartbeat | `timed_out` |
//! | `phx_close`, socket closed | `closed` |
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use wms_realtime_core::{InvalidationPredicate, RealtimeConfig, RealtimeManager};
//! # use wms_realtime_websocket_client::{WebsocketConfig, WebsocketTransport};
//! #[tokio::main]
//! async fn main() {
//!     let transport = Arc::new(WebsocketTransport::new(WebsocketConfig::new("https://wms.example.co", "anon-key")));
//!     let manager = RealtimeManager::new(RealtimeConfig::default(), transport);
//!
//!     let _guard = manager.subscribe(Arc::new(|p: &InvalidationPredicate| println!("stale: {p}")), None);
//!     manager.wait_connected().await;
//! }
//! ```

pub mod client;
pub mod config;
pub mod message;

pub use client::{ClientError, WebsocketChannel, WebsocketTransport};
pub use config::WebsocketConfig;

pub use tokio_tungstenite::tungstenite::Error as TungsteniteError;
