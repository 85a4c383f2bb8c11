//! Trade ingestion and per-venue order-flow state.
//!
//! Each venue/market has one [`TickAccumulator`] living in a cell of the
//! [`VenueStateBook`]. A [`TradeStream`] task is the only writer of its cell;
//! the orchestrator takes non-blocking snapshots. Scalar readings (funding,
//! open interest, liquidations, sentiment) are polled by [`ReadingsPoller`]
//! tasks into a [`ReadingsCell`].

pub mod accumulator;
pub mod error;
pub mod parser;
pub mod readings;
pub mod rest;
pub mod stream;
pub mod venue_state;

pub use accumulator::{CvdState, TickAccumulator, CVD_DECIMALS};
pub use error::{FeedError, FeedResult};
pub use parser::{ParseStats, TradeParser};
pub use readings::{LiquidationTracker, OiTracker, ReadingsCell};
pub use rest::{ReadingsClient, ReadingsConfig, ReadingsPoller};
pub use stream::{StreamConfig, TradeStream};
pub use venue_state::{AccumulatorHandle, CvdReading, VenueStateBook};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any WebSocket connections are made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
