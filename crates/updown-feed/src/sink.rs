//! Consumers of feed output.
//!
//! Feed tasks run concurrently and push into these traits; implementors
//! guard their own state.

use crate::odds::ActiveMarket;
use updown_core::Tick;

/// Receives normalized ticks.
pub trait TickSink: Send + Sync {
    fn on_tick(&self, tick: Tick);
}

/// Receives odds-feed events.
pub trait OddsSink: Send + Sync {
    /// The active market was (re)resolved.
    fn on_market(&self, market: ActiveMarket);

    /// A raw order-book frame arrived for the current market.
    fn on_frame(&self, raw: &str);
}
