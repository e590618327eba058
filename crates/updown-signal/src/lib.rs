//! Signal state, strategies and decision routing.
//!
//! - `SignalState`: bounded per-round price window and derived features
//! - `Strategy`: momentum, mean reversion and the composite scorer
//! - `DecisionRouter`: first-wins routing with odds adjustment and floors

pub mod composite;
pub mod context;
pub mod error;
pub mod router;
pub mod state;
pub mod strategy;

pub use composite::{CompositeConfig, CompositeStrategy};
pub use context::EvalContext;
pub use error::{SignalError, SignalResult};
pub use router::{DecisionRouter, RouterConfig};
pub use state::{Features, SignalState};
pub use strategy::{
    MeanReversionConfig, MomentumConfig, Strategy, StrategyKind, StrategyParams,
};
