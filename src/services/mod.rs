pub mod aggregator;
pub mod event_source;
pub mod finalizer;
pub mod normalizer;
pub mod odds_correlator;
pub mod trend_engine;

pub use aggregator::*;
pub use event_source::*;
pub use finalizer::*;
pub use odds_correlator::*;
pub use trend_engine::*;
