// Compensation Gap Engine
// Implements: inflation index lookup, gap computation, severity bands, recommendation feed.
// Everything in here is synchronous and side-effect free; handlers are the only async code.

pub mod engine;
pub mod handlers;
pub mod index;
pub mod recommendations;
pub mod severity;

pub use engine::{compute_gap, GapError, GapResult, SalaryObservation};
pub use index::{DateRange, IndexLookup, IndexPair, IndexPoint, IndexSeries};
pub use recommendations::{build_recommendations, RecommendationFeed};
pub use severity::{Severity, SeverityBands};
