// Form pipeline
// Implements: validation rules, snapshot persistence, submission coordination, form sessions.
// Sessions are the only stateful piece; everything they need is injected at activation.

pub mod coordinator;
pub mod liveness;
pub mod persistence;
pub mod registry;
pub mod session;
pub mod stores;
pub mod validation;

pub use coordinator::{RetryPolicy, SubmissionError, SubmissionReport, SubmitAction, SubmitError};
pub use persistence::{SnapshotAdapter, SnapshotStore};
pub use registry::{FormRegistry, RegistryLimits};
pub use session::{FormError, FormPolicy, FormView};
pub use stores::{FileStore, MemoryStore, RedisStore};
pub use validation::FieldErrors;
