//! Job entity, its state machine and the concurrent job store.

mod model;
pub mod parameters;
mod state;
mod store;

pub use model::{MultiTransferJob, TransferProcess};
pub use parameters::{BomLifecycle, JobParameters};
pub use state::{JobState, transition};
pub use store::{InMemoryJobStore, JobStore, StoreConfig};
