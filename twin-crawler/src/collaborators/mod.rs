//! Remote collaborators consumed by the crawler: registry lookup, submodel
//! fetch and blob persistence, plus the HTTP plumbing behind them.

mod blob;
pub mod http;
mod registry;
pub mod retry;
mod submodel;

pub use blob::{BlobPersistence, FsBlobStore, InMemoryBlobStore};
pub use registry::{DigitalTwinRegistry, HttpDigitalTwinRegistry};
pub use retry::RetryPolicy;
pub use submodel::{HttpSubmodelFacade, SubmodelFacade};
