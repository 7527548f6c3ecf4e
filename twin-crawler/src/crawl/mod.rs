//! Digital twin graph crawl: the per-item pipeline, the handler expanding the
//! item tree and the in-process transfer manager executing the items.

mod handler;
pub mod pipeline;
pub mod stages;
mod transfer_manager;
mod visited;

use std::sync::Arc;

use crate::collaborators::{DigitalTwinRegistry, SubmodelFacade};

pub use handler::{GraphCrawlHandler, load_containers};
pub use pipeline::{ItemContext, ItemPipeline, ItemStage};
pub use stages::{AspectStage, DigitalTwinStage, RelationshipStage};
pub use transfer_manager::{ItemTransferProcessManager, TransferConfig};
pub use visited::VisitedItems;

/// The standard item pipeline: descriptor, relationships, then aspects.
pub fn default_pipeline(
    registry: Arc<dyn DigitalTwinRegistry>,
    submodels: Arc<dyn SubmodelFacade>,
) -> ItemPipeline {
    ItemPipeline::new()
        .add_stage(DigitalTwinStage::new(registry))
        .add_stage(RelationshipStage::new(Arc::clone(&submodels)))
        .add_stage(AspectStage::new(submodels))
}
