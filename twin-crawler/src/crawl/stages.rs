//! Stages of the item crawl: descriptor resolution, relationship expansion
//! and optional aspect collection.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::pipeline::{ItemContext, ItemStage};
use crate::Error;
use crate::collaborators::{DigitalTwinRegistry, SubmodelFacade};
use crate::domain::{ProcessStep, Relationship, Submodel, Tombstone, same_aspect};

/// Resolves the item's descriptor; halts the pipeline when it cannot.
pub struct DigitalTwinStage {
    registry: Arc<dyn DigitalTwinRegistry>,
}

impl DigitalTwinStage {
    pub fn new(registry: Arc<dyn DigitalTwinRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl ItemStage for DigitalTwinStage {
    fn name(&self) -> &'static str {
        "digital_twin"
    }

    async fn process(&self, mut ctx: ItemContext) -> ItemContext {
        match self.registry.resolve(&ctx.item_id).await {
            Ok(shell) => {
                debug!(item_id = %ctx.item_id, shell_id = %shell.id, "Resolved digital twin");
                ctx.container.shells.push(shell.clone());
                ctx.shell = Some(shell);
            }
            Err(e) => {
                warn!(item_id = %ctx.item_id, error = %e, "Digital twin lookup failed");
                let endpoint = failed_endpoint(&e);
                let tombstone = Tombstone::from_error(
                    ctx.item_id.clone(),
                    endpoint,
                    ProcessStep::DigitalTwinRequest,
                    &e,
                );
                ctx.add_tombstone(tombstone);
                ctx.halt();
            }
        }
        ctx
    }
}

/// Fetches the relationship submodels of the item and records child ids.
///
/// Each endpoint is fetched independently; a failing endpoint leaves a
/// tombstone and the remaining ones are still processed.
pub struct RelationshipStage {
    submodels: Arc<dyn SubmodelFacade>,
}

impl RelationshipStage {
    pub fn new(submodels: Arc<dyn SubmodelFacade>) -> Self {
        Self { submodels }
    }
}

#[async_trait]
impl ItemStage for RelationshipStage {
    fn name(&self) -> &'static str {
        "relationship"
    }

    async fn process(&self, mut ctx: ItemContext) -> ItemContext {
        let Some(shell) = ctx.shell.clone() else {
            return ctx;
        };
        let aspect = ctx.lifecycle.relationship_aspect();

        for descriptor in shell.submodels_of(aspect) {
            for endpoint in descriptor.endpoint_addresses() {
                let fetched = match self.submodels.fetch(endpoint).await {
                    Ok(payload) => Relationship::from_payload(&payload, aspect),
                    Err(e) => Err(e),
                };
                match fetched {
                    Ok(relationships) => {
                        debug!(
                            item_id = %ctx.item_id,
                            endpoint = %endpoint,
                            count = relationships.len(),
                            "Fetched relationships"
                        );
                        for rel in relationships {
                            ctx.add_child(&rel.linked_item.child_catena_x_id);
                            ctx.container.relationships.push(rel);
                        }
                    }
                    Err(e) => {
                        warn!(item_id = %ctx.item_id, endpoint = %endpoint, error = %e, "Relationship fetch failed");
                        ctx.add_tombstone(Tombstone::from_error(
                            ctx.item_id.clone(),
                            Some(endpoint.to_string()),
                            ProcessStep::RelationshipRequest,
                            &e,
                        ));
                    }
                }
            }
        }
        ctx
    }
}

/// Collects the allowed aspect submodels when the job asks for them.
///
/// The relationship aspect itself is never collected here.
pub struct AspectStage {
    submodels: Arc<dyn SubmodelFacade>,
}

impl AspectStage {
    pub fn new(submodels: Arc<dyn SubmodelFacade>) -> Self {
        Self { submodels }
    }
}

#[async_trait]
impl ItemStage for AspectStage {
    fn name(&self) -> &'static str {
        "aspect"
    }

    async fn process(&self, mut ctx: ItemContext) -> ItemContext {
        if !ctx.collect_aspects || ctx.aspects.is_empty() {
            return ctx;
        }
        let Some(shell) = ctx.shell.clone() else {
            return ctx;
        };
        let relationship_aspect = ctx.lifecycle.relationship_aspect();

        for descriptor in &shell.submodel_descriptors {
            let Some(aspect_type) = descriptor.aspect_type() else {
                continue;
            };
            if same_aspect(&aspect_type, relationship_aspect) || !ctx.aspects.allows(&aspect_type) {
                continue;
            }

            for endpoint in descriptor.endpoint_addresses() {
                match self.submodels.fetch(endpoint).await {
                    Ok(payload) => {
                        ctx.container.submodels.push(Submodel {
                            identification: descriptor.id.clone(),
                            aspect_type: aspect_type.clone(),
                            catena_x_id: ctx.item_id.clone(),
                            payload,
                        });
                    }
                    Err(e) => {
                        warn!(item_id = %ctx.item_id, endpoint = %endpoint, error = %e, "Aspect fetch failed");
                        ctx.add_tombstone(Tombstone::from_error(
                            ctx.item_id.clone(),
                            Some(endpoint.to_string()),
                            ProcessStep::SubmodelRequest,
                            &e,
                        ));
                    }
                }
            }
        }
        ctx
    }
}

fn failed_endpoint(error: &Error) -> Option<String> {
    match error {
        Error::Transport(e) => Some(e.endpoint.clone()),
        _ => None,
    }
}
