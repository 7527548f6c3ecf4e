//! Per-item crawl pipeline.
//!
//! An item is crawled by running an ordered list of [`ItemStage`]s over an
//! [`ItemContext`]. Each stage takes the context and hands back the updated
//! one; a stage may halt the pipeline, in which case later stages are
//! skipped.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::Result;
use crate::domain::{AspectFilter, ItemContainer, ShellDescriptor, Tombstone};
use crate::job::BomLifecycle;
use crate::orchestrator::TransferRequest;

/// State threaded through the stages for one item.
#[derive(Debug, Clone)]
pub struct ItemContext {
    pub item_id: String,
    pub depth: u32,
    pub lifecycle: BomLifecycle,
    pub collect_aspects: bool,
    pub aspects: AspectFilter,
    /// Descriptor resolved for the item, once known.
    pub shell: Option<ShellDescriptor>,
    pub container: ItemContainer,
    children: Vec<String>,
    seen_children: HashSet<String>,
    halted: bool,
}

impl ItemContext {
    pub fn new(item_id: impl Into<String>, depth: u32) -> Self {
        Self {
            item_id: item_id.into(),
            depth,
            lifecycle: BomLifecycle::default(),
            collect_aspects: false,
            aspects: AspectFilter::default(),
            shell: None,
            container: ItemContainer::new(),
            children: Vec::new(),
            seen_children: HashSet::new(),
            halted: false,
        }
    }

    /// Build the context of a transfer from its request and job parameters.
    pub fn from_request(request: &TransferRequest) -> Result<Self> {
        let params = &request.parameters;
        let mut ctx = Self::new(request.item_id.clone(), request.depth);
        ctx.lifecycle = params.bom_lifecycle()?;
        ctx.collect_aspects = params.collect_aspects();
        ctx.aspects = AspectFilter::new(params.aspects());
        Ok(ctx)
    }

    /// Record a child id; repeated and self references are ignored.
    pub fn add_child(&mut self, child_id: &str) {
        if child_id != self.item_id && self.seen_children.insert(child_id.to_string()) {
            self.children.push(child_id.to_string());
        }
    }

    /// Unique child ids in discovery order.
    pub fn children(&self) -> &[String] {
        &self.children
    }

    pub fn add_tombstone(&mut self, tombstone: Tombstone) {
        self.container.tombstones.push(tombstone);
    }

    /// Skip every remaining stage.
    pub fn halt(&mut self) {
        self.halted = true;
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn into_parts(self) -> (ItemContainer, Vec<String>) {
        (self.container, self.children)
    }
}

/// One step of the item crawl.
///
/// Failures of remote calls are recorded as tombstones on the context, never
/// returned.
#[async_trait]
pub trait ItemStage: Send + Sync {
    fn name(&self) -> &'static str;

    async fn process(&self, ctx: ItemContext) -> ItemContext;
}

/// Ordered list of stages.
#[derive(Clone, Default)]
pub struct ItemPipeline {
    stages: Vec<Arc<dyn ItemStage>>,
}

impl ItemPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage; returns self for chaining.
    pub fn add_stage<S: ItemStage + 'static>(mut self, stage: S) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub async fn run(&self, mut ctx: ItemContext) -> ItemContext {
        for stage in &self.stages {
            if ctx.is_halted() {
                debug!(item_id = %ctx.item_id, stage = stage.name(), "Pipeline halted, skipping stage");
                break;
            }
            ctx = stage.process(ctx).await;
        }
        ctx
    }
}
