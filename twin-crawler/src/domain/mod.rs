//! Domain types of the digital twin graph.

pub mod aspect;
mod descriptor;
mod item;

pub use aspect::{AspectFilter, normalize_aspect, same_aspect};
pub use descriptor::{
    Endpoint, ProtocolInformation, Reference, ReferenceKey, ShellDescriptor, SubmodelDescriptor,
};
pub use item::{
    ItemContainer, LinkedItem, ProcessStep, ProcessingError, Relationship, Submodel, Tombstone,
};
