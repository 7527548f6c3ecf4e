//! Typed view over the opaque job parameter map.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub const ROOT_ITEM_ID: &str = "rootItemId";
pub const DEPTH: &str = "depth";
pub const ASPECTS: &str = "aspects";
pub const COLLECT_ASPECTS: &str = "collectAspects";
pub const BOM_LIFECYCLE: &str = "bomLifecycle";

/// Depth used when the caller does not ask for one.
pub const DEFAULT_DEPTH: u32 = 1;

/// Which bill-of-material view drives the recursion.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "camelCase")]
pub enum BomLifecycle {
    #[default]
    #[strum(serialize = "asBuilt")]
    AsBuilt,
    #[strum(serialize = "asPlanned")]
    AsPlanned,
}

impl BomLifecycle {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asbuilt" | "as_built" | "as-built" => Some(Self::AsBuilt),
            "asplanned" | "as_planned" | "as-planned" => Some(Self::AsPlanned),
            _ => None,
        }
    }

    /// Aspect type of the relationship submodel that lists child items.
    pub fn relationship_aspect(&self) -> &'static str {
        match self {
            Self::AsBuilt => "SingleLevelBomAsBuilt",
            Self::AsPlanned => "SingleLevelBomAsPlanned",
        }
    }
}

/// Immutable key/value configuration captured when a job is created.
///
/// The map itself is opaque; the accessors below only interpret the keys the
/// crawler knows about and leave everything else untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobParameters(BTreeMap<String, String>);

impl JobParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parameters for crawling from one root item.
    pub fn for_root(root_item_id: impl Into<String>) -> Self {
        Self::new().with(ROOT_ITEM_ID, root_item_id)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn with_depth(self, depth: u32) -> Self {
        self.with(DEPTH, depth.to_string())
    }

    pub fn with_aspects<I, S>(self, aspects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = aspects
            .into_iter()
            .map(|a| a.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(",");
        self.with(ASPECTS, joined)
    }

    pub fn with_collect_aspects(self, collect: bool) -> Self {
        self.with(COLLECT_ASPECTS, collect.to_string())
    }

    pub fn with_lifecycle(self, lifecycle: BomLifecycle) -> Self {
        self.with(BOM_LIFECYCLE, lifecycle.to_string())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    pub fn root_item_id(&self) -> Option<&str> {
        self.get(ROOT_ITEM_ID)
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    /// Maximum tree depth; the root item sits at depth 0.
    pub fn depth(&self) -> Result<u32> {
        let Some(raw) = self.get(DEPTH) else {
            return Ok(DEFAULT_DEPTH);
        };
        match raw.trim().parse::<u32>() {
            Ok(depth) if depth >= 1 => Ok(depth),
            _ => Err(Error::parse(format!(
                "parameter '{DEPTH}' must be a positive integer, got '{raw}'"
            ))),
        }
    }

    /// Aspect allow-list, in the order the caller gave it.
    pub fn aspects(&self) -> Vec<String> {
        self.get(ASPECTS)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn collect_aspects(&self) -> bool {
        self.get(COLLECT_ASPECTS)
            .map(|raw| {
                matches!(
                    raw.trim().to_ascii_lowercase().as_str(),
                    "true" | "1" | "yes"
                )
            })
            .unwrap_or(false)
    }

    pub fn bom_lifecycle(&self) -> Result<BomLifecycle> {
        match self.get(BOM_LIFECYCLE) {
            None => Ok(BomLifecycle::default()),
            Some(raw) => BomLifecycle::parse(raw).ok_or_else(|| {
                Error::parse(format!("unknown value '{raw}' for '{BOM_LIFECYCLE}'"))
            }),
        }
    }
}

impl<K, V> FromIterator<(K, V)> for JobParameters
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
