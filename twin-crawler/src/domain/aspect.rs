//! Aspect type names and the caller-supplied aspect allow-list.

use std::collections::HashSet;

/// Canonical form of an aspect type name.
///
/// Semantic ids carry the aspect name after the last `#`
/// (`urn:samm:io.catenax.serial_part:3.0.0#SerialPart`); callers use
/// `SerialPart`, `serial_part` or `serial-part` interchangeably. All of them
/// normalize to `serialpart`.
pub fn normalize_aspect(name: &str) -> String {
    let local = name.rsplit('#').next().unwrap_or(name);
    local
        .chars()
        .filter(|c| !matches!(c, '_' | '-' | ' ' | '.'))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Check whether two aspect names refer to the same aspect type.
pub fn same_aspect(a: &str, b: &str) -> bool {
    normalize_aspect(a) == normalize_aspect(b)
}

/// Allow-list of aspect types to collect.
#[derive(Debug, Clone, Default)]
pub struct AspectFilter {
    allowed: HashSet<String>,
}

impl AspectFilter {
    pub fn new<I, S>(aspects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed: aspects
                .into_iter()
                .map(|a| normalize_aspect(a.as_ref()))
                .filter(|a| !a.is_empty())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }

    pub fn allows(&self, aspect: &str) -> bool {
        self.allowed.contains(&normalize_aspect(aspect))
    }
}
