//! Request matching logic.
//!
//! # Responsibilities
//! - Evaluate a mapping's field rules against flattened attributes
//! - Scan a registry snapshot in order, first match wins
//!
//! # Design Decisions
//! - A field rule holds iff the attribute exists and some value of it
//!   satisfies every pattern listed for that field
//! - Patterns are unanchored; anchors belong in the pattern itself
//! - No match is a normal outcome, not an error

use std::sync::Arc;

use crate::mapping::compiler::{CompiledMapping, FieldRule};
use crate::routing::attributes::FlattenedAttributes;

/// Trait for matching requests against conditions.
pub trait Matcher: Send + Sync {
    /// Returns true if the request attributes satisfy this condition.
    fn matches(&self, attrs: &FlattenedAttributes) -> bool;
}

impl Matcher for FieldRule {
    fn matches(&self, attrs: &FlattenedAttributes) -> bool {
        match attrs.get(&self.field) {
            Some(value) => value
                .values()
                .any(|v| self.patterns.iter().all(|p| p.is_match(v))),
            None => false,
        }
    }
}

impl Matcher for CompiledMapping {
    fn matches(&self, attrs: &FlattenedAttributes) -> bool {
        // All field rules must pass (AND)
        self.rules().iter().all(|rule| rule.matches(attrs))
    }
}

/// First mapping of the snapshot whose rules all hold.
pub fn get_match(
    snapshot: &[Arc<CompiledMapping>],
    attrs: &FlattenedAttributes,
) -> Option<Arc<CompiledMapping>> {
    let found = snapshot.iter().find(|m| m.matches(attrs)).cloned();
    match &found {
        Some(m) => tracing::debug!(mapping = %m.id(), "Request matched mapping"),
        None => tracing::debug!(candidates = snapshot.len(), "No mapping matched"),
    }
    found
}
