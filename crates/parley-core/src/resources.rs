//! Resource amounts keyed by [`ResourceKind`].
//!
//! Amounts are always finite and non-negative; every constructor and mutator
//! clamps its input so repeated arithmetic cannot drift below zero.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{ParleyError, ResourceKind};

/// Clamps an amount into `[0, +inf)`, mapping NaN and infinities to zero.
fn sanitize(amount: f64) -> f64 {
    if amount.is_finite() && amount > 0.0 {
        amount
    } else {
        0.0
    }
}

/// Non-negative amounts per resource kind.
///
/// Backed by a `BTreeMap` so iteration order, and therefore every score
/// computed from it, is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<ResourceKind, f64>",
    into = "BTreeMap<ResourceKind, f64>"
)]
pub struct ResourceMap(BTreeMap<ResourceKind, f64>);

impl ResourceMap {
    /// Creates an empty map.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Sets the amount for a kind, clamping it to be non-negative.
    pub fn insert(&mut self, kind: ResourceKind, amount: f64) {
        self.0.insert(kind, sanitize(amount));
    }

    /// Builder-style [`insert`](Self::insert).
    #[must_use]
    pub fn with(mut self, kind: ResourceKind, amount: f64) -> Self {
        self.insert(kind, amount);
        self
    }

    /// Returns the amount for a kind, or zero if absent.
    #[must_use]
    pub fn get(&self, kind: &ResourceKind) -> f64 {
        self.0.get(kind).copied().unwrap_or(0.0)
    }

    /// Returns true if the kind has an entry (even a zero one).
    #[must_use]
    pub fn contains(&self, kind: &ResourceKind) -> bool {
        self.0.contains_key(kind)
    }

    /// Iterates over `(kind, amount)` pairs in kind order.
    pub fn iter(&self) -> impl Iterator<Item = (&ResourceKind, f64)> {
        self.0.iter().map(|(k, v)| (k, *v))
    }

    /// Iterates over the kinds present.
    pub fn kinds(&self) -> impl Iterator<Item = &ResourceKind> {
        self.0.keys()
    }

    /// Number of kinds present.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no kinds are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Sum of all amounts.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }

    /// Returns a copy with every amount multiplied by `factor`.
    #[must_use]
    pub fn scaled(&self, factor: f64) -> Self {
        self.map_amounts(|_, amount| amount * factor)
    }

    /// Returns a copy with every amount capped at `limit`'s amount for the
    /// same kind. Kinds missing from `limit` are capped at zero.
    #[must_use]
    pub fn clamped_to(&self, limit: &Self) -> Self {
        self.map_amounts(|kind, amount| amount.min(limit.get(kind)))
    }

    /// Returns a copy with `f` applied to every amount.
    #[must_use]
    pub fn map_amounts(&self, mut f: impl FnMut(&ResourceKind, f64) -> f64) -> Self {
        self.0
            .iter()
            .map(|(kind, amount)| (kind.clone(), f(kind, *amount)))
            .collect()
    }
}

impl FromIterator<(ResourceKind, f64)> for ResourceMap {
    fn from_iter<I: IntoIterator<Item = (ResourceKind, f64)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(kind, amount)| (kind, sanitize(amount)))
                .collect(),
        )
    }
}

impl TryFrom<BTreeMap<ResourceKind, f64>> for ResourceMap {
    type Error = ParleyError;

    fn try_from(value: BTreeMap<ResourceKind, f64>) -> Result<Self, Self::Error> {
        if let Some((kind, amount)) = value.iter().find(|(_, a)| !a.is_finite() || **a < 0.0) {
            return Err(ParleyError::InvalidAmount {
                kind: kind.to_string(),
                amount: *amount,
            });
        }
        Ok(Self(value))
    }
}

impl From<ResourceMap> for BTreeMap<ResourceKind, f64> {
    fn from(map: ResourceMap) -> Self {
        map.0
    }
}
