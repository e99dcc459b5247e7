//! Cylinder sizes and per-size quantities.

use std::collections::BTreeMap;

/// Nominal cylinder size in kilograms of gas (e.g. 12 kg, 20 kg, 45 kg).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct CylinderSize(pub u16);

impl CylinderSize {
    /// Standard 20 kg household cylinder.
    pub const KG_20: Self = Self(20);
    /// Standard 45 kg commercial cylinder.
    pub const KG_45: Self = Self(45);
}

impl std::fmt::Display for CylinderSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}kg", self.0)
    }
}

/// Quantities keyed by [`CylinderSize`].
///
/// A `Load` describes both stop demand and vehicle capacity. Quantities are
/// signed so malformed order input can be represented and rejected with a
/// reason code instead of failing to parse.
///
/// # Examples
/// ```
/// use dispatch_core::{CylinderSize, Load};
///
/// let capacity = Load::single(CylinderSize::KG_20, 5);
/// let demand = Load::single(CylinderSize::KG_20, 3);
/// assert!(demand.fits_within(&capacity));
/// assert_eq!(demand.remaining(&capacity).quantity(CylinderSize::KG_20), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Load(BTreeMap<CylinderSize, i64>);

impl Load {
    /// An empty load.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// A load holding `quantity` cylinders of a single size.
    #[must_use]
    pub fn single(size: CylinderSize, quantity: i64) -> Self {
        Self::new().with(size, quantity)
    }

    /// Set the quantity for `size`, returning `self` for chaining.
    #[must_use]
    pub fn with(mut self, size: CylinderSize, quantity: i64) -> Self {
        self.0.insert(size, quantity);
        self
    }

    /// Quantity for `size`; zero when absent.
    #[must_use]
    pub fn quantity(&self, size: CylinderSize) -> i64 {
        self.0.get(&size).copied().unwrap_or(0)
    }

    /// Iterate over `(size, quantity)` pairs in size order.
    pub fn iter(&self) -> impl Iterator<Item = (CylinderSize, i64)> + '_ {
        self.0.iter().map(|(size, qty)| (*size, *qty))
    }

    /// `true` when no size carries a non-zero quantity.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.values().all(|qty| *qty == 0)
    }

    /// Sum of all quantities.
    #[must_use]
    pub fn total(&self) -> i64 {
        self.0.values().fold(0_i64, |acc, qty| acc.saturating_add(*qty))
    }

    /// `true` when any quantity is negative.
    #[must_use]
    pub fn has_negative(&self) -> bool {
        self.0.values().any(|qty| *qty < 0)
    }

    /// `true` when at least one size has a positive quantity and none is
    /// negative.
    #[must_use]
    pub fn is_positive(&self) -> bool {
        !self.has_negative() && self.0.values().any(|qty| *qty > 0)
    }

    /// Per-size sum of `self` and `other`.
    #[must_use]
    pub fn plus(&self, other: &Self) -> Self {
        let mut sum = self.clone();
        for (size, qty) in other.iter() {
            let entry = sum.0.entry(size).or_insert(0);
            *entry = entry.saturating_add(qty);
        }
        sum
    }

    /// `true` when every size in `self` is covered by `capacity`.
    ///
    /// Sizes absent from `capacity` have zero capacity.
    #[must_use]
    pub fn fits_within(&self, capacity: &Self) -> bool {
        self.iter()
            .all(|(size, qty)| qty <= capacity.quantity(size))
    }

    /// Capacity left in `capacity` after carrying `self`.
    ///
    /// Negative results are clipped at zero.
    #[must_use]
    pub fn remaining(&self, capacity: &Self) -> Self {
        Self(
            capacity
                .iter()
                .map(|(size, cap)| (size, cap.saturating_sub(self.quantity(size)).max(0)))
                .collect(),
        )
    }
}

impl FromIterator<(CylinderSize, i64)> for Load {
    fn from_iter<T: IntoIterator<Item = (CylinderSize, i64)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
