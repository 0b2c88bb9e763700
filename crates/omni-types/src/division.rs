//! Division registry
//!
//! The portal runs two tenants for the same user. Each one is a closed
//! enum variant; `PerDivision<T>` is the fixed-size map keyed by it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Index, IndexMut};

/// ARGB color tag used to label lessons and counters by origin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagColor(pub u32);

impl TagColor {
    /// Raw 0xAARRGGBB value
    pub const fn argb(self) -> u32 {
        self.0
    }

    /// `#RRGGBB` form (alpha dropped)
    pub fn hex(self) -> String {
        format!("#{:06X}", self.0 & 0x00FF_FFFF)
    }

    /// (r, g, b) components
    pub const fn rgb(self) -> (u8, u8, u8) {
        (
            ((self.0 >> 16) & 0xFF) as u8,
            ((self.0 >> 8) & 0xFF) as u8,
            (self.0 & 0xFF) as u8,
        )
    }
}

/// One of the two backend identities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Division {
    Academy,
    College,
}

impl Division {
    /// Every division, in fetch order (Academy first, College second)
    pub const ALL: [Division; 2] = [Division::Academy, Division::College];

    /// Portal-side id (also the location id used by `auth/change-city`)
    pub const fn id(self) -> u32 {
        match self {
            Division::Academy => 74,
            Division::College => 458,
        }
    }

    /// Human readable label
    pub const fn label(self) -> &'static str {
        match self {
            Division::Academy => "Academy",
            Division::College => "College",
        }
    }

    /// Color tag shown next to lessons from this division
    pub const fn color(self) -> TagColor {
        match self {
            Division::Academy => TagColor(0xFFDB_173F),
            Division::College => TagColor(0xFF93_00D5),
        }
    }

    /// Highest grade the division's gradebook accepts
    pub const fn max_mark(self) -> u8 {
        match self {
            Division::Academy => 12,
            Division::College => 5,
        }
    }

    /// Lookup by portal id
    pub fn from_id(id: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.id() == id)
    }

    /// The other division
    pub const fn other(self) -> Self {
        match self {
            Division::Academy => Division::College,
            Division::College => Division::Academy,
        }
    }
}

impl fmt::Display for Division {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Fixed-size map from `Division` to `T`
///
/// Always holds exactly one value per division, so lookups never fail.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PerDivision<T> {
    pub academy: T,
    pub college: T,
}

impl<T> PerDivision<T> {
    pub const fn new(academy: T, college: T) -> Self {
        Self { academy, college }
    }

    /// Build by calling `f` once per division (Academy first)
    pub fn from_fn(mut f: impl FnMut(Division) -> T) -> Self {
        let academy = f(Division::Academy);
        let college = f(Division::College);
        Self { academy, college }
    }

    pub fn get(&self, division: Division) -> &T {
        match division {
            Division::Academy => &self.academy,
            Division::College => &self.college,
        }
    }

    pub fn get_mut(&mut self, division: Division) -> &mut T {
        match division {
            Division::Academy => &mut self.academy,
            Division::College => &mut self.college,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Division, &T)> {
        [
            (Division::Academy, &self.academy),
            (Division::College, &self.college),
        ]
        .into_iter()
    }

    pub fn map<U>(self, mut f: impl FnMut(Division, T) -> U) -> PerDivision<U> {
        PerDivision {
            academy: f(Division::Academy, self.academy),
            college: f(Division::College, self.college),
        }
    }

    pub fn as_ref(&self) -> PerDivision<&T> {
        PerDivision {
            academy: &self.academy,
            college: &self.college,
        }
    }
}

impl<T> Index<Division> for PerDivision<T> {
    type Output = T;

    fn index(&self, division: Division) -> &T {
        self.get(division)
    }
}

impl<T> IndexMut<Division> for PerDivision<T> {
    fn index_mut(&mut self, division: Division) -> &mut T {
        self.get_mut(division)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_division_ids_round_trip() {
        for division in Division::ALL {
            assert_eq!(Division::from_id(division.id()), Some(division));
        }
        assert_eq!(Division::from_id(0), None);
        assert_eq!(Division::from_id(75), None);
    }

    #[test]
    fn test_division_registry_values() {
        assert_eq!(Division::Academy.id(), 74);
        assert_eq!(Division::College.id(), 458);
        assert_eq!(Division::Academy.color().hex(), "#DB173F");
        assert_eq!(Division::College.color().rgb(), (0x93, 0x00, 0xD5));
        assert_eq!(Division::Academy.other(), Division::College);
    }

    #[test]
    fn test_per_division_index_and_map() {
        let mut counts = PerDivision::new(1usize, 2usize);
        counts[Division::College] += 3;
        assert_eq!(counts[Division::Academy], 1);
        assert_eq!(counts[Division::College], 5);

        let labels = counts.map(|d, n| format!("{}={}", d.id(), n));
        assert_eq!(labels.academy, "74=1");
        assert_eq!(labels.college, "458=5");
    }

    #[test]
    fn test_per_division_from_fn_order() {
        let mut seen = Vec::new();
        let ids = PerDivision::from_fn(|d| {
            seen.push(d);
            d.id()
        });
        assert_eq!(seen, vec![Division::Academy, Division::College]);
        assert_eq!(ids.iter().map(|(_, id)| *id).sum::<u32>(), 532);
    }
}
