//! # Atomic Data
//!
//! Elements from hydrogen to zinc and their relative abundances.
//!
//! An [`Element`] is identified by its atomic number. It serializes as its
//! chemical symbol so run files and JSON stay readable.

use crate::NeiError;
use crate::primitives::MAX_ATOMIC_NUMBER;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// (symbol, name) indexed by atomic number - 1.
const ELEMENTS: [(&str, &str); MAX_ATOMIC_NUMBER as usize] = [
    ("H", "hydrogen"),
    ("He", "helium"),
    ("Li", "lithium"),
    ("Be", "beryllium"),
    ("B", "boron"),
    ("C", "carbon"),
    ("N", "nitrogen"),
    ("O", "oxygen"),
    ("F", "fluorine"),
    ("Ne", "neon"),
    ("Na", "sodium"),
    ("Mg", "magnesium"),
    ("Al", "aluminium"),
    ("Si", "silicon"),
    ("P", "phosphorus"),
    ("S", "sulfur"),
    ("Cl", "chlorine"),
    ("Ar", "argon"),
    ("K", "potassium"),
    ("Ca", "calcium"),
    ("Sc", "scandium"),
    ("Ti", "titanium"),
    ("V", "vanadium"),
    ("Cr", "chromium"),
    ("Mn", "manganese"),
    ("Fe", "iron"),
    ("Co", "cobalt"),
    ("Ni", "nickel"),
    ("Cu", "copper"),
    ("Zn", "zinc"),
];

/// Solar photospheric abundances, log10(N_X / N_H) + 12 (Asplund et al. 2009).
const SOLAR_LOG_ABUNDANCES: [(u8, f64); 18] = [
    (1, 12.00),
    (2, 10.93),
    (6, 8.43),
    (7, 7.83),
    (8, 8.69),
    (10, 7.93),
    (11, 6.24),
    (12, 7.60),
    (13, 6.45),
    (14, 7.51),
    (15, 5.41),
    (16, 7.12),
    (17, 5.50),
    (18, 6.40),
    (19, 5.03),
    (20, 6.34),
    (26, 7.50),
    (28, 6.22),
];

// =============================================================================
// ELEMENT
// =============================================================================

/// A chemical element, ordered by atomic number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Element(u8);

impl Element {
    /// Hydrogen, which every simulation must contain.
    pub const HYDROGEN: Self = Self(1);

    /// Look up an element by atomic number (1..=30).
    pub fn from_atomic_number(z: u8) -> Result<Self, NeiError> {
        if (1..=MAX_ATOMIC_NUMBER).contains(&z) {
            Ok(Self(z))
        } else {
            Err(NeiError::UnknownElement(format!("atomic number {}", z)))
        }
    }

    /// Look up an element by symbol ("He"), name ("helium") or atomic number ("2").
    ///
    /// Matching is case-insensitive.
    pub fn from_symbol(input: &str) -> Result<Self, NeiError> {
        let trimmed = input.trim();
        if let Ok(z) = trimmed.parse::<u8>() {
            return Self::from_atomic_number(z);
        }
        ELEMENTS
            .iter()
            .position(|(symbol, name)| {
                symbol.eq_ignore_ascii_case(trimmed) || name.eq_ignore_ascii_case(trimmed)
            })
            .map(|index| Self(index as u8 + 1))
            .ok_or_else(|| NeiError::UnknownElement(trimmed.to_string()))
    }

    /// All supported elements in order of atomic number.
    pub fn all() -> impl Iterator<Item = Self> {
        (1..=MAX_ATOMIC_NUMBER).map(Self)
    }

    #[must_use]
    pub const fn atomic_number(self) -> u8 {
        self.0
    }

    /// Number of charge states, neutral through fully stripped.
    #[must_use]
    pub const fn nstates(self) -> usize {
        self.0 as usize + 1
    }

    #[must_use]
    pub fn symbol(self) -> &'static str {
        ELEMENTS[self.0 as usize - 1].0
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        ELEMENTS[self.0 as usize - 1].1
    }
}

impl std::fmt::Display for Element {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

impl std::str::FromStr for Element {
    type Err = NeiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_symbol(s)
    }
}

impl TryFrom<String> for Element {
    type Error = NeiError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_symbol(&value)
    }
}

impl From<Element> for String {
    fn from(element: Element) -> Self {
        element.symbol().to_string()
    }
}

// =============================================================================
// ABUNDANCES
// =============================================================================

/// Elemental abundances relative to hydrogen (linear, H = 1).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Abundances(BTreeMap<Element, f64>);

impl Abundances {
    /// Solar photospheric abundances.
    #[must_use]
    pub fn solar() -> Self {
        Self(
            SOLAR_LOG_ABUNDANCES
                .iter()
                .map(|&(z, log)| (Element(z), 10f64.powf(log - 12.0)))
                .collect(),
        )
    }

    /// Look up a named abundance set. Only "solar" is built in.
    pub fn named(name: &str) -> Result<Self, NeiError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "solar" | "asplund" | "asplund2009" => Ok(Self::solar()),
            other => Err(NeiError::InvalidAbundance(format!(
                "unknown abundance set '{}'",
                other
            ))),
        }
    }

    /// Build from linear abundances relative to hydrogen.
    pub fn from_linear(values: BTreeMap<Element, f64>) -> Result<Self, NeiError> {
        for (element, value) in &values {
            if !value.is_finite() || *value < 0.0 {
                return Err(NeiError::InvalidAbundance(format!(
                    "{} has abundance {}",
                    element, value
                )));
            }
        }
        Ok(Self(values))
    }

    /// Build from log abundances on the astronomical scale (H = 12).
    pub fn from_log(values: BTreeMap<Element, f64>) -> Result<Self, NeiError> {
        Self::from_linear(
            values
                .into_iter()
                .map(|(element, log)| (element, 10f64.powf(log - 12.0)))
                .collect(),
        )
    }

    /// Abundance of an element, if known.
    #[must_use]
    pub fn get(&self, element: Element) -> Option<f64> {
        self.0.get(&element).copied()
    }

    /// Keep only the given elements. Every element must have an abundance.
    pub fn restricted_to(&self, elements: &[Element]) -> Result<Self, NeiError> {
        elements
            .iter()
            .map(|&element| {
                self.get(element)
                    .map(|value| (element, value))
                    .ok_or_else(|| {
                        NeiError::InvalidAbundance(format!("no abundance given for {}", element))
                    })
            })
            .collect::<Result<BTreeMap<_, _>, _>>()
            .map(Self)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Element, f64)> + '_ {
        self.0.iter().map(|(&element, &value)| (element, value))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_symbol_name_and_number() {
        let oxygen = Element::from_symbol("O").expect("symbol");
        assert_eq!(oxygen.atomic_number(), 8);
        assert_eq!(Element::from_symbol("oxygen").expect("name"), oxygen);
        assert_eq!(Element::from_symbol("8").expect("number"), oxygen);
        assert_eq!(Element::from_symbol("he").expect("lowercase").symbol(), "He");
    }

    #[test]
    fn unknown_elements_rejected() {
        assert!(matches!(
            Element::from_symbol("Xx"),
            Err(NeiError::UnknownElement(_))
        ));
        assert!(Element::from_atomic_number(0).is_err());
        assert!(Element::from_atomic_number(31).is_err());
    }

    #[test]
    fn nstates_is_atomic_number_plus_one() {
        assert_eq!(Element::HYDROGEN.nstates(), 2);
        assert_eq!(Element::from_symbol("Fe").expect("iron").nstates(), 27);
    }

    #[test]
    fn all_elements_in_order() {
        let symbols: Vec<_> = Element::all().take(3).map(Element::symbol).collect();
        assert_eq!(symbols, vec!["H", "He", "Li"]);
        assert_eq!(Element::all().count(), 30);
    }

    #[test]
    fn element_serializes_as_symbol() {
        let json = serde_json::to_string(&Element::from_symbol("Ne").expect("neon")).expect("json");
        assert_eq!(json, "\"Ne\"");
        let back: Element = serde_json::from_str("\"neon\"").expect("parse");
        assert_eq!(back.atomic_number(), 10);
    }

    #[test]
    fn solar_hydrogen_is_unity() {
        let solar = Abundances::solar();
        assert_eq!(solar.get(Element::HYDROGEN), Some(1.0));
        let helium = solar.get(Element::from_symbol("He").expect("He")).expect("He abundance");
        assert!((helium - 0.0851).abs() < 1e-3);
    }

    #[test]
    fn restricted_requires_every_element() {
        let solar = Abundances::solar();
        let li = Element::from_symbol("Li").expect("Li");
        assert!(solar.restricted_to(&[Element::HYDROGEN, li]).is_err());
        let only_h = solar.restricted_to(&[Element::HYDROGEN]).expect("restrict");
        assert_eq!(only_h.len(), 1);
    }

    #[test]
    fn negative_abundance_rejected() {
        let mut values = BTreeMap::new();
        values.insert(Element::HYDROGEN, -1.0);
        assert!(matches!(
            Abundances::from_linear(values),
            Err(NeiError::InvalidAbundance(_))
        ));
    }

    #[test]
    fn log_abundances_relative_to_hydrogen() {
        let helium = Element::from_symbol("He").expect("He");
        let mut values = BTreeMap::new();
        values.insert(Element::HYDROGEN, 12.0);
        values.insert(helium, 10.93);
        let abundances = Abundances::from_log(values).expect("log");
        assert_eq!(abundances.get(Element::HYDROGEN), Some(1.0));
        let he = abundances.get(helium).expect("He abundance");
        assert!((he - 0.085_113_8).abs() < 1e-6, "He = {}", he);

        for bad in [f64::NAN, f64::INFINITY] {
            let mut values = BTreeMap::new();
            values.insert(Element::HYDROGEN, bad);
            assert!(matches!(
                Abundances::from_log(values),
                Err(NeiError::InvalidAbundance(_))
            ));
        }
    }

    #[test]
    fn named_sets() {
        assert!(Abundances::named("Solar").is_ok());
        assert!(Abundances::named("lunar").is_err());
    }
}
