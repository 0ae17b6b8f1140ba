//! Category keys: bins, sexes and disciplines.

use std::fmt;

/// A half-open interval `[lower, upper)`; `upper = None` is unbounded.
///
/// Used as a lookup key, so equality compares bounds exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CategoryBin {
    lower: i32,
    upper: Option<i32>,
}

impl CategoryBin {
    /// Creates `[lower, upper)`.
    #[must_use]
    pub const fn new(lower: i32, upper: i32) -> Self {
        Self {
            lower,
            upper: Some(upper),
        }
    }

    /// Creates `[lower, ∞)`.
    #[must_use]
    pub const fn from(lower: i32) -> Self {
        Self { lower, upper: None }
    }

    /// Creates a bin from stored bounds.
    #[must_use]
    pub const fn with_bounds(lower: i32, upper: Option<i32>) -> Self {
        Self { lower, upper }
    }

    /// Inclusive lower bound.
    #[must_use]
    pub const fn lower(&self) -> i32 {
        self.lower
    }

    /// Exclusive upper bound, if any.
    #[must_use]
    pub const fn upper(&self) -> Option<i32> {
        self.upper
    }

    /// Whether `value` lies inside the bin.
    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        value >= f64::from(self.lower) && self.upper.is_none_or(|upper| value < f64::from(upper))
    }

    /// Whether the two bins share at least one value.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        let below = |lower: i32, upper: Option<i32>| upper.is_none_or(|upper| lower < upper);
        below(self.lower, other.upper) && below(other.lower, self.upper)
    }

    /// The age bin holding `age`, if the age is old enough to compete.
    #[must_use]
    pub fn for_age(age: u32) -> Option<Self> {
        let age = i32::try_from(age).ok()?;
        AGE_BINS
            .iter()
            .copied()
            .find(|bin| age >= bin.lower && bin.upper.is_none_or(|upper| age < upper))
    }
}

impl fmt::Display for CategoryBin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upper {
            Some(upper) => write!(f, "[{},{upper})", self.lower),
            None => write!(f, "[{},∞)", self.lower),
        }
    }
}

/// Age bins shared by every discipline: contiguous and non-overlapping.
pub const AGE_BINS: [CategoryBin; 5] = [
    CategoryBin::new(10, 12),
    CategoryBin::new(12, 14),
    CategoryBin::new(14, 16),
    CategoryBin::new(16, 18),
    CategoryBin::from(18),
];

/// Age from which kumite bins widen.
pub const ADULT_AGE: u32 = 18;

/// Sex of a participant or a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sex {
    /// Men and boys.
    Male,
    /// Women and girls.
    Female,
    /// Categories open to both; never a participant's own sex.
    Mixed,
}

impl Sex {
    /// Parses Latin or Cyrillic spellings, case-insensitively.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "m" | "male" | "м" | "муж" | "мужской" => Some(Self::Male),
            "f" | "female" | "ж" | "жен" | "женский" => Some(Self::Female),
            "o" | "mixed" | "о" | "общ" | "общий" => Some(Self::Mixed),
            _ => None,
        }
    }

    /// Database representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Male => "m",
            Self::Female => "f",
            Self::Mixed => "o",
        }
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Competition discipline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Discipline {
    /// Forms, judged by age and sex.
    Kata,
    /// Sparring, judged by age, sex and weight.
    Kumite,
}

impl Discipline {
    /// Parses `kata`/`kumite` or the Cyrillic abbreviations `кат`/`кум`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "kata" | "кат" | "ката" => Some(Self::Kata),
            "kumite" | "кум" | "кумитэ" | "кумите" => Some(Self::Kumite),
            _ => None,
        }
    }

    /// Database representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Kata => "kata",
            Self::Kumite => "kumite",
        }
    }
}

impl fmt::Display for Discipline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn neighbouring_ages() {
        assert_eq!(CategoryBin::for_age(12), CategoryBin::for_age(13));
        assert_eq!(CategoryBin::for_age(12), Some(CategoryBin::new(12, 14)));
        assert_eq!(CategoryBin::for_age(11), Some(CategoryBin::new(10, 12)));
        assert_ne!(CategoryBin::for_age(11), CategoryBin::for_age(12));
        assert_eq!(CategoryBin::for_age(45), Some(CategoryBin::from(18)));
        assert_eq!(CategoryBin::for_age(9), None);
    }

    #[test]
    fn contains_is_half_open() {
        let bin = CategoryBin::new(50, 61);
        assert!(bin.contains(50.0));
        assert!(bin.contains(60.9));
        assert!(!bin.contains(61.0));
        assert!(!bin.contains(49.5));
        assert!(CategoryBin::from(84).contains(130.0));
    }

    #[test]
    fn overlap() {
        let middle = CategoryBin::new(50, 61);
        assert!(middle.overlaps(&CategoryBin::new(60, 71)));
        assert!(middle.overlaps(&CategoryBin::from(55)));
        assert!(!middle.overlaps(&CategoryBin::new(61, 71)));
        assert!(!middle.overlaps(&CategoryBin::new(40, 50)));
        assert!(CategoryBin::from(84).overlaps(&CategoryBin::from(90)));
    }

    #[test]
    fn equality_is_exact() {
        assert_ne!(CategoryBin::new(12, 14), CategoryBin::new(12, 15));
        assert_ne!(CategoryBin::new(18, 19), CategoryBin::from(18));
    }

    #[test]
    fn display() {
        assert_eq!(CategoryBin::new(12, 14).to_string(), "[12,14)");
        assert_eq!(CategoryBin::from(18).to_string(), "[18,∞)");
    }

    #[test]
    fn parse_sex_and_discipline() {
        assert_eq!(Sex::parse("Ж"), Some(Sex::Female));
        assert_eq!(Sex::parse(" m "), Some(Sex::Male));
        assert_eq!(Sex::parse("о"), Some(Sex::Mixed));
        assert_eq!(Sex::parse("x"), None);
        assert_eq!(Discipline::parse("Кат"), Some(Discipline::Kata));
        assert_eq!(Discipline::parse("kumite"), Some(Discipline::Kumite));
        assert_eq!(Discipline::parse("judo"), None);
    }

    proptest! {
        #[test]
        fn every_competing_age_has_one_bin(age in 10u32..120) {
            let matching = AGE_BINS
                .iter()
                .filter(|bin| bin.contains(f64::from(age)))
                .count();
            prop_assert_eq!(matching, 1);
            prop_assert!(CategoryBin::for_age(age).is_some());
        }
    }
}
