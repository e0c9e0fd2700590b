use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::UnknownTerm;

/// Number of academic years shown in a plan grid.
pub const YEAR_COUNT: i32 = 4;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(PlanId);
id_newtype!(CourseId);
id_newtype!(SubjectId);

/// Caller identity forwarded to the backend on every plan operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    /// Returns `None` for blank identities so callers never send an empty header.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a plan entry.
///
/// Entries confirmed by the backend carry the integer id it assigned. Entries
/// created locally and still waiting for that confirmation carry a random
/// provisional id, which serializes as a UUID string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntryId {
    Persisted(i64),
    Provisional(Uuid),
}

impl EntryId {
    pub fn provisional() -> Self {
        Self::Provisional(Uuid::new_v4())
    }

    pub fn is_provisional(&self) -> bool {
        matches!(self, Self::Provisional(_))
    }

    pub fn persisted(&self) -> Option<i64> {
        match self {
            Self::Persisted(id) => Some(*id),
            Self::Provisional(_) => None,
        }
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Persisted(id) => write!(f, "{id}"),
            Self::Provisional(uuid) => write!(f, "tmp-{uuid}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Term {
    Fall,
    Winter,
    Spring,
    SummerA,
    SummerC,
}

impl Term {
    /// Column order of the grid.
    pub const ALL: [Term; 5] = [
        Term::Fall,
        Term::Winter,
        Term::Spring,
        Term::SummerA,
        Term::SummerC,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Term::Fall => "FALL",
            Term::Winter => "WINTER",
            Term::Spring => "SPRING",
            Term::SummerA => "SUMMER_A",
            Term::SummerC => "SUMMER_C",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Term::Fall => "Fall",
            Term::Winter => "Winter",
            Term::Spring => "Spring",
            Term::SummerA => "Summer A",
            Term::SummerC => "Summer C",
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Term {
    type Err = UnknownTerm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        Term::ALL
            .into_iter()
            .find(|term| term.as_str() == normalized)
            .ok_or_else(|| UnknownTerm(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    #[default]
    Planned,
    Enrolled,
    Completed,
    Dropped,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Planned => "planned",
            EntryStatus::Enrolled => "enrolled",
            EntryStatus::Completed => "completed",
            EntryStatus::Dropped => "dropped",
        }
    }
}

/// One (year, term) cell of the plan grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BucketKey {
    pub year_index: i32,
    pub term: Term,
}

impl BucketKey {
    pub fn new(year_index: i32, term: Term) -> Self {
        Self { year_index, term }
    }

    /// Whether the key addresses a cell that the grid actually renders.
    pub fn is_canonical(&self) -> bool {
        (1..=YEAR_COUNT).contains(&self.year_index)
    }

    /// Every canonical bucket, year-major then in term order.
    pub fn all() -> impl Iterator<Item = BucketKey> {
        (1..=YEAR_COUNT)
            .flat_map(|year_index| Term::ALL.into_iter().map(move |term| Self::new(year_index, term)))
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Year {} {}", self.year_index, self.term.label())
    }
}
