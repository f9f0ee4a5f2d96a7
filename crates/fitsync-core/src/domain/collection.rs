//! Cached collections
//!
//! The set of collections is closed and known at startup. Each variant maps
//! to one stable table/collection name shared by the local store and the
//! remote store.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// Name of the collection reserved for the mutation queue
pub const MUTATION_QUEUE_COLLECTION: &str = "mutation_queue";

/// An entity collection mirrored from the remote store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Clients,
    Schedules,
    Exercises,
    Workouts,
    ProgressEntries,
}

impl Collection {
    /// All entity collections, in schema order
    pub const ALL: [Collection; 5] = [
        Collection::Clients,
        Collection::Schedules,
        Collection::Exercises,
        Collection::Workouts,
        Collection::ProgressEntries,
    ];

    /// Stable collection (table) name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Collection::Clients => "clients",
            Collection::Schedules => "schedules",
            Collection::Exercises => "exercises",
            Collection::Workouts => "workouts",
            Collection::ProgressEntries => "progress_entries",
        }
    }
}

impl Display for Collection {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Collection::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| DomainError::UnknownCollection(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_stable() {
        let names: Vec<&str> = Collection::ALL.iter().map(|c| c.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "clients",
                "schedules",
                "exercises",
                "workouts",
                "progress_entries"
            ]
        );
    }

    #[test]
    fn test_parse_known_and_unknown() {
        assert_eq!(
            "progress_entries".parse::<Collection>().unwrap(),
            Collection::ProgressEntries
        );
        assert!("mutation_queue".parse::<Collection>().is_err());
        assert!("invoices".parse::<Collection>().is_err());
    }

    #[test]
    fn test_serde_uses_table_names() {
        let json = serde_json::to_string(&Collection::ProgressEntries).unwrap();
        assert_eq!(json, "\"progress_entries\"");
    }
}
