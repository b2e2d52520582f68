//! Read-only curriculum reference data
//!
//! The engine only needs to know which topic a problem belongs to, for the
//! topic mastery projection. The catalogue itself is curated elsewhere and
//! loaded as JSON:
//!
//! ```json
//! { "topics": { "two-pointers": ["two-sum", "3sum"], "graphs": ["clone-graph"] } }
//! ```

use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::error::{ProgressError, Result};

/// Problem → topic lookup
pub trait Catalog: Send + Sync {
    fn topic_of(&self, problem_id: &str) -> Option<&str>;
}

/// In-memory catalogue
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    problem_topics: HashMap<String, String>,
}

#[derive(Deserialize)]
struct CatalogFile {
    topics: BTreeMap<String, Vec<String>>,
}

impl StaticCatalog {
    /// Build from `(topic, problems)` pairs
    pub fn from_topics<T, P, I>(topics: I) -> Self
    where
        I: IntoIterator<Item = (T, P)>,
        T: Into<String>,
        P: IntoIterator,
        P::Item: Into<String>,
    {
        let mut problem_topics = HashMap::new();
        for (topic, problems) in topics {
            let topic = topic.into();
            for problem in problems {
                problem_topics.insert(problem.into(), topic.clone());
            }
        }
        Self { problem_topics }
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let file: CatalogFile = serde_json::from_str(raw)?;
        Ok(Self::from_topics(file.topics))
    }

    /// Load a catalogue file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ProgressError::Config(format!(
                "reading catalog {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_json(&raw)
    }

    pub fn len(&self) -> usize {
        self.problem_topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.problem_topics.is_empty()
    }
}

impl Catalog for StaticCatalog {
    fn topic_of(&self, problem_id: &str) -> Option<&str> {
        self.problem_topics.get(problem_id).map(String::as_str)
    }
}
