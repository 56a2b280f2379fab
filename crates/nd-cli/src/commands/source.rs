//! Where course data comes from: the local catalog or the course server.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use nd_client::Client;
use nd_core::catalog::{Catalog, suggest_names};
use nd_core::course::Course;
use nd_core::selection::SelectionStore;
use nd_core::types::CourseKey;

use super::catalog;
use crate::Config;

/// Course data provider chosen by configuration.
#[derive(Debug)]
pub enum CourseSource {
    Local(Catalog),
    Remote(Client),
}

impl CourseSource {
    /// Uses the server when `server_url` is set, else the local catalog.
    pub fn from_config(config: &Config) -> Result<Self> {
        match &config.server_url {
            Some(url) => {
                let client = Client::new(url.as_str()).context("failed to create server client")?;
                tracing::debug!(url = client.base_url(), "using course server");
                Ok(Self::Remote(client))
            }
            None => Ok(Self::Local(catalog::load(&config.catalog_path)?)),
        }
    }

    /// The server client, if course data is remote.
    pub const fn client(&self) -> Option<&Client> {
        match self {
            Self::Local(_) => None,
            Self::Remote(client) => Some(client),
        }
    }

    pub const fn describe(&self) -> &'static str {
        match self {
            Self::Local(_) => "local catalog",
            Self::Remote(_) => "course server",
        }
    }

    /// Autocomplete suggestions for `query`.
    pub async fn search(&self, query: &str, limit: usize) -> Vec<String> {
        match self {
            Self::Local(catalog) => catalog
                .search(query, limit)
                .into_iter()
                .map(str::to_string)
                .collect(),
            Self::Remote(client) => {
                let names = client.names().await;
                suggest_names(names.iter().map(String::as_str), query, limit)
                    .into_iter()
                    .map(str::to_string)
                    .collect()
            }
        }
    }

    /// The course a user-typed name resolves to.
    pub async fn resolve(&self, name: &str) -> Option<Course> {
        match self {
            Self::Local(catalog) => catalog.lookup(name).cloned(),
            Self::Remote(client) => client.lookup(name).await,
        }
    }

    /// Course data for every saved course that can still be resolved.
    pub async fn saved_courses(&self, store: &SelectionStore) -> BTreeMap<CourseKey, Course> {
        let mut courses = BTreeMap::new();
        for saved in store.courses() {
            let course = match self {
                Self::Local(catalog) => catalog.get(&saved.key).cloned(),
                Self::Remote(client) => client.lookup(&saved.name).await,
            };
            match course {
                Some(course) => {
                    courses.insert(saved.key.clone(), course);
                }
                None => tracing::warn!(course = %saved.key, "no course data for saved course"),
            }
        }
        courses
    }
}


#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    #[tokio::test]
    async fn local_search_ranks_prefix_first() {
        let source = fixtures::local();
        assert_eq!(source.search("calc", 12).await, vec!["MATH 161 Calculus"]);
        assert_eq!(
            source.search("c", 12).await,
            vec!["CSCI 151 Programming", "MATH 161 Calculus"]
        );
    }

    #[tokio::test]
    async fn saved_courses_skips_unknown_names() {
        let source = fixtures::local();
        let mut store = SelectionStore::default();
        let now = Utc.with_ymd_and_hms(2025, 9, 1, 9, 0, 0).unwrap();
        store.add_course("CSCI 151 Programming", now).unwrap();
        store.add_course("PHYS 999 Ghosts", now).unwrap();

        let courses = source.saved_courses(&store).await;
        assert_eq!(courses.len(), 1);
        assert!(courses.contains_key(&CourseKey::new("csci 151 programming").unwrap()));
    }
}
