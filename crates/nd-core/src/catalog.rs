//! The course catalog: build from scraped data, look up by name.

use std::collections::{BTreeMap, HashMap};

use rayon::prelude::*;

use crate::course::{Course, ScrapedCourse};
use crate::types::{CourseKey, normalize_name};

/// Maximum number of autocomplete suggestions.
pub const SEARCH_LIMIT: usize = 12;

/// Read access to course data by saved-course key.
///
/// Planner operations only need to resolve the courses a user saved; the
/// full [`Catalog`] and a fetched key-to-course map both provide that.
pub trait CourseLookup {
    fn course(&self, key: &CourseKey) -> Option<&Course>;
}

impl CourseLookup for BTreeMap<CourseKey, Course> {
    fn course(&self, key: &CourseKey) -> Option<&Course> {
        self.get(key)
    }
}

/// An immutable list of courses with a case-insensitive name index.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    courses: Vec<Course>,
    by_name: HashMap<String, usize>,
}

impl Catalog {
    /// Wraps already-built courses, indexing any that arrived without types.
    pub fn from_courses(mut courses: Vec<Course>) -> Self {
        for course in &mut courses {
            course.ensure_type_index();
        }
        let by_name = courses
            .iter()
            .enumerate()
            .map(|(index, course)| (normalize_name(&course.name), index))
            .collect();
        Self { courses, by_name }
    }

    /// Merges every scraped course's rows in parallel.
    ///
    /// Courses are independent, so order is preserved and no state is shared.
    /// With `strip`, placeholder sessions are dropped after merging.
    pub fn build(scraped: Vec<ScrapedCourse>, strip: bool) -> Self {
        let courses: Vec<Course> = scraped
            .into_par_iter()
            .filter_map(|scraped| {
                let mut course = scraped.into_course();
                if course.name.is_empty() {
                    tracing::warn!("skipping scraped course without a name");
                    return None;
                }
                if strip {
                    course.strip_irrelevant();
                }
                Some(course)
            })
            .collect();
        tracing::info!(courses = courses.len(), strip, "built catalog");
        Self::from_courses(courses)
    }

    #[must_use]
    pub fn courses(&self) -> &[Course] {
        &self.courses
    }

    #[must_use]
    pub fn into_courses(self) -> Vec<Course> {
        self.courses
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.courses.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.courses.is_empty()
    }

    /// All course names in catalog order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.courses.iter().map(|course| course.name.as_str()).collect()
    }

    /// The course saved under `key`.
    #[must_use]
    pub fn get(&self, key: &CourseKey) -> Option<&Course> {
        self.by_name
            .get(key.as_str())
            .and_then(|&index| self.courses.get(index))
    }

    /// Resolves a user-typed name: exact match, then prefix, then substring.
    #[must_use]
    pub fn lookup(&self, query: &str) -> Option<&Course> {
        let query = normalize_name(query);
        if query.is_empty() {
            return None;
        }
        if let Some(&index) = self.by_name.get(&query) {
            return self.courses.get(index);
        }
        let lowered: Vec<String> = self
            .courses
            .iter()
            .map(|course| course.name.to_lowercase())
            .collect();
        lowered
            .iter()
            .position(|name| name.starts_with(&query))
            .or_else(|| lowered.iter().position(|name| name.contains(&query)))
            .and_then(|index| self.courses.get(index))
    }

    /// Autocomplete suggestions for `query`.
    #[must_use]
    pub fn search(&self, query: &str, limit: usize) -> Vec<&str> {
        suggest_names(self.names(), query, limit)
    }
}

impl CourseLookup for Catalog {
    fn course(&self, key: &CourseKey) -> Option<&Course> {
        self.get(key)
    }
}

/// Ranks `names` against `query`: prefix matches first, then other substring
/// matches, each group in input order.
pub fn suggest_names<'a>(
    names: impl IntoIterator<Item = &'a str>,
    query: &str,
    limit: usize,
) -> Vec<&'a str> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return Vec::new();
    }
    let mut prefixed = Vec::new();
    let mut containing = Vec::new();
    for name in names {
        let lowered = name.to_lowercase();
        if lowered.starts_with(&query) {
            prefixed.push(name);
        } else if lowered.contains(&query) {
            containing.push(name);
        }
    }
    prefixed.extend(containing);
    prefixed.truncate(limit);
    prefixed
}
