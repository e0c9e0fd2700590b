//! Course display cache and the sidebar's local catalog filtering.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use shared::{
    domain::CourseId,
    protocol::{Course, Subject},
};

pub const SUBJECT_RESULT_LIMIT: usize = 50;
pub const COURSE_RESULT_LIMIT: usize = 60;

/// Display-only projection of a course.
///
/// Rows may come from drag payloads before the authoritative lookup returns,
/// so they are never used to decide identity or equality of courses.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogCacheEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
}

impl CatalogCacheEntry {
    pub fn from_course(course: &Course, fallback_subject_code: Option<&str>) -> Self {
        Self {
            subject_code: course
                .subject_code
                .clone()
                .or_else(|| fallback_subject_code.map(str::to_string))
                .filter(|code| !code.trim().is_empty()),
            number: Some(course.number.clone()),
            title: Some(course.title.clone()),
            units: Some(course.units.clone()).filter(|units| !units.is_empty()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.subject_code.is_none()
            && self.number.is_none()
            && self.title.is_none()
            && self.units.is_none()
    }

    /// `"<subject code> <number>"`, or `None` when neither part is known.
    pub fn label(&self) -> Option<String> {
        let label = format!(
            "{} {}",
            self.subject_code.as_deref().unwrap_or_default(),
            self.number.as_deref().unwrap_or_default()
        );
        let label = label.trim();
        (!label.is_empty()).then(|| label.to_string())
    }
}

#[derive(Debug, Clone, Default)]
pub struct CourseCatalogCache {
    rows: HashMap<CourseId, CatalogCacheEntry>,
}

impl CourseCatalogCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, course_id: CourseId) -> Option<&CatalogCacheEntry> {
        self.rows.get(&course_id)
    }

    pub fn contains(&self, course_id: CourseId) -> bool {
        self.rows.contains_key(&course_id)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Adds or overwrites the given rows; rows for other courses are kept.
    pub fn merge_bulk(&mut self, entries: impl IntoIterator<Item = (CourseId, CatalogCacheEntry)>) {
        for (course_id, entry) in entries {
            self.rows.insert(course_id, entry);
        }
    }

    /// Speculative insert from a drag payload. Never replaces an existing row.
    pub fn seed(&mut self, course_id: CourseId, entry: CatalogCacheEntry) -> bool {
        if entry.is_empty() || self.rows.contains_key(&course_id) {
            return false;
        }
        self.rows.insert(course_id, entry);
        true
    }

    /// Distinct, sorted ids that have no cached row.
    pub fn missing_ids(&self, course_ids: impl IntoIterator<Item = CourseId>) -> Vec<CourseId> {
        course_ids
            .into_iter()
            .filter(|course_id| !self.rows.contains_key(course_id))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn label(&self, course_id: CourseId) -> String {
        self.get(course_id)
            .and_then(CatalogCacheEntry::label)
            .unwrap_or_else(|| format!("Course #{}", course_id.0))
    }

    pub fn units_label(&self, course_id: CourseId) -> String {
        self.get(course_id)
            .and_then(|entry| entry.units.as_deref())
            .map(|units| format!("{units} units"))
            .unwrap_or_default()
    }
}

pub fn course_label(course: &Course, subject_code: Option<&str>) -> String {
    let code = course.subject_code.as_deref().or(subject_code).unwrap_or_default();
    format!("{code} {}", course.number).trim().to_string()
}

fn normalized_query(query: &str) -> String {
    query.trim().to_lowercase()
}

fn contains_folded(haystack: &str, needle: &str) -> bool {
    needle.is_empty() || haystack.to_lowercase().contains(needle)
}

/// Subjects whose code or name contains `query`, first 50 in list order.
pub fn filter_subjects<'a>(subjects: &'a [Subject], query: &str) -> Vec<&'a Subject> {
    let needle = normalized_query(query);
    subjects
        .iter()
        .filter(|subject| contains_folded(&subject.code, &needle) || contains_folded(&subject.name, &needle))
        .take(SUBJECT_RESULT_LIMIT)
        .collect()
}

/// Courses not yet placed whose label, title or description contains
/// `query`, first 60 in list order.
pub fn filter_courses<'a>(
    courses: &'a [Course],
    subject_code: Option<&str>,
    query: &str,
    placed: &HashSet<CourseId>,
) -> Vec<&'a Course> {
    let needle = normalized_query(query);
    courses
        .iter()
        .filter(|course| !placed.contains(&course.id))
        .filter(|course| {
            contains_folded(&course_label(course, subject_code), &needle)
                || contains_folded(&course.title, &needle)
                || course
                    .description
                    .as_deref()
                    .is_some_and(|description| contains_folded(description, &needle))
        })
        .take(COURSE_RESULT_LIMIT)
        .collect()
}

#[cfg(test)]
#[path = "tests/catalog_tests.rs"]
mod tests;
