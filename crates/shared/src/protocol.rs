use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::{BucketKey, CourseId, EntryId, EntryStatus, PlanId, SubjectId, Term, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub name: String,
    #[serde(default)]
    pub start_year: Option<i32>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(rename = "user_id")]
    pub owner_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanEntry {
    pub id: EntryId,
    #[serde(alias = "plan")]
    pub plan_id: PlanId,
    pub year_index: i32,
    pub term: Term,
    pub course_id: CourseId,
    #[serde(default)]
    pub status: EntryStatus,
    #[serde(default)]
    pub position: u32,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl PlanEntry {
    pub fn bucket(&self) -> BucketKey {
        BucketKey::new(self.year_index, self.term)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub id: SubjectId,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: CourseId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_area_id: Option<SubjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_code: Option<String>,
    pub number: String,
    pub title: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub units: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Units are stored as text by the catalog but some deployments emit numbers.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Integer(i64),
        Float(f64),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Text(text)) => text.trim().to_string(),
        Some(Raw::Integer(value)) => value.to_string(),
        Some(Raw::Float(value)) => value.to_string(),
        None => String::new(),
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlansEnvelope {
    #[serde(default)]
    pub plans: Vec<Plan>,
}

/// Entries are kept as raw JSON so one malformed row does not hide the rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemsEnvelope {
    #[serde(default)]
    pub items: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectsEnvelope {
    #[serde(default)]
    pub subjects: Vec<Subject>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoursesEnvelope {
    #[serde(default)]
    pub courses: Vec<Course>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlanReply {
    Wrapped { plan: Plan },
    Bare(Plan),
}

impl PlanReply {
    pub fn into_plan(self) -> Plan {
        match self {
            PlanReply::Wrapped { plan } | PlanReply::Bare(plan) => plan,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntryReply {
    Wrapped { item: PlanEntry },
    Bare(PlanEntry),
}

impl EntryReply {
    pub fn into_entry(self) -> PlanEntry {
        match self {
            EntryReply::Wrapped { item } | EntryReply::Bare(item) => item,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePlanRequest {
    pub name: String,
    pub start_year: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenamePlanRequest {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateEntryRequest {
    pub year_index: i32,
    pub term: Term,
    pub course_id: CourseId,
    pub status: EntryStatus,
    pub position: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveEntryRequest {
    pub year_index: i32,
    pub term: Term,
    pub position: u32,
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
