//! Toolkit-neutral drag and drop gesture contract for the plan grid.
//!
//! A front end translates its native pointer events into three calls:
//! [`DragDropController::begin`] when a card is picked up,
//! [`DragDropController::drag_over`] while it hovers a bucket and
//! [`DragDropController::drop_into`] on release. The controller only decides
//! what the drop means; the editor executes the resulting [`DropDecision`].

use serde::{Deserialize, Serialize};
use shared::{
    domain::{BucketKey, CourseId, EntryId, Term},
    protocol::{Course, PlanEntry},
};
use tracing::debug;

use crate::catalog::{CatalogCacheEntry, CourseCatalogCache};

#[derive(Debug, Clone, PartialEq)]
pub enum DragPayload {
    /// A catalog course picked up from the sidebar.
    NewCourse {
        course: Course,
        subject_code: Option<String>,
    },
    /// An entry picked up from the grid.
    MoveEntry {
        entry_id: EntryId,
        course_id: CourseId,
        from: BucketKey,
        display: CatalogCacheEntry,
    },
}

impl DragPayload {
    pub fn from_course(course: &Course, subject_code: Option<&str>) -> Self {
        DragPayload::NewCourse {
            course: course.clone(),
            subject_code: subject_code
                .filter(|code| !code.trim().is_empty())
                .map(str::to_string),
        }
    }

    pub fn from_entry(entry: &PlanEntry, cache: &CourseCatalogCache) -> Self {
        DragPayload::MoveEntry {
            entry_id: entry.id,
            course_id: entry.course_id,
            from: entry.bucket(),
            display: cache.get(entry.course_id).cloned().unwrap_or_default(),
        }
    }

    pub fn course_id(&self) -> CourseId {
        match self {
            DragPayload::NewCourse { course, .. } => course.id,
            DragPayload::MoveEntry { course_id, .. } => *course_id,
        }
    }

    /// Display fields carried by the gesture, used to seed the catalog cache.
    pub fn display(&self) -> CatalogCacheEntry {
        match self {
            DragPayload::NewCourse {
                course,
                subject_code,
            } => CatalogCacheEntry::from_course(course, subject_code.as_deref()),
            DragPayload::MoveEntry { display, .. } => display.clone(),
        }
    }

    /// JSON form placed into a toolkit's drag data.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        let wire = match self {
            DragPayload::NewCourse {
                course,
                subject_code,
            } => WirePayload::NewCourse(NewCourseRecord {
                course: course.clone(),
                subject_code: subject_code.clone(),
            }),
            DragPayload::MoveEntry {
                entry_id,
                course_id,
                from,
                display,
            } => WirePayload::MoveEntry(MoveRecord {
                entry_id: *entry_id,
                course_id: *course_id,
                year_index: from.year_index,
                term: from.term,
                display: display.clone(),
            }),
        };
        serde_json::to_string(&wire)
    }

    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        Ok(match serde_json::from_str::<WirePayload>(raw)? {
            WirePayload::MoveEntry(record) => DragPayload::MoveEntry {
                entry_id: record.entry_id,
                course_id: record.course_id,
                from: BucketKey::new(record.year_index, record.term),
                display: record.display,
            },
            WirePayload::NewCourse(record) => DragPayload::NewCourse {
                course: record.course,
                subject_code: record.subject_code,
            },
        })
    }
}

// Move records are tried first: only they carry `_entryId`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum WirePayload {
    MoveEntry(MoveRecord),
    NewCourse(NewCourseRecord),
}

#[derive(Debug, Serialize, Deserialize)]
struct MoveRecord {
    #[serde(rename = "_entryId", alias = "_planItemId")]
    entry_id: EntryId,
    #[serde(alias = "id")]
    course_id: CourseId,
    year_index: i32,
    term: Term,
    #[serde(flatten)]
    display: CatalogCacheEntry,
}

#[derive(Debug, Serialize, Deserialize)]
struct NewCourseRecord {
    #[serde(flatten)]
    course: Course,
    #[serde(rename = "subjectCode", default, skip_serializing_if = "Option::is_none")]
    subject_code: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    NoActiveGesture,
    OutsideGrid,
    SameBucket,
    AlreadyPlanned,
    EntryGone,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DropDecision {
    Ignore(IgnoreReason),
    Add {
        course_id: CourseId,
        display: CatalogCacheEntry,
        target: BucketKey,
    },
    Move {
        entry_id: EntryId,
        target: BucketKey,
    },
}

#[derive(Debug, Default)]
pub struct DragDropController {
    active: Option<DragPayload>,
    highlight: Option<BucketKey>,
}

impl DragDropController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, payload: DragPayload) {
        debug!(course_id = payload.course_id().0, "drag: gesture started");
        self.active = Some(payload);
        self.highlight = None;
    }

    pub fn begin_serialized(&mut self, raw: &str) -> Result<(), serde_json::Error> {
        let payload = DragPayload::decode(raw)?;
        self.begin(payload);
        Ok(())
    }

    pub fn active(&self) -> Option<&DragPayload> {
        self.active.as_ref()
    }

    pub fn highlight(&self) -> Option<BucketKey> {
        self.highlight
    }

    /// Marks `key` as the single highlighted target. Returns whether the
    /// highlight moved.
    pub fn drag_over(&mut self, key: BucketKey) -> bool {
        if self.highlight == Some(key) {
            return false;
        }
        self.highlight = Some(key);
        true
    }

    pub fn drag_leave(&mut self) {
        self.highlight = None;
    }

    /// Released outside every bucket.
    pub fn cancel(&mut self) {
        self.active = None;
        self.highlight = None;
    }

    /// Ends the gesture on `target` and resolves what it means against the
    /// current entries of the open plan.
    pub fn drop_into(&mut self, target: BucketKey, entries: &[PlanEntry]) -> DropDecision {
        self.highlight = None;
        let Some(payload) = self.active.take() else {
            return DropDecision::Ignore(IgnoreReason::NoActiveGesture);
        };
        let decision = resolve_drop(payload, target, entries);
        debug!(bucket = %target, ?decision, "drag: drop resolved");
        decision
    }
}

fn resolve_drop(payload: DragPayload, target: BucketKey, entries: &[PlanEntry]) -> DropDecision {
    if !target.is_canonical() {
        return DropDecision::Ignore(IgnoreReason::OutsideGrid);
    }

    match payload {
        DragPayload::MoveEntry { entry_id, .. } => {
            let Some(current) = entries.iter().find(|entry| entry.id == entry_id) else {
                return DropDecision::Ignore(IgnoreReason::EntryGone);
            };
            if current.bucket() == target {
                DropDecision::Ignore(IgnoreReason::SameBucket)
            } else {
                DropDecision::Move { entry_id, target }
            }
        }
        payload @ DragPayload::NewCourse { .. } => {
            let course_id = payload.course_id();
            if entries.iter().any(|entry| entry.course_id == course_id) {
                return DropDecision::Ignore(IgnoreReason::AlreadyPlanned);
            }
            DropDecision::Add {
                course_id,
                display: payload.display(),
                target,
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/drag_tests.rs"]
mod tests;
