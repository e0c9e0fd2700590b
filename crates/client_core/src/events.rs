//! Observer notifications emitted by the plan editor.

use shared::domain::{CourseId, PlanId};

use crate::state::{EditorView, LoadTarget};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    AddEntry,
    MoveEntry,
    DeleteEntry,
    RenamePlan,
}

impl MutationKind {
    pub fn action(&self) -> &'static str {
        match self {
            MutationKind::AddEntry => "add course",
            MutationKind::MoveEntry => "move course",
            MutationKind::DeleteEntry => "remove course",
            MutationKind::RenamePlan => "rename plan",
        }
    }
}

/// Lifecycle of one optimistic mutation:
/// `Idle -> Applying -> (Confirmed | RolledBack) -> Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationPhase {
    Idle,
    Applying,
    Confirmed,
    RolledBack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeSeverity {
    /// Mutation failures; shown briefly, the change was already reverted.
    Transient,
    /// Load failures; stays visible until the same list loads again.
    Persistent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub severity: NoticeSeverity,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlanEvent {
    PlansChanged,
    EntriesChanged {
        plan_id: PlanId,
    },
    CatalogUpdated {
        course_ids: Vec<CourseId>,
    },
    SidebarChanged,
    ViewChanged(EditorView),
    YearToggled {
        year_index: i32,
        expanded: bool,
    },
    LoadFailed {
        target: LoadTarget,
        message: String,
    },
    MutationPhase {
        mutation_id: u64,
        kind: MutationKind,
        phase: MutationPhase,
    },
    Notice(Notice),
}
