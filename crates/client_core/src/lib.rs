//! Client-side plan editing core: grid indexing, drag and drop resolution,
//! optimistic mutations and the course label cache, on top of the planner
//! REST backend.

pub mod backend;
pub mod catalog;
pub mod drag;
pub mod editor;
pub mod error;
pub mod events;
pub mod grid;
pub mod mutation;
pub mod state;

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;

pub use backend::{HttpPlannerBackend, PlannerBackend, USER_ID_HEADER};
pub use catalog::{CatalogCacheEntry, CourseCatalogCache};
pub use drag::{DragDropController, DragPayload, DropDecision, IgnoreReason};
pub use editor::{DropOutcome, PlanEditor};
pub use error::{BackendError, PlanError};
pub use events::{MutationKind, MutationPhase, Notice, NoticeSeverity, PlanEvent};
pub use grid::GridIndex;
pub use mutation::{MutationOutcome, OptimisticMutation, PlanMutationEngine};
pub use state::{EditorState, EditorView, LoadTarget, SidebarState};
