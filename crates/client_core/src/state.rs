//! Single source of truth for the open plan and the editor around it.

use std::collections::{BTreeSet, HashMap, HashSet};

use shared::{
    domain::{CourseId, EntryId, PlanId, UserId},
    protocol::{Course, Plan, PlanEntry, Subject},
};

use crate::{catalog::CourseCatalogCache, grid::GridIndex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorView {
    PlanList,
    Editor { plan_id: PlanId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadTarget {
    Plans,
    Entries,
    Subjects,
    Courses,
}

impl LoadTarget {
    pub fn describe(&self) -> &'static str {
        match self {
            LoadTarget::Plans => "plans",
            LoadTarget::Entries => "plan items",
            LoadTarget::Subjects => "subjects",
            LoadTarget::Courses => "courses",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SidebarState {
    pub subjects: Vec<Subject>,
    pub subjects_loaded: bool,
    pub subject_query: String,
    pub selected_subject: Option<Subject>,
    pub courses: Vec<Course>,
    pub search_query: String,
}

#[derive(Debug, Clone)]
pub struct EditorState {
    pub user: Option<UserId>,
    pub view: EditorView,
    pub plans: Vec<Plan>,
    pub open_plan: Option<PlanId>,
    pub entries: Vec<PlanEntry>,
    pub catalog: CourseCatalogCache,
    pub sidebar: SidebarState,
    pub load_errors: HashMap<LoadTarget, String>,
    pub collapsed_years: BTreeSet<i32>,
    pub(crate) pending_lookups: HashSet<CourseId>,
    pub(crate) pending_entries: HashSet<EntryId>,
}

impl EditorState {
    pub fn new(user: Option<UserId>) -> Self {
        Self {
            user,
            view: EditorView::PlanList,
            plans: Vec::new(),
            open_plan: None,
            entries: Vec::new(),
            catalog: CourseCatalogCache::new(),
            sidebar: SidebarState::default(),
            load_errors: HashMap::new(),
            collapsed_years: BTreeSet::new(),
            pending_lookups: HashSet::new(),
            pending_entries: HashSet::new(),
        }
    }

    pub fn grid(&self) -> GridIndex<'_> {
        GridIndex::build(&self.entries)
    }

    pub fn entry(&self, entry_id: EntryId) -> Option<&PlanEntry> {
        self.entries.iter().find(|entry| entry.id == entry_id)
    }

    pub fn plan(&self, plan_id: PlanId) -> Option<&Plan> {
        self.plans.iter().find(|plan| plan.id == plan_id)
    }

    pub fn open_plan_record(&self) -> Option<&Plan> {
        self.open_plan.and_then(|plan_id| self.plan(plan_id))
    }

    pub fn placed_course_ids(&self) -> HashSet<CourseId> {
        self.entries.iter().map(|entry| entry.course_id).collect()
    }

    pub fn contains_course(&self, course_id: CourseId) -> bool {
        self.entries.iter().any(|entry| entry.course_id == course_id)
    }

    /// Whether a move or delete of `entry_id` is waiting for the backend.
    pub fn is_entry_pending(&self, entry_id: EntryId) -> bool {
        self.pending_entries.contains(&entry_id)
    }

    pub fn is_year_expanded(&self, year_index: i32) -> bool {
        !self.collapsed_years.contains(&year_index)
    }

    pub fn load_error(&self, target: LoadTarget) -> Option<&str> {
        self.load_errors.get(&target).map(String::as_str)
    }

    /// Subject code used to label courses of `subject_area_id`, if loaded.
    pub fn subject_code_for(&self, course: &Course) -> Option<&str> {
        let subject_id = course.subject_area_id?;
        self.sidebar
            .subjects
            .iter()
            .find(|subject| subject.id == subject_id)
            .map(|subject| subject.code.as_str())
    }
}
