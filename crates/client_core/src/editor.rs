//! The plan editor: owns the editor state, loads lists from the backend and
//! routes gestures into the mutation engine.

use std::sync::Arc;

use shared::{
    domain::{BucketKey, CourseId, EntryId, PlanId, UserId},
    protocol::{Course, CreatePlanRequest, Plan, Subject},
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::{
    backend::PlannerBackend,
    catalog::{filter_courses, filter_subjects, CatalogCacheEntry},
    drag::{DragDropController, DragPayload, DropDecision, IgnoreReason},
    error::{BackendError, PlanError},
    events::{Notice, NoticeSeverity, PlanEvent},
    mutation::{MutationOutcome, PlanMutationEngine},
    state::{EditorState, EditorView, LoadTarget},
};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropOutcome {
    Ignored(IgnoreReason),
    Applied(MutationOutcome),
}

pub struct PlanEditor {
    backend: Arc<dyn PlannerBackend>,
    state: Arc<Mutex<EditorState>>,
    drag: Mutex<DragDropController>,
    engine: PlanMutationEngine,
    events: broadcast::Sender<PlanEvent>,
}

impl PlanEditor {
    pub fn new(backend: Arc<dyn PlannerBackend>, user: Option<UserId>) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let state = Arc::new(Mutex::new(EditorState::new(user)));
        let engine = PlanMutationEngine::new(
            Arc::clone(&backend),
            Arc::clone(&state),
            events.clone(),
        );
        Arc::new(Self {
            backend,
            state,
            drag: Mutex::new(DragDropController::new()),
            engine,
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<PlanEvent> {
        self.events.subscribe()
    }

    /// Runs `read` against the current state.
    pub async fn with_state<R>(&self, read: impl FnOnce(&EditorState) -> R) -> R {
        let guard = self.state.lock().await;
        read(&guard)
    }

    pub async fn snapshot(&self) -> EditorState {
        self.state.lock().await.clone()
    }

    async fn current_user(&self) -> Result<UserId, PlanError> {
        self.state
            .lock()
            .await
            .user
            .clone()
            .ok_or(PlanError::NotAuthenticated)
    }

    fn emit(&self, event: PlanEvent) {
        let _ = self.events.send(event);
    }

    /// Records a failed list load; the message stays until that list loads.
    async fn record_load_failure(
        &self,
        target: LoadTarget,
        action: &'static str,
        source: BackendError,
    ) -> PlanError {
        let message = format!("Could not load {}: {source}", target.describe());
        warn!(list = target.describe(), "editor: {message}");
        self.state
            .lock()
            .await
            .load_errors
            .insert(target, message.clone());
        self.emit(PlanEvent::LoadFailed {
            target,
            message: message.clone(),
        });
        self.emit(PlanEvent::Notice(Notice {
            severity: NoticeSeverity::Persistent,
            message,
        }));
        PlanError::backend(action, source)
    }

    pub async fn load_plans(&self) -> Result<(), PlanError> {
        let user = self.current_user().await?;
        match self.backend.list_plans(&user).await {
            Ok(plans) => {
                info!(count = plans.len(), "editor: plans loaded");
                let mut state = self.state.lock().await;
                state.plans = plans;
                state.load_errors.remove(&LoadTarget::Plans);
                drop(state);
                self.emit(PlanEvent::PlansChanged);
                Ok(())
            }
            Err(err) => Err(self
                .record_load_failure(LoadTarget::Plans, "load plans", err)
                .await),
        }
    }

    pub async fn create_plan(
        &self,
        name: &str,
        start_year: Option<i32>,
    ) -> Result<Plan, PlanError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PlanError::EmptyPlanName);
        }
        let user = self.current_user().await?;
        let request = CreatePlanRequest {
            name: name.to_string(),
            start_year,
        };

        match self.backend.create_plan(&user, &request).await {
            Ok(plan) => {
                info!(plan_id = plan.id.0, "editor: plan created");
                let mut state = self.state.lock().await;
                state.plans.retain(|existing| existing.id != plan.id);
                state.plans.insert(0, plan.clone());
                drop(state);
                self.emit(PlanEvent::PlansChanged);
                Ok(plan)
            }
            Err(err) => {
                warn!("editor: create plan failed: {err}");
                self.emit(PlanEvent::Notice(Notice {
                    severity: NoticeSeverity::Transient,
                    message: format!("Could not create plan: {err}"),
                }));
                Err(PlanError::backend("create plan", err))
            }
        }
    }

    /// Switches to the editor view for `plan_id`, loads its entries and then
    /// the labels of any uncached courses.
    pub async fn open_plan(&self, plan_id: PlanId) -> Result<(), PlanError> {
        {
            let mut state = self.state.lock().await;
            if state.user.is_none() {
                return Err(PlanError::NotAuthenticated);
            }
            if state.plan(plan_id).is_none() {
                return Err(PlanError::UnknownPlan(plan_id));
            }
            if state.open_plan != Some(plan_id) {
                state.entries.clear();
            }
            state.open_plan = Some(plan_id);
            state.view = EditorView::Editor { plan_id };
        }
        self.drag.lock().await.cancel();
        self.emit(PlanEvent::ViewChanged(EditorView::Editor { plan_id }));

        self.reload_entries().await
    }

    pub async fn close_plan(&self) {
        {
            let mut state = self.state.lock().await;
            state.open_plan = None;
            state.entries.clear();
            state.load_errors.remove(&LoadTarget::Entries);
            state.view = EditorView::PlanList;
        }
        self.drag.lock().await.cancel();
        self.emit(PlanEvent::ViewChanged(EditorView::PlanList));
    }

    /// Replaces the open plan's entries with the backend's list, then looks up
    /// labels for courses not cached yet.
    pub async fn reload_entries(&self) -> Result<(), PlanError> {
        let (user, plan_id) = {
            let state = self.state.lock().await;
            let user = state.user.clone().ok_or(PlanError::NotAuthenticated)?;
            let plan_id = state.open_plan.ok_or(PlanError::NoPlanOpen)?;
            (user, plan_id)
        };

        let result = self.backend.list_entries(&user, plan_id).await;
        let mut state = self.state.lock().await;
        if state.open_plan != Some(plan_id) {
            debug!(plan_id = plan_id.0, "editor: discarding entries of a closed plan");
            return Ok(());
        }

        match result {
            Ok(entries) => {
                info!(plan_id = plan_id.0, count = entries.len(), "editor: entries loaded");
                state.entries = entries;
                state.load_errors.remove(&LoadTarget::Entries);
                drop(state);
                self.emit(PlanEvent::EntriesChanged { plan_id });
                self.ensure_labels().await;
                Ok(())
            }
            Err(err) => {
                drop(state);
                Err(self
                    .record_load_failure(LoadTarget::Entries, "load plan items", err)
                    .await)
            }
        }
    }

    /// Fetches display rows for placed courses that are not cached yet, in a
    /// single bulk lookup. Failures keep the fallback labels.
    pub async fn ensure_labels(&self) {
        let missing = {
            let mut state = self.state.lock().await;
            let placed = state.entries.iter().map(|entry| entry.course_id);
            let missing: Vec<CourseId> = state
                .catalog
                .missing_ids(placed)
                .into_iter()
                .filter(|course_id| !state.pending_lookups.contains(course_id))
                .collect();
            state.pending_lookups.extend(missing.iter().copied());
            missing
        };
        if missing.is_empty() {
            return;
        }

        debug!(count = missing.len(), "editor: looking up course labels");
        let result = self.backend.courses_by_ids(&missing).await;

        let mut state = self.state.lock().await;
        for course_id in &missing {
            state.pending_lookups.remove(course_id);
        }
        match result {
            Ok(courses) => {
                let rows: Vec<(CourseId, CatalogCacheEntry)> = courses
                    .iter()
                    .map(|course| {
                        (
                            course.id,
                            CatalogCacheEntry::from_course(course, state.subject_code_for(course)),
                        )
                    })
                    .collect();
                let course_ids: Vec<CourseId> = rows.iter().map(|(course_id, _)| *course_id).collect();
                state.catalog.merge_bulk(rows);
                drop(state);
                self.emit(PlanEvent::CatalogUpdated { course_ids });
            }
            Err(err) => {
                warn!(count = missing.len(), "editor: course label lookup failed: {err}");
            }
        }
    }

    pub async fn load_subjects(&self) -> Result<(), PlanError> {
        if self.state.lock().await.sidebar.subjects_loaded {
            return Ok(());
        }
        match self.backend.list_subjects().await {
            Ok(subjects) => {
                info!(count = subjects.len(), "editor: subjects loaded");
                let mut state = self.state.lock().await;
                state.sidebar.subjects = subjects;
                state.sidebar.subjects_loaded = true;
                state.load_errors.remove(&LoadTarget::Subjects);
                drop(state);
                self.emit(PlanEvent::SidebarChanged);
                Ok(())
            }
            Err(err) => Err(self
                .record_load_failure(LoadTarget::Subjects, "load subjects", err)
                .await),
        }
    }

    pub async fn set_subject_query(&self, query: &str) {
        self.state.lock().await.sidebar.subject_query = query.to_string();
        self.emit(PlanEvent::SidebarChanged);
    }

    pub async fn visible_subjects(&self) -> Vec<Subject> {
        let state = self.state.lock().await;
        filter_subjects(&state.sidebar.subjects, &state.sidebar.subject_query)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Selects `subject` and fetches its courses, once per selection.
    pub async fn select_subject(&self, subject: Subject) -> Result<(), PlanError> {
        let subject_id = subject.id;
        {
            let mut state = self.state.lock().await;
            if state.sidebar.selected_subject.as_ref() == Some(&subject)
                && state.load_error(LoadTarget::Courses).is_none()
            {
                return Ok(());
            }
            state.sidebar.selected_subject = Some(subject);
            state.sidebar.courses.clear();
        }
        self.emit(PlanEvent::SidebarChanged);

        let result = self.backend.list_courses(subject_id).await;
        let still_selected = self
            .state
            .lock()
            .await
            .sidebar
            .selected_subject
            .as_ref()
            .is_some_and(|selected| selected.id == subject_id);
        if !still_selected {
            debug!(subject_id = subject_id.0, "editor: discarding courses of a stale selection");
            return Ok(());
        }

        match result {
            Ok(courses) => {
                info!(subject_id = subject_id.0, count = courses.len(), "editor: courses loaded");
                let mut state = self.state.lock().await;
                state.sidebar.courses = courses;
                state.load_errors.remove(&LoadTarget::Courses);
                drop(state);
                self.emit(PlanEvent::SidebarChanged);
                Ok(())
            }
            Err(err) => Err(self
                .record_load_failure(LoadTarget::Courses, "load courses", err)
                .await),
        }
    }

    pub async fn clear_subject(&self) {
        {
            let mut state = self.state.lock().await;
            state.sidebar.selected_subject = None;
            state.sidebar.courses.clear();
            state.load_errors.remove(&LoadTarget::Courses);
        }
        self.emit(PlanEvent::SidebarChanged);
    }

    pub async fn set_search_query(&self, query: &str) {
        self.state.lock().await.sidebar.search_query = query.to_string();
        self.emit(PlanEvent::SidebarChanged);
    }

    /// Courses of the selected subject matching the search query, minus the
    /// ones already in the open plan.
    pub async fn visible_courses(&self) -> Vec<Course> {
        let state = self.state.lock().await;
        let placed = state.placed_course_ids();
        let subject_code = state
            .sidebar
            .selected_subject
            .as_ref()
            .map(|subject| subject.code.as_str());
        filter_courses(
            &state.sidebar.courses,
            subject_code,
            &state.sidebar.search_query,
            &placed,
        )
        .into_iter()
        .cloned()
        .collect()
    }

    /// Returns whether the year is expanded afterwards.
    pub async fn toggle_year(&self, year_index: i32) -> bool {
        let mut state = self.state.lock().await;
        let expanded = if state.collapsed_years.remove(&year_index) {
            true
        } else {
            state.collapsed_years.insert(year_index);
            false
        };
        drop(state);
        self.emit(PlanEvent::YearToggled {
            year_index,
            expanded,
        });
        expanded
    }

    pub async fn view(&self) -> EditorView {
        self.state.lock().await.view
    }

    pub async fn begin_drag(&self, payload: DragPayload) {
        self.drag.lock().await.begin(payload);
    }

    pub async fn begin_drag_serialized(&self, raw: &str) -> Result<(), serde_json::Error> {
        self.drag.lock().await.begin_serialized(raw)
    }

    /// Picks up a placed entry, carrying its cached display fields.
    pub async fn begin_entry_drag(&self, entry_id: EntryId) -> Result<(), PlanError> {
        let payload = {
            let state = self.state.lock().await;
            let entry = state
                .entry(entry_id)
                .ok_or(PlanError::UnknownEntry(entry_id))?;
            DragPayload::from_entry(entry, &state.catalog)
        };
        self.begin_drag(payload).await;
        Ok(())
    }

    pub async fn drag_over(&self, key: BucketKey) -> bool {
        self.drag.lock().await.drag_over(key)
    }

    pub async fn drag_leave(&self) {
        self.drag.lock().await.drag_leave();
    }

    pub async fn cancel_drag(&self) {
        self.drag.lock().await.cancel();
    }

    pub async fn drag_highlight(&self) -> Option<BucketKey> {
        self.drag.lock().await.highlight()
    }

    /// Ends the active gesture on `target` and executes what it means.
    pub async fn drop_into(&self, target: BucketKey) -> Result<DropOutcome, PlanError> {
        let decision = {
            let state = self.state.lock().await;
            self.drag.lock().await.drop_into(target, &state.entries)
        };

        match decision {
            DropDecision::Ignore(reason) => {
                debug!(bucket = %target, ?reason, "editor: drop ignored");
                Ok(DropOutcome::Ignored(reason))
            }
            DropDecision::Add {
                course_id,
                display,
                target,
            } => self
                .add_course(course_id, target, display)
                .await
                .map(DropOutcome::Applied),
            DropDecision::Move { entry_id, target } => self
                .move_entry(entry_id, target)
                .await
                .map(DropOutcome::Applied),
        }
    }

    pub async fn add_course(
        &self,
        course_id: CourseId,
        target: BucketKey,
        display: CatalogCacheEntry,
    ) -> Result<MutationOutcome, PlanError> {
        let outcome = self.engine.add_entry(course_id, target, display).await?;
        if outcome == MutationOutcome::Confirmed {
            self.ensure_labels().await;
        }
        Ok(outcome)
    }

    pub async fn move_entry(
        &self,
        entry_id: EntryId,
        target: BucketKey,
    ) -> Result<MutationOutcome, PlanError> {
        self.engine.move_entry(entry_id, target).await
    }

    pub async fn remove_entry(&self, entry_id: EntryId) -> Result<MutationOutcome, PlanError> {
        self.engine.delete_entry(entry_id).await
    }

    pub async fn rename_plan(
        &self,
        plan_id: PlanId,
        name: &str,
    ) -> Result<MutationOutcome, PlanError> {
        self.engine.rename_plan(plan_id, name).await
    }
}

#[cfg(test)]
#[path = "tests/editor_tests.rs"]
mod tests;
