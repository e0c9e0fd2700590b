//! In-memory planner backend shared by the engine and editor tests.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use shared::{
    domain::{CourseId, EntryId, EntryStatus, PlanId, SubjectId, Term, UserId},
    error::ApiError,
    protocol::{
        Course, CreateEntryRequest, CreatePlanRequest, MoveEntryRequest, Plan, PlanEntry,
        RenamePlanRequest, Subject,
    },
};
use tokio::sync::{broadcast, Notify};

use crate::{
    backend::PlannerBackend,
    error::BackendError,
    events::{MutationPhase, PlanEvent},
};

pub(crate) const PLAN: PlanId = PlanId(3);

pub(crate) fn user() -> UserId {
    UserId::parse("student-1").expect("user id")
}

pub(crate) fn plan(id: i64, name: &str) -> Plan {
    Plan {
        id: PlanId(id),
        name: name.to_string(),
        start_year: Some(2024),
        created_at: "2024-09-01T12:00:00Z".parse().expect("timestamp"),
        updated_at: None,
        owner_id: user(),
    }
}

pub(crate) fn entry(id: i64, year_index: i32, term: Term, course_id: i64, position: u32) -> PlanEntry {
    PlanEntry {
        id: EntryId::Persisted(id),
        plan_id: PLAN,
        year_index,
        term,
        course_id: CourseId(course_id),
        status: EntryStatus::Planned,
        position,
        notes: None,
        created_at: "2024-09-01T12:00:00Z".parse().expect("timestamp"),
    }
}

pub(crate) fn course(id: i64, subject_id: i64, number: &str) -> Course {
    Course {
        id: CourseId(id),
        subject_area_id: Some(SubjectId(subject_id)),
        subject_code: None,
        number: number.to_string(),
        title: format!("Course {number}"),
        units: "4".to_string(),
        description: None,
    }
}

pub(crate) fn subject(id: i64, code: &str, name: &str) -> Subject {
    Subject {
        id: SubjectId(id),
        code: code.to_string(),
        name: name.to_string(),
    }
}

/// Backend double that keeps server-side rows in memory, records every call
/// and can fail or hold individual operations.
pub(crate) struct FakeBackend {
    plans: Mutex<Vec<Plan>>,
    entries: Mutex<Vec<PlanEntry>>,
    subjects: Mutex<Vec<Subject>>,
    courses: Mutex<Vec<Course>>,
    calls: Mutex<Vec<String>>,
    failing: Mutex<HashSet<&'static str>>,
    gates: Mutex<HashMap<&'static str, Arc<Notify>>>,
    next_id: AtomicI64,
}

impl FakeBackend {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            plans: Mutex::new(vec![plan(3, "Main plan")]),
            entries: Mutex::new(Vec::new()),
            subjects: Mutex::new(Vec::new()),
            courses: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            gates: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(100),
        })
    }

    pub(crate) fn with_entries(self: Arc<Self>, entries: Vec<PlanEntry>) -> Arc<Self> {
        *self.entries.lock().expect("entries") = entries;
        self
    }

    pub(crate) fn with_catalog(self: Arc<Self>, subjects: Vec<Subject>, courses: Vec<Course>) -> Arc<Self> {
        *self.subjects.lock().expect("subjects") = subjects;
        *self.courses.lock().expect("courses") = courses;
        self
    }

    /// Makes `op` answer with HTTP 500 until cleared.
    pub(crate) fn fail(&self, op: &'static str) {
        self.failing.lock().expect("failing").insert(op);
    }

    pub(crate) fn recover(&self, op: &'static str) {
        self.failing.lock().expect("failing").remove(op);
    }

    /// Holds `op` until the returned handle is notified.
    pub(crate) fn gate(&self, op: &'static str) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.gates
            .lock()
            .expect("gates")
            .insert(op, Arc::clone(&notify));
        notify
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls").clone()
    }

    pub(crate) fn calls_to(&self, op: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| call.split(' ').next() == Some(op))
            .collect()
    }

    pub(crate) fn server_entries(&self) -> Vec<PlanEntry> {
        self.entries.lock().expect("entries").clone()
    }

    /// Simulates a change made by another client.
    pub(crate) fn push_server_entry(&self, entry: PlanEntry) {
        self.entries.lock().expect("entries").push(entry);
    }

    async fn enter(&self, op: &'static str, detail: String) -> Result<(), BackendError> {
        let call = if detail.is_empty() {
            op.to_string()
        } else {
            format!("{op} {detail}")
        };
        self.calls.lock().expect("calls").push(call);

        let gate = self.gates.lock().expect("gates").get(op).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if self.failing.lock().expect("failing").contains(op) {
            return Err(ApiError::new(500, "Internal Server Error").into());
        }
        Ok(())
    }
}

#[async_trait]
impl PlannerBackend for FakeBackend {
    async fn list_plans(&self, _user: &UserId) -> Result<Vec<Plan>, BackendError> {
        self.enter("list_plans", String::new()).await?;
        Ok(self.plans.lock().expect("plans").clone())
    }

    async fn create_plan(
        &self,
        user: &UserId,
        request: &CreatePlanRequest,
    ) -> Result<Plan, BackendError> {
        self.enter("create_plan", format!("name={}", request.name)).await?;
        let mut created = plan(self.next_id.fetch_add(1, Ordering::Relaxed), &request.name);
        created.start_year = request.start_year;
        created.owner_id = user.clone();
        self.plans.lock().expect("plans").insert(0, created.clone());
        Ok(created)
    }

    async fn rename_plan(
        &self,
        _user: &UserId,
        plan_id: PlanId,
        request: &RenamePlanRequest,
    ) -> Result<Option<Plan>, BackendError> {
        self.enter("rename_plan", format!("plan={plan_id} name={}", request.name))
            .await?;
        let mut plans = self.plans.lock().expect("plans");
        let renamed = plans.iter_mut().find(|plan| plan.id == plan_id).map(|plan| {
            plan.name = request.name.clone();
            plan.clone()
        });
        Ok(renamed)
    }

    async fn list_entries(
        &self,
        _user: &UserId,
        plan_id: PlanId,
    ) -> Result<Vec<PlanEntry>, BackendError> {
        self.enter("list_entries", format!("plan={plan_id}")).await?;
        Ok(self
            .entries
            .lock()
            .expect("entries")
            .iter()
            .filter(|entry| entry.plan_id == plan_id)
            .cloned()
            .collect())
    }

    async fn create_entry(
        &self,
        _user: &UserId,
        plan_id: PlanId,
        request: &CreateEntryRequest,
    ) -> Result<PlanEntry, BackendError> {
        self.enter(
            "create_entry",
            format!(
                "plan={plan_id} course={} bucket={}/{} position={}",
                request.course_id, request.year_index, request.term, request.position
            ),
        )
        .await?;
        let mut created = entry(
            self.next_id.fetch_add(1, Ordering::Relaxed),
            request.year_index,
            request.term,
            request.course_id.0,
            request.position,
        );
        created.plan_id = plan_id;
        created.status = request.status;
        self.entries.lock().expect("entries").push(created.clone());
        Ok(created)
    }

    async fn move_entry(
        &self,
        _user: &UserId,
        plan_id: PlanId,
        entry_id: i64,
        request: &MoveEntryRequest,
    ) -> Result<Option<PlanEntry>, BackendError> {
        self.enter(
            "move_entry",
            format!(
                "plan={plan_id} entry={entry_id} bucket={}/{} position={}",
                request.year_index, request.term, request.position
            ),
        )
        .await?;
        let mut entries = self.entries.lock().expect("entries");
        let moved = entries
            .iter_mut()
            .find(|entry| entry.id == EntryId::Persisted(entry_id))
            .map(|entry| {
                entry.year_index = request.year_index;
                entry.term = request.term;
                entry.position = request.position;
                entry.clone()
            });
        Ok(moved)
    }

    async fn delete_entry(
        &self,
        _user: &UserId,
        plan_id: PlanId,
        entry_id: i64,
    ) -> Result<(), BackendError> {
        self.enter("delete_entry", format!("plan={plan_id} entry={entry_id}"))
            .await?;
        self.entries
            .lock()
            .expect("entries")
            .retain(|entry| entry.id != EntryId::Persisted(entry_id));
        Ok(())
    }

    async fn list_subjects(&self) -> Result<Vec<Subject>, BackendError> {
        self.enter("list_subjects", String::new()).await?;
        Ok(self.subjects.lock().expect("subjects").clone())
    }

    async fn list_courses(&self, subject_id: SubjectId) -> Result<Vec<Course>, BackendError> {
        self.enter("list_courses", format!("subject={subject_id}")).await?;
        Ok(self
            .courses
            .lock()
            .expect("courses")
            .iter()
            .filter(|course| course.subject_area_id == Some(subject_id))
            .cloned()
            .collect())
    }

    async fn courses_by_ids(&self, ids: &[CourseId]) -> Result<Vec<Course>, BackendError> {
        let joined = ids
            .iter()
            .map(|id| id.0.to_string())
            .collect::<Vec<_>>()
            .join(",");
        self.enter("courses_by_ids", format!("ids={joined}")).await?;
        Ok(self
            .courses
            .lock()
            .expect("courses")
            .iter()
            .filter(|course| ids.contains(&course.id))
            .cloned()
            .collect())
    }
}

/// Waits until a mutation reports `phase`, failing the test after a second.
pub(crate) async fn wait_for_phase(events: &mut broadcast::Receiver<PlanEvent>, phase: MutationPhase) {
    let wait = async {
        loop {
            match events.recv().await {
                Ok(PlanEvent::MutationPhase { phase: seen, .. }) if seen == phase => return,
                Ok(_) => continue,
                Err(err) => panic!("event channel closed: {err}"),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(1), wait)
        .await
        .expect("timed out waiting for mutation phase");
}

pub(crate) fn drain(events: &mut broadcast::Receiver<PlanEvent>) -> Vec<PlanEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}
