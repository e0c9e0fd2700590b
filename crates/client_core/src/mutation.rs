//! Optimistic plan mutations.
//!
//! Every mutation runs through [`PlanMutationEngine::run`]:
//!
//! 1. validate and apply the change to local state, keeping a snapshot of
//!    exactly what was changed;
//! 2. notify observers, so the change renders before the backend answers;
//! 3. issue one backend call, then either commit the server's answer or roll
//!    the snapshot back.
//!
//! Snapshots are scoped to the mutation that took them. A rollback restores
//! only what that mutation touched, so independent mutations in flight at the
//! same time never undo each other.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use async_trait::async_trait;
use chrono::Utc;
use shared::{
    domain::{BucketKey, CourseId, EntryId, EntryStatus, PlanId, UserId},
    protocol::{CreateEntryRequest, MoveEntryRequest, Plan, PlanEntry, RenamePlanRequest},
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::{
    backend::PlannerBackend,
    catalog::CatalogCacheEntry,
    error::{BackendError, PlanError},
    events::{MutationKind, MutationPhase, Notice, NoticeSeverity, PlanEvent},
    grid::GridIndex,
    state::EditorState,
};

/// Identity and plan a mutation was applied against.
#[derive(Debug, Clone)]
pub struct MutationContext {
    pub user: UserId,
    pub plan_id: PlanId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    /// The backend accepted the change and local state reflects its answer.
    Confirmed,
    /// Nothing to do; no request was sent.
    Unchanged,
    /// The backend accepted the change after the plan was closed, so local
    /// state was left alone.
    Detached,
}

#[async_trait]
pub trait OptimisticMutation: Send + Sync {
    type Snapshot: Send + Sync;
    type Reply: Send;

    fn kind(&self) -> MutationKind;

    /// Plan the mutation targets; entry mutations target the open plan.
    fn target_plan(&self, state: &EditorState) -> Result<PlanId, PlanError> {
        state.open_plan.ok_or(PlanError::NoPlanOpen)
    }

    /// Validates and applies the optimistic change. `Ok(None)` means the
    /// mutation is a no-op and no request must be sent.
    fn apply(
        &self,
        state: &mut EditorState,
        plan_id: PlanId,
    ) -> Result<Option<Self::Snapshot>, PlanError>;

    async fn send(
        &self,
        backend: &dyn PlannerBackend,
        ctx: &MutationContext,
        snapshot: &Self::Snapshot,
    ) -> Result<Self::Reply, BackendError>;

    /// Whether local state still belongs to the plan this mutation changed.
    fn is_attached(&self, state: &EditorState, ctx: &MutationContext) -> bool {
        state.open_plan == Some(ctx.plan_id)
    }

    /// Runs once the backend answered, before commit or rollback and even when
    /// the mutation is detached.
    fn settle(&self, _state: &mut EditorState, _snapshot: &Self::Snapshot) {}

    fn commit(&self, state: &mut EditorState, snapshot: Self::Snapshot, reply: Self::Reply);

    fn rollback(&self, state: &mut EditorState, snapshot: Self::Snapshot);
}

pub struct PlanMutationEngine {
    backend: Arc<dyn PlannerBackend>,
    state: Arc<Mutex<EditorState>>,
    events: broadcast::Sender<PlanEvent>,
    next_mutation_id: AtomicU64,
}

impl PlanMutationEngine {
    pub fn new(
        backend: Arc<dyn PlannerBackend>,
        state: Arc<Mutex<EditorState>>,
        events: broadcast::Sender<PlanEvent>,
    ) -> Self {
        Self {
            backend,
            state,
            events,
            next_mutation_id: AtomicU64::new(1),
        }
    }

    pub async fn add_entry(
        &self,
        course_id: CourseId,
        target: BucketKey,
        display: CatalogCacheEntry,
    ) -> Result<MutationOutcome, PlanError> {
        self.run(AddEntry {
            course_id,
            target,
            display,
        })
        .await
    }

    pub async fn move_entry(
        &self,
        entry_id: EntryId,
        target: BucketKey,
    ) -> Result<MutationOutcome, PlanError> {
        self.run(MoveEntry { entry_id, target }).await
    }

    pub async fn delete_entry(&self, entry_id: EntryId) -> Result<MutationOutcome, PlanError> {
        self.run(DeleteEntry { entry_id }).await
    }

    pub async fn rename_plan(
        &self,
        plan_id: PlanId,
        name: &str,
    ) -> Result<MutationOutcome, PlanError> {
        self.run(RenamePlan {
            plan_id,
            name: name.trim().to_string(),
        })
        .await
    }

    pub async fn run<M: OptimisticMutation>(&self, mutation: M) -> Result<MutationOutcome, PlanError> {
        let kind = mutation.kind();
        let (ctx, snapshot) = {
            let mut state = self.state.lock().await;
            let user = state.user.clone().ok_or(PlanError::NotAuthenticated)?;
            let plan_id = mutation.target_plan(&state)?;
            match mutation.apply(&mut state, plan_id)? {
                Some(snapshot) => (MutationContext { user, plan_id }, snapshot),
                None => {
                    debug!(plan_id = plan_id.0, ?kind, "plan: mutation is a no-op");
                    return Ok(MutationOutcome::Unchanged);
                }
            }
        };

        let mutation_id = self.next_mutation_id.fetch_add(1, Ordering::Relaxed);
        self.emit_phase(mutation_id, kind, MutationPhase::Applying);
        self.emit_changed(kind, ctx.plan_id);

        let reply = mutation.send(self.backend.as_ref(), &ctx, &snapshot).await;

        let (result, attached) = {
            let mut state = self.state.lock().await;
            mutation.settle(&mut state, &snapshot);
            let attached = mutation.is_attached(&state, &ctx);
            let result = match reply {
                Ok(reply) => {
                    if attached {
                        mutation.commit(&mut state, snapshot, reply);
                        Ok(MutationOutcome::Confirmed)
                    } else {
                        Ok(MutationOutcome::Detached)
                    }
                }
                Err(source) => {
                    if attached {
                        mutation.rollback(&mut state, snapshot);
                    }
                    Err(source)
                }
            };
            (result, attached)
        };

        let result = match result {
            Ok(outcome) => {
                info!(
                    mutation_id,
                    plan_id = ctx.plan_id.0,
                    ?kind,
                    ?outcome,
                    "plan: mutation confirmed"
                );
                self.emit_phase(mutation_id, kind, MutationPhase::Confirmed);
                Ok(outcome)
            }
            Err(source) => {
                warn!(
                    mutation_id,
                    plan_id = ctx.plan_id.0,
                    ?kind,
                    attached,
                    "plan: mutation rolled back: {source}"
                );
                self.emit_phase(mutation_id, kind, MutationPhase::RolledBack);
                let _ = self.events.send(PlanEvent::Notice(Notice {
                    severity: NoticeSeverity::Transient,
                    message: format!("Could not {}: {source}", kind.action()),
                }));
                Err(PlanError::backend(kind.action(), source))
            }
        };

        if attached {
            self.emit_changed(kind, ctx.plan_id);
        }
        self.emit_phase(mutation_id, kind, MutationPhase::Idle);
        result
    }

    fn emit_phase(&self, mutation_id: u64, kind: MutationKind, phase: MutationPhase) {
        let _ = self.events.send(PlanEvent::MutationPhase {
            mutation_id,
            kind,
            phase,
        });
    }

    fn emit_changed(&self, kind: MutationKind, plan_id: PlanId) {
        let event = match kind {
            MutationKind::RenamePlan => PlanEvent::PlansChanged,
            _ => PlanEvent::EntriesChanged { plan_id },
        };
        let _ = self.events.send(event);
    }
}

fn ensure_in_grid(target: BucketKey) -> Result<(), PlanError> {
    if target.is_canonical() {
        Ok(())
    } else {
        Err(PlanError::OutsideGrid(target))
    }
}

fn confirmed_id(entry: &PlanEntry) -> Result<i64, PlanError> {
    entry
        .id
        .persisted()
        .ok_or(PlanError::EntryNotConfirmed(entry.id))
}

fn ensure_idle(state: &EditorState, entry_id: EntryId) -> Result<(), PlanError> {
    if state.is_entry_pending(entry_id) {
        Err(PlanError::EntryBusy(entry_id))
    } else {
        Ok(())
    }
}

/// Appends a course to a bucket under a provisional id.
pub struct AddEntry {
    pub course_id: CourseId,
    pub target: BucketKey,
    pub display: CatalogCacheEntry,
}

pub struct AddSnapshot {
    provisional_id: EntryId,
    request: CreateEntryRequest,
}

#[async_trait]
impl OptimisticMutation for AddEntry {
    type Snapshot = AddSnapshot;
    type Reply = PlanEntry;

    fn kind(&self) -> MutationKind {
        MutationKind::AddEntry
    }

    fn apply(
        &self,
        state: &mut EditorState,
        plan_id: PlanId,
    ) -> Result<Option<AddSnapshot>, PlanError> {
        ensure_in_grid(self.target)?;
        if state.contains_course(self.course_id) {
            return Err(PlanError::DuplicateCourse(self.course_id));
        }

        let position = GridIndex::build(&state.entries).bucket_len(self.target) as u32;
        let provisional_id = EntryId::provisional();
        state.entries.push(PlanEntry {
            id: provisional_id,
            plan_id,
            year_index: self.target.year_index,
            term: self.target.term,
            course_id: self.course_id,
            status: EntryStatus::Planned,
            position,
            notes: None,
            created_at: Utc::now(),
        });
        state.catalog.seed(self.course_id, self.display.clone());

        Ok(Some(AddSnapshot {
            provisional_id,
            request: CreateEntryRequest {
                year_index: self.target.year_index,
                term: self.target.term,
                course_id: self.course_id,
                status: EntryStatus::Planned,
                position,
            },
        }))
    }

    async fn send(
        &self,
        backend: &dyn PlannerBackend,
        ctx: &MutationContext,
        snapshot: &AddSnapshot,
    ) -> Result<PlanEntry, BackendError> {
        backend
            .create_entry(&ctx.user, ctx.plan_id, &snapshot.request)
            .await
    }

    fn commit(&self, state: &mut EditorState, snapshot: AddSnapshot, reply: PlanEntry) {
        if let Some(slot) = state
            .entries
            .iter_mut()
            .find(|entry| entry.id == snapshot.provisional_id)
        {
            *slot = reply;
            return;
        }

        // The provisional row is gone (plan reloaded meanwhile); adopt the
        // server row unless the reload already brought it in.
        let already_present = state
            .entries
            .iter()
            .any(|entry| entry.id == reply.id || entry.course_id == reply.course_id);
        if !already_present {
            state.entries.push(reply);
        }
    }

    fn rollback(&self, state: &mut EditorState, snapshot: AddSnapshot) {
        state
            .entries
            .retain(|entry| entry.id != snapshot.provisional_id);
    }
}

/// Moves an entry to the end of another bucket.
pub struct MoveEntry {
    pub entry_id: EntryId,
    pub target: BucketKey,
}

pub struct MoveSnapshot {
    server_id: i64,
    previous: (BucketKey, u32),
    applied: (BucketKey, u32),
    request: MoveEntryRequest,
}

#[async_trait]
impl OptimisticMutation for MoveEntry {
    type Snapshot = MoveSnapshot;
    type Reply = Option<PlanEntry>;

    fn kind(&self) -> MutationKind {
        MutationKind::MoveEntry
    }

    fn apply(
        &self,
        state: &mut EditorState,
        _plan_id: PlanId,
    ) -> Result<Option<MoveSnapshot>, PlanError> {
        ensure_in_grid(self.target)?;
        let current = state
            .entry(self.entry_id)
            .ok_or(PlanError::UnknownEntry(self.entry_id))?;
        let server_id = confirmed_id(current)?;
        ensure_idle(state, self.entry_id)?;
        if current.bucket() == self.target {
            return Ok(None);
        }
        let previous = (current.bucket(), current.position);

        let position = GridIndex::build(&state.entries).bucket_len(self.target) as u32;
        if let Some(entry) = state
            .entries
            .iter_mut()
            .find(|entry| entry.id == self.entry_id)
        {
            entry.year_index = self.target.year_index;
            entry.term = self.target.term;
            entry.position = position;
        }
        state.pending_entries.insert(self.entry_id);

        Ok(Some(MoveSnapshot {
            server_id,
            previous,
            applied: (self.target, position),
            request: MoveEntryRequest {
                year_index: self.target.year_index,
                term: self.target.term,
                position,
            },
        }))
    }

    async fn send(
        &self,
        backend: &dyn PlannerBackend,
        ctx: &MutationContext,
        snapshot: &MoveSnapshot,
    ) -> Result<Option<PlanEntry>, BackendError> {
        backend
            .move_entry(&ctx.user, ctx.plan_id, snapshot.server_id, &snapshot.request)
            .await
    }

    fn settle(&self, state: &mut EditorState, _snapshot: &MoveSnapshot) {
        state.pending_entries.remove(&self.entry_id);
    }

    fn commit(&self, state: &mut EditorState, _snapshot: MoveSnapshot, reply: Option<PlanEntry>) {
        let Some(canonical) = reply else {
            return;
        };
        if let Some(slot) = state
            .entries
            .iter_mut()
            .find(|entry| entry.id == canonical.id)
        {
            *slot = canonical;
        }
    }

    fn rollback(&self, state: &mut EditorState, snapshot: MoveSnapshot) {
        let (bucket, position) = snapshot.previous;
        let (applied_bucket, applied_position) = snapshot.applied;
        if let Some(entry) = state.entries.iter_mut().find(|entry| {
            entry.id == self.entry_id
                && entry.bucket() == applied_bucket
                && entry.position == applied_position
        }) {
            entry.year_index = bucket.year_index;
            entry.term = bucket.term;
            entry.position = position;
        }
    }
}

/// Removes an entry from the plan.
pub struct DeleteEntry {
    pub entry_id: EntryId,
}

pub struct DeleteSnapshot {
    server_id: i64,
    index: usize,
    removed: PlanEntry,
}

#[async_trait]
impl OptimisticMutation for DeleteEntry {
    type Snapshot = DeleteSnapshot;
    type Reply = ();

    fn kind(&self) -> MutationKind {
        MutationKind::DeleteEntry
    }

    fn apply(
        &self,
        state: &mut EditorState,
        _plan_id: PlanId,
    ) -> Result<Option<DeleteSnapshot>, PlanError> {
        let index = state
            .entries
            .iter()
            .position(|entry| entry.id == self.entry_id)
            .ok_or(PlanError::UnknownEntry(self.entry_id))?;
        let server_id = confirmed_id(&state.entries[index])?;
        ensure_idle(state, self.entry_id)?;
        let removed = state.entries.remove(index);
        state.pending_entries.insert(self.entry_id);
        Ok(Some(DeleteSnapshot {
            server_id,
            index,
            removed,
        }))
    }

    async fn send(
        &self,
        backend: &dyn PlannerBackend,
        ctx: &MutationContext,
        snapshot: &DeleteSnapshot,
    ) -> Result<(), BackendError> {
        backend
            .delete_entry(&ctx.user, ctx.plan_id, snapshot.server_id)
            .await
    }

    fn settle(&self, state: &mut EditorState, _snapshot: &DeleteSnapshot) {
        state.pending_entries.remove(&self.entry_id);
    }

    fn commit(&self, _state: &mut EditorState, _snapshot: DeleteSnapshot, _reply: ()) {}

    fn rollback(&self, state: &mut EditorState, snapshot: DeleteSnapshot) {
        let removed = snapshot.removed;
        if state.entry(removed.id).is_some() {
            return;
        }
        if state.contains_course(removed.course_id) {
            warn!(
                entry_id = %removed.id,
                course_id = removed.course_id.0,
                "plan: not restoring deleted entry, course was placed again"
            );
            return;
        }
        let index = snapshot.index.min(state.entries.len());
        state.entries.insert(index, removed);
    }
}

/// Renames a plan in the plan list.
pub struct RenamePlan {
    pub plan_id: PlanId,
    pub name: String,
}

pub struct RenameSnapshot {
    previous_name: String,
}

#[async_trait]
impl OptimisticMutation for RenamePlan {
    type Snapshot = RenameSnapshot;
    type Reply = Option<Plan>;

    fn kind(&self) -> MutationKind {
        MutationKind::RenamePlan
    }

    fn target_plan(&self, state: &EditorState) -> Result<PlanId, PlanError> {
        state
            .plan(self.plan_id)
            .map(|plan| plan.id)
            .ok_or(PlanError::UnknownPlan(self.plan_id))
    }

    fn apply(
        &self,
        state: &mut EditorState,
        plan_id: PlanId,
    ) -> Result<Option<RenameSnapshot>, PlanError> {
        let name = self.name.trim();
        let Some(plan) = state.plans.iter_mut().find(|plan| plan.id == plan_id) else {
            return Err(PlanError::UnknownPlan(plan_id));
        };
        // A blank name cancels the edit.
        if name.is_empty() || plan.name == name {
            return Ok(None);
        }
        let previous_name = std::mem::replace(&mut plan.name, name.to_string());
        Ok(Some(RenameSnapshot { previous_name }))
    }

    async fn send(
        &self,
        backend: &dyn PlannerBackend,
        ctx: &MutationContext,
        _snapshot: &RenameSnapshot,
    ) -> Result<Option<Plan>, BackendError> {
        backend
            .rename_plan(
                &ctx.user,
                ctx.plan_id,
                &RenamePlanRequest {
                    name: self.name.trim().to_string(),
                },
            )
            .await
    }

    fn is_attached(&self, state: &EditorState, ctx: &MutationContext) -> bool {
        state.plan(ctx.plan_id).is_some()
    }

    fn commit(&self, state: &mut EditorState, _snapshot: RenameSnapshot, reply: Option<Plan>) {
        let Some(canonical) = reply else {
            return;
        };
        if let Some(slot) = state.plans.iter_mut().find(|plan| plan.id == canonical.id) {
            *slot = canonical;
        }
    }

    fn rollback(&self, state: &mut EditorState, snapshot: RenameSnapshot) {
        let applied = self.name.trim();
        if let Some(plan) = state.plans.iter_mut().find(|plan| plan.id == self.plan_id) {
            // A later rename owns the name now; leave it.
            if plan.name == applied {
                plan.name = snapshot.previous_name;
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/mutation_tests.rs"]
mod tests;
