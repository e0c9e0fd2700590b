//! REST client for the planner backend and the trait seam the editor talks to.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use shared::{
    domain::{CourseId, PlanId, SubjectId, UserId},
    error::ApiError,
    protocol::{
        Course, CoursesEnvelope, CreateEntryRequest, CreatePlanRequest, EntryReply, ItemsEnvelope,
        MoveEntryRequest, Plan, PlanEntry, PlanReply, PlansEnvelope, RenamePlanRequest, Subject,
        SubjectsEnvelope,
    },
};
use tracing::{debug, warn};
use url::Url;

use crate::error::BackendError;

pub const USER_ID_HEADER: &str = "X-User-Id";

#[async_trait]
pub trait PlannerBackend: Send + Sync {
    async fn list_plans(&self, user: &UserId) -> Result<Vec<Plan>, BackendError>;
    async fn create_plan(
        &self,
        user: &UserId,
        request: &CreatePlanRequest,
    ) -> Result<Plan, BackendError>;
    /// `None` when the backend acknowledged without echoing the plan.
    async fn rename_plan(
        &self,
        user: &UserId,
        plan_id: PlanId,
        request: &RenamePlanRequest,
    ) -> Result<Option<Plan>, BackendError>;
    async fn list_entries(
        &self,
        user: &UserId,
        plan_id: PlanId,
    ) -> Result<Vec<PlanEntry>, BackendError>;
    async fn create_entry(
        &self,
        user: &UserId,
        plan_id: PlanId,
        request: &CreateEntryRequest,
    ) -> Result<PlanEntry, BackendError>;
    /// `None` when the backend acknowledged without echoing the entry.
    async fn move_entry(
        &self,
        user: &UserId,
        plan_id: PlanId,
        entry_id: i64,
        request: &MoveEntryRequest,
    ) -> Result<Option<PlanEntry>, BackendError>;
    async fn delete_entry(
        &self,
        user: &UserId,
        plan_id: PlanId,
        entry_id: i64,
    ) -> Result<(), BackendError>;
    async fn list_subjects(&self) -> Result<Vec<Subject>, BackendError>;
    async fn list_courses(&self, subject_id: SubjectId) -> Result<Vec<Course>, BackendError>;
    async fn courses_by_ids(&self, ids: &[CourseId]) -> Result<Vec<Course>, BackendError>;
}

pub struct HttpPlannerBackend {
    http: Client,
    api_base: String,
}

impl HttpPlannerBackend {
    pub fn new(api_base: &str) -> Result<Self, BackendError> {
        Self::with_client(Client::new(), api_base)
    }

    pub fn with_timeout(api_base: &str, timeout: Duration) -> Result<Self, BackendError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(BackendError::from)?;
        Self::with_client(http, api_base)
    }

    pub fn with_client(http: Client, api_base: &str) -> Result<Self, BackendError> {
        let parsed = Url::parse(api_base.trim()).map_err(|err| BackendError::InvalidBaseUrl {
            url: api_base.to_string(),
            reason: err.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(BackendError::InvalidBaseUrl {
                url: api_base.to_string(),
                reason: "scheme must be http or https".to_string(),
            });
        }
        Ok(Self {
            http,
            api_base: parsed.as_str().trim_end_matches('/').to_string(),
        })
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.api_base)
    }

    async fn send_raw(&self, request: RequestBuilder) -> Result<String, BackendError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            let err = ApiError::from_response(status.as_u16(), &body);
            debug!(status = status.as_u16(), message = %err.message, "backend: request rejected");
            return Err(err.into());
        }
        Ok(body)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, BackendError> {
        let body = self.send_raw(request).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Accepts an empty 2xx body as "acknowledged without a record".
    async fn send_optional_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<Option<T>, BackendError> {
        let body = self.send_raw(request).await?;
        if body.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&body)?))
    }
}

#[async_trait]
impl PlannerBackend for HttpPlannerBackend {
    async fn list_plans(&self, user: &UserId) -> Result<Vec<Plan>, BackendError> {
        let envelope: PlansEnvelope = self
            .send_json(
                self.http
                    .get(self.url("/plans/"))
                    .header(USER_ID_HEADER, user.as_str()),
            )
            .await?;
        Ok(envelope.plans)
    }

    async fn create_plan(
        &self,
        user: &UserId,
        request: &CreatePlanRequest,
    ) -> Result<Plan, BackendError> {
        let reply: PlanReply = self
            .send_json(
                self.http
                    .post(self.url("/plans/"))
                    .header(USER_ID_HEADER, user.as_str())
                    .json(request),
            )
            .await?;
        Ok(reply.into_plan())
    }

    async fn rename_plan(
        &self,
        user: &UserId,
        plan_id: PlanId,
        request: &RenamePlanRequest,
    ) -> Result<Option<Plan>, BackendError> {
        let reply: Option<PlanReply> = self
            .send_optional_json(
                self.http
                    .put(self.url(&format!("/plans/{plan_id}")))
                    .header(USER_ID_HEADER, user.as_str())
                    .json(request),
            )
            .await?;
        Ok(reply.map(PlanReply::into_plan))
    }

    async fn list_entries(
        &self,
        user: &UserId,
        plan_id: PlanId,
    ) -> Result<Vec<PlanEntry>, BackendError> {
        let envelope: ItemsEnvelope = self
            .send_json(
                self.http
                    .get(self.url(&format!("/plans/{plan_id}/items/")))
                    .header(USER_ID_HEADER, user.as_str()),
            )
            .await?;

        let mut entries = Vec::with_capacity(envelope.items.len());
        for raw in envelope.items {
            match serde_json::from_value::<PlanEntry>(raw) {
                Ok(entry) => entries.push(entry),
                Err(err) => {
                    warn!(plan_id = plan_id.0, "backend: skipping malformed plan item: {err}");
                }
            }
        }
        Ok(entries)
    }

    async fn create_entry(
        &self,
        user: &UserId,
        plan_id: PlanId,
        request: &CreateEntryRequest,
    ) -> Result<PlanEntry, BackendError> {
        let reply: EntryReply = self
            .send_json(
                self.http
                    .post(self.url(&format!("/plans/{plan_id}/items/")))
                    .header(USER_ID_HEADER, user.as_str())
                    .json(request),
            )
            .await?;
        Ok(reply.into_entry())
    }

    async fn move_entry(
        &self,
        user: &UserId,
        plan_id: PlanId,
        entry_id: i64,
        request: &MoveEntryRequest,
    ) -> Result<Option<PlanEntry>, BackendError> {
        let reply: Option<EntryReply> = self
            .send_optional_json(
                self.http
                    .put(self.url(&format!("/plans/{plan_id}/items/{entry_id}")))
                    .header(USER_ID_HEADER, user.as_str())
                    .json(request),
            )
            .await?;
        Ok(reply.map(EntryReply::into_entry))
    }

    async fn delete_entry(
        &self,
        user: &UserId,
        plan_id: PlanId,
        entry_id: i64,
    ) -> Result<(), BackendError> {
        self.send_raw(
            self.http
                .delete(self.url(&format!("/plans/{plan_id}/items/{entry_id}")))
                .header(USER_ID_HEADER, user.as_str()),
        )
        .await?;
        Ok(())
    }

    async fn list_subjects(&self) -> Result<Vec<Subject>, BackendError> {
        let envelope: SubjectsEnvelope = self.send_json(self.http.get(self.url("/subjects"))).await?;
        Ok(envelope.subjects)
    }

    async fn list_courses(&self, subject_id: SubjectId) -> Result<Vec<Course>, BackendError> {
        let envelope: CoursesEnvelope = self
            .send_json(self.http.get(self.url(&format!("/courses/{subject_id}"))))
            .await?;
        Ok(envelope.courses)
    }

    async fn courses_by_ids(&self, ids: &[CourseId]) -> Result<Vec<Course>, BackendError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let joined = ids
            .iter()
            .map(|id| id.0.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let envelope: CoursesEnvelope = self
            .send_json(
                self.http
                    .get(self.url(&format!("/courses/by-ids/?ids={joined}"))),
            )
            .await?;
        Ok(envelope.courses)
    }
}

#[cfg(test)]
#[path = "tests/backend_tests.rs"]
mod tests;
