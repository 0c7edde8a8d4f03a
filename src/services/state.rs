use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::json;

use crate::models::{
    Activity, ChatMessage, Invoice, InvoiceStatus, MonthlyStats, NewInvoice, NewMessage,
    NewTicket, Project, ProjectDocument, Rating, Service, SupportTicket, Task,
};
use crate::services::dashboard::StatsFeed;
use crate::services::decode::decode_snapshot;
use crate::services::invoices;
use crate::services::live::LiveQuery;
use crate::store::{server_timestamp, Direction, Query, StoreClient};

const MSG_PROJECTS: &str = "فشل في تحميل المشاريع";
const MSG_INVOICES: &str = "فشل في تحميل الفواتير";
const MSG_TICKETS: &str = "فشل في تحميل تذاكر الدعم";
const MSG_TASKS: &str = "فشل في تحميل المهام";
const MSG_MESSAGES: &str = "فشل في تحميل الرسائل";
const MSG_DOCUMENTS: &str = "فشل في تحميل المستندات";
const MSG_RATINGS: &str = "فشل في تحميل التقييمات";
const MSG_SERVICES: &str = "فشل في تحميل الخدمات";
const MSG_ACTIVITIES: &str = "فشل في تحميل النشاطات";

/// Entry point of the portal data layer: live queries for the dashboard
/// views plus the one-shot write paths. Holds the store client; every hook
/// call owns its own subscription and state slice.
#[derive(Clone)]
pub struct Portal {
    store: Arc<dyn StoreClient>,
}

impl Portal {
    pub fn new(store: Arc<dyn StoreClient>) -> Self {
        Portal { store }
    }

    pub fn store(&self) -> &Arc<dyn StoreClient> {
        &self.store
    }

    fn live<T>(
        &self,
        scope: Option<&str>,
        query: impl FnOnce(&str) -> Query,
        message: &'static str,
    ) -> LiveQuery<T>
    where
        T: crate::services::decode::Decode + Clone,
    {
        // Querying with an undefined scope would mis-scope or be rejected
        // upstream; publish an empty settled state instead.
        match scope {
            None => LiveQuery::detached(),
            Some(id) => LiveQuery::spawn(self.store.subscribe(query(id)), message),
        }
    }

    pub fn projects(&self, owner_id: Option<&str>) -> LiveQuery<Project> {
        self.live(
            owner_id,
            |id| {
                Query::collection("projects")
                    .filter_eq("ownerId", id)
                    .order_by("createdAt", Direction::Desc)
            },
            MSG_PROJECTS,
        )
    }

    pub fn invoices(&self, user_id: Option<&str>) -> LiveQuery<Invoice> {
        self.live(
            user_id,
            |id| {
                Query::collection("invoices")
                    .filter_eq("userId", id)
                    .order_by("createdAt", Direction::Desc)
            },
            MSG_INVOICES,
        )
    }

    pub fn support_tickets(&self, author_id: Option<&str>) -> LiveQuery<SupportTicket> {
        self.live(
            author_id,
            |id| {
                Query::collection("tickets")
                    .filter_eq("authorId", id)
                    .order_by("createdAt", Direction::Desc)
            },
            MSG_TICKETS,
        )
    }

    pub fn tasks(&self, assignee_id: Option<&str>) -> LiveQuery<Task> {
        self.live(
            assignee_id,
            |id| {
                Query::collection("tasks")
                    .filter_eq("assignedTo", id)
                    .order_by("createdAt", Direction::Desc)
            },
            MSG_TASKS,
        )
    }

    pub fn project_tasks(&self, project_id: Option<&str>) -> LiveQuery<Task> {
        self.live(
            project_id,
            |id| {
                Query::collection("tasks")
                    .filter_eq("projectId", id)
                    .order_by("createdAt", Direction::Desc)
            },
            MSG_TASKS,
        )
    }

    /// Chat renders chronologically, so this is the one ascending feed.
    pub fn project_messages(&self, project_id: Option<&str>) -> LiveQuery<ChatMessage> {
        self.live(
            project_id,
            |id| {
                Query::collection(format!("messages/{}/messages", id))
                    .order_by("timestamp", Direction::Asc)
            },
            MSG_MESSAGES,
        )
    }

    pub fn project_documents(&self, project_id: Option<&str>) -> LiveQuery<ProjectDocument> {
        self.live(
            project_id,
            |id| {
                Query::collection("documents")
                    .filter_eq("projectId", id)
                    .order_by("uploadedAt", Direction::Desc)
            },
            MSG_DOCUMENTS,
        )
    }

    pub fn company_ratings(&self, company_id: Option<&str>) -> LiveQuery<Rating> {
        self.live(
            company_id,
            |id| {
                Query::collection("ratings")
                    .filter_eq("companyId", id)
                    .order_by("createdAt", Direction::Desc)
            },
            MSG_RATINGS,
        )
    }

    /// Marketplace listing; unscoped by design.
    pub fn services(&self) -> LiveQuery<Service> {
        LiveQuery::spawn(
            self.store.subscribe(
                Query::collection("services").order_by("title", Direction::Asc),
            ),
            MSG_SERVICES,
        )
    }

    pub fn company_services(&self, company_id: Option<&str>) -> LiveQuery<Service> {
        self.live(
            company_id,
            |id| {
                Query::collection("services")
                    .filter_eq("companyId", id)
                    .order_by("title", Direction::Asc)
            },
            MSG_SERVICES,
        )
    }

    pub fn activities(&self, user_id: Option<&str>) -> LiveQuery<Activity> {
        self.live(
            user_id,
            |id| {
                Query::collection("activities")
                    .filter_eq("userId", id)
                    .order_by("timestamp", Direction::Desc)
                    .limit(20)
            },
            MSG_ACTIVITIES,
        )
    }

    /// Three-source aggregate for the dashboard header cards.
    pub fn dashboard_stats(&self, user_id: Option<&str>) -> StatsFeed {
        match user_id {
            None => StatsFeed::detached(),
            Some(id) => StatsFeed::spawn(&self.store, id),
        }
    }

    pub async fn create_invoice(&self, draft: NewInvoice) -> Result<String> {
        invoices::create_invoice(&self.store, draft).await
    }

    pub async fn update_invoice_status(
        &self,
        invoice_id: &str,
        status: InvoiceStatus,
    ) -> Result<()> {
        invoices::update_invoice_status(&self.store, invoice_id, status).await
    }

    pub async fn mark_invoice_sent(&self, invoice_id: &str) -> Result<()> {
        invoices::mark_invoice_sent(&self.store, invoice_id).await
    }

    /// Client support intake; tickets start open.
    pub async fn create_ticket(&self, draft: NewTicket) -> Result<String> {
        let fields = json!({
            "subject": draft.subject,
            "message": draft.message,
            "status": crate::models::TicketStatus::Open,
            "priority": draft.priority,
            "authorId": draft.author_id,
            "createdAt": server_timestamp(),
        });
        self.store
            .add_doc("tickets", fields)
            .await
            .context("Create ticket")
    }

    pub async fn send_message(&self, project_id: &str, draft: NewMessage) -> Result<String> {
        let fields = json!({
            "senderId": draft.sender_id,
            "senderName": draft.sender_name,
            "projectId": project_id,
            "message": draft.message,
            "timestamp": server_timestamp(),
        });
        self.store
            .add_doc(&format!("messages/{}/messages", project_id), fields)
            .await
            .context("Send message")
    }

    /// Append-only feed entry behind the recent-activity card.
    pub async fn log_activity(
        &self,
        user_id: &str,
        kind: &str,
        description: &str,
        order_id: Option<&str>,
    ) -> Result<String> {
        let fields = json!({
            "type": kind,
            "description": description,
            "timestamp": server_timestamp(),
            "userId": user_id,
            "orderId": order_id,
        });
        self.store
            .add_doc("activities", fields)
            .await
            .context("Log activity")
    }

    /// One-shot read of the precomputed monthly series.
    pub async fn monthly_stats(&self) -> Result<Vec<MonthlyStats>> {
        let docs = self
            .store
            .get_docs(
                Query::collection("statistics/monthly_stats")
                    .order_by("month", Direction::Asc),
            )
            .await
            .context("Load monthly stats")?;
        Ok(decode_snapshot(&docs))
    }
}
