//! Live-query data layer for the ArabShield client portal: typed entity
//! records, owner-scoped store subscriptions, and the dashboard statistics
//! aggregate, backed by a pluggable document-store client.

pub mod models;
pub mod services;
pub mod store;
pub mod utils;

pub use models::{
    Activity, ChatMessage, DashboardStats, Invoice, InvoiceStatus, MonthlyStats, NewInvoice,
    NewMessage, NewTicket, Project, ProjectDocument, ProjectStatus, Rating, Service,
    SupportTicket, Task, TaskStatus, TicketPriority, TicketStatus,
};
pub use services::dashboard::{StatsFeed, StatsState};
pub use services::live::{LiveQuery, QueryState};
pub use services::state::Portal;
pub use store::{
    server_timestamp, Direction, MemoryStore, Query, RestConfig, RestStore, SnapshotEvent,
    StoreClient, StoreError, StoredDoc, Subscription, SubscriptionGuard,
};
