use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use crate::models::{
    DashboardStats, Invoice, InvoiceStatus, Project, ProjectStatus, SupportTicket, TicketStatus,
};
use crate::services::decode::{decode_snapshot, Decode};
use crate::store::{Direction, Query, SnapshotEvent, StoreClient, Subscription, SubscriptionGuard};

/// `loading` stays true until each of the three sources (projects, tickets,
/// invoices) has settled at least once.
#[derive(Debug, Clone, Default)]
pub struct StatsState {
    pub stats: DashboardStats,
    pub loading: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Source {
    Projects,
    Invoices,
    Tickets,
}

/// Tagged partial update from one source fold. Each variant owns a disjoint
/// slice of `DashboardStats`. `Settled` marks an errored source: its slice
/// freezes at the last-known value but still counts toward completion.
enum StatsDelta {
    Projects {
        total: u32,
        active: u32,
        completed: u32,
    },
    Invoices {
        revenue: f64,
        pending: f64,
    },
    Tickets {
        open: u32,
        resolved: u32,
    },
    Settled(Source),
}

impl StatsDelta {
    fn source(&self) -> Source {
        match self {
            StatsDelta::Projects { .. } => Source::Projects,
            StatsDelta::Invoices { .. } => Source::Invoices,
            StatsDelta::Tickets { .. } => Source::Tickets,
            StatsDelta::Settled(source) => *source,
        }
    }
}

/// Dropping the feed releases all three store subscriptions.
pub struct StatsFeed {
    rx: watch::Receiver<StatsState>,
    _guards: Vec<SubscriptionGuard>,
}

impl StatsFeed {
    pub fn current(&self) -> StatsState {
        self.rx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<StatsState> {
        self.rx.clone()
    }

    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }

    pub(crate) fn detached() -> Self {
        let (_tx, rx) = watch::channel(StatsState::default());
        StatsFeed {
            rx,
            _guards: Vec::new(),
        }
    }

    pub(crate) fn spawn(store: &Arc<dyn StoreClient>, user_id: &str) -> Self {
        let (delta_tx, mut delta_rx) = mpsc::unbounded_channel();
        let mut guards = Vec::with_capacity(3);

        let projects = store.subscribe(
            Query::collection("projects")
                .filter_eq("ownerId", user_id)
                .order_by("createdAt", Direction::Desc),
        );
        guards.push(spawn_fold(projects, delta_tx.clone(), Source::Projects, fold_projects));

        let tickets = store.subscribe(
            Query::collection("tickets")
                .filter_eq("authorId", user_id)
                .order_by("createdAt", Direction::Desc),
        );
        guards.push(spawn_fold(tickets, delta_tx.clone(), Source::Tickets, fold_tickets));

        let invoices = store.subscribe(
            Query::collection("invoices")
                .filter_eq("userId", user_id)
                .order_by("createdAt", Direction::Desc),
        );
        guards.push(spawn_fold(invoices, delta_tx, Source::Invoices, fold_invoices));

        let (tx, rx) = watch::channel(StatsState {
            stats: DashboardStats::default(),
            loading: true,
        });

        tokio::spawn(async move {
            let mut settled: HashSet<Source> = HashSet::new();
            let mut stats = DashboardStats::default();
            while let Some(delta) = delta_rx.recv().await {
                settled.insert(delta.source());
                apply_delta(&mut stats, delta);
                let next = StatsState {
                    stats: stats.clone(),
                    loading: settled.len() < 3,
                };
                if tx.send(next).is_err() {
                    break;
                }
            }
        });

        StatsFeed {
            rx,
            _guards: guards,
        }
    }
}

fn apply_delta(stats: &mut DashboardStats, delta: StatsDelta) {
    match delta {
        StatsDelta::Projects {
            total,
            active,
            completed,
        } => {
            stats.total_projects = total;
            stats.active_projects = active;
            stats.completed_projects = completed;
        }
        StatsDelta::Invoices { revenue, pending } => {
            stats.total_revenue = revenue;
            stats.pending_invoices = pending;
        }
        StatsDelta::Tickets { open, resolved } => {
            stats.open_tickets = open;
            stats.resolved_tickets = resolved;
        }
        StatsDelta::Settled(_) => {}
    }
}

fn spawn_fold<T: Decode>(
    subscription: Subscription,
    delta_tx: mpsc::UnboundedSender<StatsDelta>,
    source: Source,
    fold: fn(&[T]) -> StatsDelta,
) -> SubscriptionGuard {
    let Subscription { mut events, guard } = subscription;
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let delta = match event {
                SnapshotEvent::Snapshot(docs) => fold(&decode_snapshot::<T>(&docs)),
                SnapshotEvent::Error(err) => {
                    // The slice stops updating, the aggregate keeps going.
                    tracing::error!(?source, error = %err, "stats source failed");
                    StatsDelta::Settled(source)
                }
            };
            if delta_tx.send(delta).is_err() {
                break;
            }
        }
    });
    guard
}

fn fold_projects(projects: &[Project]) -> StatsDelta {
    // on-hold and unknown statuses count toward the total but neither bucket.
    StatsDelta::Projects {
        total: projects.len() as u32,
        active: projects
            .iter()
            .filter(|p| p.status == ProjectStatus::Active)
            .count() as u32,
        completed: projects
            .iter()
            .filter(|p| p.status == ProjectStatus::Completed)
            .count() as u32,
    }
}

fn fold_invoices(invoices: &[Invoice]) -> StatsDelta {
    // pending_invoices is an amount owed, not a count.
    StatsDelta::Invoices {
        revenue: invoices
            .iter()
            .filter(|i| i.status == InvoiceStatus::Paid)
            .map(|i| i.amount)
            .sum(),
        pending: invoices
            .iter()
            .filter(|i| matches!(i.status, InvoiceStatus::Pending | InvoiceStatus::Overdue))
            .map(|i| i.amount)
            .sum(),
    }
}

fn fold_tickets(tickets: &[SupportTicket]) -> StatsDelta {
    StatsDelta::Tickets {
        open: tickets
            .iter()
            .filter(|t| matches!(t.status, TicketStatus::Open | TicketStatus::InProgress))
            .count() as u32,
        resolved: tickets
            .iter()
            .filter(|t| matches!(t.status, TicketStatus::Resolved | TicketStatus::Closed))
            .count() as u32,
    }
}
