use anyhow::{Context, Result};
use serde_json::json;
use std::sync::Arc;

use crate::models::{InvoiceStatus, NewInvoice};
use crate::store::{server_timestamp, StoreClient};

/// Creates an invoice document. Amount is immutable after creation; later
/// changes go through status updates only. Failures propagate to the caller
/// (the submit handler decides whether to retry or alert).
pub async fn create_invoice(store: &Arc<dyn StoreClient>, draft: NewInvoice) -> Result<String> {
    let fields = json!({
        "projectId": draft.project_id,
        "userId": draft.user_id,
        "amount": draft.amount,
        "currency": draft.currency,
        "status": InvoiceStatus::Pending,
        "dueDate": draft.due_date,
        "createdAt": server_timestamp(),
        "sentAt": null,
    });
    store
        .add_doc("invoices", fields)
        .await
        .context("Create invoice")
}

pub async fn update_invoice_status(
    store: &Arc<dyn StoreClient>,
    invoice_id: &str,
    status: InvoiceStatus,
) -> Result<()> {
    store
        .update_doc("invoices", invoice_id, json!({ "status": status }))
        .await
        .context("Update invoice status")
}

/// Stamps `sentAt` with the authoritative server time.
pub async fn mark_invoice_sent(store: &Arc<dyn StoreClient>, invoice_id: &str) -> Result<()> {
    store
        .update_doc("invoices", invoice_id, json!({ "sentAt": server_timestamp() }))
        .await
        .context("Mark invoice sent")
}
