use jsonschema::JSONSchema;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::models::{
    Activity, ChatMessage, Invoice, MonthlyStats, Project, ProjectDocument, Rating, Service,
    SupportTicket, Task,
};
use crate::store::StoredDoc;

/// Validating decode at the subscription boundary. The store hands back
/// untyped documents; a malformed one is skipped and logged instead of
/// letting missing fields leak into published state.
pub trait Decode: DeserializeOwned + Send + Sync + 'static {
    fn label() -> &'static str;
    fn schema() -> &'static JSONSchema;
}

fn compile(schema: Value) -> JSONSchema {
    JSONSchema::compile(&schema).expect("Invalid JSON schema")
}

macro_rules! decode_impl {
    ($type:ty, $label:literal, $schema:expr) => {
        impl Decode for $type {
            fn label() -> &'static str {
                $label
            }

            fn schema() -> &'static JSONSchema {
                static SCHEMA: std::sync::OnceLock<JSONSchema> = std::sync::OnceLock::new();
                SCHEMA.get_or_init(|| compile($schema))
            }
        }
    };
}

decode_impl!(
    Project,
    "projects",
    json!({
        "type": "object",
        "required": ["id", "title", "ownerId", "status", "progress", "createdAt"],
        "properties": {
            "id": {"type": "string"},
            "title": {"type": "string"},
            "ownerId": {"type": "string"},
            "status": {"type": "string"},
            "progress": {"type": "number", "minimum": 0, "maximum": 100},
            "createdAt": {"type": "string"}
        }
    })
);

decode_impl!(
    Invoice,
    "invoices",
    json!({
        "type": "object",
        "required": ["id", "userId", "amount", "currency", "status", "dueDate", "createdAt"],
        "properties": {
            "id": {"type": "string"},
            "projectId": {"type": ["string", "null"]},
            "userId": {"type": "string"},
            "amount": {"type": "number"},
            "currency": {"type": "string"},
            "status": {"type": "string"},
            "dueDate": {"type": "string"},
            "createdAt": {"type": "string"},
            "sentAt": {"type": ["string", "null"]}
        }
    })
);

decode_impl!(
    SupportTicket,
    "tickets",
    json!({
        "type": "object",
        "required": ["id", "subject", "message", "status", "priority", "authorId", "createdAt"],
        "properties": {
            "id": {"type": "string"},
            "subject": {"type": "string"},
            "message": {"type": "string"},
            "status": {"type": "string"},
            "priority": {"type": "string"},
            "authorId": {"type": "string"},
            "createdAt": {"type": "string"}
        }
    })
);

decode_impl!(
    Task,
    "tasks",
    json!({
        "type": "object",
        "required": ["id", "title", "status", "deadline", "assignedTo", "projectId", "createdAt"],
        "properties": {
            "id": {"type": "string"},
            "title": {"type": "string"},
            "status": {"type": "string"},
            "deadline": {"type": "string"},
            "assignedTo": {"type": "string"},
            "projectId": {"type": "string"},
            "createdAt": {"type": "string"}
        }
    })
);

decode_impl!(
    Activity,
    "activities",
    json!({
        "type": "object",
        "required": ["id", "type", "description", "timestamp"],
        "properties": {
            "id": {"type": "string"},
            "type": {"type": "string"},
            "description": {"type": "string"},
            "timestamp": {"type": "string"},
            "userId": {"type": ["string", "null"]},
            "orderId": {"type": ["string", "null"]}
        }
    })
);

decode_impl!(
    ChatMessage,
    "messages",
    json!({
        "type": "object",
        "required": ["id", "senderId", "senderName", "projectId", "message", "timestamp"],
        "properties": {
            "id": {"type": "string"},
            "senderId": {"type": "string"},
            "senderName": {"type": "string"},
            "projectId": {"type": "string"},
            "message": {"type": "string"},
            "timestamp": {"type": "string"}
        }
    })
);

decode_impl!(
    ProjectDocument,
    "documents",
    json!({
        "type": "object",
        "required": ["id", "projectId", "filename", "fileUrl", "fileSize", "fileType", "uploadedBy", "uploadedAt"],
        "properties": {
            "id": {"type": "string"},
            "projectId": {"type": "string"},
            "filename": {"type": "string"},
            "fileUrl": {"type": "string"},
            "fileSize": {"type": "number", "minimum": 0},
            "fileType": {"type": "string"},
            "uploadedBy": {"type": "string"},
            "uploadedAt": {"type": "string"},
            "folder": {"type": ["string", "null"]}
        }
    })
);

decode_impl!(
    Rating,
    "ratings",
    json!({
        "type": "object",
        "required": ["id", "companyId", "userId", "userName", "score", "comment", "createdAt"],
        "properties": {
            "id": {"type": "string"},
            "companyId": {"type": "string"},
            "userId": {"type": "string"},
            "userName": {"type": "string"},
            "score": {"type": "number", "minimum": 1, "maximum": 5},
            "comment": {"type": "string"},
            "createdAt": {"type": "string"}
        }
    })
);

decode_impl!(
    Service,
    "services",
    json!({
        "type": "object",
        "required": ["id", "companyId", "companyName", "title", "description", "price", "currency", "category"],
        "properties": {
            "id": {"type": "string"},
            "companyId": {"type": "string"},
            "companyName": {"type": "string"},
            "title": {"type": "string"},
            "description": {"type": "string"},
            "price": {"type": "number"},
            "currency": {"type": "string"},
            "category": {"type": "string"},
            "tags": {"type": "array", "items": {"type": "string"}},
            "featured": {"type": ["boolean", "null"]}
        }
    })
);

decode_impl!(
    MonthlyStats,
    "statistics/monthly_stats",
    json!({
        "type": "object",
        "required": ["id", "month", "revenue"],
        "properties": {
            "id": {"type": "string"},
            "month": {"type": "string"},
            "revenue": {"type": "number"},
            "newClients": {"type": "number", "minimum": 0},
            "completedProjects": {"type": "number", "minimum": 0}
        }
    })
);

pub fn decode_doc<T: Decode>(doc: &StoredDoc) -> Option<T> {
    let mut value = doc.fields.clone();
    match value.as_object_mut() {
        Some(map) => {
            map.insert("id".to_string(), Value::String(doc.id.clone()));
        }
        None => {
            tracing::warn!(collection = T::label(), id = %doc.id, "document is not an object, skipping");
            return None;
        }
    }

    if !T::schema().is_valid(&value) {
        tracing::warn!(collection = T::label(), id = %doc.id, "document failed schema check, skipping");
        return None;
    }

    match serde_json::from_value(value) {
        Ok(record) => Some(record),
        Err(err) => {
            tracing::warn!(collection = T::label(), id = %doc.id, error = %err, "document failed decode, skipping");
            None
        }
    }
}

pub fn decode_snapshot<T: Decode>(docs: &[StoredDoc]) -> Vec<T> {
    docs.iter().filter_map(decode_doc::<T>).collect()
}
