pub mod dashboard;
pub mod decode;
pub mod invoices;
pub mod live;
pub mod state;
