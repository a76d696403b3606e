//! Order management: the store, the manager and their error type.

mod error;
mod manager;
mod store;

pub use error::OrderError;
pub use manager::OrderManager;
pub use store::{OrderStore, UpsertResponse};
