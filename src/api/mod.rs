//! Remote endpoint access: dispatcher, typed client, wire types, errors.

pub mod client;
pub mod dispatcher;
pub mod error;
pub mod types;

#[cfg(test)]
pub(crate) mod testutil;

pub use client::InventoryClient;
pub use dispatcher::{Dispatcher, RequestDescriptor, Transport};
pub use error::ApiError;
pub use types::ReportFilters;
