//! Broker core crate - shared error type, configuration, and the property catalog.
//!
//! Every other crate in the workspace depends on the types defined here: the
//! immutable [`Property`] record loaded from the catalog file, its public
//! [`Listing`] projection, and the read-only catalog views.

pub mod catalog;
pub mod config;
pub mod error;
pub mod types;

pub use catalog::{Catalog, CatalogPage, CatalogQuery, Pagination};
pub use config::BrokerConfig;
pub use error::{BrokerError, Result};
pub use types::*;
