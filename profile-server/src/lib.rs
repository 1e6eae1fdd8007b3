//! A GraphQL server for profile documents, with subscriptions for created and updated
//! profiles.

#![deny(missing_docs, rustdoc::broken_intra_doc_links)]

pub mod bus;
pub mod config;
pub mod context;
pub mod graphql;
pub mod http;
pub mod metrics;
pub mod profile;
pub mod server;
pub mod state;
pub mod store;

// Re-export to be able to construct your own profile server
pub use store::{ProfileCollection, ProfileDb, ProfileStore};
