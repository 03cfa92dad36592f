//! Infrastructure layer: Postgres persistence and every transaction
//! boundary of the CRM.
//!
//! Layout:
//!
//! - [`config`] / [`schema`] — pool construction and idempotent DDL bootstrap;
//! - [`customers`], [`catalog`], [`orders`] — one store per aggregate, each a
//!   thin struct over the shared [`sqlx::PgPool`]; ledger and recalculation
//!   primitives take a caller-supplied transaction and never commit;
//! - [`placement`] — the Order Placement Transaction, the only code path
//!   that takes exclusive product-row locks;
//! - [`filters`] — predicate-set queries over customers, products, orders;
//! - [`stats`] — aggregate reads for the reporting jobs;
//! - [`seed`] — idempotent demo data.

pub mod catalog;
pub mod config;
pub mod customers;
pub mod error;
pub mod filters;
pub mod orders;
pub mod placement;
pub mod schema;
pub mod seed;
pub mod stats;

pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use placement::OrderPlacement;
