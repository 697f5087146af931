//! regdesk — delegate search and registration admin for conference ops.
//!
//! The crate turns two loosely structured HTTP feeds (registration rows and
//! aggregate KPIs) into a searchable, editable dashboard:
//!
//! - `normalize` folds messy upstream rows into canonical [`types::DelegateRow`]s
//! - `query` + `search` implement the typo-tolerant search syntax and ranking
//! - `kpi` reconciles the two aggregate sources and flags disagreement
//! - `editor` performs optimistic edits with rollback and a one-slot undo
//! - `feed` is the resilient HTTP layer; `dashboard` orchestrates a refresh
//! - `state` holds the shared in-memory view the CLI and poller operate on

pub mod audit;
pub mod config;
pub mod dashboard;
pub mod editor;
pub mod export;
pub mod feed;
pub mod health;
pub mod kpi;
pub mod normalize;
pub mod poller;
pub mod query;
pub mod search;
pub mod state;
pub mod text;
pub mod types;

pub use dashboard::{refresh, RefreshSummary};
pub use editor::{EditController, EditError};
pub use state::DashboardState;
pub use types::{DelegateRow, PaymentStatus, RowPatch};
