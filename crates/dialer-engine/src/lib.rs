//! # Dialer Engine
//!
//! Outbound call list queueing for a CRM. Agents pull the next dialable
//! record from a prioritized list, record what happened through a
//! disposition, and the engine decides whether the record is retried, moved,
//! finished or removed.
//!
//! ## Architecture
//!
//! ```text
//!              ┌────────────────────┐
//!              │   DialerEngine     │
//!              └─────────┬──────────┘
//!      ┌──────────┬──────┴─────┬────────────┬───────────┐
//!      ▼          ▼            ▼            ▼           ▼
//!  population   queue     disposition    session    dashboard
//!      │          │            │            │           │
//!      └──────────┴──────┬─────┴────────────┴───────────┘
//!                        ▼
//!              DatabaseManager (SQLite)
//! ```
//!
//! - [`population`]: creates lists and fills dynamic lists from a
//!   [`record_source::RecordSource`] through a [`filter::FilterExpr`]
//! - [`queue`]: hands eligible items to agents with an atomic claim
//! - [`disposition`]: applies outcome codes, writes the call log and runs
//!   side effects (list moves, CRM field updates, DNC)
//! - [`session`]: one open dialing session per agent, with pause tracking
//! - [`rules`]: list and disposition definitions plus the predefined seeds
//! - [`dashboard`]: read-only rollups per list
//! - [`api`]: axum HTTP surface over the engine
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dialer_engine::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> dialer_engine::Result<()> {
//!     let engine = DialerEngine::connect(DialerConfig::default()).await?;
//!     engine.ensure_predefined_dispositions().await?;
//!
//!     let list = engine
//!         .create_call_list(NewCallList::new("Trade Show", ListType::Static))
//!         .await?;
//!     engine.add_records_to_list(&list.id, &["lead-1".to_string()]).await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod config;
pub mod types;

pub mod filter;
pub mod record_source;
pub mod dnc;

pub mod database;

pub mod population;
pub mod queue;
pub mod disposition;
pub mod session;
pub mod rules;
pub mod dashboard;

pub mod engine;

pub mod api;
pub mod server;

pub use error::{DialerError, Result};
pub use config::DialerConfig;
pub use engine::DialerEngine;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{DialerConfig, DialerEngine, DialerError, Result};

    pub use crate::config::{ApiConfig, DatabaseConfig, LoggingConfig, PopulationConfig, QueueConfig};

    pub use crate::types::{
        AddedReason, CadenceType, CallList, CallListDisposition, CallListItem, CallLog, CallOutcome,
        CallSession, ItemStatus, ListType, NewCallList, NewCallListItem, NewDisposition, RecordKey,
        TargetObject,
    };

    pub use crate::filter::{Comparison, FilterExpr, TimeUnit};
    pub use crate::record_source::{InMemoryRecordSource, RecordSource, SourceRecord, SqliteRecordSource};
    pub use crate::dnc::{DncEntry, DncRegistry, RecordFlagDncRegistry};
    pub use crate::database::DatabaseManager;

    pub use crate::disposition::{
        DispositionAction, DispositionCatalog, DispositionOutcome, DispositionRequest, SideEffectFailure,
    };
    pub use crate::population::{AddItemsResult, RefreshResult};
    pub use crate::dashboard::{ListDashboard, StatusCounts};

    pub use chrono::{DateTime, Utc};
    pub use uuid::Uuid;
}
