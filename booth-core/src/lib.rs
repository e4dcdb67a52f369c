//! Booth Core - consistency and identity core of the photo booth platform
//!
//! # Overview
//!
//! - **Identity** (`identity`): resolves legacy ids, UUID ids, event
//!   references and slugs to one legacy account id
//! - **Document store** (`docstore`, `repository`): CouchDB adapter and typed
//!   event/photo repositories; the authoritative copy
//! - **Mirror** (`mirror`): PostgreSQL `events` / `processed_photos` copies
//! - **Sync** (`sync`): dual writes, document first, mirror tolerated
//! - **Ledger** (`ledger`): row-locked token charges and credits
//!
//! ```text
//! booth-core/src/
//! ├── config.rs      # Environment configuration
//! ├── logger.rs      # tracing setup, audit log
//! ├── error.rs       # CoreError, SyncReport
//! ├── state.rs       # Service wiring
//! ├── docstore/      # DocumentStore trait, CouchDB + memory
//! ├── repository/    # Event and photo repositories
//! ├── mirror/        # RelationalMirror trait, PostgreSQL + memory
//! ├── identity/      # IdentityResolver, account directories
//! ├── ledger/        # TokenLedger, pricing, ledger stores
//! └── sync/          # DualWriteSynchronizer, MirrorReconciler
//! ```

pub mod config;
pub mod docstore;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod logger;
pub mod mirror;
pub mod repository;
pub mod state;
pub mod sync;

pub use config::Config;
pub use error::{
    CoreError, CoreResult, MirrorWrite, RecoverableSyncError, SyncReport, SyncStage,
};
pub use identity::IdentityResolver;
pub use ledger::TokenLedger;
pub use logger::{cleanup_old_logs, init_logger, init_logger_with_file};
pub use state::{CoreServices, MemoryServices};
pub use sync::{DualWriteSynchronizer, MirrorReconciler};
