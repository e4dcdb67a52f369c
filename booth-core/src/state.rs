//! Service wiring
//!
//! Builds every component once and hands out cheap clones. Handles are
//! injected through constructors; nothing here is a global.

use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::{BoxError, Config};
use crate::docstore::{CouchDocumentStore, DocumentStore, MemoryDocumentStore};
use crate::identity::{IdentityResolver, MemoryAccountStore, PgAccountStore};
use crate::ledger::{PgLedgerStore, TokenLedger};
use crate::mirror::{MemoryMirror, PgMirror, RelationalMirror};
use crate::repository::{EventRepository, PhotoRepository};
use crate::sync::{DualWriteSynchronizer, MirrorReconciler};

#[derive(Clone)]
pub struct CoreServices {
    pub resolver: IdentityResolver,
    pub sync: DualWriteSynchronizer,
    pub ledger: TokenLedger,
    reconcile_batch_size: usize,
    reconcile_interval: Option<std::time::Duration>,
}

impl CoreServices {
    /// Connect to PostgreSQL and CouchDB, run migrations, register indexes
    pub async fn connect(config: &Config) -> Result<Self, BoxError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .acquire_timeout(config.db_acquire_timeout())
            .connect(&config.database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("PostgreSQL ready");

        let events_db = CouchDocumentStore::new(
            &config.couchdb_url,
            &config.couchdb_events_db,
            &config.couchdb_user,
            &config.couchdb_password,
            config.couchdb_timeout(),
        )?;
        let photos_db = CouchDocumentStore::new(
            &config.couchdb_url,
            &config.couchdb_photos_db,
            &config.couchdb_user,
            &config.couchdb_password,
            config.couchdb_timeout(),
        )?;
        futures::try_join!(events_db.ensure_database(), photos_db.ensure_database())?;

        let events = EventRepository::new(Arc::new(events_db));
        let photos = PhotoRepository::new(Arc::new(photos_db));
        futures::try_join!(events.ensure_indexes(), photos.ensure_indexes())?;
        tracing::info!(
            events_db = %config.couchdb_events_db,
            photos_db = %config.couchdb_photos_db,
            "CouchDB ready"
        );

        let accounts = PgAccountStore::new(pool.clone());
        let resolver = IdentityResolver::new(
            Arc::new(accounts),
            events.clone(),
            config.default_token_allotment,
        );
        let ledger = TokenLedger::new(
            Arc::new(PgLedgerStore::new(pool.clone())),
            resolver.clone(),
            config.ledger_lock_timeout(),
        );
        let sync = DualWriteSynchronizer::new(
            resolver.clone(),
            events,
            photos,
            Arc::new(PgMirror::new(pool)),
        );

        Ok(Self {
            resolver,
            sync,
            ledger,
            reconcile_batch_size: config.reconcile_batch_size,
            reconcile_interval: config.reconcile_interval(),
        })
    }

    /// Reconciler configured for this deployment, `None` when disabled
    pub fn reconciler(&self, shutdown: CancellationToken) -> Option<MirrorReconciler> {
        let interval = self.reconcile_interval?;
        Some(MirrorReconciler::new(
            self.sync.clone(),
            self.reconcile_batch_size,
            interval,
            shutdown,
        ))
    }
}

/// Services over in-memory stores, with handles for inspection and fault injection
#[derive(Clone)]
pub struct MemoryServices {
    pub services: CoreServices,
    pub accounts: MemoryAccountStore,
    pub events_db: MemoryDocumentStore,
    pub photos_db: MemoryDocumentStore,
    pub mirror: MemoryMirror,
}

impl CoreServices {
    pub fn in_memory(config: &Config) -> MemoryServices {
        let accounts = MemoryAccountStore::new();
        let events_db = MemoryDocumentStore::new(config.couchdb_events_db.clone());
        let photos_db = MemoryDocumentStore::new(config.couchdb_photos_db.clone());
        let mirror = MemoryMirror::new();

        let events_store: Arc<dyn DocumentStore> = Arc::new(events_db.clone());
        let photos_store: Arc<dyn DocumentStore> = Arc::new(photos_db.clone());
        let events = EventRepository::new(events_store);
        let photos = PhotoRepository::new(photos_store);

        let resolver = IdentityResolver::new(
            Arc::new(accounts.clone()),
            events.clone(),
            config.default_token_allotment,
        );
        let ledger = TokenLedger::new(
            Arc::new(accounts.clone()),
            resolver.clone(),
            config.ledger_lock_timeout(),
        );
        let mirror_handle: Arc<dyn RelationalMirror> = Arc::new(mirror.clone());
        let sync = DualWriteSynchronizer::new(resolver.clone(), events, photos, mirror_handle);

        MemoryServices {
            services: Self {
                resolver,
                sync,
                ledger,
                reconcile_batch_size: config.reconcile_batch_size,
                reconcile_interval: config.reconcile_interval(),
            },
            accounts,
            events_db,
            photos_db,
            mirror,
        }
    }
}
