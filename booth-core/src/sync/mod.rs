//! Dual-Write Synchronizer
//!
//! The document store is authoritative: a failed document write aborts the
//! operation. The relational mirror is written afterwards and its failures
//! are logged and reported in [`SyncReport::mirror`], never raised.

pub mod merge;
pub mod photos;
pub mod reconcile;

pub use reconcile::{MirrorReconciler, ReconcileStats};

use shared::models::{
    AccountId, CallerRef, EVENT_DOC_TYPE, EventCreate, EventDocument, EventPatch,
    is_client_writable,
};
use shared::util::now_rfc3339;
use std::sync::Arc;

use crate::error::{
    CoreError, CoreResult, MirrorWrite, RecoverableSyncError, SyncReport, SyncStage,
};
use crate::identity::IdentityResolver;
use crate::mirror::{EventUpsert, RelationalMirror};
use crate::repository::{EventRepository, PhotoRepository, events::dedupe_by_slug};

type MirrorOutcome = Result<MirrorWrite, RecoverableSyncError>;

#[derive(Clone)]
pub struct DualWriteSynchronizer {
    resolver: IdentityResolver,
    events: EventRepository,
    photos: PhotoRepository,
    mirror: Arc<dyn RelationalMirror>,
}

impl DualWriteSynchronizer {
    pub fn new(
        resolver: IdentityResolver,
        events: EventRepository,
        photos: PhotoRepository,
        mirror: Arc<dyn RelationalMirror>,
    ) -> Self {
        Self {
            resolver,
            events,
            photos,
            mirror,
        }
    }

    pub fn events(&self) -> &EventRepository {
        &self.events
    }

    // =========================================================================
    // Event writes
    // =========================================================================

    pub async fn create_event(
        &self,
        caller: &CallerRef,
        input: EventCreate,
    ) -> CoreResult<SyncReport<EventDocument>> {
        let slug = input.slug.trim().to_string();
        if slug.is_empty() {
            return Err(CoreError::Validation("event slug is required".into()));
        }

        let account = self.resolver.resolve_account(caller).await?;
        let owner = account.id.to_string();

        if self.events.find_by_owner_slug(&owner, &slug).await?.is_some() {
            return Err(CoreError::Duplicate(format!(
                "event '{}' for owner {}",
                slug, owner
            )));
        }

        // Owner, identity and mirror fields come from the resolved account only
        let mut extra = input.extra;
        extra.retain(|key, _| is_client_writable(key));

        let now = now_rfc3339();
        let doc = EventDocument {
            id: EventDocument::doc_id_for(&owner, &slug),
            rev: None,
            doc_type: EVENT_DOC_TYPE.to_string(),
            user_id: owner,
            slug,
            title: input.title,
            description: input.description,
            start_date: input.start_date,
            end_date: input.end_date,
            is_active: input.is_active.unwrap_or(true),
            theme: input.theme,
            templates: input.templates,
            branding: input.branding,
            settings: input.settings,
            mirror_ref: None,
            user_slug: account.slug,
            username: account.username,
            user_full_name: account.full_name,
            created_at: now.clone(),
            updated_at: now,
            extra,
        };

        let created = self.events.create(&doc).await?;
        tracing::info!(
            account_id = account.id,
            event_id = %created.id,
            slug = %created.slug,
            "Event created"
        );

        let (created, mirror) = self.sync_event_row(account.id, created).await;
        Ok(SyncReport::new(created, mirror))
    }

    pub async fn update_event(
        &self,
        caller: &CallerRef,
        doc_id: &str,
        patch: EventPatch,
    ) -> CoreResult<SyncReport<EventDocument>> {
        let caller_id = self.resolver.resolve(caller).await?;
        let patch = merge::sanitize_patch(patch);

        let mut retried = false;
        let (owner, saved) = loop {
            let current = self
                .events
                .find_by_id(doc_id)
                .await?
                .ok_or_else(|| CoreError::event_not_found(doc_id))?;
            let owner = self.ensure_owner(caller_id, &current).await?;

            let mut merged = merge::merge_patch(&current, &patch, &now_rfc3339())?;
            if merged.mirror_ref.is_none() {
                merged.mirror_ref = self.lookup_mirror_id(owner, &merged.slug).await;
            }

            match self.events.update(&merged).await {
                Ok(saved) => break (owner, saved),
                Err(CoreError::StaleRevision(_)) if !retried => {
                    tracing::debug!(event_id = %doc_id, "Stale revision, retrying update");
                    retried = true;
                }
                Err(e) => return Err(e),
            }
        };

        tracing::info!(account_id = owner, event_id = %saved.id, "Event updated");
        let (saved, mirror) = self.sync_event_row(owner, saved).await;
        Ok(SyncReport::new(saved, mirror))
    }

    pub async fn delete_event(
        &self,
        caller: &CallerRef,
        doc_id: &str,
    ) -> CoreResult<SyncReport<EventDocument>> {
        let caller_id = self.resolver.resolve(caller).await?;

        let mut retried = false;
        let (owner, deleted) = loop {
            let current = self
                .events
                .find_by_id(doc_id)
                .await?
                .ok_or_else(|| CoreError::event_not_found(doc_id))?;
            let owner = self.ensure_owner(caller_id, &current).await?;

            match self.events.delete(&current).await {
                Ok(()) => break (owner, current),
                Err(CoreError::StaleRevision(_)) if !retried => {
                    tracing::debug!(event_id = %doc_id, "Stale revision, retrying delete");
                    retried = true;
                }
                Err(e) => return Err(e),
            }
        };
        tracing::info!(account_id = owner, event_id = %deleted.id, "Event deleted");

        let mirror_id = match deleted.mirror_ref {
            Some(id) => Some(id),
            None => match self.mirror.find_event_id(owner, &deleted.slug).await {
                Ok(id) => id,
                Err(e) => {
                    return Ok(SyncReport::new(
                        deleted.clone(),
                        Err(self.mirror_failed(SyncStage::Delete, &deleted.id, e)),
                    ));
                }
            },
        };

        let mirror = match mirror_id {
            None => Ok(MirrorWrite::Skipped),
            Some(id) => match self.mirror.delete_event(owner, id).await {
                Ok(rows) => Ok(MirrorWrite::Deleted { rows }),
                Err(e) => Err(self.mirror_failed(SyncStage::Delete, &deleted.id, e)),
            },
        };
        Ok(SyncReport::new(deleted, mirror))
    }

    // =========================================================================
    // Event reads
    // =========================================================================

    /// Event of an owner by slug
    pub async fn get_event_by_slug(
        &self,
        owner: &CallerRef,
        slug: &str,
    ) -> CoreResult<EventDocument> {
        let owner_id = self.resolver.resolve(owner).await?;
        if let Some(doc) = self
            .events
            .find_by_owner_slug(&owner_id.to_string(), slug)
            .await?
        {
            return Ok(doc);
        }
        self.find_by_owner_slug_fallback(owner, owner_id, slug)
            .await?
            .ok_or_else(|| CoreError::event_not_found(slug))
    }

    /// Documents whose `user_id` predates owner normalization (a UUID id or
    /// another legacy form) only match on the denormalized `user_slug`.
    async fn find_by_owner_slug_fallback(
        &self,
        owner: &CallerRef,
        owner_id: AccountId,
        slug: &str,
    ) -> CoreResult<Option<EventDocument>> {
        let owner_slug = match owner {
            CallerRef::Slug(s) => Some(s.clone()),
            _ => self
                .resolver
                .directory()
                .legacy_by_id(owner_id)
                .await?
                .and_then(|a| a.slug),
        };
        let Some(owner_slug) = owner_slug else {
            return Ok(None);
        };

        let found = self.events.find_by_owner_slug_field(&owner_slug, slug).await?;
        if found.is_some() {
            tracing::debug!(owner_slug = %owner_slug, slug = %slug, "Event found by owner slug field");
        }
        Ok(found)
    }

    /// Active event for public display, enriched with current owner data
    pub async fn get_public_event(&self, owner_slug: &str, slug: &str) -> CoreResult<EventDocument> {
        let owner_ref = CallerRef::Slug(owner_slug.to_string());
        let owner_id = match self.resolver.resolve(&owner_ref).await {
            Ok(id) => id,
            Err(CoreError::Unresolvable(_)) => return Err(CoreError::event_not_found(slug)),
            Err(e) => return Err(e),
        };

        let mut doc = self.get_event_by_slug(&owner_ref, slug).await?;
        if !doc.is_active {
            return Err(CoreError::event_not_found(slug));
        }

        if let Some(account) = self.resolver.directory().legacy_by_id(owner_id).await? {
            doc.username = account.username.or(doc.username);
            doc.user_full_name = account.full_name.or(doc.user_full_name);
            doc.user_slug = account.slug.or(doc.user_slug);
        }

        if doc.mirror_ref.is_none() {
            if let Some(mirror_id) = self.lookup_mirror_id(owner_id, &doc.slug).await {
                doc.mirror_ref = Some(mirror_id);
                self.backfill_quietly(&doc.id, mirror_id).await;
            }
        }
        Ok(doc)
    }

    /// All live events of an owner, one per slug, newest first
    pub async fn list_events(&self, owner: &CallerRef) -> CoreResult<Vec<EventDocument>> {
        let owner_id = self.resolver.resolve(owner).await?;
        let mut docs = self.events.list_by_owner(&owner_id.to_string()).await?;
        if let CallerRef::Uuid(uuid_id) = owner {
            docs.extend(self.events.list_by_owner(uuid_id).await?);
        }
        Ok(dedupe_by_slug(docs))
    }

    // =========================================================================
    // Mirror side
    // =========================================================================

    /// Upsert the event row and store the assigned id on the document once
    pub(crate) async fn sync_event_row(
        &self,
        owner: AccountId,
        doc: EventDocument,
    ) -> (EventDocument, MirrorOutcome) {
        let row = EventUpsert::from_document(owner, &doc);
        let mirror_id = match self.mirror.upsert_event(&row).await {
            Ok(id) => id,
            Err(e) => {
                let err = self.mirror_failed(SyncStage::Upsert, &doc.id, e);
                return (doc, Err(err));
            }
        };

        if let Some(existing) = doc.mirror_ref {
            if existing != mirror_id {
                tracing::warn!(
                    event_id = %doc.id,
                    mirror_ref = existing,
                    mirror_id,
                    "Document points at a different mirror row; keeping its reference"
                );
            }
            return (
                doc,
                Ok(MirrorWrite::Upserted {
                    mirror_id,
                    backfilled: false,
                }),
            );
        }

        match self.backfill_mirror_ref(&doc, mirror_id).await {
            Ok(saved) => (
                saved,
                Ok(MirrorWrite::Upserted {
                    mirror_id,
                    backfilled: true,
                }),
            ),
            Err(e) => {
                let err = self.mirror_failed(SyncStage::Backfill, &doc.id, e);
                (doc, Err(err))
            }
        }
    }

    /// Write `mirror_ref` onto the document, re-reading once on a stale revision
    async fn backfill_mirror_ref(&self, doc: &EventDocument, mirror_id: i64) -> CoreResult<EventDocument> {
        let mut target = doc.clone();
        target.mirror_ref = Some(mirror_id);
        match self.events.update(&target).await {
            Err(CoreError::StaleRevision(_)) => {}
            other => return other,
        }

        let mut fresh = self
            .events
            .find_by_id(&doc.id)
            .await?
            .ok_or_else(|| CoreError::event_not_found(&doc.id))?;
        if fresh.mirror_ref.is_some() {
            return Ok(fresh);
        }
        fresh.mirror_ref = Some(mirror_id);
        self.events.update(&fresh).await
    }

    async fn backfill_quietly(&self, doc_id: &str, mirror_id: i64) {
        let result = match self.events.find_by_id(doc_id).await {
            Ok(Some(doc)) if doc.mirror_ref.is_none() => {
                self.backfill_mirror_ref(&doc, mirror_id).await.map(|_| ())
            }
            Ok(_) => Ok(()),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::warn!(event_id = %doc_id, error = %e, "Mirror reference backfill failed");
        }
    }

    /// Mirror id for `(owner, slug)`; lookup failures count as unknown
    async fn lookup_mirror_id(&self, owner: AccountId, slug: &str) -> Option<i64> {
        match self.mirror.find_event_id(owner, slug).await {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(account_id = owner, slug = %slug, error = %e, "Mirror lookup failed");
                None
            }
        }
    }

    fn mirror_failed(
        &self,
        stage: SyncStage,
        doc_id: &str,
        reason: impl std::fmt::Display,
    ) -> RecoverableSyncError {
        tracing::warn!(event_id = %doc_id, stage = %stage, error = %reason, "Mirror sync failed");
        RecoverableSyncError::mirror(stage, doc_id, reason)
    }

    /// Resolved owner of a document, which must be the caller
    async fn ensure_owner(&self, caller_id: AccountId, doc: &EventDocument) -> CoreResult<AccountId> {
        self.ensure_owner_field(caller_id, &doc.user_id, &doc.id).await
    }

    pub(crate) async fn ensure_owner_field(
        &self,
        caller_id: AccountId,
        owner_field: &str,
        resource: &str,
    ) -> CoreResult<AccountId> {
        let denied = || CoreError::OwnershipDenied {
            caller: caller_id,
            resource: resource.to_string(),
        };
        match self.resolver.resolve_owner_field(owner_field).await {
            Ok(owner) if owner == caller_id => Ok(owner),
            Ok(_) | Err(CoreError::Unresolvable(_)) => Err(denied()),
            Err(e) => Err(e),
        }
    }
}
