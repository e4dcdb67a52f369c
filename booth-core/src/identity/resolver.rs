use shared::models::{AccountId, AccountProvision, CallerRef, LegacyAccount, UuidAccount};
use std::sync::Arc;

use super::AccountDirectory;
use crate::audit_log;
use crate::error::{CoreError, CoreResult};
use crate::repository::EventRepository;

/// One strategy of the resolution cascade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionStep {
    /// Legacy id, returned as-is
    LegacyId,
    /// UUID id, joined to a legacy row by email (synthesized when missing)
    UuidEmail,
    /// Event document id, resolved through its owner field
    EventOwner,
    /// Slug or username, legacy row first then UUID row
    Slug,
}

/// Order in which strategies are tried; the first match wins
pub const RESOLUTION_ORDER: &[ResolutionStep] = &[
    ResolutionStep::LegacyId,
    ResolutionStep::UuidEmail,
    ResolutionStep::EventOwner,
    ResolutionStep::Slug,
];

/// Redirects allowed before giving up (slug -> uuid, event -> owner)
const MAX_REDIRECTS: usize = 2;

/// Length of the UUID prefix appended to a colliding slug
const SLUG_SUFFIX_LEN: usize = 8;

enum StepOutcome {
    Resolved(AccountId),
    /// Continue with another reference
    Redirect(CallerRef),
    /// Step does not apply to this reference
    Skip,
}

#[derive(Clone)]
pub struct IdentityResolver {
    directory: Arc<dyn AccountDirectory>,
    events: EventRepository,
    default_allotment: i64,
}

impl IdentityResolver {
    pub fn new(
        directory: Arc<dyn AccountDirectory>,
        events: EventRepository,
        default_allotment: i64,
    ) -> Self {
        Self {
            directory,
            events,
            default_allotment,
        }
    }

    pub fn directory(&self) -> &Arc<dyn AccountDirectory> {
        &self.directory
    }

    /// Resolve any caller reference to a legacy account id
    pub async fn resolve(&self, caller: &CallerRef) -> CoreResult<AccountId> {
        let mut current = caller.clone();
        let mut visited_event = false;

        for _ in 0..=MAX_REDIRECTS {
            let mut next = None;
            for step in RESOLUTION_ORDER {
                match self.apply(*step, &current).await? {
                    StepOutcome::Resolved(id) => {
                        tracing::debug!(caller = %caller, account_id = id, step = ?step, "Caller resolved");
                        return Ok(id);
                    }
                    StepOutcome::Redirect(r) => {
                        next = Some(r);
                        break;
                    }
                    StepOutcome::Skip => {}
                }
            }

            match next {
                Some(CallerRef::Event(_)) if visited_event => {
                    return Err(CoreError::Unresolvable(format!(
                        "{caller}: more than one event hop"
                    )));
                }
                Some(r) => {
                    if matches!(current, CallerRef::Event(_)) {
                        visited_event = true;
                    }
                    current = r;
                }
                None => break,
            }
        }

        Err(CoreError::Unresolvable(caller.to_string()))
    }

    /// Resolve and load the full legacy row
    pub async fn resolve_account(&self, caller: &CallerRef) -> CoreResult<LegacyAccount> {
        let id = self.resolve(caller).await?;
        self.directory
            .legacy_by_id(id)
            .await?
            .ok_or_else(|| CoreError::account_not_found(id))
    }

    /// Resolve an owner field as stored on documents
    pub async fn resolve_owner_field(&self, raw: &str) -> CoreResult<AccountId> {
        self.resolve(&CallerRef::from_owner_field(raw)).await
    }

    async fn apply(&self, step: ResolutionStep, caller: &CallerRef) -> CoreResult<StepOutcome> {
        match (step, caller) {
            (ResolutionStep::LegacyId, CallerRef::Legacy(id)) => Ok(StepOutcome::Resolved(*id)),
            (ResolutionStep::UuidEmail, CallerRef::Uuid(id)) => self.by_uuid(id).await,
            (ResolutionStep::EventOwner, CallerRef::Event(doc_id)) => self.by_event(doc_id).await,
            (ResolutionStep::Slug, CallerRef::Slug(slug)) => self.by_slug(slug).await,
            _ => Ok(StepOutcome::Skip),
        }
    }

    async fn by_uuid(&self, uuid_id: &str) -> CoreResult<StepOutcome> {
        let Some(user) = self.directory.uuid_by_id(uuid_id).await? else {
            return Err(CoreError::Unresolvable(format!("no account row for uuid:{uuid_id}")));
        };
        let Some(email) = user.email.clone().filter(|e| !e.trim().is_empty()) else {
            return Err(CoreError::Unresolvable(format!("uuid:{uuid_id} has no email")));
        };

        if let Some(existing) = self.directory.legacy_by_email(&email).await? {
            return Ok(StepOutcome::Resolved(existing.id));
        }

        let account = self.synthesize(&user, email).await?;
        Ok(StepOutcome::Resolved(account.id))
    }

    async fn by_event(&self, doc_id: &str) -> CoreResult<StepOutcome> {
        let Some(event) = self.events.find_by_id(doc_id).await? else {
            return Err(CoreError::Unresolvable(format!("event {doc_id} not found")));
        };
        match CallerRef::from_owner_field(&event.user_id) {
            CallerRef::Anonymous => Err(CoreError::Unresolvable(format!(
                "event {doc_id} has no owner"
            ))),
            owner => Ok(StepOutcome::Redirect(owner)),
        }
    }

    async fn by_slug(&self, slug: &str) -> CoreResult<StepOutcome> {
        if let Some(account) = self.directory.legacy_by_slug(slug).await? {
            return Ok(StepOutcome::Resolved(account.id));
        }
        match self.directory.uuid_by_slug(slug).await? {
            Some(user) => Ok(StepOutcome::Redirect(CallerRef::Uuid(user.id))),
            None => Ok(StepOutcome::Skip),
        }
    }

    /// Create the legacy row for a UUID account
    async fn synthesize(&self, user: &UuidAccount, email: String) -> CoreResult<LegacyAccount> {
        let base = base_slug(user, &email);
        let slug = if self.directory.slug_taken(&base).await? {
            suffixed_slug(&base, &user.id)
        } else {
            base.clone()
        };

        let mut provision = AccountProvision {
            username: email_local_part(&email).to_string(),
            email,
            full_name: user.name.clone(),
            slug,
            initial_tokens: self.default_allotment,
        };

        let provisioned = match self.directory.provision_legacy(&provision).await {
            // Slug taken between the check and the insert
            Err(CoreError::Duplicate(_)) if provision.slug == base => {
                provision.slug = suffixed_slug(&base, &user.id);
                self.directory.provision_legacy(&provision).await?
            }
            other => other?,
        };

        if provisioned.created {
            tracing::info!(
                account_id = provisioned.account.id,
                uuid = %user.id,
                slug = %provision.slug,
                "Provisioned legacy account"
            );
            audit_log!(
                provisioned.account.id,
                "provision",
                format!("uuid:{}", user.id),
                format!("initial_tokens={}", provision.initial_tokens)
            );
        }
        Ok(provisioned.account)
    }
}

fn base_slug(user: &UuidAccount, email: &str) -> String {
    let candidates = [
        user.slug.as_deref(),
        user.name.as_deref(),
        Some(email_local_part(email)),
    ];
    candidates
        .into_iter()
        .flatten()
        .map(slugify)
        .find(|s| !s.is_empty())
        .unwrap_or_else(|| "user".to_string())
}

fn suffixed_slug(base: &str, uuid_id: &str) -> String {
    let suffix: String = uuid_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(SLUG_SUFFIX_LEN)
        .collect::<String>()
        .to_lowercase();
    format!("{base}-{suffix}")
}

fn email_local_part(email: &str) -> &str {
    email.split('@').next().unwrap_or(email)
}

/// Lower-case ASCII slug with single dashes
pub fn slugify(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_dash = false;
    for c in raw.trim().chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uuid_account(slug: Option<&str>, name: Option<&str>) -> UuidAccount {
        UuidAccount {
            id: "Kx93fPq2LmZ7".to_string(),
            email: Some("ana.silva@example.com".to_string()),
            name: name.map(str::to_string),
            slug: slug.map(str::to_string),
        }
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Ana Silva"), "ana-silva");
        assert_eq!(slugify("  --Hello__World!! "), "hello-world");
        assert_eq!(slugify("ñ"), "");
    }

    #[test]
    fn test_base_slug_preference() {
        let email = "ana.silva@example.com";
        assert_eq!(base_slug(&uuid_account(Some("ana"), Some("Ana S")), email), "ana");
        assert_eq!(base_slug(&uuid_account(None, Some("Ana S")), email), "ana-s");
        assert_eq!(base_slug(&uuid_account(None, None), email), "ana-silva");
        assert_eq!(base_slug(&uuid_account(Some("ñ"), None), "@x"), "user");
    }

    #[test]
    fn test_suffixed_slug_uses_uuid_prefix() {
        assert_eq!(suffixed_slug("ana", "Kx93fPq2LmZ7"), "ana-kx93fpq2");
        assert_eq!(suffixed_slug("ana", "ab-c"), "ana-abc");
    }

    #[test]
    fn test_resolution_order_is_fixed() {
        assert_eq!(
            RESOLUTION_ORDER,
            &[
                ResolutionStep::LegacyId,
                ResolutionStep::UuidEmail,
                ResolutionStep::EventOwner,
                ResolutionStep::Slug,
            ]
        );
    }
}
