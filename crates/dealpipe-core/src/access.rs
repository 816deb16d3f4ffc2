//! # Access Guard
//!
//! The single authorization predicate consulted before every mutation.
//!
//! ## Rule Table
//!
//! | Action | Stage | Deal |
//! |--------|-------|------|
//! | read | any identity | any identity |
//! | create | admin | any identity |
//! | update | admin | admin or owner |
//! | delete | admin | admin or owner |
//! | reorder | admin | never |
//!
//! A missing identity is always `Unauthenticated`. The guard has no side
//! effects and never looks at the store, so a `Forbidden` answer carries no
//! information about whether the addressed record exists.

use crate::{Identity, PipelineError, UserId};

/// What the caller wants to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Read,
    Create,
    Update,
    Delete,
    Reorder,
}

/// What the caller wants to do it to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource<'a> {
    Stage,
    /// A deal; `owner` is `None` for a deal that does not exist yet.
    Deal { owner: Option<&'a UserId> },
}

/// Stateless role and ownership check.
pub struct AccessGuard;

impl AccessGuard {
    /// Require that some identity is present.
    pub fn authenticate(identity: Option<&Identity>) -> Result<&Identity, PipelineError> {
        identity.ok_or(PipelineError::Unauthenticated)
    }

    /// Check `identity` against the rule table.
    ///
    /// Returns the identity on success so callers can keep using it.
    pub fn authorize<'i>(
        identity: Option<&'i Identity>,
        action: Action,
        resource: Resource<'_>,
    ) -> Result<&'i Identity, PipelineError> {
        let identity = Self::authenticate(identity)?;
        if Self::permits(identity, action, resource) {
            Ok(identity)
        } else {
            Err(PipelineError::Forbidden)
        }
    }

    /// Boolean form of [`AccessGuard::authorize`].
    #[must_use]
    pub fn is_allowed(identity: Option<&Identity>, action: Action, resource: Resource<'_>) -> bool {
        Self::authorize(identity, action, resource).is_ok()
    }

    fn permits(identity: &Identity, action: Action, resource: Resource<'_>) -> bool {
        match (action, resource) {
            (Action::Read, _) => true,
            (_, Resource::Stage) => identity.is_admin(),
            (Action::Create, Resource::Deal { .. }) => true,
            (Action::Update | Action::Delete, Resource::Deal { owner }) => {
                identity.is_admin() || owner == Some(&identity.user_id)
            }
            (Action::Reorder, Resource::Deal { .. }) => false,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_ACTIONS: [Action; 5] = [
        Action::Read,
        Action::Create,
        Action::Update,
        Action::Delete,
        Action::Reorder,
    ];

    #[test]
    fn missing_identity_is_unauthenticated_for_everything() {
        for action in ALL_ACTIONS {
            assert_eq!(
                AccessGuard::authorize(None, action, Resource::Stage).err(),
                Some(PipelineError::Unauthenticated)
            );
            assert_eq!(
                AccessGuard::authorize(None, action, Resource::Deal { owner: None }).err(),
                Some(PipelineError::Unauthenticated)
            );
        }
    }

    #[test]
    fn stage_mutations_are_admin_only() {
        let admin = Identity::admin("root");
        let member = Identity::member("alice");

        for action in [
            Action::Create,
            Action::Update,
            Action::Delete,
            Action::Reorder,
        ] {
            assert!(AccessGuard::is_allowed(Some(&admin), action, Resource::Stage));
            assert_eq!(
                AccessGuard::authorize(Some(&member), action, Resource::Stage).err(),
                Some(PipelineError::Forbidden)
            );
        }
        assert!(AccessGuard::is_allowed(
            Some(&member),
            Action::Read,
            Resource::Stage
        ));
    }

    #[test]
    fn any_identity_creates_deals() {
        let member = Identity::member("alice");
        assert!(AccessGuard::is_allowed(
            Some(&member),
            Action::Create,
            Resource::Deal { owner: None }
        ));
    }

    #[test]
    fn deal_mutation_requires_owner_or_admin() {
        let owner = Identity::member("alice");
        let other = Identity::member("bob");
        let admin = Identity::admin("root");
        let resource = Resource::Deal {
            owner: Some(&owner.user_id),
        };

        for action in [Action::Update, Action::Delete] {
            assert!(AccessGuard::is_allowed(Some(&owner), action, resource));
            assert!(AccessGuard::is_allowed(Some(&admin), action, resource));
            assert_eq!(
                AccessGuard::authorize(Some(&other), action, resource).err(),
                Some(PipelineError::Forbidden)
            );
        }
        assert!(AccessGuard::is_allowed(Some(&other), Action::Read, resource));
    }

    #[test]
    fn deals_cannot_be_reordered() {
        let admin = Identity::admin("root");
        assert!(!AccessGuard::is_allowed(
            Some(&admin),
            Action::Reorder,
            Resource::Deal { owner: None }
        ));
    }
}
