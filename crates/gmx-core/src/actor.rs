//! # Actors and Profiles
//!
//! Every state-changing operation receives the acting party explicitly.
//! Authorization is decided from the actor's profile flags and its relation
//! to the target order, never from which UI controls happened to be shown.

use serde::{Deserialize, Serialize};

use crate::identity::ProfileId;
use crate::temporal::Timestamp;

/// A marketplace user profile as held by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Profile identifier (same id the auth provider issues).
    pub id: ProfileId,
    /// Public display name.
    pub username: String,
    /// Whether the profile may perform admin moderation.
    pub is_admin: bool,
    /// Whether the profile is barred from acting.
    pub is_banned: bool,
    /// When the profile was created.
    pub created_at: Timestamp,
}

impl Profile {
    /// A regular (non-admin, not banned) profile.
    pub fn new(id: ProfileId, username: impl Into<String>, created_at: Timestamp) -> Self {
        Self {
            id,
            username: username.into(),
            is_admin: false,
            is_banned: false,
            created_at,
        }
    }

    /// The actor this profile acts as.
    pub fn actor(&self) -> Actor {
        Actor::User {
            id: self.id,
            is_admin: self.is_admin,
            is_banned: self.is_banned,
        }
    }
}

/// The party performing an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Actor {
    /// An authenticated user, with the privilege flags of their profile.
    User {
        /// The user's profile id.
        id: ProfileId,
        /// Admin flag from the profile.
        is_admin: bool,
        /// Ban flag from the profile.
        is_banned: bool,
    },
    /// The platform itself (background jobs, instant delivery).
    System,
}

impl Actor {
    /// The acting profile id, if a user.
    pub fn profile_id(&self) -> Option<ProfileId> {
        match self {
            Self::User { id, .. } => Some(*id),
            Self::System => None,
        }
    }

    /// Whether this actor is `profile`.
    pub fn is(&self, profile: &ProfileId) -> bool {
        self.profile_id().as_ref() == Some(profile)
    }

    /// Whether this actor holds admin privileges.
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::User { is_admin: true, .. })
    }

    /// Whether this actor is barred from acting.
    pub fn is_banned(&self) -> bool {
        matches!(self, Self::User { is_banned: true, .. })
    }

    /// Whether this actor is the platform itself.
    pub fn is_system(&self) -> bool {
        matches!(self, Self::System)
    }
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User { id, is_admin: true, .. } => write!(f, "admin {id}"),
            Self::User { id, .. } => write!(f, "{id}"),
            Self::System => f.write_str("system"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_actor_carries_flags() {
        let mut p = Profile::new(ProfileId::new(), "mod", Timestamp::now());
        p.is_admin = true;
        let actor = p.actor();
        assert!(actor.is_admin());
        assert!(!actor.is_banned());
        assert!(actor.is(&p.id));
    }

    #[test]
    fn test_system_actor_has_no_profile() {
        assert_eq!(Actor::System.profile_id(), None);
        assert!(!Actor::System.is_admin());
        assert!(Actor::System.is_system());
        assert!(!Actor::System.is(&ProfileId::new()));
    }
}
