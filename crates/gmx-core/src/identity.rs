//! # Domain Identity Newtypes
//!
//! Newtype wrappers for every identifier in the marketplace. These prevent
//! accidental identifier confusion: a `ProfileId` cannot be passed where an
//! `OrderId` is expected, and a buyer id cannot be compared against a
//! dispute id.
//!
//! All identifiers are UUIDs (the store keys every table by UUID). The
//! `Display` form carries a namespace prefix (`order:…`) for log output;
//! use [`OrderId::as_uuid`] and friends when a bare UUID is needed.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_identifier {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID (e.g. one read back from the store).
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Access the inner UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, ":{}"), self.0)
            }
        }
    };
}

uuid_identifier!(
    /// Unique identifier for an order.
    OrderId,
    "order"
);

uuid_identifier!(
    /// Unique identifier for a dispute raised against an order.
    DisputeId,
    "dispute"
);

uuid_identifier!(
    /// Unique identifier for a buyer review.
    ReviewId,
    "review"
);

uuid_identifier!(
    /// Unique identifier for a user profile (buyer, seller or admin).
    ProfileId,
    "profile"
);

uuid_identifier!(
    /// Unique identifier for a marketplace listing.
    ListingId,
    "listing"
);

uuid_identifier!(
    /// Unique identifier for an admin audit record.
    AdminActionId,
    "admin_action"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_ids_are_unique() {
        assert_ne!(OrderId::new(), OrderId::new());
    }

    #[test]
    fn test_display_carries_namespace() {
        let uuid = Uuid::nil();
        assert_eq!(
            OrderId::from_uuid(uuid).to_string(),
            "order:00000000-0000-0000-0000-000000000000"
        );
        assert!(ProfileId::from_uuid(uuid).to_string().starts_with("profile:"));
    }

    #[test]
    fn test_serde_is_bare_uuid() {
        let id = DisputeId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.as_uuid()));
        let parsed: DisputeId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }
}
