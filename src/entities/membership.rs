// Membership records and their status classification

use serde::{Deserialize, Serialize};

use super::{ContactId, MembershipId};

// ============================================================================
// MEMBERSHIP
// ============================================================================

/// One membership record as held by the CRM.
///
/// A membership is "primary" when it has no owner membership; memberships
/// inherited from another membership (owner set) never act as eligibility
/// sources on their own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub id: MembershipId,

    /// The contact holding this membership.
    pub contact_id: ContactId,

    /// Membership type; only types in the configured set are relevant.
    pub membership_type_id: i64,

    /// Status record, classified by `MembershipStatus`.
    pub status_id: i64,

    /// Owning membership when this one is inherited; None for primary.
    pub owner_membership_id: Option<MembershipId>,
}

impl Membership {
    /// True when this membership is not inherited from another one.
    pub fn is_primary(&self) -> bool {
        self.owner_membership_id.is_none()
    }
}

// ============================================================================
// MEMBERSHIP STATUS
// ============================================================================

/// Classification of a membership status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipStatus {
    pub id: i64,

    /// Status label ("Current", "Grace", "Expired", ...).
    pub name: String,

    /// Whether this status counts as actively qualifying.
    pub is_current_member: bool,
}

/// A membership joined with its status record, as the eligibility query
/// returns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipWithStatus {
    pub membership: Membership,
    pub status: MembershipStatus,
}

// ============================================================================
// TESTS
// ============================================================================
