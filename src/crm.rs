// Collaborator Interfaces
// The engine never owns membership, relationship, or user data; it reads the
// CRM and mutates platform roles through these seams. Host-platform glue
// supplies the implementations (the SQLite adapter in db.rs is the reference
// one). Query failures propagate untouched; the engine adds no retry layer.

use anyhow::Result;
use std::collections::HashSet;

use crate::entities::{
    ContactId, Contribution, ContributionId, Membership, MembershipId, MembershipPayment,
    MembershipWithStatus, Relationship, UserId,
};

// ============================================================================
// CRM QUERY
// ============================================================================

/// Read-only query surface over the CRM's membership, relationship, and
/// payment records.
pub trait CrmQuery {
    /// All primary memberships (no owner membership) of the given types held
    /// by any of the given contacts, joined with their status.
    fn primary_memberships(
        &self,
        contact_ids: &[ContactId],
        membership_type_ids: &HashSet<i64>,
    ) -> Result<Vec<MembershipWithStatus>>;

    /// One membership by id.
    fn membership(&self, membership_id: MembershipId) -> Result<Option<Membership>>;

    /// Active, current relationships of the given types with the contact on
    /// either endpoint.
    fn current_relationships(
        &self,
        contact_id: ContactId,
        relationship_type_ids: &[i64],
    ) -> Result<Vec<Relationship>>;

    /// Membership-payment links for any of the given memberships.
    fn payments_for_memberships(
        &self,
        membership_ids: &[MembershipId],
    ) -> Result<Vec<MembershipPayment>>;

    /// Membership-payment links for one contribution.
    fn payments_for_contribution(
        &self,
        contribution_id: ContributionId,
    ) -> Result<Vec<MembershipPayment>>;

    /// One contribution by id, if it exists and carries a known status
    /// label.
    fn contribution(&self, contribution_id: ContributionId) -> Result<Option<Contribution>>;
}

// ============================================================================
// IDENTITY MAPPER
// ============================================================================

/// Bidirectional lookup between CRM contacts and platform users. Either
/// direction may miss: not every contact has an account, and not every user
/// is linked to a contact. A miss means "no action needed", never an error.
pub trait IdentityMapper {
    fn user_for_contact(&self, contact_id: ContactId) -> Result<Option<UserId>>;

    fn contact_for_user(&self, user_id: UserId) -> Result<Option<ContactId>>;
}

// ============================================================================
// ROLE MUTATOR
// ============================================================================

/// Adds or removes the managed role on a platform user record.
///
/// Must be idempotent from either side: setting a role that is already in
/// the desired state is a no-op, and callers apply the full decision on
/// every sync rather than tracking transitions.
pub trait RoleMutator {
    fn set_role(&self, user_id: UserId, role: &str, present: bool) -> Result<()>;
}
