// Relationship Expander
// One-hop expansion from a contact to the contacts it can inherit
// eligibility from (and confer it to). Results are memoized for the
// lifetime of one top-level operation only; CRM data may change between
// operations, so the expander itself never outlives one.

use anyhow::Result;
use std::collections::HashMap;

use crate::config::SyncConfig;
use crate::crm::CrmQuery;
use crate::entities::{ContactId, MembershipId};

/// Relationship types whose edges confer eligibility. Fixed domain policy,
/// not configuration: "Employee of".
pub const RELATIONSHIP_TYPE_IDS: &[i64] = &[5];

// ============================================================================
// EXPANDER
// ============================================================================

/// Expands a contact into its eligibility-relevant neighborhood.
///
/// Construct one per top-level operation and drop it at the end; the
/// memoization maps must not survive into an unrelated operation.
pub struct RelationshipExpander {
    by_contact: HashMap<ContactId, Vec<ContactId>>,
    by_membership: HashMap<MembershipId, Vec<ContactId>>,
}

impl RelationshipExpander {
    pub fn new() -> Self {
        RelationshipExpander {
            by_contact: HashMap::new(),
            by_membership: HashMap::new(),
        }
    }

    /// Contacts linked to the given contact by an active, current
    /// relationship of an allow-listed type, whichever endpoint column holds
    /// the contact. Expansion is deliberately single-hop: relations of
    /// relations are not considered.
    pub fn related_contacts(
        &mut self,
        crm: &dyn CrmQuery,
        contact_id: ContactId,
    ) -> Result<Vec<ContactId>> {
        if let Some(cached) = self.by_contact.get(&contact_id) {
            return Ok(cached.clone());
        }

        let mut related = Vec::new();
        for relationship in crm.current_relationships(contact_id, RELATIONSHIP_TYPE_IDS)? {
            if let Some(other) = relationship.other_endpoint(contact_id) {
                if !related.contains(&other) {
                    related.push(other);
                }
            }
        }

        self.by_contact.insert(contact_id, related.clone());
        Ok(related)
    }

    /// The contact set behind a membership: the member contact plus its
    /// related contacts, but only when the membership is primary and of a
    /// relevant type. Any other membership yields the empty set, since it
    /// cannot affect anyone's eligibility.
    pub fn contacts_for_membership(
        &mut self,
        crm: &dyn CrmQuery,
        config: &SyncConfig,
        membership_id: MembershipId,
    ) -> Result<Vec<ContactId>> {
        if let Some(cached) = self.by_membership.get(&membership_id) {
            return Ok(cached.clone());
        }

        let mut contacts = Vec::new();
        if let Some(membership) = crm.membership(membership_id)? {
            if membership.is_primary()
                && config.membership_type_ids.contains(&membership.membership_type_id)
            {
                contacts = self.related_contacts(crm, membership.contact_id)?;
                contacts.push(membership.contact_id);
            }
        }

        self.by_membership.insert(membership_id, contacts.clone());
        Ok(contacts)
    }
}

impl Default for RelationshipExpander {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
