// Eligibility Engine
// Decides whether a contact currently qualifies for the managed role.
// Eligibility is derived, never stored: every top-level operation recomputes
// it from the CRM, with memoization scoped to that operation alone.

use anyhow::Result;
use std::collections::HashMap;

use crate::config::SyncConfig;
use crate::crm::CrmQuery;
use crate::entities::{ContactId, MembershipId};
use crate::relationships::RelationshipExpander;

// ============================================================================
// QUALIFICATION
// ============================================================================

/// Outcome of one eligibility evaluation, carrying the condition that
/// decided it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qualification {
    /// A primary membership of a relevant type has a current status.
    CurrentMembership(MembershipId),

    /// A relevant membership is not current, but a linked contribution is
    /// still pending.
    PendingPayment(MembershipId),

    /// No primary membership of a relevant type anywhere in the contact's
    /// neighborhood.
    NoMemberships,

    /// Memberships were found, but none is current and none has a pending
    /// payment.
    NotQualified,
}

impl Qualification {
    pub fn is_eligible(&self) -> bool {
        matches!(
            self,
            Qualification::CurrentMembership(_) | Qualification::PendingPayment(_)
        )
    }

    pub fn describe(&self) -> String {
        match self {
            Qualification::CurrentMembership(id) => {
                format!("qualifies via current membership {}", id)
            }
            Qualification::PendingPayment(id) => {
                format!("qualifies via pending payment on membership {}", id)
            }
            Qualification::NoMemberships => "no relevant memberships found".to_string(),
            Qualification::NotQualified => "no qualifying condition found".to_string(),
        }
    }
}

// ============================================================================
// ENGINE
// ============================================================================

/// Per-operation eligibility evaluator. Construct one per top-level
/// operation; verdicts are memoized by contact for that operation only.
pub struct EligibilityEngine {
    memo: HashMap<ContactId, Qualification>,
}

impl EligibilityEngine {
    pub fn new() -> Self {
        EligibilityEngine {
            memo: HashMap::new(),
        }
    }

    /// Evaluate one contact, memoized.
    pub fn qualification(
        &mut self,
        crm: &dyn CrmQuery,
        config: &SyncConfig,
        expander: &mut RelationshipExpander,
        contact_id: ContactId,
    ) -> Result<Qualification> {
        if let Some(&cached) = self.memo.get(&contact_id) {
            return Ok(cached);
        }

        let verdict = self.evaluate(crm, config, expander, contact_id)?;
        self.memo.insert(contact_id, verdict);
        Ok(verdict)
    }

    /// Convenience wrapper over `qualification`.
    pub fn is_eligible(
        &mut self,
        crm: &dyn CrmQuery,
        config: &SyncConfig,
        expander: &mut RelationshipExpander,
        contact_id: ContactId,
    ) -> Result<bool> {
        Ok(self
            .qualification(crm, config, expander, contact_id)?
            .is_eligible())
    }

    fn evaluate(
        &mut self,
        crm: &dyn CrmQuery,
        config: &SyncConfig,
        expander: &mut RelationshipExpander,
        contact_id: ContactId,
    ) -> Result<Qualification> {
        // Candidate set: the contact itself plus every contact one
        // relationship hop away.
        let mut candidates = vec![contact_id];
        candidates.extend(expander.related_contacts(crm, contact_id)?);

        // All primary memberships of a relevant type over the candidate set,
        // current or not. The full id set is kept: the pending-payment check
        // below runs over every membership found here, not only the
        // non-current remainder.
        let memberships = crm.primary_memberships(&candidates, &config.membership_type_ids)?;
        if memberships.is_empty() {
            return Ok(Qualification::NoMemberships);
        }

        // Any one current membership suffices; order among them is
        // irrelevant.
        for record in &memberships {
            if record.status.is_current_member {
                return Ok(Qualification::CurrentMembership(record.membership.id));
            }
        }

        // Grace allowance: a membership that is not yet current still
        // qualifies while a linked contribution is pending.
        let membership_ids: Vec<MembershipId> =
            memberships.iter().map(|record| record.membership.id).collect();
        for payment in crm.payments_for_memberships(&membership_ids)? {
            if let Some(contribution) = crm.contribution(payment.contribution_id)? {
                if contribution.status.is_pending() {
                    return Ok(Qualification::PendingPayment(payment.membership_id));
                }
            }
        }

        Ok(Qualification::NotQualified)
    }
}

impl Default for EligibilityEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;
    use std::collections::HashSet;

    fn test_config() -> SyncConfig {
        SyncConfig {
            role: "member".to_string(),
            membership_type_ids: HashSet::from([10]),
            logging: false,
        }
    }

    fn evaluate(store: &SqliteStore, contact_id: ContactId) -> Qualification {
        let mut expander = RelationshipExpander::new();
        let mut engine = EligibilityEngine::new();
        engine
            .qualification(store, &test_config(), &mut expander, contact_id)
            .unwrap()
    }

    #[test]
    fn test_current_primary_membership_qualifies() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_status(2, "Current", true).unwrap();
        store.insert_membership(100, 1, 10, 2, None).unwrap();

        assert_eq!(evaluate(&store, 1), Qualification::CurrentMembership(100));
    }

    #[test]
    fn test_contact_without_memberships_does_not_qualify() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(evaluate(&store, 1), Qualification::NoMemberships);
    }

    #[test]
    fn test_inherited_membership_never_qualifies_by_itself() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_status(2, "Current", true).unwrap();
        // Current status, relevant type, but inherited (owner set): the
        // holder does not qualify through it.
        store.insert_membership(101, 4, 10, 2, Some(100)).unwrap();

        assert_eq!(evaluate(&store, 4), Qualification::NoMemberships);
    }

    #[test]
    fn test_irrelevant_membership_type_does_not_qualify() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_status(2, "Current", true).unwrap();
        store.insert_membership(100, 1, 99, 2, None).unwrap();

        assert_eq!(evaluate(&store, 1), Qualification::NoMemberships);
    }

    #[test]
    fn test_pending_payment_grants_grace() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_status(3, "Pending", false).unwrap();
        store.insert_membership(100, 2, 10, 3, None).unwrap();
        store.insert_contribution(500, "Pending").unwrap();
        store.insert_membership_payment(100, 500).unwrap();

        assert_eq!(evaluate(&store, 2), Qualification::PendingPayment(100));
    }

    #[test]
    fn test_settled_payment_grants_no_grace() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_status(4, "Expired", false).unwrap();
        store.insert_membership(100, 2, 10, 4, None).unwrap();
        store.insert_contribution(500, "Completed").unwrap();
        store.insert_membership_payment(100, 500).unwrap();

        assert_eq!(evaluate(&store, 2), Qualification::NotQualified);
    }

    #[test]
    fn test_eligibility_inherited_through_relationship() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_status(2, "Current", true).unwrap();
        store.insert_membership(100, 1, 10, 2, None).unwrap();
        // Contact 3 has no memberships, but is employed by contact 1.
        store.insert_relationship(1, 3, 1, 5, true, true).unwrap();

        assert_eq!(evaluate(&store, 3), Qualification::CurrentMembership(100));
    }

    #[test]
    fn test_no_inheritance_through_inactive_relationship() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_status(2, "Current", true).unwrap();
        store.insert_membership(100, 1, 10, 2, None).unwrap();
        store.insert_relationship(1, 3, 1, 5, false, false).unwrap();

        assert_eq!(evaluate(&store, 3), Qualification::NoMemberships);
    }

    #[test]
    fn test_no_inheritance_beyond_one_hop() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_status(2, "Current", true).unwrap();
        store.insert_membership(100, 1, 10, 2, None).unwrap();
        // 5 -- 3 -- 1: contact 5 is two hops from the member.
        store.insert_relationship(1, 3, 1, 5, true, true).unwrap();
        store.insert_relationship(2, 5, 3, 5, true, true).unwrap();

        assert_eq!(evaluate(&store, 3), Qualification::CurrentMembership(100));
        assert_eq!(evaluate(&store, 5), Qualification::NoMemberships);
    }

    #[test]
    fn test_verdict_is_memoized_per_operation() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_status(2, "Current", true).unwrap();
        store.insert_membership(100, 1, 10, 2, None).unwrap();

        let mut expander = RelationshipExpander::new();
        let mut engine = EligibilityEngine::new();
        let config = test_config();

        assert!(engine
            .is_eligible(&store, &config, &mut expander, 1)
            .unwrap());

        // Data changes mid-operation are not observed through the memo.
        store.delete_membership(100).unwrap();
        assert!(engine
            .is_eligible(&store, &config, &mut expander, 1)
            .unwrap());

        // A fresh operation recomputes.
        let mut fresh_expander = RelationshipExpander::new();
        let mut fresh_engine = EligibilityEngine::new();
        assert!(!fresh_engine
            .is_eligible(&store, &config, &mut fresh_expander, 1)
            .unwrap());
    }
}
