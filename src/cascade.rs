// Change-Cascade Resolver
// Given one record change delivered by the host in two phases (pre-commit,
// post-commit), computes the set of contacts whose eligibility must be
// recomputed. Deletes need a pre-commit snapshot: by post-commit time the
// deleted row's data may already be gone.

use anyhow::Result;
use std::collections::{BTreeSet, HashMap};

use crate::config::SyncConfig;
use crate::crm::CrmQuery;
use crate::entities::{ContactId, ContributionId, Membership, MembershipId, Relationship};
use crate::relationships::{RelationshipExpander, RELATIONSHIP_TYPE_IDS};

// ============================================================================
// CHANGE EVENTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOp {
    Create,
    Edit,
    Delete,
}

impl ChangeOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeOp::Create => "create",
            ChangeOp::Edit => "edit",
            ChangeOp::Delete => "delete",
        }
    }
}

/// One record change as delivered by the host's hook pair. The payload is
/// whatever the host hands over: for deletes that is the pre-image, since
/// the post-image no longer exists.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    Membership { op: ChangeOp, membership: Membership },
    Contribution { op: ChangeOp, contribution_id: ContributionId },
    Relationship { op: ChangeOp, relationship: Relationship },
}

impl ChangeEvent {
    pub fn op(&self) -> ChangeOp {
        match self {
            ChangeEvent::Membership { op, .. } => *op,
            ChangeEvent::Contribution { op, .. } => *op,
            ChangeEvent::Relationship { op, .. } => *op,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ChangeEvent::Membership { op, membership } => {
                format!("{} of membership {}", op.as_str(), membership.id)
            }
            ChangeEvent::Contribution { op, contribution_id } => {
                format!("{} of contribution {}", op.as_str(), contribution_id)
            }
            ChangeEvent::Relationship { op, relationship } => {
                format!("{} of relationship {}", op.as_str(), relationship.id)
            }
        }
    }
}

// ============================================================================
// SNAPSHOT STORE
// ============================================================================

/// Contact sets captured at pre-commit for records about to be deleted,
/// keyed by the disappearing record. Lives on the per-operation context and
/// dies with it; snapshots must never leak into an unrelated operation.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    memberships: HashMap<MembershipId, BTreeSet<ContactId>>,
    contributions: HashMap<ContributionId, BTreeSet<ContactId>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        SnapshotStore::default()
    }

    pub fn record_membership(&mut self, membership_id: MembershipId, contacts: BTreeSet<ContactId>) {
        self.memberships.insert(membership_id, contacts);
    }

    pub fn record_contribution(
        &mut self,
        contribution_id: ContributionId,
        contacts: BTreeSet<ContactId>,
    ) {
        self.contributions.insert(contribution_id, contacts);
    }

    /// The snapshot taken for a membership delete; empty when none was taken
    /// (the pre-image was not a relevant primary membership).
    pub fn take_membership(&mut self, membership_id: MembershipId) -> BTreeSet<ContactId> {
        self.memberships.remove(&membership_id).unwrap_or_default()
    }

    /// The snapshot taken for a contribution delete; empty when none was
    /// taken.
    pub fn take_contribution(&mut self, contribution_id: ContributionId) -> BTreeSet<ContactId> {
        self.contributions.remove(&contribution_id).unwrap_or_default()
    }
}

// ============================================================================
// PAYMENT -> MEMBERSHIP RESOLUTION
// ============================================================================

/// Resolve a contribution to the membership it pays for, applying the full
/// eligibility criteria: the membership must be primary and of a relevant
/// type, and the contribution must currently be pending. Pending is the only
/// contribution state that affects eligibility, so anything else resolves to
/// None.
pub fn membership_for_contribution(
    crm: &dyn CrmQuery,
    config: &SyncConfig,
    contribution_id: ContributionId,
) -> Result<Option<MembershipId>> {
    let payments = crm.payments_for_contribution(contribution_id)?;
    if payments.is_empty() {
        return Ok(None);
    }

    match crm.contribution(contribution_id)? {
        Some(contribution) if contribution.status.is_pending() => {}
        _ => return Ok(None),
    }

    for payment in payments {
        if let Some(membership) = crm.membership(payment.membership_id)? {
            if membership.is_primary()
                && config.membership_type_ids.contains(&membership.membership_type_id)
            {
                return Ok(Some(membership.id));
            }
        }
    }

    Ok(None)
}

// ============================================================================
// PRE-COMMIT PHASE
// ============================================================================

/// Capture contact sets for records about to be deleted. Only deletes need
/// this; create and edit payloads are still queryable at post-commit time.
pub fn snapshot_pre_commit(
    event: &ChangeEvent,
    crm: &dyn CrmQuery,
    config: &SyncConfig,
    expander: &mut RelationshipExpander,
    snapshots: &mut SnapshotStore,
) -> Result<()> {
    match event {
        ChangeEvent::Membership {
            op: ChangeOp::Delete,
            membership,
        } => {
            if membership.is_primary()
                && config.membership_type_ids.contains(&membership.membership_type_id)
            {
                let contacts = expander.contacts_for_membership(crm, config, membership.id)?;
                snapshots.record_membership(membership.id, contacts.into_iter().collect());
            }
        }
        ChangeEvent::Contribution {
            op: ChangeOp::Delete,
            contribution_id,
        } => {
            if let Some(membership_id) = membership_for_contribution(crm, config, *contribution_id)? {
                let contacts = expander.contacts_for_membership(crm, config, membership_id)?;
                snapshots.record_contribution(*contribution_id, contacts.into_iter().collect());
            }
        }
        _ => {}
    }
    Ok(())
}

// ============================================================================
// POST-COMMIT PHASE
// ============================================================================

/// Contacts whose eligibility must be recomputed for a committed change.
pub fn affected_contacts(
    event: &ChangeEvent,
    crm: &dyn CrmQuery,
    config: &SyncConfig,
    expander: &mut RelationshipExpander,
    snapshots: &mut SnapshotStore,
) -> Result<BTreeSet<ContactId>> {
    let affected = match event {
        ChangeEvent::Membership { op, membership } => {
            // Inherited memberships never cascade; only the primary record
            // they derive from does.
            if !membership.is_primary() {
                return Ok(BTreeSet::new());
            }
            match op {
                ChangeOp::Delete => snapshots.take_membership(membership.id),
                ChangeOp::Create | ChangeOp::Edit => expander
                    .contacts_for_membership(crm, config, membership.id)?
                    .into_iter()
                    .collect(),
            }
        }
        ChangeEvent::Contribution { op, contribution_id } => match op {
            ChangeOp::Delete => snapshots.take_contribution(*contribution_id),
            ChangeOp::Create | ChangeOp::Edit => {
                match membership_for_contribution(crm, config, *contribution_id)? {
                    Some(membership_id) => expander
                        .contacts_for_membership(crm, config, membership_id)?
                        .into_iter()
                        .collect(),
                    None => BTreeSet::new(),
                }
            }
        },
        ChangeEvent::Relationship { relationship, .. } => {
            // Both endpoints are re-evaluated whenever an allow-listed edge
            // changes, independent of the resulting active/current flags:
            // a deactivated edge must be able to revoke.
            if RELATIONSHIP_TYPE_IDS.contains(&relationship.relationship_type_id) {
                BTreeSet::from([relationship.contact_id_a, relationship.contact_id_b])
            } else {
                BTreeSet::new()
            }
        }
    };
    Ok(affected)
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

    fn membership_record(id: MembershipId, contact_id: ContactId) -> Membership {
        Membership {
            id,
            contact_id,
            membership_type_id: 10,
            status_id: 2,
            owner_membership_id: None,
        }
    }

    #[test]
    fn test_membership_delete_uses_pre_commit_snapshot() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_status(2, "Current", true).unwrap();
        store.insert_membership(100, 4, 10, 2, None).unwrap();
        store.insert_relationship(1, 4, 9, 5, true, true).unwrap();

        let config = test_config();
        let mut expander = RelationshipExpander::new();
        let mut snapshots = SnapshotStore::new();
        let event = ChangeEvent::Membership {
            op: ChangeOp::Delete,
            membership: membership_record(100, 4),
        };

        snapshot_pre_commit(&event, &store, &config, &mut expander, &mut snapshots).unwrap();

        // The row disappears between the phases; the snapshot carries the
        // contact set across.
        store.delete_membership(100).unwrap();
        store.delete_relationship(1).unwrap();

        let affected =
            affected_contacts(&event, &store, &config, &mut expander, &mut snapshots).unwrap();
        assert_eq!(affected, BTreeSet::from([4, 9]));
    }

    #[test]
    fn test_irrelevant_membership_delete_takes_no_snapshot() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_status(2, "Current", true).unwrap();
        store.insert_membership(100, 4, 99, 2, None).unwrap();

        let config = test_config();
        let mut expander = RelationshipExpander::new();
        let mut snapshots = SnapshotStore::new();
        let mut pre_image = membership_record(100, 4);
        pre_image.membership_type_id = 99;
        let event = ChangeEvent::Membership {
            op: ChangeOp::Delete,
            membership: pre_image,
        };

        snapshot_pre_commit(&event, &store, &config, &mut expander, &mut snapshots).unwrap();
        let affected =
            affected_contacts(&event, &store, &config, &mut expander, &mut snapshots).unwrap();
        assert!(affected.is_empty());
    }

    #[test]
    fn test_membership_create_computes_fresh_contact_set() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_status(2, "Current", true).unwrap();
        store.insert_membership(100, 1, 10, 2, None).unwrap();
        store.insert_relationship(1, 1, 7, 5, true, true).unwrap();

        let config = test_config();
        let mut expander = RelationshipExpander::new();
        let mut snapshots = SnapshotStore::new();
        let event = ChangeEvent::Membership {
            op: ChangeOp::Create,
            membership: membership_record(100, 1),
        };

        let affected =
            affected_contacts(&event, &store, &config, &mut expander, &mut snapshots).unwrap();
        assert_eq!(affected, BTreeSet::from([1, 7]));
    }

    #[test]
    fn test_inherited_membership_change_never_cascades() {
        let store = SqliteStore::open_in_memory().unwrap();
        let config = test_config();
        let mut expander = RelationshipExpander::new();
        let mut snapshots = SnapshotStore::new();

        let mut inherited = membership_record(101, 9);
        inherited.owner_membership_id = Some(100);
        let event = ChangeEvent::Membership {
            op: ChangeOp::Edit,
            membership: inherited,
        };

        let affected =
            affected_contacts(&event, &store, &config, &mut expander, &mut snapshots).unwrap();
        assert!(affected.is_empty());
    }

    #[test]
    fn test_pending_contribution_edit_cascades_through_membership() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_status(3, "Pending", false).unwrap();
        store.insert_membership(100, 2, 10, 3, None).unwrap();
        store.insert_contribution(500, "Pending").unwrap();
        store.insert_membership_payment(100, 500).unwrap();
        store.insert_relationship(1, 2, 8, 5, true, true).unwrap();

        let config = test_config();
        let mut expander = RelationshipExpander::new();
        let mut snapshots = SnapshotStore::new();
        let event = ChangeEvent::Contribution {
            op: ChangeOp::Edit,
            contribution_id: 500,
        };

        let affected =
            affected_contacts(&event, &store, &config, &mut expander, &mut snapshots).unwrap();
        assert_eq!(affected, BTreeSet::from([2, 8]));
    }

    #[test]
    fn test_settled_contribution_does_not_cascade() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_status(3, "Pending", false).unwrap();
        store.insert_membership(100, 2, 10, 3, None).unwrap();
        store.insert_contribution(500, "Completed").unwrap();
        store.insert_membership_payment(100, 500).unwrap();

        let config = test_config();
        let mut expander = RelationshipExpander::new();
        let mut snapshots = SnapshotStore::new();
        let event = ChangeEvent::Contribution {
            op: ChangeOp::Edit,
            contribution_id: 500,
        };

        let affected =
            affected_contacts(&event, &store, &config, &mut expander, &mut snapshots).unwrap();
        assert!(affected.is_empty());
    }

    #[test]
    fn test_contribution_delete_uses_pre_commit_snapshot() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_status(3, "Pending", false).unwrap();
        store.insert_membership(100, 2, 10, 3, None).unwrap();
        store.insert_contribution(500, "Pending").unwrap();
        store.insert_membership_payment(100, 500).unwrap();

        let config = test_config();
        let mut expander = RelationshipExpander::new();
        let mut snapshots = SnapshotStore::new();
        let event = ChangeEvent::Contribution {
            op: ChangeOp::Delete,
            contribution_id: 500,
        };

        snapshot_pre_commit(&event, &store, &config, &mut expander, &mut snapshots).unwrap();
        store.delete_contribution(500).unwrap();

        let affected =
            affected_contacts(&event, &store, &config, &mut expander, &mut snapshots).unwrap();
        assert_eq!(affected, BTreeSet::from([2]));
    }

    #[test]
    fn test_relationship_change_marks_exactly_both_endpoints() {
        let store = SqliteStore::open_in_memory().unwrap();
        let config = test_config();
        let mut expander = RelationshipExpander::new();
        let mut snapshots = SnapshotStore::new();

        // Already inactive and non-current: endpoints are still marked.
        let event = ChangeEvent::Relationship {
            op: ChangeOp::Edit,
            relationship: Relationship {
                id: 1,
                contact_id_a: 3,
                contact_id_b: 1,
                relationship_type_id: 5,
                is_active: false,
                is_current: false,
            },
        };

        let affected =
            affected_contacts(&event, &store, &config, &mut expander, &mut snapshots).unwrap();
        assert_eq!(affected, BTreeSet::from([1, 3]));
    }

    #[test]
    fn test_non_allow_listed_relationship_does_not_cascade() {
        let store = SqliteStore::open_in_memory().unwrap();
        let config = test_config();
        let mut expander = RelationshipExpander::new();
        let mut snapshots = SnapshotStore::new();

        let event = ChangeEvent::Relationship {
            op: ChangeOp::Delete,
            relationship: Relationship {
                id: 1,
                contact_id_a: 3,
                contact_id_b: 1,
                relationship_type_id: 7,
                is_active: true,
                is_current: true,
            },
        };

        let affected =
            affected_contacts(&event, &store, &config, &mut expander, &mut snapshots).unwrap();
        assert!(affected.is_empty());
    }

    #[test]
    fn test_snapshot_miss_yields_empty_set() {
        let mut snapshots = SnapshotStore::new();
        assert!(snapshots.take_membership(100).is_empty());
        assert!(snapshots.take_contribution(500).is_empty());
    }
}
