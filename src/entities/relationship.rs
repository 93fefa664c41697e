// Relationship records between two contacts

use serde::{Deserialize, Serialize};

use super::ContactId;

/// A relationship edge between two contacts.
///
/// The edge only confers eligibility while it is both active and current;
/// which endpoint column holds a given contact carries no meaning for this
/// engine (the edge is treated as symmetric).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: i64,

    pub contact_id_a: ContactId,
    pub contact_id_b: ContactId,

    /// Relationship type ("Employee of", ...).
    pub relationship_type_id: i64,

    pub is_active: bool,

    /// Active and inside the relationship's date window.
    pub is_current: bool,
}

impl Relationship {
    /// The endpoint opposite the given contact, or None when the contact is
    /// on neither side of this edge.
    pub fn other_endpoint(&self, contact_id: ContactId) -> Option<ContactId> {
        if self.contact_id_a == contact_id {
            Some(self.contact_id_b)
        } else if self.contact_id_b == contact_id {
            Some(self.contact_id_a)
        } else {
            None
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(a: ContactId, b: ContactId) -> Relationship {
        Relationship {
            id: 1,
            contact_id_a: a,
            contact_id_b: b,
            relationship_type_id: 5,
            is_active: true,
            is_current: true,
        }
    }

    #[test]
    fn test_other_endpoint_is_symmetric() {
        let rel = edge(3, 9);
        assert_eq!(rel.other_endpoint(3), Some(9));
        assert_eq!(rel.other_endpoint(9), Some(3));
    }

    #[test]
    fn test_other_endpoint_for_uninvolved_contact() {
        let rel = edge(3, 9);
        assert_eq!(rel.other_endpoint(4), None);
    }
}
