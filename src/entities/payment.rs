// Contributions and membership-payment links

use serde::{Deserialize, Serialize};

use super::{ContributionId, MembershipId};

// ============================================================================
// CONTRIBUTION STATUS
// ============================================================================

/// Lifecycle status of a contribution. Only `Pending` affects eligibility:
/// a not-yet-current membership with a pending payment still qualifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContributionStatus {
    Pending,
    Completed,
    Cancelled,
    Failed,
    Refunded,
}

impl ContributionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContributionStatus::Pending => "Pending",
            ContributionStatus::Completed => "Completed",
            ContributionStatus::Cancelled => "Cancelled",
            ContributionStatus::Failed => "Failed",
            ContributionStatus::Refunded => "Refunded",
        }
    }

    /// Parse a CRM status label, case-insensitively.
    pub fn parse(label: &str) -> Option<ContributionStatus> {
        match label.to_lowercase().as_str() {
            "pending" => Some(ContributionStatus::Pending),
            "completed" => Some(ContributionStatus::Completed),
            "cancelled" => Some(ContributionStatus::Cancelled),
            "failed" => Some(ContributionStatus::Failed),
            "refunded" => Some(ContributionStatus::Refunded),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, ContributionStatus::Pending)
    }
}

// ============================================================================
// CONTRIBUTION
// ============================================================================

/// A payment record in the CRM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contribution {
    pub id: ContributionId,
    pub status: ContributionStatus,
}

// ============================================================================
// MEMBERSHIP PAYMENT
// ============================================================================

/// Link row joining a contribution to the membership it pays for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipPayment {
    pub membership_id: MembershipId,
    pub contribution_id: ContributionId,
}

// ============================================================================
// TESTS
// ============================================================================
