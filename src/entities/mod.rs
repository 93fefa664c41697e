// CRM Record Types
// Plain views of the records this engine reads from the CRM. Every record
// here is owned and persisted by the CRM itself; nothing is stored locally.

pub mod membership;
pub mod payment;
pub mod relationship;

pub use membership::{Membership, MembershipStatus, MembershipWithStatus};
pub use payment::{Contribution, ContributionStatus, MembershipPayment};
pub use relationship::Relationship;

/// CRM contact identifier.
pub type ContactId = i64;

/// Platform user identifier.
pub type UserId = i64;

/// Membership record identifier.
pub type MembershipId = i64;

/// Contribution record identifier.
pub type ContributionId = i64;
