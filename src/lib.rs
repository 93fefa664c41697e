// Membership Role Sync - Core Library
// Keeps one managed platform role in lockstep with membership, payment, and
// relationship eligibility rules evaluated against an external CRM.

pub mod cascade;
pub mod config;
pub mod crm;
pub mod db;
pub mod eligibility;
pub mod entities;
pub mod logger;
pub mod merge;
pub mod relationships;
pub mod sync;

// Re-export commonly used types
pub use cascade::{ChangeEvent, ChangeOp, SnapshotStore};
pub use config::{ConfigError, JsonFileSettings, SettingsStore, StaticSettings, SyncConfig};
pub use crm::{CrmQuery, IdentityMapper, RoleMutator};
pub use db::SqliteStore;
pub use eligibility::{EligibilityEngine, Qualification};
pub use entities::{
    ContactId, Contribution, ContributionId, ContributionStatus, Membership, MembershipId,
    MembershipPayment, MembershipStatus, MembershipWithStatus, Relationship, UserId,
};
pub use logger::{FileLogger, MemoryLogger, NullLogger, SyncLogger};
pub use merge::{prepend_repair, repair_statement};
pub use relationships::{RelationshipExpander, RELATIONSHIP_TYPE_IDS};
pub use sync::{Operation, SyncEngine};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
