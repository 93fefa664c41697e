// Sync Orchestrator
// Public surface of the engine. Every entry point runs the same shape:
// read settings fresh, go inert when they are incomplete, then drive
// eligibility + identity mapping + role mutation over a set of contacts,
// all within one per-operation context that is dropped at the end.

use anyhow::Result;
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::cascade::{self, ChangeEvent, SnapshotStore};
use crate::config::{SettingsStore, SyncConfig};
use crate::crm::{CrmQuery, IdentityMapper, RoleMutator};
use crate::eligibility::{EligibilityEngine, Qualification};
use crate::entities::{ContactId, UserId};
use crate::logger::SyncLogger;
use crate::merge;
use crate::relationships::RelationshipExpander;

// ============================================================================
// PER-OPERATION CONTEXT
// ============================================================================

/// State scoped to one top-level operation: the settings read, the lookup
/// memos, and the pre-commit snapshots. For a record change the host keeps
/// one context alive across the pre-commit and post-commit hooks of that
/// change, then drops it; login and manual syncs build their own internally.
pub struct Operation {
    label: &'static str,

    /// Correlation token tagging this operation's log lines.
    token: String,

    config_loaded: bool,
    config: Option<SyncConfig>,

    expander: RelationshipExpander,
    eligibility: EligibilityEngine,
    snapshots: SnapshotStore,
}

impl Operation {
    fn new(label: &'static str) -> Self {
        let token = Uuid::new_v4().simple().to_string()[..8].to_string();
        Operation {
            label,
            token,
            config_loaded: false,
            config: None,
            expander: RelationshipExpander::new(),
            eligibility: EligibilityEngine::new(),
            snapshots: SnapshotStore::new(),
        }
    }
}

// ============================================================================
// SYNC ENGINE
// ============================================================================

/// Drives role synchronization over the collaborator interfaces. Holds no
/// state of its own beyond the collaborators; everything operation-scoped
/// lives on `Operation`.
pub struct SyncEngine<'a> {
    settings: &'a dyn SettingsStore,
    crm: &'a dyn CrmQuery,
    identity: &'a dyn IdentityMapper,
    roles: &'a dyn RoleMutator,
    logger: &'a dyn SyncLogger,
}

impl<'a> SyncEngine<'a> {
    pub fn new(
        settings: &'a dyn SettingsStore,
        crm: &'a dyn CrmQuery,
        identity: &'a dyn IdentityMapper,
        roles: &'a dyn RoleMutator,
        logger: &'a dyn SyncLogger,
    ) -> Self {
        SyncEngine {
            settings,
            crm,
            identity,
            roles,
            logger,
        }
    }

    /// Begin the context for one record change. Pass the same context to
    /// `handle_pre_commit` and `handle_post_commit`, then drop it.
    pub fn begin_change(&self) -> Operation {
        Operation::new("change")
    }

    // ========================================================================
    // ENTRY POINTS
    // ========================================================================

    /// Pre-commit hook: capture delete snapshots while the record still
    /// exists. Inert when not configured.
    pub fn handle_pre_commit(&self, op: &mut Operation, event: &ChangeEvent) -> Result<()> {
        let Some(config) = self.load_config(op)? else {
            return Ok(());
        };
        self.log(op, &config, &format!("pre-commit {}", event.describe()));
        cascade::snapshot_pre_commit(event, self.crm, &config, &mut op.expander, &mut op.snapshots)
    }

    /// Post-commit hook: resolve the cascade for a committed change and
    /// apply the role decision to every affected contact.
    pub fn handle_post_commit(&self, op: &mut Operation, event: &ChangeEvent) -> Result<()> {
        let Some(config) = self.load_config(op)? else {
            return Ok(());
        };
        let affected =
            cascade::affected_contacts(event, self.crm, &config, &mut op.expander, &mut op.snapshots)?;
        self.log(
            op,
            &config,
            &format!(
                "post-commit {}: {} affected contact(s)",
                event.describe(),
                affected.len()
            ),
        );
        self.sync_contact_set(op, &config, &affected)
    }

    /// Login hook: the self-healing path. Re-evaluates the logging-in user's
    /// linked contact so the role is correct at least once per session even
    /// when change events were missed.
    pub fn handle_login(&self, user_id: UserId) -> Result<()> {
        let mut op = Operation::new("login");
        let Some(config) = self.load_config(&mut op)? else {
            return Ok(());
        };
        self.log(&op, &config, &format!("user {} logged in", user_id));

        let Some(contact_id) = self.identity.contact_for_user(user_id)? else {
            self.log(
                &op,
                &config,
                &format!("no contact found for user {}", user_id),
            );
            return Ok(());
        };
        self.apply_decision(&mut op, &config, contact_id, user_id)
    }

    /// Contact-merge hook: prepend the relationship repair to the merge's
    /// SQL statement list.
    pub fn handle_merge(
        &self,
        main_contact_id: ContactId,
        other_contact_id: ContactId,
        statements: &mut Vec<String>,
    ) -> Result<()> {
        let mut op = Operation::new("merge");
        let Some(config) = self.load_config(&mut op)? else {
            return Ok(());
        };
        merge::prepend_repair(main_contact_id, other_contact_id, statements);
        self.log(
            &op,
            &config,
            &format!(
                "merge of contact {} into {}: prepended relationship repair",
                other_contact_id, main_contact_id
            ),
        );
        Ok(())
    }

    /// Re-evaluate a set of contacts and apply the role decision to each one
    /// that has a platform account. Safe to call repeatedly.
    pub fn sync_contacts(&self, contact_ids: &[ContactId]) -> Result<()> {
        let mut op = Operation::new("sync");
        let Some(config) = self.load_config(&mut op)? else {
            return Ok(());
        };
        let contacts: BTreeSet<ContactId> = contact_ids.iter().copied().collect();
        self.sync_contact_set(&mut op, &config, &contacts)
    }

    /// Evaluate one contact without touching any role. Returns None when the
    /// engine is not configured.
    pub fn check_contact(&self, contact_id: ContactId) -> Result<Option<Qualification>> {
        let mut op = Operation::new("check");
        let Some(config) = self.load_config(&mut op)? else {
            return Ok(None);
        };
        let verdict =
            op.eligibility
                .qualification(self.crm, &config, &mut op.expander, contact_id)?;
        Ok(Some(verdict))
    }

    // ========================================================================
    // INTERNALS
    // ========================================================================

    /// Read settings once per operation. None means the engine is inert for
    /// this operation; a shape error aborts it.
    fn load_config(&self, op: &mut Operation) -> Result<Option<SyncConfig>> {
        if !op.config_loaded {
            op.config = SyncConfig::load_from(self.settings)?;
            op.config_loaded = true;
        }
        Ok(op.config.clone())
    }

    fn log(&self, op: &Operation, config: &SyncConfig, message: &str) {
        if config.logging {
            self.logger
                .write(&format!("{}[{}] :: {}", op.label, op.token, message));
        }
    }

    fn sync_contact_set(
        &self,
        op: &mut Operation,
        config: &SyncConfig,
        contacts: &BTreeSet<ContactId>,
    ) -> Result<()> {
        for &contact_id in contacts {
            let Some(user_id) = self.identity.user_for_contact(contact_id)? else {
                self.log(
                    op,
                    config,
                    &format!("no platform user for contact {}, skipping", contact_id),
                );
                continue;
            };
            self.apply_decision(op, config, contact_id, user_id)?;
        }
        Ok(())
    }

    fn apply_decision(
        &self,
        op: &mut Operation,
        config: &SyncConfig,
        contact_id: ContactId,
        user_id: UserId,
    ) -> Result<()> {
        let verdict =
            op.eligibility
                .qualification(self.crm, config, &mut op.expander, contact_id)?;
        self.log(
            op,
            config,
            &format!("contact {}: {}", contact_id, verdict.describe()),
        );

        let eligible = verdict.is_eligible();
        self.log(
            op,
            config,
            &format!(
                "{} role '{}' for user {}",
                if eligible { "add" } else { "remove" },
                config.role,
                user_id
            ),
        );
        self.roles.set_role(user_id, &config.role, eligible)
    }
}

// ============================================================================
// TESTS
// ============================================================================
