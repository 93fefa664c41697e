// SQLite Reference Adapter
// One connection backing three collaborator roles: CRM record queries, the
// contact/user identity map, and the platform user-role store. Host
// platforms replace this with their own adapters; the CLI and the test
// suite run against it directly.

use anyhow::{Context, Result};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::collections::HashSet;
use std::path::Path;

use crate::crm::{CrmQuery, IdentityMapper, RoleMutator};
use crate::entities::{
    ContactId, Contribution, ContributionId, ContributionStatus, Membership, MembershipId,
    MembershipPayment, MembershipStatus, MembershipWithStatus, Relationship, UserId,
};

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .with_context(|| format!("Failed to open database: {:?}", path.as_ref()))?;
        setup_schema(&conn)?;
        Ok(SqliteStore { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        setup_schema(&conn)?;
        Ok(SqliteStore { conn })
    }

    /// Direct access for statements built outside the adapter (the merge
    /// repair runs here).
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    // ========================================================================
    // SEEDING
    // Used by the CLI demo and by fixtures; the engine itself only reads.
    // ========================================================================

    pub fn insert_status(&self, id: i64, name: &str, is_current_member: bool) -> Result<()> {
        self.conn.execute(
            "INSERT INTO membership_status (id, name, is_current_member) VALUES (?1, ?2, ?3)",
            params![id, name, is_current_member],
        )?;
        Ok(())
    }

    pub fn insert_membership(
        &self,
        id: MembershipId,
        contact_id: ContactId,
        membership_type_id: i64,
        status_id: i64,
        owner_membership_id: Option<MembershipId>,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO membership (id, contact_id, membership_type_id, status_id, owner_membership_id)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, contact_id, membership_type_id, status_id, owner_membership_id],
        )?;
        Ok(())
    }

    pub fn delete_membership(&self, id: MembershipId) -> Result<()> {
        self.conn
            .execute("DELETE FROM membership WHERE id = ?1", [id])?;
        Ok(())
    }

    pub fn insert_relationship(
        &self,
        id: i64,
        contact_id_a: ContactId,
        contact_id_b: ContactId,
        relationship_type_id: i64,
        is_active: bool,
        is_current: bool,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO relationship (id, contact_id_a, contact_id_b, relationship_type_id, is_active, is_current)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id,
                contact_id_a,
                contact_id_b,
                relationship_type_id,
                is_active,
                is_current
            ],
        )?;
        Ok(())
    }

    pub fn delete_relationship(&self, id: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM relationship WHERE id = ?1", [id])?;
        Ok(())
    }

    pub fn insert_contribution(&self, id: ContributionId, status: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO contribution (id, status) VALUES (?1, ?2)",
            params![id, status],
        )?;
        Ok(())
    }

    pub fn delete_contribution(&self, id: ContributionId) -> Result<()> {
        self.conn
            .execute("DELETE FROM contribution WHERE id = ?1", [id])?;
        Ok(())
    }

    pub fn insert_membership_payment(
        &self,
        membership_id: MembershipId,
        contribution_id: ContributionId,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO membership_payment (membership_id, contribution_id) VALUES (?1, ?2)",
            params![membership_id, contribution_id],
        )?;
        Ok(())
    }

    pub fn insert_user(&self, id: UserId, login: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO platform_user (id, login, roles) VALUES (?1, ?2, '[]')",
            params![id, login],
        )?;
        Ok(())
    }

    pub fn map_identity(&self, user_id: UserId, contact_id: ContactId) -> Result<()> {
        self.conn.execute(
            "INSERT INTO identity_map (user_id, contact_id) VALUES (?1, ?2)",
            params![user_id, contact_id],
        )?;
        Ok(())
    }

    // ========================================================================
    // INSPECTION
    // ========================================================================

    pub fn user_roles(&self, user_id: UserId) -> Result<Vec<String>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT roles FROM platform_user WHERE id = ?1",
                [user_id],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            Some(raw) => serde_json::from_str(&raw)
                .with_context(|| format!("Corrupt role list for user {}", user_id)),
            None => Ok(Vec::new()),
        }
    }

    /// All platform users with their role lists, ordered by id.
    pub fn users(&self) -> Result<Vec<(UserId, String, Vec<String>)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, login, roles FROM platform_user ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, UserId>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        let mut users = Vec::new();
        for row in rows {
            let (id, login, raw) = row?;
            let roles = serde_json::from_str(&raw)
                .with_context(|| format!("Corrupt role list for user {}", id))?;
            users.push((id, login, roles));
        }
        Ok(users)
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

fn setup_schema(conn: &Connection) -> Result<()> {
    // WAL keeps the CLI usable while the host has the file open.
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS membership (
            id INTEGER PRIMARY KEY,
            contact_id INTEGER NOT NULL,
            membership_type_id INTEGER NOT NULL,
            status_id INTEGER NOT NULL,
            owner_membership_id INTEGER
        );

        CREATE TABLE IF NOT EXISTS membership_status (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            is_current_member INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS relationship (
            id INTEGER PRIMARY KEY,
            contact_id_a INTEGER NOT NULL,
            contact_id_b INTEGER NOT NULL,
            relationship_type_id INTEGER NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            is_current INTEGER NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS contribution (
            id INTEGER PRIMARY KEY,
            status TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS membership_payment (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            membership_id INTEGER NOT NULL,
            contribution_id INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS identity_map (
            user_id INTEGER NOT NULL UNIQUE,
            contact_id INTEGER NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS platform_user (
            id INTEGER PRIMARY KEY,
            login TEXT NOT NULL,
            roles TEXT NOT NULL DEFAULT '[]'
        );

        CREATE INDEX IF NOT EXISTS idx_membership_contact ON membership(contact_id);
        CREATE INDEX IF NOT EXISTS idx_relationship_a ON relationship(contact_id_a);
        CREATE INDEX IF NOT EXISTS idx_relationship_b ON relationship(contact_id_b);
        CREATE INDEX IF NOT EXISTS idx_payment_membership ON membership_payment(membership_id);
        CREATE INDEX IF NOT EXISTS idx_payment_contribution ON membership_payment(contribution_id);",
    )
    .context("Failed to create schema")?;

    Ok(())
}

// ============================================================================
// CRM QUERY
// ============================================================================

impl CrmQuery for SqliteStore {
    fn primary_memberships(
        &self,
        contact_ids: &[ContactId],
        membership_type_ids: &HashSet<i64>,
    ) -> Result<Vec<MembershipWithStatus>> {
        if contact_ids.is_empty() || membership_type_ids.is_empty() {
            return Ok(Vec::new());
        }

        let contact_marks = vec!["?"; contact_ids.len()].join(",");
        let type_marks = vec!["?"; membership_type_ids.len()].join(",");
        let sql = format!(
            "SELECT m.id, m.contact_id, m.membership_type_id, m.status_id, m.owner_membership_id,
                    s.id, s.name, s.is_current_member
             FROM membership m
             JOIN membership_status s ON s.id = m.status_id
             WHERE m.owner_membership_id IS NULL
               AND m.contact_id IN ({contact_marks})
               AND m.membership_type_id IN ({type_marks})
             ORDER BY m.id"
        );

        let bindings: Vec<i64> = contact_ids
            .iter()
            .copied()
            .chain(membership_type_ids.iter().copied())
            .collect();
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(bindings), |row| {
            Ok(MembershipWithStatus {
                membership: Membership {
                    id: row.get(0)?,
                    contact_id: row.get(1)?,
                    membership_type_id: row.get(2)?,
                    status_id: row.get(3)?,
                    owner_membership_id: row.get(4)?,
                },
                status: MembershipStatus {
                    id: row.get(5)?,
                    name: row.get(6)?,
                    is_current_member: row.get(7)?,
                },
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn membership(&self, membership_id: MembershipId) -> Result<Option<Membership>> {
        let membership = self
            .conn
            .query_row(
                "SELECT id, contact_id, membership_type_id, status_id, owner_membership_id
                 FROM membership WHERE id = ?1",
                [membership_id],
                |row| {
                    Ok(Membership {
                        id: row.get(0)?,
                        contact_id: row.get(1)?,
                        membership_type_id: row.get(2)?,
                        status_id: row.get(3)?,
                        owner_membership_id: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(membership)
    }

    fn current_relationships(
        &self,
        contact_id: ContactId,
        relationship_type_ids: &[i64],
    ) -> Result<Vec<Relationship>> {
        if relationship_type_ids.is_empty() {
            return Ok(Vec::new());
        }

        let type_marks = vec!["?"; relationship_type_ids.len()].join(",");
        let sql = format!(
            "SELECT id, contact_id_a, contact_id_b, relationship_type_id, is_active, is_current
             FROM relationship
             WHERE is_active AND is_current
               AND relationship_type_id IN ({type_marks})
               AND (contact_id_a = ? OR contact_id_b = ?)
             ORDER BY id"
        );

        let bindings: Vec<i64> = relationship_type_ids
            .iter()
            .copied()
            .chain([contact_id, contact_id])
            .collect();
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(bindings), |row| {
            Ok(Relationship {
                id: row.get(0)?,
                contact_id_a: row.get(1)?,
                contact_id_b: row.get(2)?,
                relationship_type_id: row.get(3)?,
                is_active: row.get(4)?,
                is_current: row.get(5)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn payments_for_memberships(
        &self,
        membership_ids: &[MembershipId],
    ) -> Result<Vec<MembershipPayment>> {
        if membership_ids.is_empty() {
            return Ok(Vec::new());
        }

        let marks = vec!["?"; membership_ids.len()].join(",");
        let sql = format!(
            "SELECT membership_id, contribution_id FROM membership_payment
             WHERE membership_id IN ({marks})"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(membership_ids.iter().copied()), |row| {
            Ok(MembershipPayment {
                membership_id: row.get(0)?,
                contribution_id: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn payments_for_contribution(
        &self,
        contribution_id: ContributionId,
    ) -> Result<Vec<MembershipPayment>> {
        let mut stmt = self.conn.prepare(
            "SELECT membership_id, contribution_id FROM membership_payment
             WHERE contribution_id = ?1",
        )?;
        let rows = stmt.query_map([contribution_id], |row| {
            Ok(MembershipPayment {
                membership_id: row.get(0)?,
                contribution_id: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn contribution(&self, contribution_id: ContributionId) -> Result<Option<Contribution>> {
        let row: Option<(ContributionId, String)> = self
            .conn
            .query_row(
                "SELECT id, status FROM contribution WHERE id = ?1",
                [contribution_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        // A status label the engine does not know cannot be pending, so the
        // row is treated as absent.
        Ok(row.and_then(|(id, label)| {
            ContributionStatus::parse(&label).map(|status| Contribution { id, status })
        }))
    }
}

// ============================================================================
// IDENTITY MAPPER
// ============================================================================

impl IdentityMapper for SqliteStore {
    fn user_for_contact(&self, contact_id: ContactId) -> Result<Option<UserId>> {
        let user_id = self
            .conn
            .query_row(
                "SELECT user_id FROM identity_map WHERE contact_id = ?1",
                [contact_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(user_id)
    }

    fn contact_for_user(&self, user_id: UserId) -> Result<Option<ContactId>> {
        let contact_id = self
            .conn
            .query_row(
                "SELECT contact_id FROM identity_map WHERE user_id = ?1",
                [user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(contact_id)
    }
}

// ============================================================================
// ROLE MUTATOR
// ============================================================================

impl RoleMutator for SqliteStore {
    fn set_role(&self, user_id: UserId, role: &str, present: bool) -> Result<()> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT roles FROM platform_user WHERE id = ?1",
                [user_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(raw) = raw else {
            // Identity map pointed at a user that no longer exists; nothing
            // to mutate.
            return Ok(());
        };

        let mut roles: Vec<String> = serde_json::from_str(&raw)
            .with_context(|| format!("Corrupt role list for user {}", user_id))?;
        if present {
            if !roles.iter().any(|existing| existing == role) {
                roles.push(role.to_string());
            }
        } else {
            roles.retain(|existing| existing != role);
        }

        self.conn.execute(
            "UPDATE platform_user SET roles = ?1 WHERE id = ?2",
            params![serde_json::to_string(&roles)?, user_id],
        )?;
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
