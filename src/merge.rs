// Merge-Time Relationship Repair
// When the CRM merges two contacts it consolidates their relationship rows
// with a batch of SQL statements. A naive merge can leave the surviving
// contact's copy of a relationship inactive even though the losing contact's
// copy was active, silently revoking access for contacts that depend on the
// edge. One repair statement, injected before the merge's own statements,
// reactivates those rows first.

use crate::entities::ContactId;

/// Build the repair statement for a merge of `other_contact_id` (losing)
/// into `main_contact_id` (surviving).
///
/// Reactivates the surviving contact's inactive relationship wherever the
/// losing contact holds an active relationship of the same type to the same
/// counterpart.
pub fn repair_statement(main_contact_id: ContactId, other_contact_id: ContactId) -> String {
    format!(
        "UPDATE relationship SET is_active = 1 \
         WHERE contact_id_b = {main} \
           AND NOT is_active \
           AND EXISTS (\
             SELECT 1 FROM relationship other \
              WHERE other.relationship_type_id = relationship.relationship_type_id \
                AND other.contact_id_a = relationship.contact_id_a \
                AND other.contact_id_b = {other} \
                AND other.is_active\
           )",
        main = main_contact_id,
        other = other_contact_id,
    )
}

/// Prepend the repair statement to the merge's statement list so it runs
/// before any relationship row is consolidated or trashed.
pub fn prepend_repair(
    main_contact_id: ContactId,
    other_contact_id: ContactId,
    statements: &mut Vec<String>,
) {
    statements.insert(0, repair_statement(main_contact_id, other_contact_id));
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;

    #[test]
    fn test_repair_reactivates_surviving_relationship() {
        let store = SqliteStore::open_in_memory().unwrap();
        // Contact 30 (employer side a) relates to both merge parties: the
        // surviving contact 1 holds the edge inactive, the losing contact 2
        // holds it active.
        store.insert_relationship(1, 30, 1, 5, false, false).unwrap();
        store.insert_relationship(2, 30, 2, 5, true, true).unwrap();

        store
            .connection()
            .execute_batch(&repair_statement(1, 2))
            .unwrap();

        let is_active: bool = store
            .connection()
            .query_row("SELECT is_active FROM relationship WHERE id = 1", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert!(is_active);
    }

    #[test]
    fn test_repair_requires_matching_type_and_counterpart() {
        let store = SqliteStore::open_in_memory().unwrap();
        // Different relationship type on the losing side.
        store.insert_relationship(1, 30, 1, 5, false, false).unwrap();
        store.insert_relationship(2, 30, 2, 7, true, true).unwrap();
        // Different counterpart on the losing side.
        store.insert_relationship(3, 31, 1, 5, false, false).unwrap();
        store.insert_relationship(4, 32, 2, 5, true, true).unwrap();

        store
            .connection()
            .execute_batch(&repair_statement(1, 2))
            .unwrap();

        for id in [1, 3] {
            let is_active: bool = store
                .connection()
                .query_row(
                    "SELECT is_active FROM relationship WHERE id = ?1",
                    [id],
                    |row| row.get(0),
                )
                .unwrap();
            assert!(!is_active, "relationship {} should stay inactive", id);
        }
    }

    #[test]
    fn test_repair_leaves_inactive_losing_edges_alone() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_relationship(1, 30, 1, 5, false, false).unwrap();
        store.insert_relationship(2, 30, 2, 5, false, false).unwrap();

        store
            .connection()
            .execute_batch(&repair_statement(1, 2))
            .unwrap();

        let is_active: bool = store
            .connection()
            .query_row("SELECT is_active FROM relationship WHERE id = 1", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert!(!is_active);
    }

    #[test]
    fn test_repair_runs_before_merge_statements() {
        let mut statements = vec!["DELETE FROM relationship WHERE contact_id_b = 2".to_string()];
        prepend_repair(1, 2, &mut statements);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].starts_with("UPDATE relationship"));
    }
}
