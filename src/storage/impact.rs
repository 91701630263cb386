//! Impact records: which clients a change affects, and whether each has
//! healed.

use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::info;

use crate::model::{AffectedClient, Status};

use super::{Result, Storage, StorageError, now, parsed};

pub(crate) const AFFECTED_CLIENT_COLUMNS: &str = "ac.id, ac.client_id, ac.affected_endpoint_id, \
     ac.healing_status, ac.created_at, ac.modified_at";

impl Storage {
    /// Sets the healing status of an impact record. Any status is accepted,
    /// including reopening a completed record.
    pub fn set_healing_status(&self, id: i64, status: Status) -> Result<AffectedClient> {
        let rows = self.conn.execute(
            "UPDATE affected_clients SET healing_status = ?1, modified_at = ?2 WHERE id = ?3",
            params![status.as_str(), now(), id],
        )?;
        if rows == 0 {
            return Err(StorageError::AffectedClientNotFound(id));
        }
        info!(affected_client_id = id, %status, "healing status set");
        get(&self.conn, id)
    }

    /// Every impact record of one change, in client order.
    pub fn affected_clients_of(&self, change_id: i64) -> Result<Vec<AffectedClient>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {AFFECTED_CLIENT_COLUMNS} FROM affected_clients ac
             WHERE ac.affected_endpoint_id = ?1
             ORDER BY ac.client_id"
        ))?;
        let records = stmt
            .query_map([change_id], |row| affected_client_from_row(row, 0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }
}

pub(crate) fn get(conn: &Connection, id: i64) -> Result<AffectedClient> {
    conn.query_row(
        &format!("SELECT {AFFECTED_CLIENT_COLUMNS} FROM affected_clients ac WHERE ac.id = ?1"),
        [id],
        |row| affected_client_from_row(row, 0),
    )
    .optional()?
    .ok_or(StorageError::AffectedClientNotFound(id))
}

pub(crate) fn find(
    conn: &Connection,
    client_id: i64,
    change_id: i64,
) -> Result<Option<AffectedClient>> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {AFFECTED_CLIENT_COLUMNS} FROM affected_clients ac
                 WHERE ac.client_id = ?1 AND ac.affected_endpoint_id = ?2"
            ),
            params![client_id, change_id],
            |row| affected_client_from_row(row, 0),
        )
        .optional()?)
}

/// Inserts a `pending` impact record unless one exists for the pair.
///
/// Returns the new id only when this call created the row.
pub(crate) fn insert(conn: &Connection, client_id: i64, change_id: i64) -> Result<Option<i64>> {
    Ok(conn
        .query_row(
            "INSERT INTO affected_clients
                 (client_id, affected_endpoint_id, healing_status, created_at, modified_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT (client_id, affected_endpoint_id) DO NOTHING
             RETURNING id",
            params![client_id, change_id, Status::Pending.as_str(), now()],
            |row| row.get(0),
        )
        .optional()?)
}

pub(crate) fn affected_client_from_row(
    row: &Row<'_>,
    at: usize,
) -> rusqlite::Result<AffectedClient> {
    Ok(AffectedClient {
        id: row.get(at)?,
        client_id: row.get(at + 1)?,
        affected_endpoint_id: row.get(at + 2)?,
        healing_status: parsed(row, at + 3)?,
        created_at: parsed(row, at + 4)?,
        modified_at: parsed(row, at + 5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::model::ChangeOrigin;
    use crate::storage::ledger::tests::report;
    use crate::storage::testing::{consumer, service_with_endpoint, test_storage};

    #[test]
    fn insert_creates_once_per_pair() {
        let (_dir, mut storage) = test_storage();
        service_with_endpoint(&mut storage, "https://github.com/acme/users", "/users/{id}", "GET");
        let client = consumer(&mut storage, "https://github.com/acme/orders", "/users/{id}", "GET");
        let change = storage
            .notify(&report(ChangeOrigin::GithubPr, "42"))
            .unwrap();

        let first = insert(storage.connection(), client.id, change.id).unwrap();
        let second = insert(storage.connection(), client.id, change.id).unwrap();

        assert!(first.is_some());
        assert_eq!(second, None);
        let found = find(storage.connection(), client.id, change.id)
            .unwrap()
            .unwrap();
        assert_eq!(Some(found.id), first);
        assert_eq!(found.healing_status, Status::Pending);
    }

    #[test]
    fn healing_status_can_reopen() {
        let (_dir, mut storage) = test_storage();
        service_with_endpoint(&mut storage, "https://github.com/acme/users", "/users/{id}", "GET");
        let client = consumer(&mut storage, "https://github.com/acme/orders", "/users/{id}", "GET");
        let change = storage
            .notify(&report(ChangeOrigin::GithubPr, "42"))
            .unwrap();
        let id = insert(storage.connection(), client.id, change.id)
            .unwrap()
            .unwrap();

        storage.set_healing_status(id, Status::Completed).unwrap();
        let reopened = storage.set_healing_status(id, Status::InProgress).unwrap();

        assert_eq!(reopened.healing_status, Status::InProgress);
        assert_eq!(storage.affected_clients_of(change.id).unwrap().len(), 1);
    }

    #[test]
    fn unknown_record_is_not_found() {
        let (_dir, storage) = test_storage();
        let err = storage
            .set_healing_status(99, Status::Completed)
            .unwrap_err();
        assert!(matches!(err, StorageError::AffectedClientNotFound(99)));
    }
}
