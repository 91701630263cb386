//! The change ledger: reported interface changes (`affected_endpoints`).

use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::info;

use crate::model::{AffectedEndpoint, ChangeKind, ChangeOrigin, ChangeReport, Page, Status};

use super::{Result, Storage, StorageError, now, parsed, registry};

pub(crate) const CHANGE_COLUMNS: &str = "ae.id, ae.endpoint_id, ae.change_type, \
     ae.description, ae.reason, ae.status, ae.change_origin, ae.origin_unique_id, \
     ae.change_origin_url, ae.current_specification, ae.specification_after_the_change, \
     ae.created_at, ae.modified_at";

impl Storage {
    /// Records a reported change against the endpoint at (url, method).
    ///
    /// A report whose (endpoint, origin, origin id, kind) tuple is new creates
    /// a `pending` entry. Otherwise the existing entry accumulates the new
    /// description and reason, refreshes the origin URL and the specification
    /// after the change when given, and goes to `updated`.
    pub fn notify(&mut self, report: &ChangeReport) -> Result<AffectedEndpoint> {
        if report.origin_id.trim().is_empty() {
            return Err(StorageError::InvalidInput(
                "origin unique id must not be empty".into(),
            ));
        }

        let tx = self.transaction()?;
        let endpoint = registry::endpoint_by_route(&tx, &report.url, &report.method)?
            .ok_or_else(|| StorageError::EndpointNotFound {
                url: report.url.clone(),
                method: report.method.to_ascii_uppercase(),
            })?;

        let existing = find_by_origin(
            &tx,
            endpoint.id,
            report.origin,
            &report.origin_id,
            report.kind,
        )?;

        let id = if let Some(change) = existing {
            tx.execute(
                "UPDATE affected_endpoints
                 SET description = ?1,
                     reason = ?2,
                     change_origin_url = COALESCE(?3, change_origin_url),
                     specification_after_the_change = COALESCE(?4, specification_after_the_change),
                     status = ?5,
                     modified_at = ?6
                 WHERE id = ?7",
                params![
                    append_line(&change.description, &report.description),
                    append_line(&change.reason, &report.reason),
                    report.origin_url,
                    report.specification_after,
                    Status::Updated.as_str(),
                    now(),
                    change.id,
                ],
            )?;
            info!(
                change_id = change.id,
                endpoint_id = endpoint.id,
                origin = %report.origin,
                origin_id = %report.origin_id,
                "change updated"
            );
            change.id
        } else {
            let ts = now();
            tx.execute(
                "INSERT INTO affected_endpoints
                     (endpoint_id, change_type, description, reason, status,
                      change_origin, origin_unique_id, change_origin_url,
                      current_specification, specification_after_the_change,
                      created_at, modified_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
                params![
                    endpoint.id,
                    report.kind.as_str(),
                    report.description,
                    report.reason,
                    Status::Pending.as_str(),
                    report.origin.as_str(),
                    report.origin_id,
                    report.origin_url,
                    endpoint.specification,
                    report.specification_after,
                    ts,
                ],
            )?;
            let id = tx.last_insert_rowid();
            info!(
                change_id = id,
                endpoint_id = endpoint.id,
                kind = %report.kind,
                origin = %report.origin,
                origin_id = %report.origin_id,
                "change recorded"
            );
            id
        };

        let change = get(&tx, id)?;
        tx.commit()?;
        Ok(change)
    }

    /// Ids of every change awaiting propagation, oldest first.
    pub fn open_changes(&self) -> Result<Vec<i64>> {
        open_change_ids(&self.conn)
    }

    /// Loads one change by id.
    pub fn change(&self, id: i64) -> Result<AffectedEndpoint> {
        get(&self.conn, id)
    }

    /// Lists changes, optionally narrowed to one status, ordered by id.
    pub fn list_changes(&self, status: Option<Status>, page: Page) -> Result<Vec<AffectedEndpoint>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CHANGE_COLUMNS} FROM affected_endpoints ae
             WHERE ?1 IS NULL OR ae.status = ?1
             ORDER BY ae.id LIMIT ?2 OFFSET ?3"
        ))?;
        let changes = stmt
            .query_map(
                params![status.map(Status::as_str), page.limit(), page.offset()],
                |row| change_from_row(row, 0),
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(changes)
    }
}

/// Appends `addition` on its own line. Empty text on either side adds no
/// separator.
fn append_line(existing: &str, addition: &str) -> String {
    match (existing.is_empty(), addition.is_empty()) {
        (_, true) => existing.to_string(),
        (true, false) => addition.to_string(),
        (false, false) => format!("{existing}\n{addition}"),
    }
}

fn find_by_origin(
    conn: &Connection,
    endpoint_id: i64,
    origin: ChangeOrigin,
    origin_id: &str,
    kind: ChangeKind,
) -> Result<Option<AffectedEndpoint>> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {CHANGE_COLUMNS} FROM affected_endpoints ae
                 WHERE ae.endpoint_id = ?1 AND ae.change_origin = ?2
                   AND ae.origin_unique_id = ?3 AND ae.change_type = ?4"
            ),
            params![endpoint_id, origin.as_str(), origin_id, kind.as_str()],
            |row| change_from_row(row, 0),
        )
        .optional()?)
}

pub(crate) fn get(conn: &Connection, id: i64) -> Result<AffectedEndpoint> {
    conn.query_row(
        &format!("SELECT {CHANGE_COLUMNS} FROM affected_endpoints ae WHERE ae.id = ?1"),
        [id],
        |row| change_from_row(row, 0),
    )
    .optional()?
    .ok_or(StorageError::ChangeNotFound(id))
}

fn open_change_ids(conn: &Connection) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(
        "SELECT id FROM affected_endpoints WHERE status IN (?1, ?2) ORDER BY id",
    )?;
    let ids = stmt
        .query_map(
            params![Status::Pending.as_str(), Status::Updated.as_str()],
            |row| row.get(0),
        )?
        .collect::<rusqlite::Result<Vec<i64>>>()?;
    Ok(ids)
}

pub(crate) fn set_status(conn: &Connection, id: i64, status: Status) -> Result<()> {
    let rows = conn.execute(
        "UPDATE affected_endpoints SET status = ?1, modified_at = ?2 WHERE id = ?3",
        params![status.as_str(), now(), id],
    )?;
    if rows == 0 {
        return Err(StorageError::ChangeNotFound(id));
    }
    Ok(())
}

pub(crate) fn change_from_row(row: &Row<'_>, at: usize) -> rusqlite::Result<AffectedEndpoint> {
    Ok(AffectedEndpoint {
        id: row.get(at)?,
        endpoint_id: row.get(at + 1)?,
        kind: parsed(row, at + 2)?,
        description: row.get(at + 3)?,
        reason: row.get(at + 4)?,
        status: parsed(row, at + 5)?,
        origin: parsed(row, at + 6)?,
        origin_id: row.get(at + 7)?,
        origin_url: row.get(at + 8)?,
        specification_before: row.get(at + 9)?,
        specification_after: row.get(at + 10)?,
        created_at: parsed(row, at + 11)?,
        modified_at: parsed(row, at + 12)?,
    })
}
