//! Action items: per-client remediation tasks and the remediators' view of
//! them.

use jiff::Timestamp;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::info;

use crate::model::{ActionItem, ActionItemDetail, ActionItemUpdate, ActionKind, Page, Status};

use super::{
    Result, Storage, StorageError, json,
    ledger::{CHANGE_COLUMNS, change_from_row},
    now, parsed,
    registry::branch_context_from_row,
};

pub(crate) const ACTION_ITEM_COLUMNS: &str = "ai.id, ai.affected_client_id, ai.action_type, \
     ai.propagation_status, ai.comments, ai.meta_data, ai.created_at, ai.modified_at";

/// Column count of [`ACTION_ITEM_COLUMNS`].
const ITEM_WIDTH: usize = 8;

/// Column count of `CHANGE_COLUMNS`.
const CHANGE_WIDTH: usize = 13;

/// Column count of a branch context selection.
const CONTEXT_WIDTH: usize = 6;

/// Timestamp prefix of each comment line. Stamps are UTC and say so.
const COMMENT_STAMP: &str = "%Y-%m-%d %H:%M:%S UTC";

impl Storage {
    pub fn action_item(&self, id: i64) -> Result<ActionItem> {
        get(&self.conn, id)
    }

    /// Applies a remediator's update to an action item.
    ///
    /// A comment is appended as a timestamped line, artifacts are merged into
    /// the client scope of the metadata, and a status is set as given.
    pub fn update_action_item(&mut self, id: i64, update: ActionItemUpdate) -> Result<ActionItem> {
        let tx = self.transaction()?;
        let mut item = get(&tx, id)?;

        if let Some(comment) = update.comment.as_deref()
            && !comment.is_empty()
        {
            let stamp = Timestamp::now().strftime(COMMENT_STAMP);
            item.comments
                .get_or_insert_with(String::new)
                .push_str(&format!("{stamp} : {comment}\n"));
        }
        if let Some(artifacts) = update.artifacts {
            item.meta.merge(artifacts);
        }
        if let Some(status) = update.status {
            item.status = status;
        }

        tx.execute(
            "UPDATE action_items
             SET comments = ?1, meta_data = ?2, propagation_status = ?3, modified_at = ?4
             WHERE id = ?5",
            params![
                item.comments,
                serde_json::to_string(&item.meta)?,
                item.status.as_str(),
                now(),
                id,
            ],
        )?;
        let item = get(&tx, id)?;
        tx.commit()?;

        info!(action_item_id = id, status = %item.status, "action item updated");
        Ok(item)
    }

    /// Lists action items joined with their change, endpoint and both sides
    /// of the dependency, ordered by id.
    pub fn list_action_items(
        &self,
        kind: Option<ActionKind>,
        status: Option<Status>,
        page: Page,
    ) -> Result<Vec<ActionItemDetail>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ACTION_ITEM_COLUMNS},
                    {CHANGE_COLUMNS},
                    e.endpoint_url, e.method,
                    sb.name, sb.guid, sr.url, sb.branch, sb.jira_instance_url, sb.jira_project_key,
                    ac.healing_status,
                    cb.name, cb.guid, cr.url, cb.branch, cb.jira_instance_url, cb.jira_project_key
             FROM action_items ai
             JOIN affected_clients ac ON ac.id = ai.affected_client_id
             JOIN affected_endpoints ae ON ae.id = ac.affected_endpoint_id
             JOIN endpoints e ON e.id = ae.endpoint_id
             JOIN services s ON s.id = e.service_id
             JOIN repo_branches sb ON sb.id = s.repo_branch_id
             JOIN repositories sr ON sr.id = sb.repository_id
             JOIN clients c ON c.id = ac.client_id
             JOIN repo_branches cb ON cb.id = c.repo_branch_id
             JOIN repositories cr ON cr.id = cb.repository_id
             WHERE (?1 IS NULL OR ai.action_type = ?1)
               AND (?2 IS NULL OR ai.propagation_status = ?2)
             ORDER BY ai.id
             LIMIT ?3 OFFSET ?4"
        ))?;

        let details = stmt
            .query_map(
                params![
                    kind.map(ActionKind::as_str),
                    status.map(Status::as_str),
                    page.limit(),
                    page.offset(),
                ],
                detail_from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(details)
    }
}

fn detail_from_row(row: &Row<'_>) -> rusqlite::Result<ActionItemDetail> {
    let item = action_item_from_row(row, 0)?;
    let change = change_from_row(row, ITEM_WIDTH)?;

    let at = ITEM_WIDTH + CHANGE_WIDTH;
    let endpoint = (row.get(at)?, row.get(at + 1)?);
    let originating = branch_context_from_row(row, at + 2)?;
    let healing_status = parsed(row, at + 2 + CONTEXT_WIDTH)?;
    let client = branch_context_from_row(row, at + 3 + CONTEXT_WIDTH)?;

    Ok(ActionItemDetail::assemble(
        item,
        change,
        endpoint,
        originating,
        healing_status,
        client,
    ))
}

pub(crate) fn get(conn: &Connection, id: i64) -> Result<ActionItem> {
    conn.query_row(
        &format!("SELECT {ACTION_ITEM_COLUMNS} FROM action_items ai WHERE ai.id = ?1"),
        [id],
        |row| action_item_from_row(row, 0),
    )
    .optional()?
    .ok_or(StorageError::ActionItemNotFound(id))
}

/// Inserts a `pending` action item unless the impact record already has one
/// of this kind. Returns the new id only when this call created the row.
pub(crate) fn insert(
    conn: &Connection,
    affected_client_id: i64,
    kind: ActionKind,
) -> Result<Option<i64>> {
    Ok(conn
        .query_row(
            "INSERT INTO action_items
                 (affected_client_id, action_type, propagation_status, created_at, modified_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT (affected_client_id, action_type) DO NOTHING
             RETURNING id",
            params![
                affected_client_id,
                kind.as_str(),
                Status::Pending.as_str(),
                now()
            ],
            |row| row.get(0),
        )
        .optional()?)
}

/// Flags every unfinished item of an impact record as `updated`, returning
/// how many were flagged. Completed items stay completed.
pub(crate) fn mark_updated(conn: &Connection, affected_client_id: i64) -> Result<usize> {
    Ok(conn.execute(
        "UPDATE action_items
         SET propagation_status = ?1, modified_at = ?2
         WHERE affected_client_id = ?3 AND propagation_status != ?4",
        params![
            Status::Updated.as_str(),
            now(),
            affected_client_id,
            Status::Completed.as_str(),
        ],
    )?)
}

pub(crate) fn for_affected_client(
    conn: &Connection,
    affected_client_id: i64,
) -> Result<Vec<ActionItem>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ACTION_ITEM_COLUMNS} FROM action_items ai
         WHERE ai.affected_client_id = ?1 ORDER BY ai.id"
    ))?;
    let items = stmt
        .query_map([affected_client_id], |row| action_item_from_row(row, 0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(items)
}

pub(crate) fn action_item_from_row(row: &Row<'_>, at: usize) -> rusqlite::Result<ActionItem> {
    Ok(ActionItem {
        id: row.get(at)?,
        affected_client_id: row.get(at + 1)?,
        kind: parsed(row, at + 2)?,
        status: parsed(row, at + 3)?,
        comments: row.get(at + 4)?,
        meta: json(row, at + 5)?,
        created_at: parsed(row, at + 6)?,
        modified_at: parsed(row, at + 7)?,
    })
}
