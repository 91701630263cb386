//! Table definitions and schema installation.

use rusqlite::Connection;

use super::{Result, StorageError};

/// Bumped whenever the table layout changes incompatibly.
const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS repositories (
    id                INTEGER PRIMARY KEY,
    url               TEXT NOT NULL UNIQUE,
    name              TEXT,
    guid              TEXT,
    jira_instance_url TEXT,
    jira_project_key  TEXT,
    created_at        TEXT NOT NULL,
    modified_at       TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS repo_branches (
    id                  INTEGER PRIMARY KEY,
    repository_id       INTEGER NOT NULL REFERENCES repositories(id),
    branch              TEXT NOT NULL,
    included_extensions TEXT NOT NULL,
    status              TEXT NOT NULL,
    guid                TEXT NOT NULL UNIQUE,
    name                TEXT,
    jira_instance_url   TEXT,
    jira_project_key    TEXT,
    created_at          TEXT NOT NULL,
    modified_at         TEXT NOT NULL,
    UNIQUE (repository_id, branch)
);

CREATE TABLE IF NOT EXISTS services (
    id             INTEGER PRIMARY KEY,
    repo_branch_id INTEGER NOT NULL UNIQUE REFERENCES repo_branches(id),
    port           INTEGER NOT NULL,
    created_at     TEXT NOT NULL,
    modified_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS clients (
    id             INTEGER PRIMARY KEY,
    repo_branch_id INTEGER NOT NULL UNIQUE REFERENCES repo_branches(id),
    created_at     TEXT NOT NULL,
    modified_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS endpoints (
    id            INTEGER PRIMARY KEY,
    service_id    INTEGER NOT NULL REFERENCES services(id),
    endpoint_url  TEXT NOT NULL,
    method        TEXT NOT NULL,
    description   TEXT NOT NULL,
    specification TEXT,
    created_at    TEXT NOT NULL,
    modified_at   TEXT NOT NULL,
    UNIQUE (service_id, endpoint_url, method)
);
CREATE INDEX IF NOT EXISTS endpoints_by_route ON endpoints (endpoint_url, method);

CREATE TABLE IF NOT EXISTS endpoint_consumers (
    id          INTEGER PRIMARY KEY,
    client_id   INTEGER NOT NULL REFERENCES clients(id),
    endpoint_id INTEGER NOT NULL REFERENCES endpoints(id),
    created_at  TEXT NOT NULL,
    modified_at TEXT NOT NULL,
    UNIQUE (client_id, endpoint_id)
);
CREATE INDEX IF NOT EXISTS endpoint_consumers_by_endpoint ON endpoint_consumers (endpoint_id);

CREATE TABLE IF NOT EXISTS affected_endpoints (
    id                             INTEGER PRIMARY KEY,
    endpoint_id                    INTEGER NOT NULL REFERENCES endpoints(id),
    change_type                    TEXT NOT NULL,
    description                    TEXT NOT NULL,
    reason                         TEXT NOT NULL,
    status                         TEXT NOT NULL,
    change_origin                  TEXT NOT NULL,
    origin_unique_id               TEXT NOT NULL,
    change_origin_url              TEXT,
    current_specification          TEXT,
    specification_after_the_change TEXT,
    created_at                     TEXT NOT NULL,
    modified_at                    TEXT NOT NULL,
    UNIQUE (endpoint_id, change_origin, origin_unique_id, change_type)
);
CREATE INDEX IF NOT EXISTS affected_endpoints_by_status ON affected_endpoints (status);

CREATE TABLE IF NOT EXISTS affected_clients (
    id                   INTEGER PRIMARY KEY,
    client_id            INTEGER NOT NULL REFERENCES clients(id),
    affected_endpoint_id INTEGER NOT NULL REFERENCES affected_endpoints(id),
    healing_status       TEXT NOT NULL,
    created_at           TEXT NOT NULL,
    modified_at          TEXT NOT NULL,
    UNIQUE (client_id, affected_endpoint_id)
);

CREATE TABLE IF NOT EXISTS action_items (
    id                 INTEGER PRIMARY KEY,
    affected_client_id INTEGER NOT NULL REFERENCES affected_clients(id),
    action_type        TEXT NOT NULL,
    meta_data          TEXT,
    comments           TEXT,
    propagation_status TEXT NOT NULL,
    created_at         TEXT NOT NULL,
    modified_at        TEXT NOT NULL,
    UNIQUE (affected_client_id, action_type)
);
CREATE INDEX IF NOT EXISTS action_items_by_type_status
    ON action_items (action_type, propagation_status);
";

/// Creates any missing tables and stamps the schema version.
///
/// Refuses databases written by a newer schema.
pub(super) fn install(conn: &Connection) -> Result<()> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version > SCHEMA_VERSION {
        return Err(StorageError::Corrupt(format!(
            "schema version {version} is newer than supported version {SCHEMA_VERSION}"
        )));
    }
    conn.execute_batch(SCHEMA)?;
    if version < SCHEMA_VERSION {
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    }
    Ok(())
}
