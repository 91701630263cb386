//! Registry storage: repositories, branches, services, clients, endpoints
//! and the consumer relation between clients and endpoints.
//!
//! Every write is an idempotent upsert keyed by the table's natural unique
//! constraint, so onboarding can be replayed safely.

use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::model::{
    Branch, BranchContext, BranchProfile, BranchTree, Client, ClientTree, Endpoint, LinkOutcome,
    Page, Repository, RepositoryTree, Service, ServiceTree, Status,
};

use super::{Result, Storage, StorageError, is_constraint_violation, json, now, parsed, port};

pub(crate) const REPOSITORY_COLUMNS: &str =
    "r.id, r.url, r.name, r.guid, r.jira_instance_url, r.jira_project_key, r.created_at, r.modified_at";

pub(crate) const BRANCH_COLUMNS: &str = "b.id, b.repository_id, b.branch, b.name, b.guid, \
     b.jira_instance_url, b.jira_project_key, b.included_extensions, b.status, \
     b.created_at, b.modified_at";

pub(crate) const SERVICE_COLUMNS: &str =
    "s.id, s.repo_branch_id, s.port, s.created_at, s.modified_at";

pub(crate) const CLIENT_COLUMNS: &str = "c.id, c.repo_branch_id, c.created_at, c.modified_at";

pub(crate) const ENDPOINT_COLUMNS: &str = "e.id, e.service_id, e.endpoint_url, e.method, \
     e.description, e.specification, e.created_at, e.modified_at";

impl Storage {
    /// Registers a repository together with its first branch.
    ///
    /// Fails with [`StorageError::RepositoryAlreadyExists`] if the URL is
    /// already registered; nothing is written in that case.
    pub fn register_repository(
        &mut self,
        url: &str,
        branch: &str,
        included_extensions: &[String],
    ) -> Result<(Repository, Branch)> {
        let tx = self.transaction()?;
        let repository = insert_repository(&tx, url)?;
        let branch = upsert_branch(&tx, repository.id, branch, included_extensions)?;
        tx.commit()?;
        Ok((repository, branch))
    }

    /// Registers another branch of a known repository. Idempotent.
    pub fn register_branch(
        &self,
        repository_id: i64,
        branch: &str,
        included_extensions: &[String],
    ) -> Result<Branch> {
        upsert_branch(&self.conn, repository_id, branch, included_extensions)
    }

    /// Loads a repository by URL.
    pub fn repository_by_url(&self, url: &str) -> Result<Repository> {
        repository_by_url(&self.conn, url)
    }

    /// Loads a branch by repository URL and branch name.
    pub fn branch(&self, repository_url: &str, branch: &str) -> Result<Branch> {
        branch_by_name(&self.conn, repository_url, branch)
    }

    pub fn set_branch_status(&self, branch_id: i64, status: Status) -> Result<()> {
        set_branch_status(&self.conn, branch_id, status)
    }

    pub fn consumers_of(&self, endpoint_id: i64) -> Result<Vec<Client>> {
        consumers_of(&self.conn, endpoint_id)
    }

    /// Looks up endpoints by URL template, optionally narrowed to one method.
    pub fn find_endpoints(&self, url: &str, method: Option<&str>) -> Result<Vec<Endpoint>> {
        find_endpoints(&self.conn, url, method)
    }

    /// Lists repositories with their branches, services, clients and endpoints.
    pub fn list_repositories(&self, page: Page) -> Result<Vec<RepositoryTree>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {REPOSITORY_COLUMNS} FROM repositories r ORDER BY r.id LIMIT ?1 OFFSET ?2"
        ))?;
        let repositories = stmt
            .query_map(params![page.limit(), page.offset()], |row| {
                repository_from_row(row, 0)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        repositories
            .into_iter()
            .map(|repository| {
                let branches = branches_of(&self.conn, repository.id)?
                    .into_iter()
                    .map(|branch| branch_tree(&self.conn, branch))
                    .collect::<Result<Vec<_>>>()?;
                Ok(RepositoryTree {
                    repository,
                    branches,
                })
            })
            .collect()
    }
}

fn branch_tree(conn: &Connection, branch: Branch) -> Result<BranchTree> {
    let mut services = Vec::new();
    if let Some(service) = service_of_branch(conn, branch.id)? {
        let exposed_endpoints = endpoints_of_service(conn, service.id)?;
        services.push(ServiceTree {
            service,
            exposed_endpoints,
        });
    }

    let mut clients = Vec::new();
    if let Some(client) = client_of_branch(conn, branch.id)? {
        let consumed_endpoints = consumed_by(conn, client.id)?;
        clients.push(ClientTree {
            client,
            consumed_endpoints,
        });
    }

    Ok(BranchTree {
        branch,
        services,
        clients,
    })
}

// ── Repositories & branches ──

pub(crate) fn insert_repository(conn: &Connection, url: &str) -> Result<Repository> {
    let ts = now();
    let inserted = conn.execute(
        "INSERT INTO repositories (url, created_at, modified_at) VALUES (?1, ?2, ?2)",
        params![url, ts],
    );
    if let Err(err) = inserted {
        if is_constraint_violation(&err) {
            return Err(StorageError::RepositoryAlreadyExists(url.to_string()));
        }
        return Err(err.into());
    }
    repository_by_url(conn, url)
}

pub(crate) fn repository_by_url(conn: &Connection, url: &str) -> Result<Repository> {
    conn.query_row(
        &format!("SELECT {REPOSITORY_COLUMNS} FROM repositories r WHERE r.url = ?1"),
        [url],
        |row| repository_from_row(row, 0),
    )
    .optional()?
    .ok_or_else(|| StorageError::RepositoryNotFound(url.to_string()))
}

pub(crate) fn update_repository_profile(
    conn: &Connection,
    repository_id: i64,
    profile: &BranchProfile,
) -> Result<()> {
    conn.execute(
        "UPDATE repositories
         SET name = COALESCE(?1, name),
             guid = COALESCE(?2, guid),
             jira_instance_url = COALESCE(?3, jira_instance_url),
             jira_project_key = COALESCE(?4, jira_project_key),
             modified_at = ?5
         WHERE id = ?6",
        params![
            profile.name,
            profile.guid,
            profile.jira_instance_url,
            profile.jira_project_key,
            now(),
            repository_id,
        ],
    )?;
    Ok(())
}

/// Inserts a branch, or refreshes its included extensions if it exists.
pub(crate) fn upsert_branch(
    conn: &Connection,
    repository_id: i64,
    branch: &str,
    included_extensions: &[String],
) -> Result<Branch> {
    let extensions = serde_json::to_string(included_extensions)?;
    conn.execute(
        "INSERT INTO repo_branches
             (repository_id, branch, included_extensions, status, guid, created_at, modified_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
         ON CONFLICT (repository_id, branch) DO UPDATE
         SET included_extensions = excluded.included_extensions,
             modified_at = excluded.modified_at",
        params![
            repository_id,
            branch,
            extensions,
            Status::Pending.as_str(),
            Uuid::new_v4().to_string(),
            now(),
        ],
    )?;
    conn.query_row(
        &format!(
            "SELECT {BRANCH_COLUMNS} FROM repo_branches b
             WHERE b.repository_id = ?1 AND b.branch = ?2"
        ),
        params![repository_id, branch],
        |row| branch_from_row(row, 0),
    )
    .map_err(Into::into)
}

pub(crate) fn branch_by_name(
    conn: &Connection,
    repository_url: &str,
    branch: &str,
) -> Result<Branch> {
    let repository = repository_by_url(conn, repository_url)?;
    conn.query_row(
        &format!(
            "SELECT {BRANCH_COLUMNS} FROM repo_branches b
             WHERE b.repository_id = ?1 AND b.branch = ?2"
        ),
        params![repository.id, branch],
        |row| branch_from_row(row, 0),
    )
    .optional()?
    .ok_or_else(|| StorageError::BranchNotFound(format!("{repository_url}@{branch}")))
}

fn branches_of(conn: &Connection, repository_id: i64) -> Result<Vec<Branch>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BRANCH_COLUMNS} FROM repo_branches b WHERE b.repository_id = ?1 ORDER BY b.id"
    ))?;
    let branches = stmt
        .query_map([repository_id], |row| branch_from_row(row, 0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(branches)
}

/// Overwrites the descriptive fields that are present in `profile`.
pub(crate) fn update_branch_profile(
    conn: &Connection,
    branch_id: i64,
    profile: &BranchProfile,
) -> Result<()> {
    let rows = conn.execute(
        "UPDATE repo_branches
         SET name = COALESCE(?1, name),
             guid = COALESCE(?2, guid),
             jira_instance_url = COALESCE(?3, jira_instance_url),
             jira_project_key = COALESCE(?4, jira_project_key),
             modified_at = ?5
         WHERE id = ?6",
        params![
            profile.name,
            profile.guid,
            profile.jira_instance_url,
            profile.jira_project_key,
            now(),
            branch_id,
        ],
    )?;
    if rows == 0 {
        return Err(StorageError::BranchNotFound(branch_id.to_string()));
    }
    Ok(())
}

pub(crate) fn set_branch_status(conn: &Connection, branch_id: i64, status: Status) -> Result<()> {
    let rows = conn.execute(
        "UPDATE repo_branches SET status = ?1, modified_at = ?2 WHERE id = ?3",
        params![status.as_str(), now(), branch_id],
    )?;
    if rows == 0 {
        return Err(StorageError::BranchNotFound(branch_id.to_string()));
    }
    Ok(())
}

/// Reporting context for a branch: names, repository and tracker linkage.
pub(crate) fn branch_context(conn: &Connection, branch_id: i64) -> Result<BranchContext> {
    conn.query_row(
        "SELECT b.name, b.guid, r.url, b.branch, b.jira_instance_url, b.jira_project_key
         FROM repo_branches b JOIN repositories r ON r.id = b.repository_id
         WHERE b.id = ?1",
        [branch_id],
        |row| branch_context_from_row(row, 0),
    )
    .optional()?
    .ok_or_else(|| StorageError::BranchNotFound(branch_id.to_string()))
}

// ── Services & clients ──

/// Returns the branch's service, creating it with `port` if missing.
///
/// An existing service keeps its port.
pub(crate) fn find_or_create_service(
    conn: &Connection,
    branch_id: i64,
    port: u16,
) -> Result<Service> {
    conn.execute(
        "INSERT INTO services (repo_branch_id, port, created_at, modified_at)
         VALUES (?1, ?2, ?3, ?3)
         ON CONFLICT (repo_branch_id) DO NOTHING",
        params![branch_id, port, now()],
    )?;
    service_of_branch(conn, branch_id)?
        .ok_or_else(|| StorageError::BranchNotFound(branch_id.to_string()))
}

/// Returns the branch's client, creating it if missing.
pub(crate) fn find_or_create_client(conn: &Connection, branch_id: i64) -> Result<Client> {
    conn.execute(
        "INSERT INTO clients (repo_branch_id, created_at, modified_at)
         VALUES (?1, ?2, ?2)
         ON CONFLICT (repo_branch_id) DO NOTHING",
        params![branch_id, now()],
    )?;
    client_of_branch(conn, branch_id)?
        .ok_or_else(|| StorageError::BranchNotFound(branch_id.to_string()))
}

fn service_of_branch(conn: &Connection, branch_id: i64) -> Result<Option<Service>> {
    Ok(conn
        .query_row(
            &format!("SELECT {SERVICE_COLUMNS} FROM services s WHERE s.repo_branch_id = ?1"),
            [branch_id],
            |row| service_from_row(row, 0),
        )
        .optional()?)
}

fn client_of_branch(conn: &Connection, branch_id: i64) -> Result<Option<Client>> {
    Ok(conn
        .query_row(
            &format!("SELECT {CLIENT_COLUMNS} FROM clients c WHERE c.repo_branch_id = ?1"),
            [branch_id],
            |row| client_from_row(row, 0),
        )
        .optional()?)
}

/// Every service, in registration order.
pub(crate) fn all_services(conn: &Connection) -> Result<Vec<Service>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SERVICE_COLUMNS} FROM services s ORDER BY s.id"
    ))?;
    let services = stmt
        .query_map([], |row| service_from_row(row, 0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(services)
}

// ── Endpoints ──

/// Inserts an endpoint, or refreshes the description and specification of
/// the existing (service, url, method) row. The method is stored upper-case.
pub(crate) fn upsert_endpoint(
    conn: &Connection,
    service_id: i64,
    url: &str,
    method: &str,
    description: &str,
    specification: Option<&str>,
) -> Result<Endpoint> {
    let method = method.to_ascii_uppercase();
    conn.execute(
        "INSERT INTO endpoints
             (service_id, endpoint_url, method, description, specification, created_at, modified_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
         ON CONFLICT (service_id, endpoint_url, method) DO UPDATE
         SET description = excluded.description,
             specification = COALESCE(excluded.specification, specification),
             modified_at = excluded.modified_at",
        params![service_id, url, method, description, specification, now()],
    )?;
    conn.query_row(
        &format!(
            "SELECT {ENDPOINT_COLUMNS} FROM endpoints e
             WHERE e.service_id = ?1 AND e.endpoint_url = ?2 AND e.method = ?3"
        ),
        params![service_id, url, method],
        |row| endpoint_from_row(row, 0),
    )
    .map_err(Into::into)
}

/// Resolves a route to an endpoint. When several services expose the same
/// route, the earliest registered endpoint wins.
pub(crate) fn endpoint_by_route(
    conn: &Connection,
    url: &str,
    method: &str,
) -> Result<Option<Endpoint>> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {ENDPOINT_COLUMNS} FROM endpoints e
                 WHERE e.endpoint_url = ?1 AND e.method = ?2
                 ORDER BY e.id LIMIT 1"
            ),
            params![url, method.to_ascii_uppercase()],
            |row| endpoint_from_row(row, 0),
        )
        .optional()?)
}

pub(crate) fn find_endpoints(
    conn: &Connection,
    url: &str,
    method: Option<&str>,
) -> Result<Vec<Endpoint>> {
    let method = method.map(str::to_ascii_uppercase);
    let mut stmt = conn.prepare(&format!(
        "SELECT {ENDPOINT_COLUMNS} FROM endpoints e
         WHERE e.endpoint_url = ?1 AND (?2 IS NULL OR e.method = ?2)
         ORDER BY e.id"
    ))?;
    let endpoints = stmt
        .query_map(params![url, method], |row| endpoint_from_row(row, 0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(endpoints)
}

pub(crate) fn endpoints_of_service(conn: &Connection, service_id: i64) -> Result<Vec<Endpoint>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ENDPOINT_COLUMNS} FROM endpoints e WHERE e.service_id = ?1 ORDER BY e.id"
    ))?;
    let endpoints = stmt
        .query_map([service_id], |row| endpoint_from_row(row, 0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(endpoints)
}

// ── Consumers ──

/// Records that `client_id` calls the endpoint at (url, method).
///
/// No-op when the edge exists. When the endpoint is not registered yet the
/// skip is logged and reported, not treated as an error: clients are often
/// onboarded before the services they call.
pub(crate) fn link_consumer(
    conn: &Connection,
    client_id: i64,
    url: &str,
    method: &str,
) -> Result<LinkOutcome> {
    let Some(endpoint) = endpoint_by_route(conn, url, method)? else {
        warn!(client_id, url, method, "endpoint not registered, skipping consumer link");
        return Ok(LinkOutcome::EndpointMissing);
    };

    let inserted = conn.execute(
        "INSERT INTO endpoint_consumers (client_id, endpoint_id, created_at, modified_at)
         VALUES (?1, ?2, ?3, ?3)
         ON CONFLICT (client_id, endpoint_id) DO NOTHING",
        params![client_id, endpoint.id, now()],
    )?;

    if inserted == 0 {
        return Ok(LinkOutcome::AlreadyLinked {
            endpoint_id: endpoint.id,
        });
    }
    debug!(client_id, endpoint_id = endpoint.id, "linked consumer");
    Ok(LinkOutcome::Linked {
        endpoint_id: endpoint.id,
    })
}

/// Every client with a consumer edge to the endpoint, in client order.
pub(crate) fn consumers_of(conn: &Connection, endpoint_id: i64) -> Result<Vec<Client>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CLIENT_COLUMNS} FROM clients c
         JOIN endpoint_consumers ec ON ec.client_id = c.id
         WHERE ec.endpoint_id = ?1
         ORDER BY c.id"
    ))?;
    let clients = stmt
        .query_map([endpoint_id], |row| client_from_row(row, 0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(clients)
}

fn consumed_by(conn: &Connection, client_id: i64) -> Result<Vec<Endpoint>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ENDPOINT_COLUMNS} FROM endpoints e
         JOIN endpoint_consumers ec ON ec.endpoint_id = e.id
         WHERE ec.client_id = ?1
         ORDER BY e.id"
    ))?;
    let endpoints = stmt
        .query_map([client_id], |row| endpoint_from_row(row, 0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(endpoints)
}

// ── Row mapping ──

pub(crate) fn repository_from_row(row: &Row<'_>, at: usize) -> rusqlite::Result<Repository> {
    Ok(Repository {
        id: row.get(at)?,
        url: row.get(at + 1)?,
        name: row.get(at + 2)?,
        guid: row.get(at + 3)?,
        jira_instance_url: row.get(at + 4)?,
        jira_project_key: row.get(at + 5)?,
        created_at: parsed(row, at + 6)?,
        modified_at: parsed(row, at + 7)?,
    })
}

pub(crate) fn branch_from_row(row: &Row<'_>, at: usize) -> rusqlite::Result<Branch> {
    Ok(Branch {
        id: row.get(at)?,
        repository_id: row.get(at + 1)?,
        branch: row.get(at + 2)?,
        name: row.get(at + 3)?,
        guid: row.get(at + 4)?,
        jira_instance_url: row.get(at + 5)?,
        jira_project_key: row.get(at + 6)?,
        included_extensions: json(row, at + 7)?,
        status: parsed(row, at + 8)?,
        created_at: parsed(row, at + 9)?,
        modified_at: parsed(row, at + 10)?,
    })
}

pub(crate) fn service_from_row(row: &Row<'_>, at: usize) -> rusqlite::Result<Service> {
    Ok(Service {
        id: row.get(at)?,
        branch_id: row.get(at + 1)?,
        port: port(row, at + 2)?,
        created_at: parsed(row, at + 3)?,
        modified_at: parsed(row, at + 4)?,
    })
}

pub(crate) fn client_from_row(row: &Row<'_>, at: usize) -> rusqlite::Result<Client> {
    Ok(Client {
        id: row.get(at)?,
        branch_id: row.get(at + 1)?,
        created_at: parsed(row, at + 2)?,
        modified_at: parsed(row, at + 3)?,
    })
}

pub(crate) fn endpoint_from_row(row: &Row<'_>, at: usize) -> rusqlite::Result<Endpoint> {
    Ok(Endpoint {
        id: row.get(at)?,
        service_id: row.get(at + 1)?,
        url: row.get(at + 2)?,
        method: row.get(at + 3)?,
        description: row.get(at + 4)?,
        specification: row.get(at + 5)?,
        created_at: parsed(row, at + 6)?,
        modified_at: parsed(row, at + 7)?,
    })
}

/// Reads `name, guid, repository url, branch, jira url, jira key`.
pub(crate) fn branch_context_from_row(
    row: &Row<'_>,
    at: usize,
) -> rusqlite::Result<BranchContext> {
    Ok(BranchContext {
        name: row.get(at)?,
        guid: row.get(at + 1)?,
        repository_url: row.get(at + 2)?,
        branch: row.get(at + 3)?,
        jira_instance_url: row.get(at + 4)?,
        jira_project_key: row.get(at + 5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::storage::testing::{branch, test_storage};

    #[test]
    fn register_repository_creates_pending_branch() {
        let (_dir, mut storage) = test_storage();
        let (repo, branch) = storage
            .register_repository(
                "https://github.com/acme/users",
                "master",
                &[".go".into(), ".yaml".into()],
            )
            .unwrap();

        assert_eq!(branch.repository_id, repo.id);
        assert_eq!(branch.branch, "master");
        assert_eq!(branch.status, Status::Pending);
        assert_eq!(branch.included_extensions, vec![".go", ".yaml"]);
        assert!(!branch.guid.is_empty());
    }

    #[test]
    fn duplicate_repository_fails_without_writing() {
        let (_dir, mut storage) = test_storage();
        storage
            .register_repository("https://github.com/acme/users", "master", &[])
            .unwrap();

        let err = storage
            .register_repository("https://github.com/acme/users", "develop", &[])
            .unwrap_err();
        assert!(matches!(err, StorageError::RepositoryAlreadyExists(_)));

        let err = storage
            .branch("https://github.com/acme/users", "develop")
            .unwrap_err();
        assert!(matches!(err, StorageError::BranchNotFound(_)));
    }

    #[test]
    fn register_branch_is_idempotent() {
        let (_dir, mut storage) = test_storage();
        let first = branch(&mut storage, "https://github.com/acme/users");

        let again = storage
            .register_branch(first.repository_id, "master", &[".rs".into()])
            .unwrap();

        assert_eq!(again.id, first.id);
        assert_eq!(again.guid, first.guid);
        assert_eq!(again.included_extensions, vec![".rs"]);
    }

    #[test]
    fn missing_branch_is_a_lookup_failure() {
        let (_dir, storage) = test_storage();
        let err = storage
            .branch("https://github.com/acme/nowhere", "master")
            .unwrap_err();
        assert!(matches!(err, StorageError::RepositoryNotFound(_)));
    }

    #[test]
    fn service_and_client_are_one_per_branch() {
        let (_dir, mut storage) = test_storage();
        let branch = branch(&mut storage, "https://github.com/acme/users");

        let service = find_or_create_service(storage.connection(), branch.id, 8080).unwrap();
        let again = find_or_create_service(storage.connection(), branch.id, 9090).unwrap();
        assert_eq!(again.id, service.id);
        assert_eq!(again.port, 8080);

        let client = find_or_create_client(storage.connection(), branch.id).unwrap();
        let again = find_or_create_client(storage.connection(), branch.id).unwrap();
        assert_eq!(again.id, client.id);
    }

    #[test]
    fn upsert_endpoint_keeps_identity_and_uppercases_method() {
        let (_dir, mut storage) = test_storage();
        let branch = branch(&mut storage, "https://github.com/acme/users");
        let service = find_or_create_service(storage.connection(), branch.id, 8080).unwrap();

        let conn = storage.connection();
        let first = upsert_endpoint(conn, service.id, "/users/{id}", "get", "Fetch a user", None)
            .unwrap();
        let second = upsert_endpoint(
            conn,
            service.id,
            "/users/{id}",
            "GET",
            "Fetch one user",
            Some("{}"),
        )
        .unwrap();

        assert_eq!(first.method, "GET");
        assert_eq!(second.id, first.id);
        assert_eq!(second.description, "Fetch one user");
        assert_eq!(second.specification.as_deref(), Some("{}"));
    }

    #[test]
    fn find_endpoints_filters_by_method() {
        let (_dir, mut storage) = test_storage();
        let branch = branch(&mut storage, "https://github.com/acme/users");
        let service = find_or_create_service(storage.connection(), branch.id, 8080).unwrap();
        let conn = storage.connection();
        upsert_endpoint(conn, service.id, "/users/{id}", "GET", "Fetch", None).unwrap();
        upsert_endpoint(conn, service.id, "/users/{id}", "DELETE", "Remove", None).unwrap();

        assert_eq!(storage.find_endpoints("/users/{id}", None).unwrap().len(), 2);
        let deletes = storage
            .find_endpoints("/users/{id}", Some("delete"))
            .unwrap();
        assert_eq!(deletes.len(), 1);
        assert_eq!(deletes[0].description, "Remove");
    }

    #[test]
    fn link_consumer_is_idempotent() {
        let (_dir, mut storage) = test_storage();
        let users = branch(&mut storage, "https://github.com/acme/users");
        let service = find_or_create_service(storage.connection(), users.id, 8080).unwrap();
        let endpoint =
            upsert_endpoint(storage.connection(), service.id, "/users/{id}", "GET", "Fetch", None)
                .unwrap();
        let orders = branch(&mut storage, "https://github.com/acme/orders");
        let client = find_or_create_client(storage.connection(), orders.id).unwrap();

        let first = link_consumer(storage.connection(), client.id, "/users/{id}", "get").unwrap();
        let second = link_consumer(storage.connection(), client.id, "/users/{id}", "GET").unwrap();

        assert_eq!(
            first,
            LinkOutcome::Linked {
                endpoint_id: endpoint.id
            }
        );
        assert_eq!(
            second,
            LinkOutcome::AlreadyLinked {
                endpoint_id: endpoint.id
            }
        );
        assert_eq!(storage.consumers_of(endpoint.id).unwrap().len(), 1);
    }

    #[test]
    fn link_to_unknown_endpoint_is_skipped() {
        let (_dir, mut storage) = test_storage();
        let orders = branch(&mut storage, "https://github.com/acme/orders");
        let client = find_or_create_client(storage.connection(), orders.id).unwrap();

        let outcome = link_consumer(storage.connection(), client.id, "/users/{id}", "GET").unwrap();

        assert_eq!(outcome, LinkOutcome::EndpointMissing);
    }

    #[test]
    fn list_repositories_builds_tree() {
        let (_dir, mut storage) = test_storage();
        let users = branch(&mut storage, "https://github.com/acme/users");
        let service = find_or_create_service(storage.connection(), users.id, 8080).unwrap();
        upsert_endpoint(storage.connection(), service.id, "/users/{id}", "GET", "Fetch", None).unwrap();
        let orders = branch(&mut storage, "https://github.com/acme/orders");
        let client = find_or_create_client(storage.connection(), orders.id).unwrap();
        link_consumer(storage.connection(), client.id, "/users/{id}", "GET").unwrap();

        let trees = storage.list_repositories(Page::default()).unwrap();
        assert_eq!(trees.len(), 2);
        let users_tree = &trees[0].branches[0];
        assert_eq!(users_tree.services[0].exposed_endpoints.len(), 1);
        assert!(users_tree.clients.is_empty());
        let orders_tree = &trees[1].branches[0];
        assert_eq!(orders_tree.clients[0].consumed_endpoints[0].url, "/users/{id}");

        let second_page = storage.list_repositories(Page::new(2, 1)).unwrap();
        assert_eq!(second_page.len(), 1);
        assert_eq!(
            second_page[0].repository.url,
            "https://github.com/acme/orders"
        );
    }

    #[test]
    fn profile_updates_only_present_fields() {
        let (_dir, mut storage) = test_storage();
        let users = branch(&mut storage, "https://github.com/acme/users");

        update_branch_profile(
            storage.connection(),
            users.id,
            &BranchProfile {
                name: Some("UserService".into()),
                jira_project_key: Some("USR".into()),
                ..BranchProfile::default()
            },
        )
        .unwrap();
        update_branch_profile(
            storage.connection(),
            users.id,
            &BranchProfile {
                jira_instance_url: Some("https://jira.acme.dev".into()),
                ..BranchProfile::default()
            },
        )
        .unwrap();

        let context = branch_context(storage.connection(), users.id).unwrap();
        assert_eq!(context.name.as_deref(), Some("UserService"));
        assert_eq!(context.jira_project_key.as_deref(), Some("USR"));
        assert_eq!(
            context.jira_instance_url.as_deref(),
            Some("https://jira.acme.dev")
        );
        assert_eq!(context.guid, users.guid);
    }
}
