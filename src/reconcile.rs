//! The reconciliation engine.
//!
//! Each tick picks up every change still awaiting propagation and fans it out
//! to the clients consuming the changed endpoint: one impact record per
//! client, plus the action items the change's origin calls for. Every change
//! is its own `IMMEDIATE` transaction, so a failure rolls back only that
//! change, which stays open and is retried on the next tick.

use std::{path::PathBuf, thread, time::Duration};

use tracing::{debug, error, info, info_span};

use crate::model::Status;
use crate::storage::{Result, Storage, action_items, impact, ledger, registry};

/// What propagating one change did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanOut {
    pub change_id: i64,

    /// Consumers that received a new impact record.
    pub clients_impacted: usize,

    pub items_created: usize,

    /// Existing items re-flagged as `updated` by a follow-up report.
    pub items_flagged: usize,

    /// Consumers that already had an impact record for this change.
    pub already_impacted: usize,
}

/// Outcome of one tick.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub completed: Vec<FanOut>,

    /// Changes whose propagation failed and was rolled back.
    pub failed: Vec<i64>,
}

/// Polls the database and propagates changes until the process ends.
pub struct Reconciler {
    database: PathBuf,
    interval: Duration,
}

impl Reconciler {
    pub fn new(database: PathBuf, interval: Duration) -> Self {
        Self { database, interval }
    }

    /// Runs ticks forever, sleeping `interval` between them.
    pub fn run(&self) -> ! {
        info!(
            database = %self.database.display(),
            interval_ms = u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX),
            "reconciler started"
        );
        loop {
            if let Err(e) = self.tick() {
                error!(error = %e, "tick failed");
            }
            thread::sleep(self.interval);
        }
    }

    /// Runs a single tick on a fresh database session, released on return.
    pub fn tick(&self) -> Result<TickReport> {
        let mut storage = Storage::open(&self.database)?;
        reconcile(&mut storage)
    }
}

/// Propagates every open change, oldest first.
///
/// Failures of individual changes are logged and reported, never returned:
/// only failing to list the open changes fails the tick.
pub fn reconcile(storage: &mut Storage) -> Result<TickReport> {
    let mut report = TickReport::default();

    for change_id in storage.open_changes()? {
        let span = info_span!("change", change_id);
        let _entered = span.enter();

        match fan_out(storage, change_id) {
            Ok(Some(fan)) => {
                info!(
                    clients_impacted = fan.clients_impacted,
                    items_created = fan.items_created,
                    items_flagged = fan.items_flagged,
                    "change propagated"
                );
                report.completed.push(fan);
            }
            Ok(None) => debug!("change no longer open, skipped"),
            Err(e) => {
                error!(error = %e, "propagation failed, will retry");
                report.failed.push(change_id);
            }
        }
    }

    Ok(report)
}

/// Propagates one change in its own transaction.
///
/// Returns `None` if another engine completed the change first.
fn fan_out(storage: &mut Storage, change_id: i64) -> Result<Option<FanOut>> {
    let tx = storage.transaction()?;

    let change = ledger::get(&tx, change_id)?;
    if !change.status.is_open() {
        return Ok(None);
    }

    let mut fan = FanOut {
        change_id,
        ..FanOut::default()
    };

    for client in registry::consumers_of(&tx, change.endpoint_id)? {
        if change.status == Status::Updated
            && let Some(existing) = impact::find(&tx, client.id, change.id)?
        {
            fan.items_flagged += action_items::mark_updated(&tx, existing.id)?;
            fan.already_impacted += 1;
            continue;
        }

        // The unique index decides which engine creates the record; only the
        // creator spawns action items.
        let Some(affected_client_id) = impact::insert(&tx, client.id, change.id)? else {
            fan.already_impacted += 1;
            continue;
        };
        fan.clients_impacted += 1;

        for kind in change.origin.action_kinds() {
            if action_items::insert(&tx, affected_client_id, *kind)?.is_some() {
                fan.items_created += 1;
            }
        }
    }

    ledger::set_status(&tx, change.id, Status::Completed)?;
    tx.commit()?;
    Ok(Some(fan))
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    use crate::model::{
        ActionItemUpdate, ActionKind, ChangeKind, ChangeOrigin, ChangeReport, ClientArtifacts,
        Health, Page, PullRequestRef, TicketRef,
    };
    use crate::storage::testing::{consumer, service_with_endpoint, test_storage};

    const USERS: &str = "https://github.com/acme/users";

    fn report(origin: ChangeOrigin, origin_id: &str, description: &str) -> ChangeReport {
        ChangeReport {
            url: "/users/{id}".into(),
            method: "GET".into(),
            kind: ChangeKind::Breaking,
            description: description.into(),
            reason: "global identifiers".into(),
            origin,
            origin_id: origin_id.into(),
            origin_url: None,
            specification_after: Some(r#"{"params":["uuid"]}"#.into()),
        }
    }

    fn count(storage: &Storage, table: &str) -> i64 {
        storage
            .connection()
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .unwrap()
    }

    fn item_statuses(storage: &Storage) -> Vec<Status> {
        storage
            .list_action_items(None, None, Page::default())
            .unwrap()
            .into_iter()
            .map(|detail| detail.item.status)
            .collect()
    }

    /// A users service and `n` consuming clients.
    fn users_with_consumers(storage: &mut Storage, n: usize) -> Vec<i64> {
        service_with_endpoint(storage, USERS, "/users/{id}", "GET");
        (0..n)
            .map(|i| {
                let repo = format!("https://github.com/acme/consumer-{i}");
                consumer(storage, &repo, "/users/{id}", "GET").id
            })
            .collect()
    }

    #[test]
    fn jira_change_fans_out_two_items_per_client() {
        let (_dir, mut storage) = test_storage();
        users_with_consumers(&mut storage, 3);
        let change = storage
            .notify(&report(ChangeOrigin::JiraTicket, "USR-1", "id becomes a UUID"))
            .unwrap();

        let tick = reconcile(&mut storage).unwrap();

        assert_eq!(tick.completed.len(), 1);
        assert_eq!(tick.completed[0].clients_impacted, 3);
        assert_eq!(tick.completed[0].items_created, 6);
        assert_eq!(count(&storage, "affected_clients"), 3);
        assert_eq!(count(&storage, "action_items"), 6);
        assert_eq!(storage.change(change.id).unwrap().status, Status::Completed);
        assert!(item_statuses(&storage).iter().all(|s| *s == Status::Pending));
    }

    #[test]
    fn github_change_fans_out_one_item_per_client() {
        let (_dir, mut storage) = test_storage();
        users_with_consumers(&mut storage, 3);
        storage
            .notify(&report(ChangeOrigin::GithubPr, "42", "id becomes a UUID"))
            .unwrap();

        reconcile(&mut storage).unwrap();

        assert_eq!(count(&storage, "affected_clients"), 3);
        assert_eq!(count(&storage, "action_items"), 3);
        let kinds: Vec<ActionKind> = storage
            .list_action_items(None, None, Page::default())
            .unwrap()
            .into_iter()
            .map(|detail| detail.item.kind)
            .collect();
        assert_eq!(kinds, vec![ActionKind::GithubPr; 3]);
    }

    #[test]
    fn change_without_consumers_completes() {
        let (_dir, mut storage) = test_storage();
        users_with_consumers(&mut storage, 0);
        let change = storage
            .notify(&report(ChangeOrigin::GithubPr, "42", "id becomes a UUID"))
            .unwrap();

        let tick = reconcile(&mut storage).unwrap();

        assert_eq!(
            tick.completed[0],
            FanOut {
                change_id: change.id,
                ..FanOut::default()
            }
        );
        assert_eq!(storage.change(change.id).unwrap().status, Status::Completed);
    }

    #[test]
    fn second_tick_changes_nothing() {
        let (_dir, mut storage) = test_storage();
        users_with_consumers(&mut storage, 2);
        storage
            .notify(&report(ChangeOrigin::JiraTicket, "USR-1", "id becomes a UUID"))
            .unwrap();
        reconcile(&mut storage).unwrap();

        let tick = reconcile(&mut storage).unwrap();

        assert!(tick.completed.is_empty());
        assert!(tick.failed.is_empty());
        assert_eq!(count(&storage, "affected_clients"), 2);
        assert_eq!(count(&storage, "action_items"), 4);
    }

    #[test]
    fn repeated_report_before_tick_creates_one_change() {
        let (_dir, mut storage) = test_storage();
        users_with_consumers(&mut storage, 1);
        storage
            .notify(&report(ChangeOrigin::GithubPr, "42", "id becomes a UUID"))
            .unwrap();
        storage
            .notify(&report(ChangeOrigin::GithubPr, "42", "email is dropped"))
            .unwrap();

        reconcile(&mut storage).unwrap();

        assert_eq!(count(&storage, "affected_endpoints"), 1);
        assert_eq!(count(&storage, "affected_clients"), 1);
        assert_eq!(count(&storage, "action_items"), 1);
    }

    #[test]
    fn update_flags_items_without_duplicating() {
        let (_dir, mut storage) = test_storage();
        users_with_consumers(&mut storage, 2);
        storage
            .notify(&report(ChangeOrigin::JiraTicket, "USR-1", "id becomes a UUID"))
            .unwrap();
        reconcile(&mut storage).unwrap();

        let first_item = storage
            .list_action_items(None, None, Page::default())
            .unwrap()[0]
            .item
            .id;
        storage
            .update_action_item(
                first_item,
                ActionItemUpdate {
                    status: Some(Status::Completed),
                    ..ActionItemUpdate::default()
                },
            )
            .unwrap();

        let updated = storage
            .notify(&report(ChangeOrigin::JiraTicket, "USR-1", "email is dropped"))
            .unwrap();
        assert_eq!(updated.status, Status::Updated);

        let tick = reconcile(&mut storage).unwrap();

        assert_eq!(tick.completed[0].clients_impacted, 0);
        assert_eq!(tick.completed[0].items_flagged, 3);
        assert_eq!(tick.completed[0].already_impacted, 2);
        assert_eq!(count(&storage, "affected_clients"), 2);
        assert_eq!(count(&storage, "action_items"), 4);

        let statuses = item_statuses(&storage);
        assert_eq!(statuses[0], Status::Completed);
        assert!(statuses[1..].iter().all(|s| *s == Status::Updated));
        assert_eq!(storage.change(updated.id).unwrap().status, Status::Completed);
    }

    #[test]
    fn consumer_added_after_first_tick_gets_items_on_update() {
        let (_dir, mut storage) = test_storage();
        users_with_consumers(&mut storage, 1);
        let change = storage
            .notify(&report(ChangeOrigin::JiraTicket, "USR-1", "id becomes a UUID"))
            .unwrap();
        reconcile(&mut storage).unwrap();

        let late = consumer(
            &mut storage,
            "https://github.com/acme/late",
            "/users/{id}",
            "GET",
        );
        storage
            .notify(&report(ChangeOrigin::JiraTicket, "USR-1", "email is dropped"))
            .unwrap();
        let tick = reconcile(&mut storage).unwrap();

        assert_eq!(tick.completed[0].clients_impacted, 1);
        assert_eq!(tick.completed[0].items_created, 2);
        assert_eq!(tick.completed[0].items_flagged, 2);
        assert_eq!(count(&storage, "affected_clients"), 2);
        assert_eq!(count(&storage, "action_items"), 4);

        let late_items: Vec<Status> = storage
            .list_action_items(None, None, Page::default())
            .unwrap()
            .into_iter()
            .filter(|d| d.client.repository_url == "https://github.com/acme/late")
            .map(|d| d.item.status)
            .collect();
        assert_eq!(late_items, vec![Status::Pending, Status::Pending]);
        assert!(
            storage
                .affected_clients_of(change.id)
                .unwrap()
                .iter()
                .any(|ac| ac.client_id == late.id)
        );
    }

    #[test]
    fn stale_engine_does_not_duplicate() {
        let (_dir, mut storage) = test_storage();
        users_with_consumers(&mut storage, 2);
        let change = storage
            .notify(&report(ChangeOrigin::JiraTicket, "USR-1", "id becomes a UUID"))
            .unwrap();
        fan_out(&mut storage, change.id).unwrap();

        // A second engine that read the change before the first committed.
        ledger::set_status(storage.connection(), change.id, Status::Pending).unwrap();
        let stale = fan_out(&mut storage, change.id).unwrap().unwrap();

        assert_eq!(stale.clients_impacted, 0);
        assert_eq!(stale.items_created, 0);
        assert_eq!(stale.already_impacted, 2);
        assert_eq!(count(&storage, "affected_clients"), 2);
        assert_eq!(count(&storage, "action_items"), 4);
    }

    #[test]
    fn stale_session_skips_change_completed_by_another() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("adapt.sqlite");
        let mut first = Storage::open(&path).unwrap();
        users_with_consumers(&mut first, 2);
        let change = first
            .notify(&report(ChangeOrigin::JiraTicket, "USR-1", "id becomes a UUID"))
            .unwrap();

        // The second engine lists the change before the first propagates it.
        let mut second = Storage::open(&path).unwrap();
        let listed = second.open_changes().unwrap();
        assert_eq!(listed, vec![change.id]);

        let tick = reconcile(&mut first).unwrap();
        assert_eq!(tick.completed.len(), 1);

        assert_eq!(fan_out(&mut second, change.id).unwrap(), None);
        assert_eq!(count(&second, "affected_clients"), 2);
        assert_eq!(count(&second, "action_items"), 4);
    }

    #[test]
    fn concurrent_engines_propagate_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("adapt.sqlite");
        {
            let mut storage = Storage::open(&path).unwrap();
            users_with_consumers(&mut storage, 3);
            storage
                .notify(&report(ChangeOrigin::JiraTicket, "USR-1", "id becomes a UUID"))
                .unwrap();
        }

        let engines: Vec<_> = (0..2)
            .map(|_| {
                let path = path.clone();
                thread::spawn(move || {
                    let mut storage = Storage::open(&path).unwrap();
                    reconcile(&mut storage).unwrap()
                })
            })
            .collect();
        let ticks: Vec<TickReport> = engines.into_iter().map(|e| e.join().unwrap()).collect();

        let completed: Vec<&FanOut> = ticks.iter().flat_map(|t| &t.completed).collect();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].clients_impacted, 3);
        assert!(ticks.iter().all(|t| t.failed.is_empty()));

        let storage = Storage::open(&path).unwrap();
        assert_eq!(count(&storage, "affected_clients"), 3);
        assert_eq!(count(&storage, "action_items"), 6);
    }

    #[test]
    fn completed_change_is_skipped_by_fan_out() {
        let (_dir, mut storage) = test_storage();
        users_with_consumers(&mut storage, 1);
        let change = storage
            .notify(&report(ChangeOrigin::GithubPr, "42", "id becomes a UUID"))
            .unwrap();
        reconcile(&mut storage).unwrap();

        assert_eq!(fan_out(&mut storage, change.id).unwrap(), None);
    }

    #[test]
    fn failing_change_does_not_block_others() {
        let (_dir, mut storage) = test_storage();
        users_with_consumers(&mut storage, 1);
        let good = storage
            .notify(&report(ChangeOrigin::GithubPr, "42", "id becomes a UUID"))
            .unwrap();
        storage
            .connection()
            .execute(
                "INSERT INTO affected_endpoints
                     (endpoint_id, change_type, description, reason, status, change_origin,
                      origin_unique_id, created_at, modified_at)
                 VALUES (?1, 'breaking', '', '', 'pending', 'carrier-pigeon', 'x', ?2, ?2)",
                rusqlite::params![good.endpoint_id, crate::storage::now()],
            )
            .unwrap();
        let bad = storage.connection().last_insert_rowid();

        let tick = reconcile(&mut storage).unwrap();

        assert_eq!(tick.failed, vec![bad]);
        assert_eq!(tick.completed.len(), 1);
        assert_eq!(storage.change(good.id).unwrap().status, Status::Completed);
        assert_eq!(storage.open_changes().unwrap(), vec![bad]);
    }

    #[test]
    fn reconciler_tick_opens_its_own_session() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("adapt.sqlite");
        {
            let mut storage = Storage::open(&path).unwrap();
            users_with_consumers(&mut storage, 1);
            storage
                .notify(&report(ChangeOrigin::GithubPr, "42", "id becomes a UUID"))
                .unwrap();
        }

        let reconciler = Reconciler::new(path.clone(), Duration::from_millis(10));
        let tick = reconciler.tick().unwrap();

        assert_eq!(tick.completed.len(), 1);
        let storage = Storage::open(&path).unwrap();
        assert_eq!(count(&storage, "action_items"), 1);
    }

    #[test]
    fn users_endpoint_change_from_report_to_healed() {
        let (_dir, mut storage) = test_storage();
        let (_, endpoint) = service_with_endpoint(&mut storage, USERS, "/users/{id}", "GET");
        let orders = consumer(
            &mut storage,
            "https://github.com/acme/orders",
            "/users/{id}",
            "GET",
        );
        let billing = consumer(
            &mut storage,
            "https://github.com/acme/billing",
            "/users/{id}",
            "get",
        );

        let mut pr = report(ChangeOrigin::GithubPr, "42", "id becomes a UUID");
        pr.origin_url = Some("https://github.com/acme/users/pull/42".into());
        let change = storage.notify(&pr).unwrap();
        assert_eq!(
            change.specification_before.as_deref(),
            Some(r#"{"params":["id"]}"#)
        );

        reconcile(&mut storage).unwrap();

        let impacts = storage.affected_clients_of(change.id).unwrap();
        assert_eq!(impacts.len(), 2);
        assert!(impacts.iter().all(|ac| ac.healing_status == Status::Pending));
        assert_eq!(
            storage.client_health(orders.id, endpoint.id).unwrap(),
            Health::Degraded
        );
        assert_eq!(
            storage.client_health(billing.id, endpoint.id).unwrap(),
            Health::Degraded
        );

        // The remediator opens a patch PR on orders, then a ticket.
        let orders_item = storage
            .list_action_items(Some(ActionKind::GithubPr), Some(Status::Pending), Page::default())
            .unwrap()
            .into_iter()
            .find(|d| d.client.repository_url == "https://github.com/acme/orders")
            .unwrap();
        storage
            .update_action_item(
                orders_item.item.id,
                ActionItemUpdate {
                    comment: Some("patch opened".into()),
                    artifacts: Some(ClientArtifacts {
                        github_project: Some(PullRequestRef {
                            pr_id: Some("7".into()),
                            pr_url: Some("https://github.com/acme/orders/pull/7".into()),
                        }),
                        jira_project: None,
                    }),
                    status: Some(Status::InProgress),
                },
            )
            .unwrap();
        let item = storage
            .update_action_item(
                orders_item.item.id,
                ActionItemUpdate {
                    artifacts: Some(ClientArtifacts {
                        github_project: None,
                        jira_project: Some(TicketRef {
                            ticket_id: Some("ORD-3".into()),
                            ticket_url: None,
                        }),
                    }),
                    status: Some(Status::Completed),
                    ..ActionItemUpdate::default()
                },
            )
            .unwrap();
        assert_eq!(item.meta.pull_request().unwrap().pr_id.as_deref(), Some("7"));
        assert_eq!(item.meta.ticket().unwrap().ticket_id.as_deref(), Some("ORD-3"));

        storage
            .set_healing_status(orders_item.affected_client_id, Status::Completed)
            .unwrap();

        assert_eq!(
            storage.client_health(orders.id, endpoint.id).unwrap(),
            Health::Healthy
        );
        assert_eq!(
            storage.client_health(billing.id, endpoint.id).unwrap(),
            Health::Degraded
        );
    }
}
