//! Derived dependency health. Nothing here is stored; every answer is
//! computed from impact records and their action items.

use rusqlite::{Connection, params};

use crate::model::{
    ActionKind, ArtifactLink, ChangeOrigin, ChangeRef, Client, ConsumerHealth, EndpointHealth,
    Health, ServiceHealth, Status,
};

use super::{Result, Storage, action_items, parsed, registry};

impl Storage {
    /// Health of one consumer edge.
    ///
    /// Healthy unless an unhealed impact record with at least one action item
    /// exists for the pair; then the worst origin-derived label wins.
    pub fn client_health(&self, client_id: i64, endpoint_id: i64) -> Result<Health> {
        Ok(unhealed(&self.conn, client_id, endpoint_id)?
            .iter()
            .fold(Health::Healthy, |health, record| {
                health.worst(record.origin.unhealed_health())
            }))
    }

    /// Every service with each consumer of each endpoint and its health.
    pub fn health_report(&self) -> Result<Vec<ServiceHealth>> {
        registry::all_services(&self.conn)?
            .into_iter()
            .map(|service| {
                let endpoints = registry::endpoints_of_service(&self.conn, service.id)?
                    .into_iter()
                    .map(|endpoint| {
                        let consumers = registry::consumers_of(&self.conn, endpoint.id)?
                            .iter()
                            .map(|client| consumer_health(&self.conn, client, endpoint.id))
                            .collect::<Result<Vec<_>>>()?;
                        Ok(EndpointHealth {
                            endpoint_id: endpoint.id,
                            url: endpoint.url,
                            method: endpoint.method,
                            description: endpoint.description,
                            consumers,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(ServiceHealth {
                    service_id: service.id,
                    port: service.port,
                    branch: registry::branch_context(&self.conn, service.branch_id)?,
                    endpoints,
                })
            })
            .collect()
    }
}

/// An impact record that still counts against a consumer's health.
struct Unhealed {
    affected_client_id: i64,
    change: ChangeRef,
    origin: ChangeOrigin,
}

fn unhealed(conn: &Connection, client_id: i64, endpoint_id: i64) -> Result<Vec<Unhealed>> {
    let mut stmt = conn.prepare(
        "SELECT ac.id, ae.id, ae.change_origin, ae.origin_unique_id, ae.change_origin_url
         FROM affected_clients ac
         JOIN affected_endpoints ae ON ae.id = ac.affected_endpoint_id
         WHERE ac.client_id = ?1
           AND ae.endpoint_id = ?2
           AND ac.healing_status != ?3
           AND EXISTS (SELECT 1 FROM action_items ai WHERE ai.affected_client_id = ac.id)
         ORDER BY ac.id",
    )?;
    let records = stmt
        .query_map(
            params![client_id, endpoint_id, Status::Completed.as_str()],
            |row| {
                let origin: ChangeOrigin = parsed(row, 2)?;
                Ok(Unhealed {
                    affected_client_id: row.get(0)?,
                    change: ChangeRef {
                        affected_endpoint_id: row.get(1)?,
                        origin,
                        origin_id: row.get(3)?,
                        origin_url: row.get(4)?,
                    },
                    origin,
                })
            },
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(records)
}

fn consumer_health(conn: &Connection, client: &Client, endpoint_id: i64) -> Result<ConsumerHealth> {
    let mut health = Health::Healthy;
    let mut cause = None;
    let mut actions = Vec::new();

    for record in unhealed(conn, client.id, endpoint_id)? {
        let label = record.origin.unhealed_health();
        if health.worst(label) != health {
            health = label;
            cause = Some(record.change.clone());
        }
        for item in action_items::for_affected_client(conn, record.affected_client_id)? {
            if item.status == Status::Completed {
                continue;
            }
            let (id, url) = match item.kind {
                ActionKind::GithubPr => item
                    .meta
                    .pull_request()
                    .map(|pr| (pr.pr_id.clone(), pr.pr_url.clone()))
                    .unwrap_or_default(),
                ActionKind::JiraTicket => item
                    .meta
                    .ticket()
                    .map(|t| (t.ticket_id.clone(), t.ticket_url.clone()))
                    .unwrap_or_default(),
                ActionKind::Email => (None, None),
            };
            actions.push(ArtifactLink {
                action_item_id: item.id,
                kind: item.kind,
                status: item.status,
                id,
                url,
            });
        }
    }

    Ok(ConsumerHealth {
        client_id: client.id,
        branch: registry::branch_context(conn, client.branch_id)?,
        health,
        cause,
        actions,
    })
}
