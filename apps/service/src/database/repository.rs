use std::ops::Deref;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use deadpool::managed::Object;
use libsql::{Connection, Row, params};

use super::models::{
    Check, Endpoint, EndpointStatus, Network, Project, millis_to_timestamp, timestamp_to_millis,
};
use crate::monitoring::types::EndpointTarget;
use crate::pool::{LibsqlManager, LibsqlPool};

/// Database trait for abstracting database operations
#[async_trait]
pub trait Database: Send + Sync {
    /// All projects ordered by slug
    async fn list_projects(&self) -> Result<Vec<Project>>;

    /// Get a project by its slug
    async fn get_project_by_slug(&self, slug: &str) -> Result<Option<Project>>;

    /// Insert (no id) or update (with id) a project
    async fn save_project(&self, project: &Project) -> Result<i64>;

    /// Networks of a project, optionally restricted to one network type,
    /// ordered by network type then chain id
    async fn get_networks(&self, project_id: i64, network_type: Option<&str>) -> Result<Vec<Network>>;

    /// Get a network by its slug within a project
    async fn get_network_by_slug(&self, project_id: i64, slug: &str) -> Result<Option<Network>>;

    /// Insert (no id) or update (with id) a network
    async fn save_network(&self, network: &Network) -> Result<i64>;

    /// Endpoints of a network ordered by type then name
    async fn get_endpoints(&self, network_id: i64, only_enabled: bool) -> Result<Vec<Endpoint>>;

    /// Get an endpoint by its (unique) URL
    async fn get_endpoint_by_url(&self, url: &str) -> Result<Option<Endpoint>>;

    /// Insert (no id) or update (with id) an endpoint
    async fn save_endpoint(&self, endpoint: &Endpoint) -> Result<i64>;

    /// Delete an endpoint; its checks and status go with it
    async fn delete_endpoint(&self, id: i64) -> Result<()>;

    /// Up to `limit` enabled endpoints with their network's chain id,
    /// least recently checked first
    async fn enabled_targets(&self, limit: usize) -> Result<Vec<EndpointTarget>>;

    /// Append a check and upsert the endpoint's status from it, atomically
    async fn record_check(&self, check: &Check) -> Result<i64>;

    /// Latest known status of an endpoint
    async fn get_endpoint_status(&self, endpoint_id: i64) -> Result<Option<EndpointStatus>>;

    /// Most recent checks of an endpoint, newest first
    async fn get_recent_checks(&self, endpoint_id: i64, limit: usize) -> Result<Vec<Check>>;

    /// Open a transaction pinned to one connection; nothing it writes is
    /// visible elsewhere until `commit`
    async fn begin(&self) -> Result<Box<dyn DatabaseTransaction>>;
}

/// A [`Database`] whose every call runs inside one open transaction
#[async_trait]
pub trait DatabaseTransaction: Database {
    fn as_database(&self) -> &dyn Database;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// LibSQL database implementation
pub struct DatabaseImpl {
    source: ConnectionSource,
}

enum ConnectionSource {
    Pool(LibsqlPool),
    /// Connection holding an open transaction
    Pinned(Object<LibsqlManager>),
}

/// Either a connection checked out of the pool or the pinned one
enum ConnectionRef<'a> {
    Pooled(Object<LibsqlManager>),
    Pinned(&'a Connection),
}

impl Deref for ConnectionRef<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        match self {
            Self::Pooled(conn) => &**conn,
            Self::Pinned(conn) => *conn,
        }
    }
}

const PROJECT_COLUMNS: &str = "id, slug, name, created_at";
const NETWORK_COLUMNS: &str = "id, project_id, slug, name, chain_id, network_type, created_at";
const ENDPOINT_COLUMNS: &str = "id, network_id, name, type, url, enabled, created_at";
const RESULT_COLUMNS: &str =
    "id, endpoint_id, is_available, status_code, block_delay_ms, last_block_height, error_message, checked_at";

impl DatabaseImpl {
    /// Create a new database instance from a pool
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { source: ConnectionSource::Pool(pool) }
    }

    /// Get a connection from the pool, or the pinned one inside a transaction
    async fn get_conn(&self) -> Result<ConnectionRef<'_>> {
        match &self.source {
            ConnectionSource::Pool(pool) => Ok(ConnectionRef::Pooled(pool.get().await?)),
            ConnectionSource::Pinned(conn) => Ok(ConnectionRef::Pinned(&**conn)),
        }
    }

    async fn finish(&self, statement: &str) -> Result<()> {
        match &self.source {
            ConnectionSource::Pinned(conn) => {
                conn.execute(statement, ()).await?;
                Ok(())
            }
            ConnectionSource::Pool(_) => Err(anyhow!("no transaction is open")),
        }
    }
}

fn project_from_row(row: &Row) -> Result<Project> {
    Ok(Project {
        id: Some(row.get(0)?),
        slug: row.get(1)?,
        name: row.get(2)?,
        created_at: millis_to_timestamp(row.get(3)?),
    })
}

fn network_from_row(row: &Row) -> Result<Network> {
    Ok(Network {
        id: Some(row.get(0)?),
        project_id: row.get(1)?,
        slug: row.get(2)?,
        name: row.get(3)?,
        chain_id: row.get(4)?,
        network_type: row.get(5)?,
        created_at: millis_to_timestamp(row.get(6)?),
    })
}

fn endpoint_from_row(row: &Row) -> Result<Endpoint> {
    Ok(Endpoint {
        id: Some(row.get(0)?),
        network_id: row.get(1)?,
        name: row.get(2)?,
        kind: row.get(3)?,
        url: row.get(4)?,
        enabled: row.get::<i64>(5)? != 0,
        created_at: millis_to_timestamp(row.get(6)?),
    })
}

fn check_from_row(row: &Row) -> Result<Check> {
    Ok(Check {
        id: Some(row.get(0)?),
        endpoint_id: row.get(1)?,
        is_available: row.get::<i64>(2)? != 0,
        status_code: row.get::<Option<i64>>(3)?.map(u16::try_from).transpose()?,
        block_delay_ms: row.get::<Option<i64>>(4)?.map(u64::try_from).transpose()?,
        last_block_height: row.get(5)?,
        error_message: row.get(6)?,
        checked_at: millis_to_timestamp(row.get(7)?),
    })
}

fn status_from_row(row: &Row) -> Result<EndpointStatus> {
    let check = check_from_row(row)?;
    Ok(EndpointStatus { id: check.id, ..EndpointStatus::from(&check) })
}

fn delay_param(delay: Option<u64>) -> Result<Option<i64>> {
    delay
        .map(i64::try_from)
        .transpose()
        .map_err(|_| anyhow!("block delay out of range"))
}

#[async_trait]
impl Database for DatabaseImpl {
    async fn list_projects(&self) -> Result<Vec<Project>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(&format!("SELECT {PROJECT_COLUMNS} FROM projects ORDER BY slug"), ())
            .await?;

        let mut projects = Vec::new();
        while let Some(row) = rows.next().await? {
            projects.push(project_from_row(&row)?);
        }

        Ok(projects)
    }

    async fn get_project_by_slug(&self, slug: &str) -> Result<Option<Project>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE slug = ?"),
                params![slug.to_string()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(project_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn save_project(&self, project: &Project) -> Result<i64> {
        let conn = self.get_conn().await?;

        if let Some(id) = project.id {
            conn.execute(
                "UPDATE projects SET slug = ?, name = ? WHERE id = ?",
                params![project.slug.clone(), project.name.clone(), id],
            )
            .await?;
            Ok(id)
        } else {
            conn.execute(
                "INSERT INTO projects (slug, name, created_at) VALUES (?, ?, ?)",
                params![project.slug.clone(), project.name.clone(), timestamp_to_millis(project.created_at)],
            )
            .await?;
            Ok(conn.last_insert_rowid())
        }
    }

    async fn get_networks(&self, project_id: i64, network_type: Option<&str>) -> Result<Vec<Network>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {NETWORK_COLUMNS} FROM networks \
                     WHERE project_id = ?1 AND (?2 IS NULL OR network_type = ?2) \
                     ORDER BY network_type, chain_id"
                ),
                params![project_id, network_type.map(str::to_string)],
            )
            .await?;

        let mut networks = Vec::new();
        while let Some(row) = rows.next().await? {
            networks.push(network_from_row(&row)?);
        }

        Ok(networks)
    }

    async fn get_network_by_slug(&self, project_id: i64, slug: &str) -> Result<Option<Network>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {NETWORK_COLUMNS} FROM networks WHERE project_id = ? AND slug = ?"),
                params![project_id, slug.to_string()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(network_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn save_network(&self, network: &Network) -> Result<i64> {
        let conn = self.get_conn().await?;

        if let Some(id) = network.id {
            conn.execute(
                "UPDATE networks SET project_id = ?, slug = ?, name = ?, chain_id = ?, network_type = ? WHERE id = ?",
                params![
                    network.project_id,
                    network.slug.clone(),
                    network.name.clone(),
                    network.chain_id.clone(),
                    network.network_type.clone(),
                    id
                ],
            )
            .await?;
            Ok(id)
        } else {
            conn.execute(
                "INSERT INTO networks (project_id, slug, name, chain_id, network_type, created_at) VALUES (?, ?, ?, ?, ?, ?)",
                params![
                    network.project_id,
                    network.slug.clone(),
                    network.name.clone(),
                    network.chain_id.clone(),
                    network.network_type.clone(),
                    timestamp_to_millis(network.created_at)
                ],
            )
            .await?;
            Ok(conn.last_insert_rowid())
        }
    }

    async fn get_endpoints(&self, network_id: i64, only_enabled: bool) -> Result<Vec<Endpoint>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {ENDPOINT_COLUMNS} FROM endpoints \
                     WHERE network_id = ?1 AND (?2 = 0 OR enabled = 1) \
                     ORDER BY type, name"
                ),
                params![network_id, if only_enabled { 1 } else { 0 }],
            )
            .await?;

        let mut endpoints = Vec::new();
        while let Some(row) = rows.next().await? {
            endpoints.push(endpoint_from_row(&row)?);
        }

        Ok(endpoints)
    }

    async fn get_endpoint_by_url(&self, url: &str) -> Result<Option<Endpoint>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {ENDPOINT_COLUMNS} FROM endpoints WHERE url = ?"),
                params![url.to_string()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(endpoint_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn save_endpoint(&self, endpoint: &Endpoint) -> Result<i64> {
        let conn = self.get_conn().await?;

        if let Some(id) = endpoint.id {
            conn.execute(
                "UPDATE endpoints SET network_id = ?, name = ?, type = ?, url = ?, enabled = ? WHERE id = ?",
                params![
                    endpoint.network_id,
                    endpoint.name.clone(),
                    endpoint.kind.clone(),
                    endpoint.url.clone(),
                    if endpoint.enabled { 1 } else { 0 },
                    id
                ],
            )
            .await?;
            Ok(id)
        } else {
            conn.execute(
                "INSERT INTO endpoints (network_id, name, type, url, enabled, created_at) VALUES (?, ?, ?, ?, ?, ?)",
                params![
                    endpoint.network_id,
                    endpoint.name.clone(),
                    endpoint.kind.clone(),
                    endpoint.url.clone(),
                    if endpoint.enabled { 1 } else { 0 },
                    timestamp_to_millis(endpoint.created_at)
                ],
            )
            .await?;
            Ok(conn.last_insert_rowid())
        }
    }

    async fn delete_endpoint(&self, id: i64) -> Result<()> {
        let conn = self.get_conn().await?;

        // Checks and the status row are removed via ON DELETE CASCADE
        conn.execute("DELETE FROM endpoints WHERE id = ?", params![id]).await?;
        Ok(())
    }

    async fn enabled_targets(&self, limit: usize) -> Result<Vec<EndpointTarget>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT e.id, e.name, e.type, e.url, n.chain_id
                 FROM endpoints e
                 JOIN networks n ON n.id = e.network_id
                 LEFT JOIN endpoint_statuses s ON s.endpoint_id = e.id
                 WHERE e.enabled = 1
                 ORDER BY s.checked_at IS NOT NULL, s.checked_at, e.id
                 LIMIT ?",
                params![i64::try_from(limit).unwrap_or(i64::MAX)],
            )
            .await?;

        let mut targets = Vec::new();
        while let Some(row) = rows.next().await? {
            let chain_id: String = row.get(4)?;

            targets.push(EndpointTarget {
                endpoint_id: row.get(0)?,
                name: row.get(1)?,
                kind: row.get(2)?,
                url: row.get(3)?,
                expected_chain_id: (!chain_id.is_empty()).then_some(chain_id),
            });
        }

        Ok(targets)
    }

    async fn record_check(&self, check: &Check) -> Result<i64> {
        let conn = self.get_conn().await?;
        let status_code = check.status_code.map(i64::from);
        let block_delay_ms = delay_param(check.block_delay_ms)?;
        let checked_at = timestamp_to_millis(check.checked_at);
        let is_available = if check.is_available { 1 } else { 0 };

        // The check row goes in first; the status never runs ahead of history.
        // A pinned connection is already inside a transaction.
        let tx = match &self.source {
            ConnectionSource::Pool(_) => Some(conn.transaction().await?),
            ConnectionSource::Pinned(_) => None,
        };
        let writer: &Connection = tx.as_deref().unwrap_or(&*conn);

        writer.execute(
            "INSERT INTO checks (endpoint_id, is_available, status_code, block_delay_ms, last_block_height, error_message, checked_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                check.endpoint_id,
                is_available,
                status_code,
                block_delay_ms,
                check.last_block_height.clone(),
                check.error_message.clone(),
                checked_at
            ],
        )
        .await?;
        let check_id = writer.last_insert_rowid();

        let existing_status: Option<i64> = {
            let mut rows = writer
                .query(
                    "SELECT id FROM endpoint_statuses WHERE endpoint_id = ?",
                    params![check.endpoint_id],
                )
                .await?;
            match rows.next().await? {
                Some(row) => Some(row.get(0)?),
                None => None,
            }
        };

        if let Some(status_id) = existing_status {
            writer.execute(
                "UPDATE endpoint_statuses SET is_available = ?, status_code = ?, block_delay_ms = ?, last_block_height = ?, error_message = ?, checked_at = ? WHERE id = ?",
                params![
                    is_available,
                    status_code,
                    block_delay_ms,
                    check.last_block_height.clone(),
                    check.error_message.clone(),
                    checked_at,
                    status_id
                ],
            )
            .await?;
        } else {
            writer.execute(
                "INSERT INTO endpoint_statuses (endpoint_id, is_available, status_code, block_delay_ms, last_block_height, error_message, checked_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
                params![
                    check.endpoint_id,
                    is_available,
                    status_code,
                    block_delay_ms,
                    check.last_block_height.clone(),
                    check.error_message.clone(),
                    checked_at
                ],
            )
            .await?;
        }

        if let Some(tx) = tx {
            tx.commit().await?;
        }
        Ok(check_id)
    }

    async fn get_endpoint_status(&self, endpoint_id: i64) -> Result<Option<EndpointStatus>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {RESULT_COLUMNS} FROM endpoint_statuses WHERE endpoint_id = ?"),
                params![endpoint_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(status_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn get_recent_checks(&self, endpoint_id: i64, limit: usize) -> Result<Vec<Check>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {RESULT_COLUMNS} FROM checks WHERE endpoint_id = ? ORDER BY checked_at DESC, id DESC LIMIT ?"
                ),
                params![endpoint_id, i64::try_from(limit).unwrap_or(i64::MAX)],
            )
            .await?;

        let mut checks = Vec::new();
        while let Some(row) = rows.next().await? {
            checks.push(check_from_row(&row)?);
        }

        Ok(checks)
    }

    async fn begin(&self) -> Result<Box<dyn DatabaseTransaction>> {
        let ConnectionSource::Pool(pool) = &self.source else {
            return Err(anyhow!("nested transactions are not supported"));
        };

        let conn = pool.get().await?;
        // Take the write lock up front so the transaction cannot fail to upgrade later
        conn.execute("BEGIN IMMEDIATE", ()).await?;
        Ok(Box::new(Self { source: ConnectionSource::Pinned(conn) }))
    }
}

#[async_trait]
impl DatabaseTransaction for DatabaseImpl {
    fn as_database(&self) -> &dyn Database {
        self
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.finish("COMMIT").await
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.finish("ROLLBACK").await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::monitoring::types::{ProbeError, ProbeResult};
    use crate::pool::open_pool;
    use chrono::{Duration, Utc};
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Fresh migrated database in a temporary directory; keep the `TempDir` alive
    pub(crate) async fn create_test_database() -> Result<(Arc<DatabaseImpl>, TempDir)> {
        let temp_dir = tempfile::tempdir()?;
        let db_path = temp_dir.path().join("test.db");

        let pool = open_pool(&db_path.to_string_lossy(), 4).await?;
        let conn = pool.get().await?;
        crate::database::initialize_database(&conn).await?;
        drop(conn);

        Ok((Arc::new(DatabaseImpl::new_from_pool(pool)), temp_dir))
    }

    /// Run one raw statement, e.g. to install a trigger
    pub(crate) async fn execute_sql(database: &DatabaseImpl, sql: &str) -> Result<()> {
        database.get_conn().await?.execute(sql, ()).await?;
        Ok(())
    }

    /// Project + network + one endpoint per `(type, url, enabled)`
    pub(crate) async fn seed_network(
        database: &DatabaseImpl,
        chain_id: &str,
        endpoints: &[(&str, &str, bool)],
    ) -> Result<Vec<i64>> {
        let project_id = database
            .save_project(&Project::new(format!("proj-{chain_id}"), "Project".into()))
            .await?;
        let network_id = database
            .save_network(&Network::new(
                project_id,
                format!("{chain_id}-net"),
                "Network".into(),
                chain_id.into(),
                "mainnet".into(),
            ))
            .await?;

        let mut ids = Vec::new();
        for (index, (kind, url, enabled)) in endpoints.iter().enumerate() {
            let endpoint =
                Endpoint::new(network_id, format!("node-{index}"), kind.to_string(), url.to_string(), *enabled);
            ids.push(database.save_endpoint(&endpoint).await?);
        }

        Ok(ids)
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() -> Result<()> {
        let (database, _dir) = create_test_database().await?;
        let conn = database.get_conn().await?;
        crate::database::initialize_database(&conn).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_disabled_endpoints_are_never_selected() -> Result<()> {
        let (database, _dir) = create_test_database().await?;
        let ids = seed_network(
            &database,
            "cosmoshub-4",
            &[
                ("rpc", "https://a.example.com", true),
                ("api", "https://b.example.com", false),
                ("rpc", "https://c.example.com", true),
            ],
        )
        .await?;

        for limit in [1, 2, 3, 100] {
            let targets = database.enabled_targets(limit).await?;
            assert!(targets.len() <= limit);
            assert!(targets.iter().all(|t| t.endpoint_id != ids[1]), "limit {limit}");
        }

        let targets = database.enabled_targets(100).await?;
        assert_eq!(targets.len(), 2);
        assert!(targets.iter().all(|t| t.expected_chain_id.as_deref() == Some("cosmoshub-4")));
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_chain_id_means_no_expectation() -> Result<()> {
        let (database, _dir) = create_test_database().await?;
        seed_network(&database, "", &[("rpc", "https://a.example.com", true)]).await?;

        let targets = database.enabled_targets(10).await?;
        assert_eq!(targets[0].expected_chain_id, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_least_recently_checked_first() -> Result<()> {
        let (database, _dir) = create_test_database().await?;
        let ids = seed_network(
            &database,
            "juno-1",
            &[
                ("rpc", "https://a.example.com", true),
                ("rpc", "https://b.example.com", true),
                ("rpc", "https://c.example.com", true),
            ],
        )
        .await?;

        let now = Utc::now();
        let ok = ProbeResult::available(200);
        database.record_check(&Check::from_probe(ids[0], &ok, now)).await?;
        database.record_check(&Check::from_probe(ids[1], &ok, now - Duration::minutes(5))).await?;

        let order: Vec<i64> = database.enabled_targets(10).await?.iter().map(|t| t.endpoint_id).collect();
        assert_eq!(order, vec![ids[2], ids[1], ids[0]]);

        let first = database.enabled_targets(1).await?;
        assert_eq!(first[0].endpoint_id, ids[2]);
        Ok(())
    }

    #[tokio::test]
    async fn test_record_check_appends_history_and_upserts_status() -> Result<()> {
        let (database, _dir) = create_test_database().await?;
        let ids = seed_network(&database, "osmosis-1", &[("api", "https://api.example.com", true)]).await?;
        let endpoint_id = ids[0];

        let first_at = Utc::now() - Duration::seconds(30);
        let first = ProbeResult::available(200).with_freshness(Some(4_000), Some("100".into()));
        database.record_check(&Check::from_probe(endpoint_id, &first, first_at)).await?;

        let status = database.get_endpoint_status(endpoint_id).await?.unwrap();
        assert!(status.is_available);
        assert_eq!(status.block_delay_ms, Some(4_000));
        assert_eq!(status.last_block_height.as_deref(), Some("100"));

        let second_at = Utc::now();
        let second = ProbeResult::failure(ProbeError::RequestTimeout);
        database.record_check(&Check::from_probe(endpoint_id, &second, second_at)).await?;

        let status = database.get_endpoint_status(endpoint_id).await?.unwrap();
        assert!(!status.is_available);
        assert_eq!(status.status_code, None);
        assert_eq!(status.block_delay_ms, None);
        assert_eq!(status.last_block_height, None);
        assert_eq!(status.error_message.as_deref(), Some("REQUEST_TIMEOUT"));
        assert_eq!(status.checked_at.timestamp_millis(), second_at.timestamp_millis());

        let history = database.get_recent_checks(endpoint_id, 10).await?;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].error_message.as_deref(), Some("REQUEST_TIMEOUT"));
        assert_eq!(history[1].status_code, Some(200));
        assert!(status.checked_at >= history[0].checked_at);

        let conn = database.get_conn().await?;
        let mut rows = conn
            .query("SELECT COUNT(*) FROM endpoint_statuses WHERE endpoint_id = ?", params![endpoint_id])
            .await?;
        let count: i64 = rows.next().await?.unwrap().get(0)?;
        assert_eq!(count, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_record_check_for_unknown_endpoint_writes_nothing() -> Result<()> {
        let (database, _dir) = create_test_database().await?;

        let check = Check::from_probe(9_999, &ProbeResult::available(200), Utc::now());
        assert!(database.record_check(&check).await.is_err());
        assert!(database.get_recent_checks(9_999, 10).await?.is_empty());
        assert!(database.get_endpoint_status(9_999).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_deleting_endpoint_cascades() -> Result<()> {
        let (database, _dir) = create_test_database().await?;
        let ids = seed_network(&database, "stargaze-1", &[("rpc", "https://rpc.example.com", true)]).await?;

        database
            .record_check(&Check::from_probe(ids[0], &ProbeResult::available(200), Utc::now()))
            .await?;
        database.delete_endpoint(ids[0]).await?;

        assert!(database.get_endpoint_by_url("https://rpc.example.com").await?.is_none());
        assert!(database.get_endpoint_status(ids[0]).await?.is_none());
        assert!(database.get_recent_checks(ids[0], 10).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_network_filter_and_ordering() -> Result<()> {
        let (database, _dir) = create_test_database().await?;
        let project_id = database.save_project(&Project::new("cosmos".into(), "Cosmos".into())).await?;
        for (slug, chain_id, kind) in [
            ("hub", "cosmoshub-4", "mainnet"),
            ("theta", "theta-testnet-001", "testnet"),
            ("provider", "provider", "testnet"),
        ] {
            database
                .save_network(&Network::new(project_id, slug.into(), slug.into(), chain_id.into(), kind.into()))
                .await?;
        }

        let all: Vec<String> =
            database.get_networks(project_id, None).await?.into_iter().map(|n| n.chain_id).collect();
        assert_eq!(all, vec!["cosmoshub-4", "provider", "theta-testnet-001"]);

        let testnets: Vec<String> = database
            .get_networks(project_id, Some("testnet"))
            .await?
            .into_iter()
            .map(|n| n.chain_id)
            .collect();
        assert_eq!(testnets, vec!["provider", "theta-testnet-001"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_transaction_rollback_discards_writes() -> Result<()> {
        let (database, _dir) = create_test_database().await?;

        let tx = database.begin().await?;
        tx.save_project(&Project::new("dropped".into(), "Dropped".into())).await?;
        assert!(tx.get_project_by_slug("dropped").await?.is_some());
        tx.rollback().await?;

        assert!(database.get_project_by_slug("dropped").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_transaction_commit_publishes_writes() -> Result<()> {
        let (database, _dir) = create_test_database().await?;

        let tx = database.begin().await?;
        let project_id = tx.save_project(&Project::new("cosmos".into(), "Cosmos".into())).await?;
        let network_id = tx
            .save_network(&Network::new(
                project_id,
                "hub".into(),
                "Hub".into(),
                "cosmoshub-4".into(),
                "mainnet".into(),
            ))
            .await?;
        let endpoint_id = tx
            .save_endpoint(&Endpoint::new(
                network_id,
                "node".into(),
                "rpc".into(),
                "https://rpc.example.com".into(),
                true,
            ))
            .await?;
        tx.record_check(&Check::from_probe(endpoint_id, &ProbeResult::available(200), Utc::now()))
            .await?;
        assert!(tx.begin().await.is_err());

        assert!(database.get_project_by_slug("cosmos").await?.is_none());
        tx.commit().await?;

        assert_eq!(database.get_project_by_slug("cosmos").await?.and_then(|p| p.id), Some(project_id));
        assert!(database.get_endpoint_status(endpoint_id).await?.is_some_and(|s| s.is_available));
        Ok(())
    }

    #[tokio::test]
    async fn test_abandoned_transaction_is_rolled_back_on_reuse() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let pool = open_pool(&dir.path().join("single.db").to_string_lossy(), 1).await?;
        crate::database::initialize_database(&*pool.get().await?).await?;
        let database = DatabaseImpl::new_from_pool(pool);

        let tx = database.begin().await?;
        tx.save_project(&Project::new("abandoned".into(), "Abandoned".into())).await?;
        drop(tx);

        assert!(database.list_projects().await?.is_empty());
        let tx = database.begin().await?;
        tx.save_project(&Project::new("cosmos".into(), "Cosmos".into())).await?;
        tx.commit().await?;
        assert_eq!(database.list_projects().await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_commit_without_transaction_is_an_error() -> Result<()> {
        let (database, _dir) = create_test_database().await?;
        let database = Arc::try_unwrap(database).map_err(|_| anyhow!("database still shared"))?;
        assert!(Box::new(database).commit().await.is_err());
        Ok(())
    }
}
