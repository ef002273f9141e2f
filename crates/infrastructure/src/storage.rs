use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use nodewatch_application::ports::StorageGateway;
use nodewatch_domain::{
    AggregatedResult, DailyStats, DomainError, GeoRecord, Node, NodeAddress, PerHostnameResult,
    ProtocolResult, ProtocolTag, WhoisOutcome,
};
use sqlx::{Row, SqlitePool};
use tracing::{debug, error};

/// `StorageGateway` backed by a pair of SQLite pools (write/read), matching
/// the teacher's split-pool persistence stack. The `nodes`/`directory_meta`
/// tables are populated out of band (directory import is out of scope here);
/// this gateway only reads them.
pub struct SqliteStorageGateway {
    write_pool: SqlitePool,
    read_pool: SqlitePool,
}

impl SqliteStorageGateway {
    pub fn new(write_pool: SqlitePool, read_pool: SqlitePool) -> Self {
        Self {
            write_pool,
            read_pool,
        }
    }
}

fn storage_err(context: &str, err: sqlx::Error) -> DomainError {
    error!(error = %err, context, "storage error");
    DomainError::Storage(format!("{context}: {err}"))
}

fn row_to_node(row: &sqlx::sqlite::SqliteRow) -> Result<Node, DomainError> {
    let address_str: String = row.get("address");
    let address = NodeAddress::from_str(&address_str)?;

    let hostnames_json: String = row.get("hostnames_json");
    let hostnames: Vec<String> = serde_json::from_str(&hostnames_json)
        .map_err(|e| DomainError::Storage(format!("decoding hostnames_json: {e}")))?;

    let protocols_json: String = row.get("protocols_json");
    let protocol_strs: Vec<String> = serde_json::from_str(&protocols_json)
        .map_err(|e| DomainError::Storage(format!("decoding protocols_json: {e}")))?;
    let protocols: HashSet<ProtocolTag> = protocol_strs
        .iter()
        .filter_map(|s| ProtocolTag::from_str(s).ok())
        .collect();

    let ports_json: String = row.get("protocol_ports_json");
    let port_map: HashMap<String, u16> = serde_json::from_str(&ports_json)
        .map_err(|e| DomainError::Storage(format!("decoding protocol_ports_json: {e}")))?;
    let protocol_ports: HashMap<ProtocolTag, u16> = port_map
        .into_iter()
        .filter_map(|(k, v)| ProtocolTag::from_str(&k).ok().map(|tag| (tag, v)))
        .collect();

    let flags_json: String = row.get("flags_json");
    let flags: HashSet<Arc<str>> = serde_json::from_str::<Vec<String>>(&flags_json)
        .map_err(|e| DomainError::Storage(format!("decoding flags_json: {e}")))?
        .into_iter()
        .map(|s| Arc::from(s.as_str()))
        .collect();

    let mut node = Node::new(address);
    node.hostnames = hostnames.into_iter().map(|s| Arc::from(s.as_str())).collect();
    node.protocols = protocols;
    node.protocol_ports = protocol_ports;
    node.flags = flags;
    node.has_internet = row.get::<i64, _>("has_internet") != 0;
    Ok(node)
}

fn row_to_aggregated(row: &sqlx::sqlite::SqliteRow) -> Result<AggregatedResult, DomainError> {
    let address_str: String = row.get("address");
    let address = NodeAddress::from_str(&address_str)?;

    let resolved_v4: Vec<std::net::IpAddr> =
        serde_json::from_str(&row.get::<String, _>("resolved_v4_json"))
            .map_err(|e| DomainError::Storage(format!("decoding resolved_v4_json: {e}")))?;
    let resolved_v6: Vec<std::net::IpAddr> =
        serde_json::from_str(&row.get::<String, _>("resolved_v6_json"))
            .map_err(|e| DomainError::Storage(format!("decoding resolved_v6_json: {e}")))?;

    let geo: Option<GeoRecord> = row
        .get::<Option<String>, _>("geo_json")
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| DomainError::Storage(format!("decoding geo_json: {e}")))?;

    let protocols: HashMap<ProtocolTag, ProtocolResult> =
        serde_json::from_str(&row.get::<String, _>("protocols_json"))
            .map_err(|e| DomainError::Storage(format!("decoding protocols_json: {e}")))?;

    let tested_hostname: String = row.get("tested_hostname");

    Ok(AggregatedResult {
        address,
        test_time: row.get("test_time"),
        tested_hostname: Arc::from(tested_hostname.as_str()),
        resolved_v4,
        resolved_v6,
        dns_error: row.get("dns_error"),
        geo,
        protocols,
        is_operational: row.get::<i64, _>("is_operational") != 0,
        is_aggregated: row.get::<i64, _>("is_aggregated") != 0,
        total_hostnames: row.get::<i64, _>("total_hostnames") as usize,
        hostnames_tested: row.get::<i64, _>("hostnames_tested") as usize,
        hostnames_operational: row.get::<i64, _>("hostnames_operational") as usize,
        has_connectivity_issues: row.get::<i64, _>("has_connectivity_issues") != 0,
    })
}

#[async_trait]
impl StorageGateway for SqliteStorageGateway {
    async fn read_directory(&self) -> Result<Vec<Node>, DomainError> {
        let rows = sqlx::query("SELECT * FROM nodes")
            .fetch_all(&self.read_pool)
            .await
            .map_err(|e| storage_err("read_directory", e))?;

        rows.iter().map(row_to_node).collect()
    }

    async fn read_directory_revision(&self) -> Result<u64, DomainError> {
        let row = sqlx::query("SELECT revision FROM directory_meta WHERE id = 1")
            .fetch_one(&self.read_pool)
            .await
            .map_err(|e| storage_err("read_directory_revision", e))?;
        Ok(row.get::<i64, _>("revision") as u64)
    }

    async fn read_history(
        &self,
        address: NodeAddress,
        limit: usize,
    ) -> Result<Vec<AggregatedResult>, DomainError> {
        let rows = sqlx::query(
            "SELECT * FROM test_results WHERE kind = 'aggregated' AND address = ?
             ORDER BY test_time DESC LIMIT ?",
        )
        .bind(address.to_string())
        .bind(limit as i64)
        .fetch_all(&self.read_pool)
        .await
        .map_err(|e| storage_err("read_history", e))?;

        rows.iter().map(row_to_aggregated).collect()
    }

    async fn append_result(&self, result: &PerHostnameResult) -> Result<(), DomainError> {
        let resolved_v4_json = serde_json::to_string(&result.resolved_v4)
            .map_err(|e| DomainError::Storage(e.to_string()))?;
        let resolved_v6_json = serde_json::to_string(&result.resolved_v6)
            .map_err(|e| DomainError::Storage(e.to_string()))?;
        let protocols_json = serde_json::to_string(&result.protocols)
            .map_err(|e| DomainError::Storage(e.to_string()))?;
        let geo_json = result
            .geo
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| DomainError::Storage(e.to_string()))?;

        sqlx::query(
            "INSERT INTO test_results (
                kind, address, test_time, tested_hostname, hostname_index,
                resolved_v4_json, resolved_v6_json, dns_error, geo_json,
                protocols_json, is_operational, is_aggregated
             ) VALUES ('hostname', ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0)",
        )
        .bind(result.address.to_string())
        .bind(result.test_time)
        .bind(&*result.tested_hostname)
        .bind(result.hostname_index as i64)
        .bind(resolved_v4_json)
        .bind(resolved_v6_json)
        .bind(&result.dns_error)
        .bind(geo_json)
        .bind(protocols_json)
        .bind(result.is_operational as i64)
        .execute(&self.write_pool)
        .await
        .map_err(|e| storage_err("append_result", e))?;

        Ok(())
    }

    /// Builds one multi-row `INSERT`, the way `SqliteQueryLogRepository::flush_batch`
    /// does in the teacher, instead of one round-trip per result.
    async fn append_results(&self, results: &[AggregatedResult]) -> Result<(), DomainError> {
        if results.is_empty() {
            return Ok(());
        }

        let mut sql = String::from(
            "INSERT INTO test_results (
                kind, address, test_time, tested_hostname,
                resolved_v4_json, resolved_v6_json, dns_error, geo_json,
                protocols_json, is_operational, is_aggregated,
                total_hostnames, hostnames_tested, hostnames_operational, has_connectivity_issues
             ) VALUES ",
        );
        for i in 0..results.len() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push_str("('aggregated', ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?, ?, ?)");
        }

        let mut query = sqlx::query(&sql);
        for result in results {
            let resolved_v4_json = serde_json::to_string(&result.resolved_v4)
                .map_err(|e| DomainError::Storage(e.to_string()))?;
            let resolved_v6_json = serde_json::to_string(&result.resolved_v6)
                .map_err(|e| DomainError::Storage(e.to_string()))?;
            let protocols_json = serde_json::to_string(&result.protocols)
                .map_err(|e| DomainError::Storage(e.to_string()))?;
            let geo_json = result
                .geo
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .map_err(|e| DomainError::Storage(e.to_string()))?;

            query = query
                .bind(result.address.to_string())
                .bind(result.test_time)
                .bind(result.tested_hostname.to_string())
                .bind(resolved_v4_json)
                .bind(resolved_v6_json)
                .bind(result.dns_error.clone())
                .bind(geo_json)
                .bind(protocols_json)
                .bind(result.is_operational as i64)
                .bind(result.total_hostnames as i64)
                .bind(result.hostnames_tested as i64)
                .bind(result.hostnames_operational as i64)
                .bind(result.has_connectivity_issues as i64);
        }

        match query.execute(&self.write_pool).await {
            Ok(_) => {
                debug!(count = results.len(), "aggregated results flushed");
                Ok(())
            }
            Err(e) => Err(storage_err("append_results", e)),
        }
    }

    async fn append_daily_stats(&self, stats: &DailyStats) -> Result<(), DomainError> {
        sqlx::query(
            "INSERT INTO daily_stats (
                day, computed_at, nodes_tested, nodes_operational,
                nodes_with_connectivity_issues, dual_stack, v4_only, v6_only, failed
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(day) DO UPDATE SET
                computed_at = excluded.computed_at,
                nodes_tested = excluded.nodes_tested,
                nodes_operational = excluded.nodes_operational,
                nodes_with_connectivity_issues = excluded.nodes_with_connectivity_issues,
                dual_stack = excluded.dual_stack,
                v4_only = excluded.v4_only,
                v6_only = excluded.v6_only,
                failed = excluded.failed",
        )
        .bind(stats.day)
        .bind(stats.computed_at)
        .bind(stats.nodes_tested as i64)
        .bind(stats.nodes_operational as i64)
        .bind(stats.nodes_with_connectivity_issues as i64)
        .bind(stats.dual_stack as i64)
        .bind(stats.v4_only as i64)
        .bind(stats.v6_only as i64)
        .bind(stats.failed as i64)
        .execute(&self.write_pool)
        .await
        .map_err(|e| storage_err("append_daily_stats", e))?;

        Ok(())
    }

    async fn store_whois_result(&self, outcome: &WhoisOutcome) -> Result<(), DomainError> {
        sqlx::query(
            "INSERT INTO whois_results (domain, looked_up_at, registered, registrar, expiration)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(domain) DO UPDATE SET
                looked_up_at = excluded.looked_up_at,
                registered = excluded.registered,
                registrar = excluded.registrar,
                expiration = excluded.expiration",
        )
        .bind(&outcome.domain)
        .bind(outcome.looked_up_at)
        .bind(outcome.registered as i64)
        .bind(&outcome.registrar)
        .bind(outcome.expiration)
        .execute(&self.write_pool)
        .await
        .map_err(|e| storage_err("store_whois_result", e))?;

        Ok(())
    }

    async fn read_recent_whois(&self, domain: &str) -> Result<Option<WhoisOutcome>, DomainError> {
        let row = sqlx::query("SELECT * FROM whois_results WHERE domain = ?")
            .bind(domain)
            .fetch_optional(&self.read_pool)
            .await
            .map_err(|e| storage_err("read_recent_whois", e))?;

        let Some(row) = row else { return Ok(None) };

        Ok(Some(WhoisOutcome {
            domain: row.get("domain"),
            looked_up_at: row.get("looked_up_at"),
            registered: row.get::<i64, _>("registered") != 0,
            registrar: row.get("registrar"),
            expiration: row.get("expiration"),
        }))
    }
}
