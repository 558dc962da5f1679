//! # Connection Pools
//!
//! The [`ConnectionPool`] seam hands out transactional [`DatabaseSession`]s.
//! [`PgConnectionPool`] is the sqlx implementation. Its sizing comes from a
//! [`PoolStrategy`]: behind an external pooler (PgBouncer) nothing is pooled
//! locally, otherwise a sized queue pool is kept.

use async_trait::async_trait;
use serde::Serialize;
use sqlx::postgres::{PgArguments, PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Column, PgPool, Postgres, Row, Transaction, TypeInfo, ValueRef};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::database::error_codes::DbErrorKind;
use crate::database::session::{DatabaseSession, QueryResult, SessionPriority};
use crate::database::statement::{statement_body, StatementShape};
use crate::error::{DatabaseError, SentinelResult};

/// Source of transactional sessions
#[async_trait]
pub trait ConnectionPool: Send + Sync {
    async fn get_connection(
        &self,
        priority: SessionPriority,
    ) -> Result<Box<dyn DatabaseSession>, DatabaseError>;

    /// Current pool occupancy, when the pool can report it
    fn status(&self) -> Option<PoolStatus> {
        None
    }

    async fn close(&self) {}
}

/// Pooling strategy selected from the resolved connection string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolStrategy {
    /// Connections go through PgBouncer or similar; keep nothing locally
    ExternalPooler,
    /// Sized local queue pool
    LocalQueue {
        pool_size: u32,
        max_overflow: u32,
        pool_timeout: Duration,
        pool_recycle: Duration,
        pre_ping: bool,
    },
}

impl PoolStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            PoolStrategy::ExternalPooler => "external_pooler",
            PoolStrategy::LocalQueue { .. } => "local_queue",
        }
    }

    pub fn is_external(&self) -> bool {
        matches!(self, PoolStrategy::ExternalPooler)
    }

    /// Concrete pool settings for this strategy
    pub fn pool_configuration(&self) -> PoolConfiguration {
        match self {
            PoolStrategy::ExternalPooler => PoolConfiguration {
                max_connections: 10,
                min_connections: 0,
                acquire_timeout: Duration::from_secs(30),
                idle_timeout: Duration::from_secs(1),
                max_lifetime: Duration::from_secs(60),
                test_before_acquire: false,
                statement_cache_capacity: 0,
            },
            PoolStrategy::LocalQueue {
                pool_size,
                max_overflow,
                pool_timeout,
                pool_recycle,
                pre_ping,
            } => PoolConfiguration {
                max_connections: pool_size.saturating_add(*max_overflow).max(1),
                min_connections: (*pool_size).min(5),
                acquire_timeout: *pool_timeout,
                idle_timeout: Duration::from_secs(300),
                max_lifetime: *pool_recycle,
                test_before_acquire: *pre_ping,
                statement_cache_capacity: 100,
            },
        }
    }
}

/// sqlx pool settings derived from a [`PoolStrategy`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfiguration {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
    pub test_before_acquire: bool,
    pub statement_cache_capacity: usize,
}

impl PoolConfiguration {
    pub fn pool_options(&self) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .acquire_timeout(self.acquire_timeout)
            .idle_timeout(self.idle_timeout)
            .max_lifetime(self.max_lifetime)
            .test_before_acquire(self.test_before_acquire)
    }
}

/// Point-in-time pool occupancy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub strategy: &'static str,
    pub size: u32,
    pub idle: u32,
    pub max_connections: u32,
}

impl PoolStatus {
    pub fn in_use(&self) -> u32 {
        self.size.saturating_sub(self.idle)
    }
}

/// sqlx-backed pool of PostgreSQL transactions
#[derive(Debug, Clone)]
pub struct PgConnectionPool {
    pool: PgPool,
    strategy: PoolStrategy,
    configuration: PoolConfiguration,
}

impl PgConnectionPool {
    /// Build a lazily-connecting pool; no connection is opened until first use
    pub fn connect_lazy(config: &DatabaseConfig) -> SentinelResult<Self> {
        let url = config.resolve_url();
        let strategy = config.pool_strategy(&url);
        let configuration = strategy.pool_configuration();

        let connect_options = PgConnectOptions::from_str(&url)
            .map_err(DatabaseError::from)?
            .statement_cache_capacity(configuration.statement_cache_capacity)
            .options([("statement_timeout", config.statement_timeout_ms.to_string())]);

        let pool = configuration.pool_options().connect_lazy_with(connect_options);

        info!(
            strategy = strategy.name(),
            max_connections = configuration.max_connections,
            min_connections = configuration.min_connections,
            acquire_timeout_seconds = configuration.acquire_timeout.as_secs(),
            "💾 POOL: Database pool configured"
        );

        Ok(Self {
            pool,
            strategy,
            configuration,
        })
    }

    /// Wrap an existing sqlx pool
    pub fn from_pool(pool: PgPool, strategy: PoolStrategy) -> Self {
        let configuration = strategy.pool_configuration();
        Self {
            pool,
            strategy,
            configuration,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn strategy(&self) -> &PoolStrategy {
        &self.strategy
    }

    pub fn configuration(&self) -> &PoolConfiguration {
        &self.configuration
    }
}

#[async_trait]
impl ConnectionPool for PgConnectionPool {
    async fn get_connection(
        &self,
        priority: SessionPriority,
    ) -> Result<Box<dyn DatabaseSession>, DatabaseError> {
        debug!(priority = %priority, strategy = self.strategy.name(), "Acquiring pooled transaction");
        let transaction = self.pool.begin().await?;
        Ok(Box::new(PgSession {
            transaction: Some(transaction),
        }))
    }

    fn status(&self) -> Option<PoolStatus> {
        Some(PoolStatus {
            strategy: self.strategy.name(),
            size: self.pool.size(),
            idle: self.pool.num_idle() as u32,
            max_connections: self.configuration.max_connections,
        })
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// One PostgreSQL transaction checked out of [`PgConnectionPool`]
pub struct PgSession {
    transaction: Option<Transaction<'static, Postgres>>,
}

impl PgSession {
    fn transaction(&mut self) -> Result<&mut Transaction<'static, Postgres>, DatabaseError> {
        self.transaction
            .as_mut()
            .ok_or_else(|| DatabaseError::new(DbErrorKind::ConnectionLost, "session already finished"))
    }
}

#[async_trait]
impl DatabaseSession for PgSession {
    async fn execute(
        &mut self,
        query: &str,
        params: &[serde_json::Value],
    ) -> Result<QueryResult, DatabaseError> {
        let transaction = self.transaction()?;
        let shape = StatementShape::of(query);

        if shape.is_cacheable() {
            let wrapped = format!(
                "SELECT row_to_json(sentinel_row) FROM ({}) AS sentinel_row",
                statement_body(query)
            );
            let statement = params
                .iter()
                .fold(sqlx::query(&wrapped), bind_json_param);
            let rows = statement.fetch_all(&mut **transaction).await?;
            let rows = rows
                .iter()
                .map(|row| row.try_get::<serde_json::Value, _>(0))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(QueryResult::with_rows(rows))
        } else if shape.returns_rows {
            // RETURNING and data-modifying CTEs cannot sit inside a subquery
            let statement = params.iter().fold(sqlx::query(query), bind_json_param);
            let rows = statement
                .fetch_all(&mut **transaction)
                .await?
                .iter()
                .map(row_to_json)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(QueryResult {
                rows_affected: rows.len() as u64,
                rows,
            })
        } else {
            let statement = params.iter().fold(sqlx::query(query), bind_json_param);
            let done = statement.execute(&mut **transaction).await?;
            Ok(QueryResult {
                rows: Vec::new(),
                rows_affected: done.rows_affected(),
            })
        }
    }

    async fn commit(&mut self) -> Result<(), DatabaseError> {
        match self.transaction.take() {
            Some(transaction) => Ok(transaction.commit().await?),
            None => Ok(()),
        }
    }

    async fn rollback(&mut self) -> Result<(), DatabaseError> {
        match self.transaction.take() {
            Some(transaction) => Ok(transaction.rollback().await?),
            None => Ok(()),
        }
    }

    async fn close(&mut self) {
        // Dropping an open sqlx transaction rolls it back and returns the connection
        self.transaction.take();
    }
}

/// Decode a row by column type into a JSON object keyed by column name
fn row_to_json(row: &PgRow) -> Result<serde_json::Value, sqlx::Error> {
    use serde_json::Value;

    let mut object = serde_json::Map::with_capacity(row.len());
    for (index, column) in row.columns().iter().enumerate() {
        let value = if row.try_get_raw(index)?.is_null() {
            Value::Null
        } else {
            match column.type_info().name() {
                "BOOL" => Value::from(row.try_get::<bool, _>(index)?),
                "INT2" => Value::from(row.try_get::<i16, _>(index)?),
                "INT4" => Value::from(row.try_get::<i32, _>(index)?),
                "INT8" => Value::from(row.try_get::<i64, _>(index)?),
                "FLOAT4" => Value::from(row.try_get::<f32, _>(index)?),
                "FLOAT8" => Value::from(row.try_get::<f64, _>(index)?),
                "JSON" | "JSONB" => row.try_get::<Value, _>(index)?,
                "UUID" => Value::from(row.try_get::<uuid::Uuid, _>(index)?.to_string()),
                "TIMESTAMPTZ" => Value::from(
                    row.try_get::<chrono::DateTime<chrono::Utc>, _>(index)?
                        .to_rfc3339(),
                ),
                "TIMESTAMP" => Value::from(
                    row.try_get::<chrono::NaiveDateTime, _>(index)?
                        .to_string(),
                ),
                "DATE" => Value::from(row.try_get::<chrono::NaiveDate, _>(index)?.to_string()),
                _ => row
                    .try_get::<String, _>(index)
                    .map(Value::from)
                    .unwrap_or(Value::Null),
            }
        };
        object.insert(column.name().to_string(), value);
    }
    Ok(Value::Object(object))
}

/// Bind a JSON parameter as the closest native PostgreSQL type
fn bind_json_param<'q>(
    query: Query<'q, Postgres, PgArguments>,
    param: &'q serde_json::Value,
) -> Query<'q, Postgres, PgArguments> {
    use serde_json::Value;

    match param {
        Value::Null => query.bind(None::<String>),
        Value::Bool(value) => query.bind(*value),
        Value::Number(number) => match number.as_i64() {
            Some(value) => query.bind(value),
            None => query.bind(number.as_f64()),
        },
        Value::String(value) => query.bind(value.as_str()),
        other => query.bind(sqlx::types::Json(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_external_pooler_keeps_nothing_locally() {
        let configuration = PoolStrategy::ExternalPooler.pool_configuration();
        assert_eq!(configuration.min_connections, 0);
        assert_eq!(configuration.statement_cache_capacity, 0);
        assert!(configuration.idle_timeout <= Duration::from_secs(1));
    }

    #[test]
    fn test_local_queue_sizing() {
        let strategy = PoolStrategy::LocalQueue {
            pool_size: 20,
            max_overflow: 30,
            pool_timeout: Duration::from_secs(30),
            pool_recycle: Duration::from_secs(3600),
            pre_ping: true,
        };
        let configuration = strategy.pool_configuration();

        assert_eq!(strategy.name(), "local_queue");
        assert_eq!(configuration.max_connections, 50);
        assert_eq!(configuration.acquire_timeout, Duration::from_secs(30));
        assert_eq!(configuration.max_lifetime, Duration::from_secs(3600));
        assert!(configuration.test_before_acquire);
    }

    #[test]
    fn test_strategy_from_config() {
        let config = DatabaseConfig::default();
        assert!(config
            .pool_strategy("postgresql://u:p@pgbouncer:5432/db")
            .is_external());
    }

    #[test]
    fn test_pool_status_in_use() {
        let status = PoolStatus {
            strategy: "local_queue",
            size: 8,
            idle: 3,
            max_connections: 50,
        };
        assert_eq!(status.in_use(), 5);
    }
}
