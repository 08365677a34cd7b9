//! Built-in drivers backed by SQLx.
//!
//! Metric SQL is arbitrary text from the metric files, so statements go through
//! `sqlx::raw_sql` (the simple/text protocol) and every cell is decoded by probing the
//! common Rust types in order, falling back to an unchecked string read. That fallback
//! is what lets NUMERIC, DECIMAL and engine-specific types come through as text.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::connection_pool_strategies::{PoolConfiguration, PoolMetrics};
use super::driver::{ConnectRequest, EngineDriver, MetricSource, QueryOutcome};
use crate::error::{CollectorError, Result};
#[cfg(any(feature = "postgres", feature = "mysql"))]
use crate::masking::mask_host;
use crate::models::{EngineType, MetricValue};

/// Decode one cell by trying the usual types in order
macro_rules! decode_cell {
    ($row:expr, $idx:expr) => {{
        use sqlx::{Row, ValueRef};
        let row = $row;
        let idx: usize = $idx;
        let is_null = row.try_get_raw(idx).map(|raw| raw.is_null()).unwrap_or(true);
        if is_null {
            MetricValue::Null
        } else if let Ok(v) = row.try_get::<i64, _>(idx) {
            MetricValue::Integer(v)
        } else if let Ok(v) = row.try_get::<i32, _>(idx) {
            MetricValue::Integer(i64::from(v))
        } else if let Ok(v) = row.try_get::<f64, _>(idx) {
            MetricValue::Float(v)
        } else if let Ok(v) = row.try_get::<bool, _>(idx) {
            MetricValue::Bool(v)
        } else if let Ok(v) = row.try_get::<String, _>(idx) {
            MetricValue::Text(v)
        } else if let Ok(v) = row.try_get::<chrono::NaiveDateTime, _>(idx) {
            MetricValue::Text(v.format("%Y-%m-%d %H:%M:%S").to_string())
        } else if let Ok(v) = row.try_get::<chrono::DateTime<chrono::Utc>, _>(idx) {
            MetricValue::Text(v.to_rfc3339())
        } else if let Ok(v) = row.try_get_unchecked::<String, _>(idx) {
            MetricValue::Text(v)
        } else {
            debug!(column = idx, "Undecodable column value, reporting NULL");
            MetricValue::Null
        }
    }};
}

/// Pooled source over one SQLx pool type
macro_rules! sqlx_metric_source {
    ($source:ident, $pool:ty) => {
        pub struct $source {
            name: String,
            config: PoolConfiguration,
            pool: $pool,
        }

        #[async_trait]
        impl MetricSource for $source {
            fn name(&self) -> &str {
                &self.name
            }

            async fn fetch(&self, sql: &str) -> Result<QueryOutcome> {
                use sqlx::{Column, Row};
                let rows = sqlx::raw_sql(sql).fetch_all(&self.pool).await?;
                let columns = rows
                    .first()
                    .map(|row| {
                        row.columns()
                            .iter()
                            .map(|c| c.name().to_string())
                            .collect::<Vec<_>>()
                    })
                    .unwrap_or_default();
                let decoded = rows
                    .iter()
                    .map(|row| (0..row.len()).map(|idx| decode_cell!(row, idx)).collect())
                    .collect();
                Ok(QueryOutcome::new(columns, decoded))
            }

            fn stats(&self) -> PoolMetrics {
                PoolMetrics {
                    pool_name: self.name.clone(),
                    engine: self.config.engine,
                    size: self.pool.size(),
                    num_idle: self.pool.num_idle() as u32,
                    is_closed: self.pool.is_closed(),
                    max_connections: self.config.max_connections,
                    min_connections: self.config.min_connections,
                }
            }

            async fn close(&self) {
                info!(pool = %self.name, "Closing connection pool");
                self.pool.close().await;
            }
        }
    };
}

/// Map a connect-phase failure, keeping auth and network classification
fn connect_error(err: sqlx::Error, request: &ConnectRequest, timeout: Duration) -> CollectorError {
    match CollectorError::from(err) {
        CollectorError::ConnectTimeout { .. } => CollectorError::ConnectTimeout {
            target: request.pool_name.clone(),
            timeout,
        },
        err @ (CollectorError::Authentication(_)
        | CollectorError::Network(_)
        | CollectorError::Configuration(_)) => err,
        other => CollectorError::PoolCreation {
            key: request.pool_name.clone(),
            reason: other.to_string(),
        },
    }
}

#[cfg(any(feature = "postgres", feature = "mysql"))]
fn network_port(request: &ConnectRequest) -> Result<u16> {
    u16::try_from(request.port).map_err(|_| CollectorError::InvalidPort {
        host: mask_host(&request.host),
        port: request.port,
    })
}

/// Run a direct connect under the login timeout
async fn within_login_timeout<T, F>(request: &ConnectRequest, login_timeout: Duration, connect: F) -> Result<T>
where
    F: std::future::Future<Output = std::result::Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(login_timeout, connect).await {
        Ok(result) => result.map_err(|e| connect_error(e, request, login_timeout)),
        Err(_) => Err(CollectorError::ConnectTimeout {
            target: request.pool_name.clone(),
            timeout: login_timeout,
        }),
    }
}

#[cfg(feature = "postgres")]
mod postgres {
    use super::*;
    use sqlx::postgres::{PgConnectOptions, PgConnection, PgPool, PgPoolOptions};
    use sqlx::Connection;

    sqlx_metric_source!(PostgresSource, PgPool);

    fn connect_options(request: &ConnectRequest) -> Result<PgConnectOptions> {
        let mut options = PgConnectOptions::new()
            .host(&request.host)
            .port(network_port(request)?)
            .database(request.database.as_deref().unwrap_or("postgres"))
            .application_name("dbcli-collector");
        if let Some(username) = &request.username {
            options = options.username(username);
        }
        if let Some(password) = &request.password {
            options = options.password(password);
        }
        Ok(options)
    }

    /// PostgreSQL over SQLx
    #[derive(Debug, Default, Clone, Copy)]
    pub struct PostgresDriver;

    #[async_trait]
    impl EngineDriver for PostgresDriver {
        fn engine(&self) -> EngineType {
            EngineType::PostgreSql
        }

        async fn open_pool(
            &self,
            request: &ConnectRequest,
            config: &PoolConfiguration,
        ) -> Result<Arc<dyn MetricSource>> {
            let pool = PgPoolOptions::new()
                .max_connections(config.max_connections)
                .min_connections(config.min_connections)
                .acquire_timeout(config.acquire_timeout)
                .idle_timeout(config.idle_timeout)
                .max_lifetime(config.max_lifetime)
                .connect_with(connect_options(request)?)
                .await
                .map_err(|e| connect_error(e, request, config.acquire_timeout))?;
            sqlx::raw_sql(config.validation_query)
                .execute(&pool)
                .await
                .map_err(|e| connect_error(e, request, config.acquire_timeout))?;
            Ok(Arc::new(PostgresSource {
                name: request.pool_name.clone(),
                config: config.clone(),
                pool,
            }))
        }

        async fn probe(&self, request: &ConnectRequest, login_timeout: Duration) -> Result<()> {
            let options = connect_options(request)?;
            let mut conn =
                within_login_timeout(request, login_timeout, PgConnection::connect_with(&options)).await?;
            conn.ping().await?;
            conn.close().await?;
            Ok(())
        }
    }
}

#[cfg(feature = "mysql")]
mod mysql {
    use super::*;
    use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlPool, MySqlPoolOptions};
    use sqlx::Connection;

    sqlx_metric_source!(MySqlSource, MySqlPool);

    fn connect_options(request: &ConnectRequest) -> Result<MySqlConnectOptions> {
        let mut options = MySqlConnectOptions::new()
            .host(&request.host)
            .port(network_port(request)?)
            .charset("utf8mb4");
        if let Some(database) = &request.database {
            options = options.database(database);
        }
        if let Some(username) = &request.username {
            options = options.username(username);
        }
        if let Some(password) = &request.password {
            options = options.password(password);
        }
        Ok(options)
    }

    /// MySQL over SQLx
    #[derive(Debug, Default, Clone, Copy)]
    pub struct MySqlDriver;

    #[async_trait]
    impl EngineDriver for MySqlDriver {
        fn engine(&self) -> EngineType {
            EngineType::MySql
        }

        async fn open_pool(
            &self,
            request: &ConnectRequest,
            config: &PoolConfiguration,
        ) -> Result<Arc<dyn MetricSource>> {
            let pool = MySqlPoolOptions::new()
                .max_connections(config.max_connections)
                .min_connections(config.min_connections)
                .acquire_timeout(config.acquire_timeout)
                .idle_timeout(config.idle_timeout)
                .max_lifetime(config.max_lifetime)
                .connect_with(connect_options(request)?)
                .await
                .map_err(|e| connect_error(e, request, config.acquire_timeout))?;
            sqlx::raw_sql(config.validation_query)
                .execute(&pool)
                .await
                .map_err(|e| connect_error(e, request, config.acquire_timeout))?;
            Ok(Arc::new(MySqlSource {
                name: request.pool_name.clone(),
                config: config.clone(),
                pool,
            }))
        }

        async fn probe(&self, request: &ConnectRequest, login_timeout: Duration) -> Result<()> {
            let options = connect_options(request)?;
            let mut conn =
                within_login_timeout(request, login_timeout, MySqlConnection::connect_with(&options)).await?;
            conn.ping().await?;
            conn.close().await?;
            Ok(())
        }
    }
}

#[cfg(feature = "embedded")]
mod embedded {
    use super::*;
    use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions};
    use sqlx::Connection;
    use std::str::FromStr;

    sqlx_metric_source!(EmbeddedSource, SqlitePool);

    fn connect_options(request: &ConnectRequest) -> Result<SqliteConnectOptions> {
        SqliteConnectOptions::from_str(request.identity.connection_string()).map_err(|e| {
            CollectorError::Configuration(format!("invalid embedded connection string: {e}"))
        })
    }

    /// In-process SQLite, used for embedded collection and tests
    #[derive(Debug, Default, Clone, Copy)]
    pub struct EmbeddedDriver;

    #[async_trait]
    impl EngineDriver for EmbeddedDriver {
        fn engine(&self) -> EngineType {
            EngineType::Embedded
        }

        async fn open_pool(
            &self,
            request: &ConnectRequest,
            config: &PoolConfiguration,
        ) -> Result<Arc<dyn MetricSource>> {
            // min_connections keeps the shared in-memory database alive
            let pool = SqlitePoolOptions::new()
                .max_connections(config.max_connections)
                .min_connections(config.min_connections.max(1))
                .acquire_timeout(config.acquire_timeout)
                .idle_timeout(config.idle_timeout)
                .max_lifetime(config.max_lifetime)
                .connect_with(connect_options(request)?)
                .await
                .map_err(|e| connect_error(e, request, config.acquire_timeout))?;
            sqlx::raw_sql(config.validation_query)
                .execute(&pool)
                .await
                .map_err(|e| connect_error(e, request, config.acquire_timeout))?;
            Ok(Arc::new(EmbeddedSource {
                name: request.pool_name.clone(),
                config: config.clone(),
                pool,
            }))
        }

        async fn probe(&self, request: &ConnectRequest, login_timeout: Duration) -> Result<()> {
            let options = connect_options(request)?;
            let mut conn =
                within_login_timeout(request, login_timeout, SqliteConnection::connect_with(&options)).await?;
            conn.ping().await?;
            conn.close().await?;
            Ok(())
        }
    }
}

#[cfg(feature = "embedded")]
pub use embedded::{EmbeddedDriver, EmbeddedSource};
#[cfg(feature = "mysql")]
pub use mysql::{MySqlDriver, MySqlSource};
#[cfg(feature = "postgres")]
pub use postgres::{PostgresDriver, PostgresSource};
