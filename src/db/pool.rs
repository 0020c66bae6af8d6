//! Adapter between bb8 and the sqlx::Postgres driver.
use anyhow::{Context, Result, anyhow};
use derive_builder::Builder;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgSslMode};
use sqlx::{ConnectOptions, Connection};

use crate::config::{
    ACQUIRE_TIMEOUT, CONNECT_TIMEOUT, DEFAULT_MAX_POOL_SIZE, DEFAULT_MIN_IDLE, DEFAULT_PORT,
    PING_TIMEOUT,
};

/// Inner pool variants
#[derive(Debug, Clone)]
enum PoolInner {
    Postgres(bb8::Pool<ConnectionManager>),
    #[cfg(test)]
    Sqlite(sqlx::SqlitePool),
}

#[derive(Debug, Clone)]
pub struct Pool {
    inner: PoolInner,
}

#[derive(Builder)]
pub struct PoolArgs {
    #[builder(setter(into))]
    host: String,
    #[builder(default = "DEFAULT_PORT")]
    port: u16,
    #[builder(setter(into))]
    database: String,
    #[builder(setter(into))]
    username: String,
    #[builder(setter(into))]
    password: String,
    #[builder(default = "PgSslMode::Prefer")]
    ssl_mode: PgSslMode,
    #[builder(default = "DEFAULT_MIN_IDLE")]
    min_idle: u32,
    #[builder(default = "DEFAULT_MAX_POOL_SIZE")]
    max_pool_size: u32,
}

pub async fn pool(args: PoolArgs) -> Result<Pool> {
    let PoolArgs {
        host,
        port,
        database,
        username,
        password,
        ssl_mode,
        min_idle,
        max_pool_size,
    } = args;

    // Build the options field by field so credentials never pass through a URL
    // and need no percent-encoding.
    let connect_options = PgConnectOptions::new()
        .host(&host)
        .port(port)
        .database(&database)
        .username(&username)
        .password(&password)
        .ssl_mode(ssl_mode);

    tracing::debug!(host = %host, port, database = %database, username = %username, "building connection pool");

    let bb8_pool = bb8::Builder::new()
        .min_idle(min_idle)
        .max_size(max_pool_size)
        .connection_timeout(ACQUIRE_TIMEOUT)
        .build(ConnectionManager::new(connect_options))
        .await
        .with_context(|| format!("Unable to connect to the database at {host}:{port}"))?;

    Ok(Pool {
        inner: PoolInner::Postgres(bb8_pool),
    })
}

fn run_error(err: bb8::RunError<sqlx::Error>) -> sqlx::Error {
    match err {
        bb8::RunError::User(e) => e,
        bb8::RunError::TimedOut => sqlx::Error::PoolTimedOut,
    }
}

impl Pool {
    /// Create an in-memory SQLite pool for testing
    #[cfg(test)]
    pub async fn sqlite_in_memory() -> Result<Self, sqlx::Error> {
        // Every connection to `sqlite::memory:` opens its own database, so the
        // pool is pinned to one long-lived connection.
        let sqlite_pool = sqlx::sqlite::SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        Ok(Pool {
            inner: PoolInner::Sqlite(sqlite_pool),
        })
    }

    /// Run a query returning a single integer, like `SELECT COUNT(*) FROM t`
    #[cfg(test)]
    pub async fn fetch_scalar(&self, sql: &str) -> Result<i64, sqlx::Error> {
        let (value,): (i64,) = match &self.inner {
            PoolInner::Postgres(pool) => {
                let mut conn = pool.get().await.map_err(run_error)?;
                sqlx::query_as(sql).fetch_one(&mut *conn).await?
            }
            PoolInner::Sqlite(pool) => sqlx::query_as(sql).fetch_one(pool).await?,
        };
        Ok(value)
    }

    /// Execute a single statement (DDL like CREATE TABLE) - works for both Postgres and SQLite
    pub async fn execute_query(&self, sql: &str) -> Result<(), sqlx::Error> {
        match &self.inner {
            PoolInner::Postgres(pool) => {
                let mut conn = pool.get().await.map_err(run_error)?;
                sqlx::query(sql).execute(&mut *conn).await?;
                Ok(())
            }
            #[cfg(test)]
            PoolInner::Sqlite(pool) => {
                sqlx::query(sql).execute(pool).await?;
                Ok(())
            }
        }
    }

    /// List the tables of a schema, sorted by name.
    ///
    /// SQLite has no schemas in the Postgres sense, so `schema` is ignored there.
    pub async fn list_tables(&self, schema: &str) -> Result<Vec<String>, sqlx::Error> {
        match &self.inner {
            PoolInner::Postgres(pool) => {
                let mut conn = pool.get().await.map_err(run_error)?;
                let query = r#"
                    SELECT tablename::text
                    FROM pg_catalog.pg_tables
                    WHERE schemaname = $1
                    ORDER BY tablename
                "#;
                let rows: Vec<(String,)> = sqlx::query_as(query)
                    .bind(schema)
                    .fetch_all(&mut *conn)
                    .await?;
                Ok(rows.into_iter().map(|(name,)| name).collect())
            }
            #[cfg(test)]
            PoolInner::Sqlite(pool) => {
                let _ = schema;
                let query = r#"
                    SELECT name
                    FROM sqlite_master
                    WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
                    ORDER BY name
                "#;
                let rows: Vec<(String,)> = sqlx::query_as(query).fetch_all(pool).await?;
                Ok(rows.into_iter().map(|(name,)| name).collect())
            }
        }
    }

    /// Quote a table name for use in DDL, qualified by schema on Postgres
    pub fn qualified_table_name(&self, schema: &str, table: &str) -> String {
        match &self.inner {
            PoolInner::Postgres(_) => format!("{}.{}", quote_ident(schema), quote_ident(table)),
            #[cfg(test)]
            PoolInner::Sqlite(_) => quote_ident(table),
        }
    }
}

/// Double-quote an identifier, escaping embedded quotes
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Split a `DB_HOST` value into host and optional port.
///
/// Accepts `host`, `host:port`, `[v6addr]` and `[v6addr]:port`. A bare IPv6
/// address without brackets is taken as a host with no port.
pub fn split_host_port(value: &str) -> Result<(String, Option<u16>)> {
    let value = value.trim();
    if value.is_empty() {
        return Err(anyhow!("Database host is empty"));
    }

    if let Some(rest) = value.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| anyhow!("Unterminated IPv6 address in host '{}'", value))?;
        return match tail {
            "" => Ok((host.to_string(), None)),
            _ => {
                let port = tail
                    .strip_prefix(':')
                    .ok_or_else(|| anyhow!("Unexpected characters after IPv6 address in '{}'", value))?;
                Ok((host.to_string(), Some(parse_port(port, value)?)))
            }
        };
    }

    match value.split_once(':') {
        Some((host, port)) if !port.contains(':') => {
            if host.is_empty() {
                return Err(anyhow!("Database host is empty in '{}'", value));
            }
            Ok((host.to_string(), Some(parse_port(port, value)?)))
        }
        _ => Ok((value.to_string(), None)),
    }
}

fn parse_port(port: &str, value: &str) -> Result<u16> {
    port.parse::<u16>()
        .map_err(|e| anyhow!("Invalid port '{}' in host '{}': {}", port, value, e))
}

pub struct ConnectionManager {
    connect_options: PgConnectOptions,
}

impl ConnectionManager {
    /// Create a new `ConnectionManager` with the specified connect options.
    pub fn new(connect_options: PgConnectOptions) -> Self {
        Self { connect_options }
    }
}

impl bb8::ManageConnection for ConnectionManager {
    type Connection = PgConnection;
    type Error = sqlx::Error;

    async fn connect(&self) -> Result<Self::Connection, Self::Error> {
        tokio::time::timeout(CONNECT_TIMEOUT, self.connect_options.connect())
            .await
            .map_err(|_| sqlx::Error::PoolTimedOut)?
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        tokio::time::timeout(PING_TIMEOUT, conn.ping())
            .await
            // Convert tokio timeouts into sqlx pool timeouts. bb8 will retry a different connection on ping failure.
            .map_err(|_| sqlx::Error::PoolTimedOut)
            // Make sure that we also look at the actual ping result
            .and_then(|result| result)?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        // sqlx::PgConnection provides no non-async way to check for closed/broken connections.
        false
    }
}
