//! High-level runner API for the bootstrap tool.
//!
//! This module wraps pool setup, table creation and the infrastructure
//! declaration behind a few entry points. It is the API the CLI uses.

use anyhow::{Context, Result, anyhow};
use sqlx::postgres::PgSslMode;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::db::pool::{PoolArgsBuilder, split_host_port};
use crate::db::{self as db_pool, Pool, app_tables};
use crate::infra::{self, PlanStep, StackConfig};

pub use crate::config::DEFAULT_SCHEMA;

/// Where and how to connect to the application database
#[derive(Debug, Clone)]
pub struct ConnectionArgs {
    /// Host, optionally with `:port`
    pub host: String,
    pub database: String,
    pub username: String,
    pub password: String,
    /// libpq-style TLS mode: disable, allow, prefer, require, verify-ca, verify-full
    pub ssl_mode: String,
}

/// Arguments for the bootstrap and listing operations
#[derive(Debug, Clone)]
pub struct BootstrapArgs {
    pub connection: ConnectionArgs,
    pub schema: String,

    // Test-only: inject a pre-created pool (for SQLite testing)
    #[cfg(test)]
    pub test_pool: Option<Pool>,
}

/// Result of a completed bootstrap
#[derive(Debug)]
pub struct BootstrapResult {
    /// Tables this run created
    pub created: Vec<String>,
    /// Application tables that were already present
    pub existing: Vec<String>,
    /// Every table in the schema after the run, sorted by name
    pub tables: Vec<String>,
    pub duration: Duration,
}

#[cfg(test)]
fn injected_pool(args: &BootstrapArgs) -> Option<Pool> {
    args.test_pool.clone()
}

#[cfg(not(test))]
fn injected_pool(_args: &BootstrapArgs) -> Option<Pool> {
    None
}

async fn connect(args: &BootstrapArgs) -> Result<Pool> {
    if let Some(pool) = injected_pool(args) {
        return Ok(pool);
    }

    let conn = &args.connection;
    let (host, port) = split_host_port(&conn.host)?;
    let ssl_mode: PgSslMode = conn
        .ssl_mode
        .parse()
        .map_err(|e| anyhow!("Invalid SSL mode '{}': {}", conn.ssl_mode, e))?;

    let mut builder = PoolArgsBuilder::default();
    builder
        .host(host)
        .database(&conn.database)
        .username(&conn.username)
        .password(&conn.password)
        .ssl_mode(ssl_mode);
    if let Some(port) = port {
        builder.port(port);
    }

    db_pool::pool::pool(builder.build()?).await
}

/// Create the application tables if they are missing, then list the schema's tables.
///
/// Safe to run repeatedly: tables that already exist are left untouched.
///
/// # Example
///
/// ```no_run
/// use cnr_stack::runner::{BootstrapArgs, ConnectionArgs, run_bootstrap};
///
/// # async fn example() -> anyhow::Result<()> {
/// let args = BootstrapArgs {
///     connection: ConnectionArgs {
///         host: "10.0.0.5".to_string(),
///         database: "cnr-app-db".to_string(),
///         username: "appuser".to_string(),
///         password: "secret".to_string(),
///         ssl_mode: "prefer".to_string(),
///     },
///     schema: "public".to_string(),
/// };
///
/// let result = run_bootstrap(args).await?;
/// for table in result.tables {
///     println!("{table}");
/// }
/// # Ok(())
/// # }
/// ```
pub async fn run_bootstrap(args: BootstrapArgs) -> Result<BootstrapResult> {
    let start = Instant::now();
    let pool = connect(&args).await?;

    let before = pool
        .list_tables(&args.schema)
        .await
        .context("Error retrieving tables")?;

    let mut created = Vec::new();
    let mut existing = Vec::new();

    for table in app_tables() {
        let qualified = pool.qualified_table_name(&args.schema, table.name);
        let ddl = table.create_if_not_exists_ddl(&qualified);
        debug!(table = table.name, %ddl, "ensuring table");

        pool.execute_query(&ddl)
            .await
            .with_context(|| format!("Table creation failed: {}", table.name))?;

        if before.iter().any(|t| t == table.name) {
            info!("Table already exists: {}", qualified);
            existing.push(table.name.to_string());
        } else {
            info!("Created table: {}", qualified);
            created.push(table.name.to_string());
        }
    }

    let tables = pool
        .list_tables(&args.schema)
        .await
        .context("Error retrieving tables")?;

    // IF NOT EXISTS also skips silently when a view or other relation holds the name
    for table in app_tables() {
        if !tables.iter().any(|t| t == table.name) {
            return Err(anyhow!(
                "'{}' is not a table in schema '{}' after creation; another object may hold the name",
                table.name,
                args.schema
            ))
            .with_context(|| format!("Table creation failed: {}", table.name));
        }
    }

    Ok(BootstrapResult {
        created,
        existing,
        tables,
        duration: start.elapsed(),
    })
}

/// List the tables of the configured schema without changing anything
pub async fn run_list_tables(args: BootstrapArgs) -> Result<Vec<String>> {
    let pool = connect(&args).await?;
    pool.list_tables(&args.schema)
        .await
        .context("Error retrieving tables")
}

/// Render the declared stack as a Pulumi YAML program
pub fn render_stack(config_path: Option<&Path>) -> Result<String> {
    let config = StackConfig::load(config_path)?;
    let program = infra::declare(&config);
    infra::to_pulumi_yaml(&program)
}

/// The declared stack in dependency order
pub fn plan_stack(config_path: Option<&Path>) -> Result<Vec<PlanStep>> {
    let config = StackConfig::load(config_path)?;
    infra::apply_order(&infra::declare(&config))
}
