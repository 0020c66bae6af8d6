use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand};
use cnr_stack::runner::{
    BootstrapArgs, ConnectionArgs, DEFAULT_SCHEMA, plan_stack, render_stack, run_bootstrap, run_list_tables,
};
use std::path::PathBuf;

#[derive(Parser, Clone)]
#[command(name = "cnr-stack")]
#[command(about = "Bootstrap the application tables and declare the Cloud SQL stack behind them")]
struct Args {
    /// Quiet mode - only warnings and errors are logged
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, ClapArgs)]
struct DbOptions {
    /// Database host, optionally with :port
    #[arg(long, env = "DB_HOST")]
    host: String,

    /// Database name
    #[arg(long, env = "DB_NAME")]
    database: String,

    /// Database username
    #[arg(long, env = "DB_USER")]
    username: String,

    /// Database password
    #[arg(long, env = "DB_PASSWORD", hide_env_values = true)]
    password: String,

    /// TLS mode (disable, allow, prefer, require, verify-ca, verify-full)
    #[arg(long, env = "DB_SSL_MODE", default_value = "prefer")]
    ssl_mode: String,

    /// Schema to create tables in and list
    #[arg(long, default_value = DEFAULT_SCHEMA)]
    schema: String,
}

#[derive(Clone, Subcommand)]
enum Command {
    /// Create the users and phones tables if missing, then list all tables
    Bootstrap {
        #[command(flatten)]
        db: DbOptions,
    },
    /// List the tables of the schema
    Tables {
        #[command(flatten)]
        db: DbOptions,
    },
    /// Work with the infrastructure declaration
    Infra {
        #[command(subcommand)]
        command: InfraCommand,
    },
}

#[derive(Clone, Subcommand)]
enum InfraCommand {
    /// Write the stack as a Pulumi YAML program
    Render {
        /// Stack config file (.toml, .json, .yaml); defaults apply when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show the declared resources in dependency order
    Plan {
        /// Stack config file (.toml, .json, .yaml); defaults apply when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

impl DbOptions {
    fn into_bootstrap_args(self) -> BootstrapArgs {
        BootstrapArgs {
            connection: ConnectionArgs {
                host: self.host,
                database: self.database,
                username: self.username,
                password: self.password,
                ssl_mode: self.ssl_mode,
            },
            schema: self.schema,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; the environment or flags may carry everything.
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    init_tracing(args.quiet);

    match args.command {
        Command::Bootstrap { db } => {
            let result = run_bootstrap(db.into_bootstrap_args()).await?;
            tracing::info!(
                created = ?result.created,
                existing = ?result.existing,
                "Bootstrap finished in {:.2}s",
                result.duration.as_secs_f64()
            );
            for table in result.tables {
                println!("{}", table);
            }
        }
        Command::Tables { db } => {
            for table in run_list_tables(db.into_bootstrap_args()).await? {
                println!("{}", table);
            }
        }
        Command::Infra { command } => run_infra(command)?,
    }

    Ok(())
}

fn run_infra(command: InfraCommand) -> anyhow::Result<()> {
    match command {
        InfraCommand::Render { config, output } => {
            let yaml = render_stack(config.as_deref())?;
            match output {
                Some(path) => {
                    std::fs::write(&path, yaml)
                        .with_context(|| format!("Failed to write '{}'", path.display()))?;
                    tracing::info!("Wrote Pulumi program to {}", path.display());
                }
                None => print!("{}", yaml),
            }
        }
        InfraCommand::Plan { config } => {
            let steps = plan_stack(config.as_deref())?;
            println!("Apply order");
            println!("===========");
            for (i, step) in steps.iter().enumerate() {
                let kind = if step.is_lookup { "lookup" } else { "create" };
                println!("{:>2}. {} {} ({})", i + 1, kind, step.key, step.type_label);
                if !step.depends_on.is_empty() {
                    println!("      after: {}", step.depends_on.join(", "));
                }
            }
        }
    }
    Ok(())
}

fn init_tracing(quiet: bool) {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    // stdout is reserved for command output (table names, YAML)
    let filter = if quiet {
        EnvFilter::new("cnr_stack=warn,sqlx=off")
    } else {
        EnvFilter::new("cnr_stack=info,sqlx=off")
    };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
