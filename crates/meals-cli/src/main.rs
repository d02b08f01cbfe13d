mod config;
mod menu_cmds;
mod orders_cmd;
mod parent_cmds;
mod serve_cmd;
#[cfg(test)]
mod test_util;

use clap::{CommandFactory, Parser, Subcommand};

use meals_db::pool;

use config::MealsConfig;

#[derive(Parser)]
#[command(name = "meals", about = "School meal ordering service")]
struct Cli {
    /// Database URL (overrides MEALS_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a meals config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = "postgresql://localhost:5432/meals")]
        db_url: String,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Create and migrate the meals database
    DbInit,
    /// Run the HTTP service
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        /// Port to listen on
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
    /// Menu administration
    Menu {
        #[command(subcommand)]
        command: MenuCommands,
    },
    /// Parent account administration
    Parent {
        #[command(subcommand)]
        command: ParentCommands,
    },
    /// Print a session token for a user
    Token {
        /// Username the token is issued to
        username: String,
        /// Issue a staff token instead of a parent token
        #[arg(long)]
        staff: bool,
    },
    /// Show kitchen meal counts per date
    Orders {
        /// First date (YYYY-MM-DD, default today)
        #[arg(long)]
        from: Option<String>,
        /// Last date (YYYY-MM-DD, default four weeks ahead)
        #[arg(long)]
        to: Option<String>,
    },
    /// Print shell completions
    Completions {
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
pub enum MenuCommands {
    /// Import meals and offered dates from a TOML file
    Import {
        /// Path to the menu TOML file
        file: String,
    },
    /// List offered dates and their meals
    Show {
        /// First date (YYYY-MM-DD, default today)
        #[arg(long)]
        from: Option<String>,
        /// Last date (YYYY-MM-DD, default four weeks ahead)
        #[arg(long)]
        to: Option<String>,
        /// Print as an importable menu TOML file
        #[arg(long)]
        toml: bool,
    },
    /// Withdraw a date, deleting the choices made for it
    Remove {
        /// Date to withdraw (YYYY-MM-DD)
        date: String,
    },
}

#[derive(Subcommand)]
pub enum ParentCommands {
    /// Register a parent account ahead of first sign-in
    Add {
        /// Username the parent signs in with
        username: String,
        /// Display name
        #[arg(long)]
        full_name: String,
        /// Contact email
        #[arg(long)]
        email: Option<String>,
    },
}

fn cmd_init(db_url: &str, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let session_secret = config::generate_session_secret();

    let cfg = config::ConfigFile {
        database: config::DatabaseSection {
            url: db_url.to_string(),
        },
        auth: config::AuthSection {
            session_secret: session_secret.clone(),
        },
    };

    let written = config::save_config(&cfg)?;

    println!("Config written to {}", written.display());
    println!("  database.url = {db_url}");
    println!(
        "  auth.session_secret = {}...{}",
        &session_secret[..8],
        &session_secret[session_secret.len() - 8..]
    );
    println!();
    println!("Next: run `meals db-init` to create and migrate the database.");

    Ok(())
}

async fn cmd_db_init(cli_db_url: Option<&str>) -> anyhow::Result<()> {
    let resolved = MealsConfig::resolve(cli_db_url)?;

    println!("Initializing meals database...");

    pool::ensure_database_exists(&resolved.db_config).await?;
    let db_pool = pool::create_pool(&resolved.db_config).await?;
    pool::run_migrations(&db_pool).await?;

    let counts = pool::table_counts(&db_pool).await?;
    println!("Database ready. Tables:");
    for (table, count) in &counts {
        println!("  {table}: {count} rows");
    }

    db_pool.close().await;

    println!("meals db-init complete.");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { db_url, force } => {
            cmd_init(&db_url, force)?;
        }
        Commands::DbInit => {
            cmd_db_init(cli.database_url.as_deref()).await?;
        }
        Commands::Serve { bind, port } => {
            let resolved = MealsConfig::resolve(cli.database_url.as_deref())?;
            let tokens = resolved.require_tokens()?.clone();
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let state = serve_cmd::AppState {
                pool: db_pool.clone(),
                tokens,
            };
            let result = serve_cmd::run_serve(state, &bind, port).await;
            db_pool.close().await;
            result?;
        }
        Commands::Menu { command } => {
            let resolved = MealsConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = menu_cmds::run_menu_command(command, &db_pool).await;
            db_pool.close().await;
            result?;
        }
        Commands::Parent {
            command:
                ParentCommands::Add {
                    username,
                    full_name,
                    email,
                },
        } => {
            let resolved = MealsConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result =
                parent_cmds::run_parent_add(&db_pool, &username, &full_name, email.as_deref())
                    .await;
            db_pool.close().await;
            result?;
        }
        Commands::Token { username, staff } => {
            let resolved = MealsConfig::resolve(cli.database_url.as_deref())?;
            let token = parent_cmds::issue_token(resolved.require_tokens()?, &username, staff)?;
            println!("{token}");
        }
        Commands::Orders { from, to } => {
            let resolved = MealsConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = orders_cmd::run_orders(&db_pool, from.as_deref(), to.as_deref()).await;
            db_pool.close().await;
            result?;
        }
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "meals", &mut std::io::stdout());
        }
    }

    Ok(())
}
