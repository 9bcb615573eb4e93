use std::process::ExitCode;

use clap::Parser;
use linkauth::{
    AppUpdate, LinkAuth, LinkAuthBuilder, LinkAuthError, LinkRequest, NewApplication,
    QueueConfig, SqliteRepositoryProvider, TokenConfig,
};
use tracing_subscriber::EnvFilter;

/// Command line interface for linkauth
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database connection string
    #[arg(long, env = "LINKAUTH_DB_URL", default_value = "sqlite://linkauth.db?mode=rwc")]
    db_url: String,

    /// Command to execute
    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands
#[derive(clap::Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Register an application and mail its credentials to the admin
    Register {
        #[arg(long)]
        name: String,
        /// Admin email; the application id is derived from it
        #[arg(long)]
        email: String,
        #[arg(long)]
        redirect_url: String,
        /// Session duration in seconds
        #[arg(long)]
        duration: Option<i64>,
    },
    /// Issue a magic link and mail it
    Link {
        /// Admin secret of the application
        #[arg(long)]
        secret: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        redirect_url: Option<String>,
        /// Session duration in seconds
        #[arg(long)]
        duration: Option<i64>,
    },
    /// Check a token
    Validate {
        #[arg(long)]
        secret: String,
        #[arg(long)]
        token: String,
        /// Require an admin session token
        #[arg(long)]
        admin: bool,
    },
    /// Show an application using an admin session token
    Info {
        #[arg(long)]
        secret: String,
        #[arg(long)]
        token: String,
    },
    /// Rename an application or change its redirect URL or session duration
    Update {
        #[arg(long)]
        secret: String,
        #[arg(long)]
        token: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        redirect_url: Option<String>,
        #[arg(long)]
        duration: Option<i64>,
    },
    /// Delete an application and every token it issued
    Delete {
        #[arg(long)]
        secret: String,
        #[arg(long)]
        token: String,
    },
    /// Delete expired tokens
    Sweep,
    /// Print version information
    Version,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Version = cli.command {
        println!("linkauth v{}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), LinkAuthError> {
    let token_config = TokenConfig::from_env();
    let linkauth = LinkAuthBuilder::new()
        .with_sqlite(&cli.db_url)
        .await?
        .with_token_config(token_config.clone())
        .with_queue_config(QueueConfig::from_env())
        .with_mailer_from_env()?
        .apply_migrations(matches!(cli.command, Commands::Migrate))
        .build()
        .await?;

    match cli.command {
        Commands::Migrate => {
            println!("Migrations applied");
        }
        Commands::Register {
            name,
            email,
            redirect_url,
            duration,
        } => {
            let duration = duration.unwrap_or(token_config.default_session_duration);
            let registration = linkauth
                .register_app(&NewApplication::new(name, email, redirect_url, duration))
                .await?;
            flush(&linkauth).await;
            println!("app_id: {}", registration.app_id);
            println!("secret: {}", registration.secret);
        }
        Commands::Link {
            secret,
            email,
            redirect_url,
            duration,
        } => {
            let request = LinkRequest {
                email,
                redirect_url,
                duration,
            };
            let issued = linkauth.request_link(&secret, &request).await?;
            flush(&linkauth).await;
            println!("{}", issued.link);
        }
        Commands::Validate {
            secret,
            token,
            admin,
        } => {
            let valid = if admin {
                linkauth.validate_admin_token(&token, &secret).await.is_some()
            } else {
                linkauth.validate_user_token(&token, &secret).await
            };
            println!("{}", if valid { "valid" } else { "invalid" });
            if !valid {
                return Err(LinkAuthError::Unauthorized);
            }
        }
        Commands::Info { secret, token } => {
            let view = linkauth.app_metadata(&token, &secret).await?;
            print_json(&view);
        }
        Commands::Update {
            secret,
            token,
            name,
            redirect_url,
            duration,
        } => {
            let update = AppUpdate {
                name,
                redirect_url,
                session_duration: duration,
            };
            let view = linkauth.update_app(&token, &secret, &update).await?;
            print_json(&view);
        }
        Commands::Delete { secret, token } => {
            linkauth.delete_app(&token, &secret).await?;
            println!("Application deleted");
        }
        Commands::Sweep => {
            let removed = linkauth.sweep_expired().await?;
            println!("Removed {removed} expired tokens");
        }
        Commands::Version => {}
    }

    Ok(())
}

/// The process exits right after the command, so queued mail is sent inline.
async fn flush(linkauth: &LinkAuth<SqliteRepositoryProvider>) {
    let queued = linkauth.queue().len();
    let delivered = linkauth.deliver_pending().await;
    if delivered < queued {
        tracing::warn!(queued, delivered, "Some emails could not be delivered");
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => tracing::error!(error = %e, "Failed to serialize output"),
    }
}
