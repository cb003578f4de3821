use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;
use petshop_api::auth::NewUser;
use petshop_api::{AuthConfig, DatabaseConfig, UserStore};

#[derive(Parser)]
#[command(name = "petshop-api")]
#[command(about = "Pet Shop API: accounts and session tokens")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Token settings shared by every command that signs or checks tokens.
#[derive(Args)]
struct KeyArgs {
    /// PEM file with the RSA private key
    #[arg(long, env = "JWT_PRIVATE_KEY", default_value = "keys/jwt_private.pem")]
    private_key: PathBuf,
    /// PEM file with the RSA public key
    #[arg(long, env = "JWT_PUBLIC_KEY", default_value = "keys/jwt_public.pem")]
    public_key: PathBuf,
    #[arg(long, env = "JWT_ISSUER", default_value = "petshop-api")]
    issuer: String,
    /// Token lifetime in seconds
    #[arg(long, env = "JWT_TTL_SECONDS", default_value_t = 3600)]
    ttl_seconds: u64,
    /// Clock skew tolerated on iat/exp, in seconds
    #[arg(long, env = "JWT_LEEWAY_SECONDS", default_value_t = 5)]
    leeway_seconds: u64,
    /// Upper bound on a single token store call, in milliseconds
    #[arg(long, env = "TOKEN_STORE_TIMEOUT_MS", default_value_t = 2000)]
    store_timeout_ms: u64,
    /// Skip writing last_used_at on every authenticated request
    #[arg(long, default_value_t = false)]
    no_touch: bool,
}

impl KeyArgs {
    fn into_config(self) -> AuthConfig {
        AuthConfig {
            private_key_path: self.private_key,
            public_key_path: self.public_key,
            issuer: self.issuer,
            token_ttl_seconds: self.ttl_seconds,
            clock_skew_seconds: self.leeway_seconds,
            store_timeout_ms: self.store_timeout_ms,
            touch_last_used: !self.no_touch,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API
    Serve {
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: String,
        #[arg(long, env = "SURREALDB_URL", default_value = "memory")]
        db_url: String,
        #[command(flatten)]
        keys: KeyArgs,
    },
    /// Initialize the database
    Init {
        #[arg(long, env = "SURREALDB_URL", default_value = "memory")]
        db_url: String,
    },
    /// Create an administrator account
    CreateAdmin {
        #[arg(long)]
        email: String,
        #[arg(long, env = "ADMIN_PASSWORD")]
        password: String,
        #[arg(long, default_value = "Admin")]
        first_name: String,
        #[arg(long, default_value = "")]
        last_name: String,
        #[arg(long, env = "SURREALDB_URL", default_value = "memory")]
        db_url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("petshop_api=info".parse()?),
        )
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { bind, db_url, keys } => {
            let db_config = DatabaseConfig {
                url: db_url,
                ..Default::default()
            };
            info!("Using database url for API server: {}", db_config.url);

            let auth_config = keys.into_config();
            info!(
                "Token issuer '{}', lifetime {}s, leeway {}s",
                auth_config.issuer, auth_config.token_ttl_seconds, auth_config.clock_skew_seconds
            );

            let state = petshop_api::build_state(db_config, auth_config).await?;
            let app = petshop_api::create_router(state);

            let listener = tokio::net::TcpListener::bind(&bind).await?;
            info!("API server listening on http://{}", bind);

            axum::serve(listener, app).await?;
        }
        Commands::Init { db_url } => {
            let db_config = DatabaseConfig {
                url: db_url,
                ..Default::default()
            };
            info!("Using database url for initialization: {}", db_config.url);

            info!("Initializing database...");
            let db = petshop_api::create_connection(db_config).await?;
            petshop_api::ensure_schema(&db).await?;
            info!("Database initialized successfully");
        }
        Commands::CreateAdmin {
            email,
            password,
            first_name,
            last_name,
            db_url,
        } => {
            let db_config = DatabaseConfig {
                url: db_url,
                ..Default::default()
            };
            let db = petshop_api::create_connection(db_config).await?;
            petshop_api::ensure_schema(&db).await?;

            let users = UserStore::new(db);
            let admin = users
                .create_user(
                    NewUser {
                        first_name,
                        last_name,
                        email,
                        password,
                        address: None,
                        phone_number: None,
                        is_marketing: false,
                    },
                    true,
                )
                .await?;

            println!("Administrator created successfully!");
            println!();
            println!("  UUID:  {}", admin.external_id);
            println!("  Email: {}", admin.email);
        }
    }

    Ok(())
}
