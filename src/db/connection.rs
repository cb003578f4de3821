use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::Root;
use surrealdb::Surreal;

pub type Db = Surreal<Any>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub namespace: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: env::var("SURREALDB_URL")
                .unwrap_or_else(|_| "memory".to_string()),
            namespace: env::var("SURREALDB_NAMESPACE")
                .unwrap_or_else(|_| "petshop".to_string()),
            database: env::var("SURREALDB_DATABASE")
                .unwrap_or_else(|_| "api".to_string()),
            username: env::var("SURREALDB_USERNAME").ok(),
            password: env::var("SURREALDB_PASSWORD").ok(),
        }
    }
}

pub async fn create_connection(config: DatabaseConfig) -> Result<Db> {
    let db = surrealdb::engine::any::connect(config.url.as_str())
        .await
        .with_context(|| format!("failed to connect to {}", config.url))?;

    // Sign in if credentials are provided
    if let (Some(username), Some(password)) = (config.username, config.password) {
        db.signin(Root {
            username: &username,
            password: &password,
        })
        .await?;
    }

    db.use_ns(config.namespace).use_db(config.database).await?;

    Ok(db)
}

/// Define the tables the auth subsystem reads and writes.
///
/// Safe to run on every start: every statement is `IF NOT EXISTS`.
pub async fn ensure_schema(db: &Db) -> Result<()> {
    let schema_queries = vec![
        // Principals. Profile columns are owned by the account flows.
        "DEFINE TABLE IF NOT EXISTS user SCHEMALESS;
         DEFINE FIELD IF NOT EXISTS external_id ON TABLE user TYPE string;
         DEFINE FIELD IF NOT EXISTS email ON TABLE user TYPE string;
         DEFINE FIELD IF NOT EXISTS password_hash ON TABLE user TYPE string;
         DEFINE FIELD IF NOT EXISTS is_admin ON TABLE user TYPE bool DEFAULT false;
         DEFINE FIELD IF NOT EXISTS created_at ON TABLE user TYPE datetime DEFAULT time::now();",

        // Server-side shadow of every issued token. Rows are never deleted;
        // revocation backdates expires_at.
        "DEFINE TABLE IF NOT EXISTS token_record SCHEMALESS;
         DEFINE FIELD IF NOT EXISTS owner_id ON TABLE token_record TYPE record<user>;
         DEFINE FIELD IF NOT EXISTS unique_id ON TABLE token_record TYPE string;
         DEFINE FIELD IF NOT EXISTS permissions ON TABLE token_record TYPE array<string>;
         DEFINE FIELD IF NOT EXISTS expires_at ON TABLE token_record TYPE datetime;
         DEFINE FIELD IF NOT EXISTS created_at ON TABLE token_record TYPE datetime;",

        "DEFINE INDEX IF NOT EXISTS user_external_id ON TABLE user COLUMNS external_id UNIQUE;
         DEFINE INDEX IF NOT EXISTS user_email ON TABLE user COLUMNS email UNIQUE;
         DEFINE INDEX IF NOT EXISTS token_record_unique_id ON TABLE token_record COLUMNS unique_id UNIQUE;
         DEFINE INDEX IF NOT EXISTS token_record_owner ON TABLE token_record COLUMNS owner_id;",
    ];

    for query in schema_queries {
        db.query(query).await?.check()?;
    }

    Ok(())
}
