//! PostgreSQL credential store
//!
//! Each `save` is a single INSERT or UPDATE statement, so a row is always
//! observed either before or after a change, never halfway. Uniqueness of
//! username and email is enforced by table constraints; a violation comes back
//! as [`TallyError::DuplicateKey`] naming the field.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use tally_core::{CredentialStore, Identity, Result, Role, TallyError};

const USERNAME_CONSTRAINT: &str = "users_username_key";
const EMAIL_CONSTRAINT: &str = "users_email_key";

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS users (
        id BIGSERIAL PRIMARY KEY,
        username VARCHAR(50) NOT NULL,
        email VARCHAR(255) NOT NULL,
        password_hash TEXT NOT NULL,
        first_name VARCHAR(50) NOT NULL,
        last_name VARCHAR(50) NOT NULL,
        role VARCHAR(16) NOT NULL DEFAULT 'USER',
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        is_verified BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        last_login TIMESTAMPTZ,
        updated_at TIMESTAMPTZ,
        CONSTRAINT users_username_key UNIQUE (username),
        CONSTRAINT users_email_key UNIQUE (email)
    )
"#;

const COLUMNS: &str = "id, username, email, password_hash, first_name, last_name, role, \
                       is_active, is_verified, created_at, last_login, updated_at";

/// Identity row from database
#[derive(Debug, FromRow)]
struct IdentityRow {
    id: i64,
    username: String,
    email: String,
    password_hash: String,
    first_name: String,
    last_name: String,
    role: String,
    is_active: bool,
    is_verified: bool,
    created_at: DateTime<Utc>,
    last_login: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

impl TryFrom<IdentityRow> for Identity {
    type Error = TallyError;

    fn try_from(row: IdentityRow) -> Result<Self> {
        let role: Role = row.role.parse().map_err(TallyError::Storage)?;

        Ok(Identity {
            id: Some(row.id),
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            first_name: row.first_name,
            last_name: row.last_name,
            role,
            is_active: row.is_active,
            is_verified: row.is_verified,
            created_at: row.created_at,
            last_login: row.last_login,
            updated_at: row.updated_at,
        })
    }
}

/// PostgreSQL-backed [`CredentialStore`]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    /// Connect and make sure the `users` table exists
    pub async fn connect(database_url: &str, pool_size: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(pool_size)
            .connect(database_url)
            .await
            .map_err(|e| TallyError::Storage(format!("PostgreSQL connection failed: {e}")))?;

        let store = Self::from_pool(pool);
        store.migrate().await?;
        Ok(store)
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Idempotent schema bootstrap
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| TallyError::Storage(format!("Failed to create users table: {e}")))?;
        Ok(())
    }

    async fn find_one(&self, column: &str, value: &str) -> Result<Option<Identity>> {
        let sql = format!("SELECT {COLUMNS} FROM users WHERE {column} = $1");
        let row: Option<IdentityRow> = sqlx::query_as(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        row.map(Identity::try_from).transpose()
    }

    async fn exists(&self, column: &str, value: &str) -> Result<bool> {
        let sql = format!("SELECT EXISTS(SELECT 1 FROM users WHERE {column} = $1)");
        let (exists,): (bool,) = sqlx::query_as(&sql)
            .bind(value)
            .fetch_one(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(exists)
    }

    async fn insert(&self, identity: &Identity) -> Result<Identity> {
        let sql = format!(
            r#"
            INSERT INTO users (
                username, email, password_hash, first_name, last_name, role,
                is_active, is_verified, created_at, last_login, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {COLUMNS}
            "#
        );

        let row: IdentityRow = sqlx::query_as(&sql)
            .bind(&identity.username)
            .bind(&identity.email)
            .bind(&identity.password_hash)
            .bind(&identity.first_name)
            .bind(&identity.last_name)
            .bind(identity.role.as_str())
            .bind(identity.is_active)
            .bind(identity.is_verified)
            .bind(identity.created_at)
            .bind(identity.last_login)
            .bind(identity.updated_at)
            .fetch_one(&self.pool)
            .await
            .map_err(write_error)?;

        row.try_into()
    }

    async fn update(&self, id: i64, identity: &Identity) -> Result<Identity> {
        let sql = format!(
            r#"
            UPDATE users SET
                username = $2,
                email = $3,
                password_hash = $4,
                first_name = $5,
                last_name = $6,
                role = $7,
                is_active = $8,
                is_verified = $9,
                last_login = $10,
                updated_at = $11
            WHERE id = $1
            RETURNING {COLUMNS}
            "#
        );

        let row: Option<IdentityRow> = sqlx::query_as(&sql)
            .bind(id)
            .bind(&identity.username)
            .bind(&identity.email)
            .bind(&identity.password_hash)
            .bind(&identity.first_name)
            .bind(&identity.last_name)
            .bind(identity.role.as_str())
            .bind(identity.is_active)
            .bind(identity.is_verified)
            .bind(identity.last_login)
            .bind(identity.updated_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(write_error)?;

        row.ok_or_else(|| TallyError::NotFound(format!("identity {id}")))?
            .try_into()
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<Identity>> {
        self.find_one("username", username).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>> {
        self.find_one("email", email).await
    }

    async fn exists_by_username(&self, username: &str) -> Result<bool> {
        self.exists("username", username).await
    }

    async fn record_login(&self, username: &str, at: DateTime<Utc>) -> Result<Option<Identity>> {
        let sql = format!(
            r#"
            UPDATE users SET last_login = GREATEST(COALESCE(last_login, $2), $2)
            WHERE username = $1
            RETURNING {COLUMNS}
            "#
        );

        let row: Option<IdentityRow> = sqlx::query_as(&sql)
            .bind(username)
            .bind(at)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        row.map(Identity::try_from).transpose()
    }

    async fn exists_by_email(&self, email: &str) -> Result<bool> {
        self.exists("email", email).await
    }

    async fn save(&self, identity: Identity) -> Result<Identity> {
        match identity.id {
            None => self.insert(&identity).await,
            Some(id) => self.update(id, &identity).await,
        }
    }
}

fn storage_error(err: sqlx::Error) -> TallyError {
    TallyError::Storage(err.to_string())
}

fn write_error(err: sqlx::Error) -> TallyError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            if let Some(field) = duplicate_field(db_err.constraint()) {
                return TallyError::DuplicateKey(field.to_string());
            }
        }
    }
    storage_error(err)
}

fn duplicate_field(constraint: Option<&str>) -> Option<&'static str> {
    match constraint? {
        USERNAME_CONSTRAINT => Some("username"),
        EMAIL_CONSTRAINT => Some("email"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_field_from_constraint() {
        assert_eq!(duplicate_field(Some("users_username_key")), Some("username"));
        assert_eq!(duplicate_field(Some("users_email_key")), Some("email"));
        assert_eq!(duplicate_field(Some("users_pkey")), None);
        assert_eq!(duplicate_field(None), None);
    }

    #[test]
    fn test_row_conversion() {
        let now = Utc::now();
        let row = IdentityRow {
            id: 7,
            username: "alice".to_string(),
            email: "alice@x.com".to_string(),
            password_hash: "hash".to_string(),
            first_name: "Alice".to_string(),
            last_name: "A".to_string(),
            role: "ADMIN".to_string(),
            is_active: true,
            is_verified: true,
            created_at: now,
            last_login: None,
            updated_at: None,
        };

        let identity = Identity::try_from(row).unwrap();
        assert_eq!(identity.id, Some(7));
        assert_eq!(identity.role, Role::Admin);
    }

    #[test]
    fn test_unknown_role_is_storage_error() {
        let row = IdentityRow {
            id: 1,
            username: "alice".to_string(),
            email: "alice@x.com".to_string(),
            password_hash: "hash".to_string(),
            first_name: "Alice".to_string(),
            last_name: "A".to_string(),
            role: "ROOT".to_string(),
            is_active: true,
            is_verified: true,
            created_at: Utc::now(),
            last_login: None,
            updated_at: None,
        };

        assert!(matches!(
            Identity::try_from(row),
            Err(TallyError::Storage(_))
        ));
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL pointing at a disposable PostgreSQL database"]
    async fn test_postgres_round_trip() {
        let url = std::env::var("DATABASE_URL").unwrap();
        let store = PgCredentialStore::connect(&url, 2).await.unwrap();
        let username = format!("pg-{}", uuid::Uuid::new_v4().simple());

        let saved = store
            .save(Identity::new(
                username.clone(),
                format!("{username}@x.com"),
                "hash",
                "Pg",
                "Test",
            ))
            .await
            .unwrap();
        assert!(saved.id.is_some());
        assert!(store.exists_by_username(&username).await.unwrap());

        let duplicate = store
            .save(Identity::new(
                username.clone(),
                "other@x.com",
                "hash",
                "Pg",
                "Test",
            ))
            .await;
        assert!(matches!(duplicate, Err(TallyError::DuplicateKey(f)) if f == "username"));

        let at = Utc::now();
        let touched = store.record_login(&username, at).await.unwrap().unwrap();
        assert!(touched.last_login.is_some());
        assert_eq!(touched.password_hash, "hash");
        assert!(store.record_login("pg-missing", at).await.unwrap().is_none());
    }
}
