//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, the concrete implementation of the
//! storage ports from the `core` crate (`UserStore`, `DatasetCatalog`, `CartStore`,
//! `PurchaseLedger`). It handles all interactions with PostgreSQL using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use marketplace_core::domain::{
    CartLine, Dataset, NewPurchase, Purchase, PurchaseStatus, PurchaseSummary, User,
    UserCredentials,
};
use marketplace_core::ports::{
    CartStore, DatasetCatalog, PortError, PortResult, PurchaseLedger, UserStore,
};
use marketplace_core::EncryptionKey;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements every storage port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

/// Maps constraint violations on writes to the matching port error.
fn write_error(e: sqlx::Error, what: &str) -> PortError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            PortError::Conflict(what.to_string())
        }
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
            PortError::NotFound(what.to_string())
        }
        _ => unexpected(e),
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    email: String,
    username: String,
}
impl UserRecord {
    fn to_domain(self) -> User {
        User {
            user_id: self.id,
            email: self.email,
            username: self.username,
        }
    }
}

#[derive(FromRow)]
struct CredentialsRecord {
    id: Uuid,
    email: String,
    password_hash: String,
}
impl CredentialsRecord {
    fn to_domain(self) -> UserCredentials {
        UserCredentials {
            user_id: self.id,
            email: self.email,
            hashed_password: self.password_hash,
        }
    }
}

#[derive(FromRow)]
struct DatasetRecord {
    id: Uuid,
    title: String,
    slug: String,
    description: String,
    price: f64,
    file_path: Option<String>,
}
impl DatasetRecord {
    fn to_domain(self) -> Dataset {
        Dataset {
            id: self.id,
            title: self.title,
            slug: self.slug,
            description: self.description,
            price: self.price,
            file_path: self.file_path,
        }
    }
}

#[derive(FromRow)]
struct CartLineRecord {
    dataset_id: Uuid,
    title: String,
    price: f64,
}
impl CartLineRecord {
    fn to_domain(self) -> CartLine {
        CartLine {
            dataset_id: self.dataset_id,
            title: self.title,
            price: self.price,
        }
    }
}

#[derive(FromRow)]
struct PurchaseRecord {
    id: Uuid,
    user_id: Uuid,
    dataset_id: Uuid,
    amount: f64,
    encryption_key: String,
    purchase_date: DateTime<Utc>,
    status: String,
}
impl PurchaseRecord {
    fn to_domain(self) -> PortResult<Purchase> {
        let status = PurchaseStatus::parse(&self.status).ok_or_else(|| {
            PortError::Unexpected(format!(
                "Purchase {} has unknown status '{}'",
                self.id, self.status
            ))
        })?;
        Ok(Purchase {
            id: self.id,
            user_id: self.user_id,
            dataset_id: self.dataset_id,
            amount: self.amount,
            encryption_key: EncryptionKey::from_stored(self.encryption_key),
            purchase_date: self.purchase_date,
            status,
        })
    }
}

#[derive(FromRow)]
struct PurchaseSummaryRecord {
    #[sqlx(flatten)]
    purchase: PurchaseRecord,
    dataset_title: String,
}

const PURCHASE_COLUMNS: &str =
    "id, user_id, dataset_id, amount, encryption_key, purchase_date, status";

//=========================================================================================
// `UserStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl UserStore for DbAdapter {
    async fn create_user_with_email(
        &self,
        email: &str,
        username: &str,
        hashed_password: &str,
    ) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "INSERT INTO users (id, email, username, password_hash) VALUES ($1, $2, $3, $4) \
             RETURNING id, email, username",
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(username)
        .bind(hashed_password)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| write_error(e, "email or username already registered"))?;
        Ok(record.to_domain())
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, CredentialsRecord>(
            "SELECT id, email, password_hash FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| PortError::NotFound(format!("User {} not found", email)))?;
        Ok(record.to_domain())
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT id, email, username FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))?;
        Ok(record.to_domain())
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(session_id)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT user_id FROM auth_sessions WHERE id = $1 AND expires_at > NOW()",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or(PortError::Unauthorized)
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }
}

//=========================================================================================
// `DatasetCatalog` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatasetCatalog for DbAdapter {
    async fn dataset_by_id(&self, dataset_id: Uuid) -> PortResult<Option<Dataset>> {
        let record = sqlx::query_as::<_, DatasetRecord>(
            "SELECT id, title, slug, description, price, file_path FROM datasets WHERE id = $1",
        )
        .bind(dataset_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(DatasetRecord::to_domain))
    }

    async fn list_datasets(&self) -> PortResult<Vec<Dataset>> {
        let records = sqlx::query_as::<_, DatasetRecord>(
            "SELECT id, title, slug, description, price, file_path FROM datasets ORDER BY title ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }
}

//=========================================================================================
// `CartStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl CartStore for DbAdapter {
    async fn cart_items(&self, user_id: Uuid) -> PortResult<Vec<CartLine>> {
        let records = sqlx::query_as::<_, CartLineRecord>(
            "SELECT c.dataset_id, d.title, d.price FROM cart_items c \
             JOIN datasets d ON d.id = c.dataset_id \
             WHERE c.user_id = $1 ORDER BY c.added_at ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn add_to_cart(&self, user_id: Uuid, dataset_id: Uuid) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO cart_items (user_id, dataset_id) VALUES ($1, $2) \
             ON CONFLICT (user_id, dataset_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(dataset_id)
        .execute(&self.pool)
        .await
        .map_err(|e| write_error(e, &format!("Dataset {} not found", dataset_id)))?;
        Ok(())
    }

    async fn remove_from_cart(&self, user_id: Uuid, dataset_id: Uuid) -> PortResult<()> {
        sqlx::query("DELETE FROM cart_items WHERE user_id = $1 AND dataset_id = $2")
            .bind(user_id)
            .bind(dataset_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }
}

//=========================================================================================
// `PurchaseLedger` Trait Implementation
//=========================================================================================

#[async_trait]
impl PurchaseLedger for DbAdapter {
    async fn create_purchase(
        &self,
        user_id: Uuid,
        dataset_id: Uuid,
        amount: f64,
        key: EncryptionKey,
    ) -> PortResult<Purchase> {
        let record = sqlx::query_as::<_, PurchaseRecord>(&format!(
            "INSERT INTO purchases (id, user_id, dataset_id, amount, encryption_key, status) \
             VALUES ($1, $2, $3, $4, $5, 'completed') RETURNING {}",
            PURCHASE_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(dataset_id)
        .bind(amount)
        .bind(key.expose())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| write_error(e, &format!("Dataset {} already purchased", dataset_id)))?;
        record.to_domain()
    }

    async fn record_checkout(
        &self,
        user_id: Uuid,
        lines: Vec<NewPurchase>,
    ) -> PortResult<Vec<Purchase>> {
        let insert = format!(
            "INSERT INTO purchases (id, user_id, dataset_id, amount, encryption_key, status) \
             VALUES ($1, $2, $3, $4, $5, 'completed') RETURNING {}",
            PURCHASE_COLUMNS
        );

        // Dropping the transaction on any early return rolls everything back.
        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        let mut purchases = Vec::with_capacity(lines.len());
        for line in lines {
            let record = sqlx::query_as::<_, PurchaseRecord>(&insert)
                .bind(Uuid::new_v4())
                .bind(user_id)
                .bind(line.dataset_id)
                .bind(line.amount)
                .bind(line.encryption_key.expose())
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| {
                    write_error(e, &format!("Dataset {} already purchased", line.dataset_id))
                })?;
            purchases.push(record.to_domain()?);
        }

        sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;
        tx.commit().await.map_err(unexpected)?;

        Ok(purchases)
    }

    async fn get_purchase(&self, user_id: Uuid, dataset_id: Uuid) -> PortResult<Option<Purchase>> {
        let record = sqlx::query_as::<_, PurchaseRecord>(&format!(
            "SELECT {} FROM purchases \
             WHERE user_id = $1 AND dataset_id = $2 AND status = 'completed' \
             ORDER BY purchase_date DESC LIMIT 1",
            PURCHASE_COLUMNS
        ))
        .bind(user_id)
        .bind(dataset_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        record.map(PurchaseRecord::to_domain).transpose()
    }

    async fn list_purchases(&self, user_id: Uuid) -> PortResult<Vec<PurchaseSummary>> {
        let records = sqlx::query_as::<_, PurchaseSummaryRecord>(
            "SELECT p.id, p.user_id, p.dataset_id, p.amount, p.encryption_key, \
                    p.purchase_date, p.status, d.title AS dataset_title \
             FROM purchases p JOIN datasets d ON d.id = p.dataset_id \
             WHERE p.user_id = $1 ORDER BY p.purchase_date DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        records
            .into_iter()
            .map(|r| {
                Ok(PurchaseSummary {
                    purchase: r.purchase.to_domain()?,
                    dataset_title: r.dataset_title,
                })
            })
            .collect()
    }
}
