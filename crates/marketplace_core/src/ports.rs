//! crates/marketplace_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the marketplace's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the database, the filesystem and the archiving tool.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::{CartLine, Dataset, NewPurchase, Purchase, PurchaseSummary, User, UserCredentials};
use crate::keys::EncryptionKey;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all storage port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Conflicting record: {0}")]
    Conflict(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Storage Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user_with_email(
        &self,
        email: &str,
        username: &str,
        hashed_password: &str,
    ) -> PortResult<User>;

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User>;

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    /// Resolves a live session to its user. Expired or unknown sessions are `Unauthorized`.
    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;
}

#[async_trait]
pub trait DatasetCatalog: Send + Sync {
    /// Returns `None` when no dataset has this id.
    async fn dataset_by_id(&self, dataset_id: Uuid) -> PortResult<Option<Dataset>>;

    async fn list_datasets(&self) -> PortResult<Vec<Dataset>>;
}

#[async_trait]
pub trait CartStore: Send + Sync {
    async fn cart_items(&self, user_id: Uuid) -> PortResult<Vec<CartLine>>;

    /// Adding a dataset that is already in the cart is a no-op.
    async fn add_to_cart(&self, user_id: Uuid, dataset_id: Uuid) -> PortResult<()>;

    async fn remove_from_cart(&self, user_id: Uuid, dataset_id: Uuid) -> PortResult<()>;
}

#[async_trait]
pub trait PurchaseLedger: Send + Sync {
    /// Inserts one completed purchase. Not idempotent on its own.
    async fn create_purchase(
        &self,
        user_id: Uuid,
        dataset_id: Uuid,
        amount: f64,
        key: EncryptionKey,
    ) -> PortResult<Purchase>;

    /// Writes every line as a completed purchase and empties the user's cart,
    /// all or nothing.
    async fn record_checkout(
        &self,
        user_id: Uuid,
        lines: Vec<NewPurchase>,
    ) -> PortResult<Vec<Purchase>>;

    /// The authoritative completed purchase for this pair, if any.
    ///
    /// If several completed rows exist the most recent `purchase_date` wins.
    async fn get_purchase(&self, user_id: Uuid, dataset_id: Uuid) -> PortResult<Option<Purchase>>;

    /// All purchases of a user, newest first.
    async fn list_purchases(&self, user_id: Uuid) -> PortResult<Vec<PurchaseSummary>>;
}

//=========================================================================================
// Archive Packager Port
//=========================================================================================

/// Failures of a single packaging run.
#[derive(Debug, thiserror::Error)]
pub enum PackagingError {
    #[error("source file is missing")]
    SourceMissing,
    #[error("archiving tool failed: {0}")]
    ToolFailed(String),
    #[error("archiving tool reported success but produced no archive")]
    OutputMissing,
    #[error("packaging did not finish within {0:?}")]
    Timeout(Duration),
}

#[async_trait]
pub trait Packager: Send + Sync {
    /// Wraps `source` into a single-entry, AES-256 encrypted ZIP at `output`,
    /// decryptable with `password`.
    ///
    /// Every call is an independent run; nothing is cached between calls.
    async fn package_encrypted(
        &self,
        source: &Path,
        password: &EncryptionKey,
        output: &Path,
    ) -> Result<(), PackagingError>;
}
