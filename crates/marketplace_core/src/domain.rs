//! crates/marketplace_core/src/domain.rs
//!
//! Defines the pure, core data structures for the marketplace.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::keys::EncryptionKey;

// Represents a user - used throughout app
#[derive(Debug, Clone)]
pub struct User {
    pub user_id: Uuid,
    pub email: String,
    pub username: String,
}

// Only used internally for login/signup - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub email: String,
    pub hashed_password: String,
}

// Represents a browser login session (auth cookie)
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub id: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// A catalog entry. The delivery pipeline only reads `slug` and `file_path`.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub price: f64,
    /// Location of the canonical source file, relative to the dataset root.
    pub file_path: Option<String>,
}

/// One dataset sitting in a user's cart, priced at the current catalog price.
#[derive(Debug, Clone)]
pub struct CartLine {
    pub dataset_id: Uuid,
    pub title: String,
    pub price: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseStatus {
    Pending,
    Completed,
    Refunded,
}

impl PurchaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseStatus::Pending => "pending",
            PurchaseStatus::Completed => "completed",
            PurchaseStatus::Refunded => "refunded",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(PurchaseStatus::Pending),
            "completed" => Some(PurchaseStatus::Completed),
            "refunded" => Some(PurchaseStatus::Refunded),
            _ => None,
        }
    }

    /// Only completed purchases grant download access.
    pub fn grants_access(&self) -> bool {
        matches!(self, PurchaseStatus::Completed)
    }
}

/// A completed (or historical) transaction binding a user to a dataset.
///
/// The encryption key is minted once at checkout and never regenerated.
#[derive(Debug, Clone)]
pub struct Purchase {
    pub id: Uuid,
    pub user_id: Uuid,
    pub dataset_id: Uuid,
    pub amount: f64,
    pub encryption_key: EncryptionKey,
    pub purchase_date: DateTime<Utc>,
    pub status: PurchaseStatus,
}

/// A purchase row about to be written during checkout.
#[derive(Debug, Clone)]
pub struct NewPurchase {
    pub dataset_id: Uuid,
    pub amount: f64,
    pub encryption_key: EncryptionKey,
}

/// A purchase joined with the title of the dataset it refers to.
#[derive(Debug, Clone)]
pub struct PurchaseSummary {
    pub purchase: Purchase,
    pub dataset_title: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_completed_grants_access() {
        assert!(PurchaseStatus::Completed.grants_access());
        assert!(!PurchaseStatus::Pending.grants_access());
        assert!(!PurchaseStatus::Refunded.grants_access());
    }

    #[test]
    fn status_parses_its_own_rendering() {
        for status in [
            PurchaseStatus::Pending,
            PurchaseStatus::Completed,
            PurchaseStatus::Refunded,
        ] {
            assert_eq!(PurchaseStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(PurchaseStatus::parse("COMPLETED"), None);
    }
}
