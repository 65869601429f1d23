//! crates/marketplace_core/src/checkout.rs
//!
//! Turns a user's cart into completed purchases, minting one key per line.

use std::collections::HashSet;
use uuid::Uuid;

use crate::domain::{NewPurchase, Purchase};
use crate::keys::generate_key;
use crate::ports::{CartStore, PortError, PurchaseLedger};

#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error("Cart is empty")]
    EmptyCart,
    #[error("Dataset {0} has already been purchased")]
    AlreadyPurchased(Uuid),
    #[error("Could not generate an encryption key: {0}")]
    KeyGeneration(getrandom::Error),
    #[error(transparent)]
    Port(#[from] PortError),
}

/// Checks out the whole cart of `user_id`.
///
/// Keys are generated for every line before anything is written, and the ledger
/// writes all purchases and clears the cart in a single transaction. A failure at
/// any step leaves no purchase behind.
pub async fn checkout(
    carts: &dyn CartStore,
    ledger: &dyn PurchaseLedger,
    user_id: Uuid,
) -> Result<Vec<Purchase>, CheckoutError> {
    let lines = carts.cart_items(user_id).await?;
    if lines.is_empty() {
        return Err(CheckoutError::EmptyCart);
    }

    let mut seen = HashSet::new();
    let mut new_purchases = Vec::with_capacity(lines.len());
    for line in lines {
        if !seen.insert(line.dataset_id) {
            continue;
        }
        if ledger.get_purchase(user_id, line.dataset_id).await?.is_some() {
            return Err(CheckoutError::AlreadyPurchased(line.dataset_id));
        }
        let encryption_key = generate_key().map_err(CheckoutError::KeyGeneration)?;
        new_purchases.push(NewPurchase {
            dataset_id: line.dataset_id,
            amount: line.price,
            encryption_key,
        });
    }

    // The ledger's uniqueness constraint still rejects a concurrent checkout of
    // the same dataset with `PortError::Conflict`.
    let purchases = ledger.record_checkout(user_id, new_purchases).await?;
    Ok(purchases)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryStore;

    fn seeded() -> (InMemoryStore, Uuid, Uuid, Uuid) {
        let store = InMemoryStore::new();
        let user_id = Uuid::new_v4();
        let first = store.insert_dataset("global-financial-markets-q2-2025", 299.99, Some("finance/global.csv"));
        let second = store.insert_dataset("healthcare-cost-analysis", 549.99, Some("healthcare/cost.csv"));
        (store, user_id, first, second)
    }

    #[tokio::test]
    async fn checkout_creates_one_purchase_per_line_with_distinct_keys() {
        let (store, user_id, first, second) = seeded();
        store.add_to_cart(user_id, first).await.unwrap();
        store.add_to_cart(user_id, second).await.unwrap();

        let purchases = checkout(&store, &store, user_id).await.unwrap();

        assert_eq!(purchases.len(), 2);
        assert_ne!(purchases[0].encryption_key, purchases[1].encryption_key);
        let first_purchase = purchases.iter().find(|p| p.dataset_id == first).unwrap();
        assert_eq!(first_purchase.amount, 299.99);
        assert!(first_purchase.status.grants_access());
        assert!(store.cart_items(user_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_cart_is_rejected() {
        let (store, user_id, _, _) = seeded();
        let err = checkout(&store, &store, user_id).await.unwrap_err();
        assert!(matches!(err, CheckoutError::EmptyCart));
    }

    #[tokio::test]
    async fn buying_an_owned_dataset_again_is_rejected() {
        let (store, user_id, first, _) = seeded();
        store.add_to_cart(user_id, first).await.unwrap();
        checkout(&store, &store, user_id).await.unwrap();

        store.add_to_cart(user_id, first).await.unwrap();
        let err = checkout(&store, &store, user_id).await.unwrap_err();
        assert!(matches!(err, CheckoutError::AlreadyPurchased(id) if id == first));
        assert_eq!(store.purchase_count(), 1);
    }

    #[tokio::test]
    async fn failed_ledger_write_leaves_no_purchase_and_keeps_the_cart() {
        let (store, user_id, first, second) = seeded();
        store.add_to_cart(user_id, first).await.unwrap();
        store.add_to_cart(user_id, second).await.unwrap();
        store.fail_ledger_writes(true);

        let err = checkout(&store, &store, user_id).await.unwrap_err();

        assert!(matches!(err, CheckoutError::Port(_)));
        assert_eq!(store.purchase_count(), 0);
        assert_eq!(store.cart_items(user_id).await.unwrap().len(), 2);
        assert!(store.get_purchase(user_id, first).await.unwrap().is_none());
    }
}
