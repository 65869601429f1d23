//! crates/marketplace_core/src/access.rs
//!
//! The gate in front of every download: an authenticated user must own a
//! completed purchase of the dataset.

use std::sync::Arc;
use uuid::Uuid;

use crate::domain::Purchase;
use crate::ports::{PortError, PurchaseLedger};

#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error("Not authenticated")]
    NotAuthenticated,
    #[error("User {user_id} has not purchased dataset {dataset_id}")]
    AccessDenied { user_id: Uuid, dataset_id: Uuid },
    #[error(transparent)]
    Port(#[from] PortError),
}

/// Decides whether a user may download a dataset. Fails closed.
#[derive(Clone)]
pub struct AccessGuard {
    ledger: Arc<dyn PurchaseLedger>,
}

impl AccessGuard {
    pub fn new(ledger: Arc<dyn PurchaseLedger>) -> Self {
        Self { ledger }
    }

    /// Returns the purchase that authorizes the download.
    ///
    /// `user` is the identity resolved by the authentication layer, `None` when the
    /// request carried no valid session.
    pub async fn authorize_download(
        &self,
        user: Option<Uuid>,
        dataset_id: Uuid,
    ) -> Result<Purchase, AccessError> {
        let user_id = user.ok_or(AccessError::NotAuthenticated)?;

        match self.ledger.get_purchase(user_id, dataset_id).await? {
            Some(purchase)
                if purchase.status.grants_access()
                    && purchase.user_id == user_id
                    && purchase.dataset_id == dataset_id =>
            {
                Ok(purchase)
            }
            _ => Err(AccessError::AccessDenied { user_id, dataset_id }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::generate_key;
    use crate::testing::InMemoryStore;

    #[tokio::test]
    async fn anonymous_requests_are_rejected() {
        let store = Arc::new(InMemoryStore::new());
        let guard = AccessGuard::new(store);

        let err = guard.authorize_download(None, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AccessError::NotAuthenticated));
    }

    #[tokio::test]
    async fn access_matrix_follows_completed_purchases() {
        let store = Arc::new(InMemoryStore::new());
        let guard = AccessGuard::new(store.clone());

        let users = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
        let datasets = [Uuid::new_v4(), Uuid::new_v4()];
        // users[0] owns datasets[0], users[1] owns datasets[1], users[2] owns nothing.
        let owned = [(users[0], datasets[0]), (users[1], datasets[1])];
        for (user_id, dataset_id) in owned {
            store
                .create_purchase(user_id, dataset_id, 10.0, generate_key().unwrap())
                .await
                .unwrap();
        }

        for user_id in users {
            for dataset_id in datasets {
                let result = guard.authorize_download(Some(user_id), dataset_id).await;
                if owned.contains(&(user_id, dataset_id)) {
                    let purchase = result.unwrap();
                    assert_eq!(purchase.user_id, user_id);
                    assert_eq!(purchase.dataset_id, dataset_id);
                } else {
                    assert!(matches!(result, Err(AccessError::AccessDenied { .. })));
                }
            }
        }
    }

    #[tokio::test]
    async fn refunded_purchases_do_not_grant_access() {
        let store = Arc::new(InMemoryStore::new());
        let guard = AccessGuard::new(store.clone());
        let (user_id, dataset_id) = (Uuid::new_v4(), Uuid::new_v4());

        let purchase = store
            .create_purchase(user_id, dataset_id, 10.0, generate_key().unwrap())
            .await
            .unwrap();
        store.refund(purchase.id);

        let result = guard.authorize_download(Some(user_id), dataset_id).await;
        assert!(matches!(result, Err(AccessError::AccessDenied { .. })));
    }

    #[tokio::test]
    async fn ledger_failures_surface_as_port_errors() {
        let store = Arc::new(InMemoryStore::new());
        store.fail_ledger_reads(true);
        let guard = AccessGuard::new(store);

        let result = guard.authorize_download(Some(Uuid::new_v4()), Uuid::new_v4()).await;
        assert!(matches!(result, Err(AccessError::Port(_))));
    }
}
