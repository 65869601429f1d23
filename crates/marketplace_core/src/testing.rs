//! crates/marketplace_core/src/testing.rs
//!
//! In-memory implementations of the ports, used by unit tests here and by the
//! `api` crate's tests. Enabled with the `testing` feature.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::domain::{
    CartLine, Dataset, NewPurchase, Purchase, PurchaseStatus, PurchaseSummary, User,
    UserCredentials,
};
use crate::keys::EncryptionKey;
use crate::ports::{
    CartStore, DatasetCatalog, PackagingError, Packager, PortError, PortResult, PurchaseLedger,
    UserStore,
};

#[derive(Default)]
struct State {
    users: HashMap<Uuid, UserCredentials>,
    usernames: HashMap<Uuid, String>,
    sessions: HashMap<String, (Uuid, DateTime<Utc>)>,
    datasets: Vec<Dataset>,
    carts: HashMap<Uuid, Vec<Uuid>>,
    purchases: Vec<Purchase>,
    fail_reads: bool,
    fail_writes: bool,
}

/// One store behind all four storage ports.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Adds a catalog entry and returns its id.
    pub fn insert_dataset(&self, slug: &str, price: f64, file_path: Option<&str>) -> Uuid {
        let id = Uuid::new_v4();
        self.state().datasets.push(Dataset {
            id,
            title: slug.replace('-', " "),
            slug: slug.to_string(),
            description: format!("Dataset {}", slug),
            price,
            file_path: file_path.map(str::to_string),
        });
        id
    }

    /// Marks a purchase as refunded.
    pub fn refund(&self, purchase_id: Uuid) {
        if let Some(purchase) = self
            .state()
            .purchases
            .iter_mut()
            .find(|p| p.id == purchase_id)
        {
            purchase.status = PurchaseStatus::Refunded;
        }
    }

    pub fn fail_ledger_reads(&self, fail: bool) {
        self.state().fail_reads = fail;
    }

    pub fn fail_ledger_writes(&self, fail: bool) {
        self.state().fail_writes = fail;
    }

    pub fn purchase_count(&self) -> usize {
        self.state().purchases.len()
    }

    fn insert_completed(
        state: &mut State,
        user_id: Uuid,
        dataset_id: Uuid,
        amount: f64,
        encryption_key: EncryptionKey,
    ) -> PortResult<Purchase> {
        let duplicate = state.purchases.iter().any(|p| {
            p.user_id == user_id && p.dataset_id == dataset_id && p.status.grants_access()
        });
        if duplicate {
            return Err(PortError::Conflict(format!(
                "completed purchase of {} already exists",
                dataset_id
            )));
        }
        let purchase = Purchase {
            id: Uuid::new_v4(),
            user_id,
            dataset_id,
            amount,
            encryption_key,
            purchase_date: Utc::now(),
            status: PurchaseStatus::Completed,
        };
        state.purchases.push(purchase.clone());
        Ok(purchase)
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn create_user_with_email(
        &self,
        email: &str,
        username: &str,
        hashed_password: &str,
    ) -> PortResult<User> {
        let mut state = self.state();
        if state.users.values().any(|u| u.email == email) {
            return Err(PortError::Conflict(format!("email {} is taken", email)));
        }
        let user_id = Uuid::new_v4();
        state.users.insert(
            user_id,
            UserCredentials {
                user_id,
                email: email.to_string(),
                hashed_password: hashed_password.to_string(),
            },
        );
        state.usernames.insert(user_id, username.to_string());
        Ok(User {
            user_id,
            email: email.to_string(),
            username: username.to_string(),
        })
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        self.state()
            .users
            .values()
            .find(|u| u.email == email)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", email)))
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User> {
        let state = self.state();
        let creds = state
            .users
            .get(&user_id)
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))?;
        Ok(User {
            user_id,
            email: creds.email.clone(),
            username: state.usernames.get(&user_id).cloned().unwrap_or_default(),
        })
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        self.state()
            .sessions
            .insert(session_id.to_string(), (user_id, expires_at));
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        match self.state().sessions.get(session_id) {
            Some((user_id, expires_at)) if *expires_at > Utc::now() => Ok(*user_id),
            _ => Err(PortError::Unauthorized),
        }
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        self.state().sessions.remove(session_id);
        Ok(())
    }
}

#[async_trait]
impl DatasetCatalog for InMemoryStore {
    async fn dataset_by_id(&self, dataset_id: Uuid) -> PortResult<Option<Dataset>> {
        Ok(self
            .state()
            .datasets
            .iter()
            .find(|d| d.id == dataset_id)
            .cloned())
    }

    async fn list_datasets(&self) -> PortResult<Vec<Dataset>> {
        Ok(self.state().datasets.clone())
    }
}

#[async_trait]
impl CartStore for InMemoryStore {
    async fn cart_items(&self, user_id: Uuid) -> PortResult<Vec<CartLine>> {
        let state = self.state();
        let ids = state.carts.get(&user_id).cloned().unwrap_or_default();
        Ok(ids
            .into_iter()
            .filter_map(|id| state.datasets.iter().find(|d| d.id == id))
            .map(|d| CartLine {
                dataset_id: d.id,
                title: d.title.clone(),
                price: d.price,
            })
            .collect())
    }

    async fn add_to_cart(&self, user_id: Uuid, dataset_id: Uuid) -> PortResult<()> {
        let mut state = self.state();
        if !state.datasets.iter().any(|d| d.id == dataset_id) {
            return Err(PortError::NotFound(format!("Dataset {} not found", dataset_id)));
        }
        let cart = state.carts.entry(user_id).or_default();
        if !cart.contains(&dataset_id) {
            cart.push(dataset_id);
        }
        Ok(())
    }

    async fn remove_from_cart(&self, user_id: Uuid, dataset_id: Uuid) -> PortResult<()> {
        if let Some(cart) = self.state().carts.get_mut(&user_id) {
            cart.retain(|id| *id != dataset_id);
        }
        Ok(())
    }
}

#[async_trait]
impl PurchaseLedger for InMemoryStore {
    async fn create_purchase(
        &self,
        user_id: Uuid,
        dataset_id: Uuid,
        amount: f64,
        key: EncryptionKey,
    ) -> PortResult<Purchase> {
        let mut state = self.state();
        if state.fail_writes {
            return Err(PortError::Unexpected("ledger write failed".to_string()));
        }
        Self::insert_completed(&mut state, user_id, dataset_id, amount, key)
    }

    async fn record_checkout(
        &self,
        user_id: Uuid,
        lines: Vec<NewPurchase>,
    ) -> PortResult<Vec<Purchase>> {
        let mut state = self.state();
        if state.fail_writes {
            return Err(PortError::Unexpected("ledger write failed".to_string()));
        }
        // Work on a copy so a conflict halfway through commits nothing.
        let mut staged = State {
            purchases: state.purchases.clone(),
            ..State::default()
        };
        let mut created = Vec::with_capacity(lines.len());
        for line in lines {
            created.push(Self::insert_completed(
                &mut staged,
                user_id,
                line.dataset_id,
                line.amount,
                line.encryption_key,
            )?);
        }
        state.purchases = staged.purchases;
        state.carts.remove(&user_id);
        Ok(created)
    }

    async fn get_purchase(&self, user_id: Uuid, dataset_id: Uuid) -> PortResult<Option<Purchase>> {
        let state = self.state();
        if state.fail_reads {
            return Err(PortError::Unexpected("ledger read failed".to_string()));
        }
        Ok(state
            .purchases
            .iter()
            .filter(|p| {
                p.user_id == user_id && p.dataset_id == dataset_id && p.status.grants_access()
            })
            .max_by_key(|p| p.purchase_date)
            .cloned())
    }

    async fn list_purchases(&self, user_id: Uuid) -> PortResult<Vec<PurchaseSummary>> {
        let state = self.state();
        let mut summaries: Vec<PurchaseSummary> = state
            .purchases
            .iter()
            .filter(|p| p.user_id == user_id)
            .map(|p| PurchaseSummary {
                purchase: p.clone(),
                dataset_title: state
                    .datasets
                    .iter()
                    .find(|d| d.id == p.dataset_id)
                    .map(|d| d.title.clone())
                    .unwrap_or_default(),
            })
            .collect();
        summaries.sort_by(|a, b| b.purchase.purchase_date.cmp(&a.purchase.purchase_date));
        Ok(summaries)
    }
}

//=========================================================================================
// Fake Packager
//=========================================================================================

/// How a [`FakePackager`] responds to every call.
#[derive(Debug, Clone)]
pub enum FakeBehaviour {
    /// Writes a marker archive containing the password and the source bytes.
    Succeed,
    /// Writes part of an archive, then reports a tool failure.
    FailAfterPartialWrite(String),
    /// Reports success without writing anything.
    SkipOutput,
    /// Never completes.
    Hang,
}

/// A packager that never spawns a process.
pub struct FakePackager {
    behaviour: FakeBehaviour,
    calls: AtomicUsize,
    outputs: Mutex<Vec<PathBuf>>,
}

/// Header of the marker archives written by [`FakeBehaviour::Succeed`].
pub const FAKE_ARCHIVE_MAGIC: &[u8] = b"FAKEZIP\n";

impl FakePackager {
    pub fn new(behaviour: FakeBehaviour) -> Self {
        Self {
            behaviour,
            calls: AtomicUsize::new(0),
            outputs: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Output paths of every call, in call order.
    pub fn outputs(&self) -> Vec<PathBuf> {
        self.outputs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl Packager for FakePackager {
    async fn package_encrypted(
        &self,
        source: &Path,
        password: &EncryptionKey,
        output: &Path,
    ) -> Result<(), PackagingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outputs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(output.to_path_buf());

        let contents = std::fs::read(source).map_err(|_| PackagingError::SourceMissing)?;
        match &self.behaviour {
            FakeBehaviour::Succeed => {
                let mut archive = FAKE_ARCHIVE_MAGIC.to_vec();
                archive.extend_from_slice(password.expose().as_bytes());
                archive.push(b'\n');
                archive.extend_from_slice(&contents);
                std::fs::write(output, archive)
                    .map_err(|e| PackagingError::ToolFailed(e.to_string()))
            }
            FakeBehaviour::FailAfterPartialWrite(message) => {
                std::fs::write(output, FAKE_ARCHIVE_MAGIC)
                    .map_err(|e| PackagingError::ToolFailed(e.to_string()))?;
                Err(PackagingError::ToolFailed(message.clone()))
            }
            FakeBehaviour::SkipOutput => Ok(()),
            FakeBehaviour::Hang => std::future::pending().await,
        }
    }
}
