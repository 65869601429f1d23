pub mod access;
pub mod checkout;
pub mod domain;
pub mod keys;
pub mod ports;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use access::{AccessError, AccessGuard};
pub use checkout::{checkout, CheckoutError};
pub use domain::{
    AuthSession, CartLine, Dataset, NewPurchase, Purchase, PurchaseStatus, PurchaseSummary, User,
    UserCredentials,
};
pub use keys::{generate_key, EncryptionKey};
pub use ports::{
    CartStore, DatasetCatalog, PackagingError, Packager, PortError, PortResult, PurchaseLedger,
    UserStore,
};
