pub mod db;
pub mod packager;

pub use db::DbAdapter;
pub use packager::{SevenZipPackager, ZipAesPackager};
