//! services/api/src/delivery/mod.rs
//!
//! Per-request encrypted delivery: package into a temp archive, stream it,
//! remove it.

pub mod archive;
pub mod pipeline;
pub mod streamer;

pub use archive::TempArchive;
pub use pipeline::DeliveryPipeline;
pub use streamer::{stream_and_cleanup, CleanupStream, StreamPhase};
