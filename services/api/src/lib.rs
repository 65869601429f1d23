pub mod adapters;
pub mod config;
pub mod delivery;
pub mod error;
pub mod web;
