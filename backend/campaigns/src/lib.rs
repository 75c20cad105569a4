//! Campaign view service.
//!
//! Joins ledger-held campaigns with user-directory profiles into client views,
//! serves them from a cache kept coherent with ledger writes, and validates
//! donations before they are submitted.

pub mod api;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod directory;
pub mod errors;
pub mod keystore;
pub mod ledger;
pub mod units;
pub mod validator;
pub mod views;

#[cfg(test)]
mod testing;
