//! Kreddig Core - Shared domain types.
//!
//! This crate provides the types shared by the kreddig components:
//! - `site` - Public inquiry site (email confirmation + inquiries)
//! - `cli` - Command-line tools for migrations and support tasks
//!
//! # Architecture
//!
//! The core crate contains only types and pure rules - no I/O, no database
//! access, no mail transport. This keeps it lightweight and allows it to be
//! used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Email addresses, per-user quotas and confirmation states

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
