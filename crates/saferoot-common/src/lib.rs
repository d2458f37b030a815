//! # saferoot-common
//!
//! Shared error taxonomy and policy constants used across the saferoot
//! workspace.
//!
//! This crate is the leaf of the dependency graph — it depends on no other
//! internal crate and provides the foundational primitives that the resolver
//! core and the C ABI surface build upon.

pub mod constants;
pub mod error;
