//! # Common: Admission Policy & Contract Registry
//!
//! Shared, read-only configuration for the contract gate:
//! - [`syntax`]: the closed [`NodeKind`] enumeration produced by the front end.
//! - [`policy`]: the syntax whitelist, decorator set and import roots.
//! - [`catalog`]: the stable S1-S13 violation codes.
//! - [`builtins`]: the safe-name registry (the whole ambient namespace).
//! - [`registry`]: the `exists(name)` client and the on-disk contract store.

pub mod builtins;
pub mod catalog;
pub mod policy;
pub mod registry;
pub mod syntax;

pub use catalog::ViolationCode;
pub use policy::PolicyTables;
pub use registry::ContractRegistry;
pub use syntax::NodeKind;
