//! Whilr - condition-driven asynchronous loops and collection traversal
//!
//! Whilr provides do-while / while iteration over futures produced by a
//! generator function, batched variants that keep up to N invocations in
//! flight behind a shared termination gate, and traversal adapters that map
//! an async transform over a sequence or an insertion-ordered mapping.

pub mod config;
pub mod error;
pub mod loops;
pub mod traverse;

pub use error::{Result, WhilrError};
pub use loops::{do_while, do_while_batch, while_batch, while_loop};
pub use traverse::{Collection, Key, traverse, traverse_batch};
