//! Loop engines for Whilr.
//!
//! This module provides the condition-driven iteration primitives:
//! - `do_while` / `while_loop`: sequential loops that await one generator
//!   invocation at a time and accumulate results in call order
//! - `do_while_batch` / `while_batch`: batched loops that keep up to N
//!   lanes in flight against a shared termination gate
//!
//! ## Lane model
//!
//! ```text
//! while_batch(4, cond, generator, ..)
//!   lane 0: generator() ─ await ─ push ─ gate? ─ generator() ─ await ─ ...
//!   lane 1: generator() ─ await ─ push ─ gate? ─ ...
//!   lane 2: generator() ─ await ─ push ─ gate? ─ ...
//!   lane 3: generator() ─ await ─ push ─ gate? ─ ...
//! ```
//!
//! All lanes share one accumulator and one gate; once any lane sees the
//! condition return false, the gate latches shut and no lane starts another
//! invocation. In-flight invocations run to completion.

mod batch;
mod sequential;

pub use batch::{do_while_batch, while_batch};
pub use sequential::{do_while, while_loop};
