//! Integration and property tests for chainkeep.
//!
//! Scenario suites live in `tests/`; the block and transaction builders they
//! share live in [`helpers`].

pub mod helpers;
