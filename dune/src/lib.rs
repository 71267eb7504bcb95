//! Task configuration and validation pipeline.
//!
//! A natural-language task is mapped to capability providers, their
//! parameters and environment dependencies are collected, and the result is
//! saved as a YAML configuration document. Documents are validated against
//! the live environment, repaired where possible and handed to an executor.
//!
//! - **[`core`]**: Pure data and checks (catalog, document model, scoring,
//!   structural validation). No I/O.
//! - **[`io`]**: Filesystem, `.env`, operator prompts and process execution.
//!
//! Component modules ([`mapper`], [`resolver`], [`builder`], [`validate`],
//! [`repair`]) combine the two; [`pipeline`] wires them into run modes.

pub mod builder;
pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod mapper;
pub mod pipeline;
pub mod repair;
pub mod resolver;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod validate;
