//! promote-core library.
//!
//! Hierarchy materialization and rollup engine: rebuild the work-item tree
//! from a flat link list, roll child descriptions, states and tags up onto
//! their parents, and emit a write only when something would change.
//!
//! # Conventions
//!
//! - **Errors**: `thiserror` enums per component, each mapping to an
//!   [`error::ErrorCode`]. `anyhow::Result` only where layering settings.
//! - **Logging**: `tracing` macros (`info!`, `warn!`, `error!`, `debug!`).
//! - **I/O**: the core never talks HTTP. It goes through the
//!   [`source::WorkItemSource`] and [`source::WorkItemSink`] traits.

pub mod config;
pub mod decision;
pub mod dispatch;
pub mod error;
pub mod graph;
pub mod history;
pub mod memory;
pub mod model;
pub mod pipeline;
pub mod rollup;
pub mod snapshot;
pub mod source;
