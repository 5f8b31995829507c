//! docket-core
//!
//! Distributed work coordination on top of a document store and a message
//! transport.
//!
//! - **domain**: tasks, payloads, work items, scheduled jobs, sites, events, errors
//! - **ports**: store, transport, clock, id generation, event sink, worker pool
//! - **impls**: in-memory store and transport, audit logger, collection repositories
//! - **lease**: the compare-and-set claim primitive every lock is built on
//! - **processor**: typed task processors and their registry
//! - **app**: task queue, listeners, lock manager, scheduler, sweeper, autoscaler
//! - **config**: YAML configuration

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod lease;
pub mod ports;
pub mod processor;
