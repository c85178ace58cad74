//! Stargate relay server library.
//!
//! This module exposes the server components for use in tests and binaries.

pub mod config;
pub mod connection;
pub mod error;
pub mod gate;
pub mod queue;
pub mod registry;
pub mod registry_loop;
pub mod server;
pub mod ws;
