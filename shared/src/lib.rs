//! Types and pure functions shared by the stargate relay and its clients.

pub mod address;
pub mod protocol;
