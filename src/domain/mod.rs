//! Domain modules organized as vertical slices.
//!
//! Each sub-module contains (where it applies):
//! - `mod.rs`: Domain types shared by the session and callers
//! - `wire.rs`: Raw serde structs matching server push payloads and request bodies
//! - `convert.rs`: `From` conversions between wire, draft and state types
//! - `state.rs`: State containers with update methods (driven by push events)

pub mod account;
pub mod config;
pub mod order;
pub mod tx;
