//! Route definitions for the gateway HTTP surface.

pub mod api;

pub use api::create_api_router;
