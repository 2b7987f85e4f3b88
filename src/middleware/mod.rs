//! Middleware module for the Termcast HTTP server
//!
//! Provides:
//! - Cookie identity extractors (`RequireIdentity`, `MaybeIdentity`)

pub mod identity;
