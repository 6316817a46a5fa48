//! RAG Gateway Library
//!
//! This library exposes modules for testing and external use.
//! The main binary is in `src/main.rs`.

pub mod abort;
pub mod api;
pub mod augment;
pub mod backend;
pub mod config;
pub mod error;
pub mod message;
pub mod relay;
pub mod retrieval;
pub mod session;
