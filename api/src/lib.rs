//! Backend contracts and shared types for the KVSFS metadata core.
//!
//! This crate defines everything the core and its storage backends agree on:
//! the shared types and constants ([`types`]), the error taxonomy
//! ([`error`]), the ordered key-value store contract ([`kvstore`]), and the
//! object store contract ([`dstore`]).
//!
//! It also ships one concrete implementation of each contract — an in-memory
//! transactional KVS ([`memkv`]) and a file-backed, memory-mapped object
//! store ([`filestore`]) — which the test suite runs against and which serve
//! as reference behavior for production backends.

#![deny(missing_docs)]

pub mod error;

//Basic modules for types
pub mod types;

//Backend contracts
pub mod dstore;
pub mod kvstore;

//Reference backends
pub mod filestore;
pub mod memkv;
