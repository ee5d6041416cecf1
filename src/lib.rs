//! # formwork
//!
//! A file-driven survey delivery backend. Each directory under the surveys
//! root is one survey (YAML questions, metadata and security policy, an
//! optional stylesheet). formwork parses the tree, reconciles it into a
//! store, and serves surveys, sessions and answers over HTTP.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌────────────┐
//! │ surveys/*/   │──▶│ Parser +     │──▶│  Store     │
//! │ YAML + CSS   │   │ Sync engine  │   │ SQLite/mem │
//! └──────▲───────┘   └──────────────┘   └─────┬──────┘
//!        │ watch                              │
//!        │                 ┌──────────────────┤
//!        │                 ▼                  ▼
//!   ┌─────────┐      ┌──────────┐       ┌──────────┐
//!   │ notify  │      │   CLI    │       │   HTTP   │──▶ webhooks
//!   └─────────┘      └──────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! formwork init                 # create database
//! formwork check ./surveys      # parse without touching the store
//! formwork sync                 # reconcile surveys into the store
//! formwork serve                # sync, then serve HTTP
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |
//! | [`sqlite_store`] | SQLite adapter of the core store port |
//! | [`backend`] | Store selection from config |
//! | [`parser`] | Survey directory parser |
//! | [`resync`] | Resync orchestration and directory watcher |
//! | [`webhook`] | Outbound webhook delivery |
//! | [`server`] | HTTP server |
//!
//! The domain model and engines live in the `formwork-core` crate.

pub mod backend;
pub mod config;
pub mod db;
pub mod logging;
pub mod migrate;
pub mod parser;
pub mod resync;
pub mod server;
pub mod sqlite_store;
pub mod webhook;
