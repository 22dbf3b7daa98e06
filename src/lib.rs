//! # Summary Harness
//!
//! Retrieval-augmented map-reduce summarization over pools of
//! capacity-limited LLM providers.
//!
//! A request leases a summarizer slot from the provider pool, segments its
//! text, optionally ranks supporting passages from a sentence-level vector
//! index, packs everything into token-budgeted chunks and reduces them
//! through concurrent extraction rounds until one final call produces the
//! answer.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌─────────────┐   ┌──────────────┐
//! │  Request   │──▶│  Allocator  │──▶│ SQLite leases │
//! │ text/docs  │   │ role/device │   │   + locks     │
//! └─────┬──────┘   └─────────────┘   └──────────────┘
//!       │
//!       ▼
//! ┌────────────┐   ┌─────────────┐   ┌──────────────┐
//! │ Segment +  │──▶│  Assemble   │──▶│  Map-reduce   │
//! │   Rank     │   │  (tokens)   │   │  LLM rounds   │
//! └────────────┘   └─────────────┘   └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! summ init                                   # create database
//! summ text report.md --prompt "Summarize the key risks."
//! summ documents doc-1 doc-2 --prompt "What changed in Q3?"
//! summ leases list
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Typed inference, lock and summary errors |
//! | [`allocator`] | Provider pool allocator |
//! | [`lock`] | Named mutexes (in-process and SQLite) |
//! | [`summarize`] | Map-reduce orchestrator |
//! | [`prompt`] | Prompt formats per provider family |
//! | [`llm`] | Language-model trait and HTTP client |
//! | [`encoder`] | HTTP sentence encoder |
//! | [`qdrant`] | Qdrant vector index |
//! | [`tokenizer`] | BPE token counter |
//! | [`sqlite_store`] | SQLite lease store and summary cache |
//! | [`harness`] | Wiring from configuration to engine |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`logging`] | Tracing subscriber setup |

pub mod allocator;
pub mod config;
pub mod db;
pub mod encoder;
pub mod error;
pub mod harness;
pub mod llm;
pub mod lock;
pub mod logging;
pub mod migrate;
pub mod prompt;
pub mod qdrant;
pub mod sqlite_store;
pub mod summarize;
pub mod tokenizer;
