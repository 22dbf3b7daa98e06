//! # Summary Harness Core
//!
//! Pure logic shared by the Summary Harness application: data models,
//! provider registry parsing, text segmentation, passage ranking, chunk
//! assembly and the collaborator traits the orchestrator talks to.
//!
//! This crate contains no tokio, sqlx, HTTP or filesystem dependencies.
//! Every external system (lease storage, vector index, document store,
//! encoder, sentence parser, summary cache) sits behind an async trait
//! with an in-memory implementation in [`store::memory`].
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Roles, leases, chunks, passages and usage accounting |
//! | [`registry`] | Provider declarations and device limits per role |
//! | [`segment`] | Paragraph-boundary text segmenter |
//! | [`tokens`] | Token counting trait and the character heuristic |
//! | [`sentences`] | Sentence parser trait and punctuation splitter |
//! | [`embedding`] | Encoder trait and vector similarity |
//! | [`rank`] | Passage ranker over sentence-level search hits |
//! | [`assemble`] | Token-budgeted chunk packing |
//! | [`store`] | Lease, vector, document and cache traits |

pub mod assemble;
pub mod embedding;
pub mod models;
pub mod rank;
pub mod registry;
pub mod segment;
pub mod sentences;
pub mod store;
pub mod tokens;
