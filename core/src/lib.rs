//! Shared building blocks for the crawler, the search server and the trainer:
//! storage contracts, tokenization, BM25 ranking and the recommendation model.

pub mod config;
pub mod index;
pub mod memory;
pub mod persist;
pub mod profile;
pub mod ranking;
pub mod recommend;
pub mod schedule;
pub mod store;
pub mod tokenizer;
pub mod urls;

pub use index::*;
pub use store::{DocumentIndex, ModelStore, PageStore, ResultCache, StoreError, StoreResult};
