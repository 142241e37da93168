//! Translation management backend.
//!
//! CRUD over locales, tags, and translations, a filtered search, and three
//! bulk export paths with distinct consistency rules:
//!
//! - `export` — the cached, unfiltered full dump (stale up to the cache TTL)
//! - `exportByLocalAndTag` — uncached locale(+tag) pages, erroring on empty
//! - `export/{locale}.json` — unpaginated flat bundles for asset delivery
//!
//! `db` owns persistence, `query` the filter/pagination contracts, `export`
//! the export semantics, `cache` the export-all memoization, and `api` the
//! HTTP surface.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod query;
pub mod security;
