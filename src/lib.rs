//! Cache-aside data access over a relational store and a key-value cache.
//!
//! Declare how an entity's cache keys are built with an
//! [`EntityDescriptor`](application::EntityDescriptor), bind its shapes with
//! an [`EntitySchema`](application::EntitySchema), then drive reads and
//! writes through [`CacheAside`](application::CacheAside) with any
//! [`Repository`](application::Repository) and
//! [`CacheStore`](cache::CacheStore).

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
