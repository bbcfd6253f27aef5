//! Local mirror of a remote music collection.
//!
//! The [`sync::CollectionSync`] engine pulls saved tracks, albums, artists,
//! shows, episodes, pins and the playlist root list into a redb mirror,
//! keeps it current with token deltas and push notifications, and submits
//! local saves/unsaves through a write queue.

pub mod api;
pub mod config;
pub mod error;
pub mod ids;
pub mod metadata;
pub mod model;
pub mod store;
pub mod sync;
