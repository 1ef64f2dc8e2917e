//! `reelqueue-store`: durable, tenant-scoped upload queue.
//!
//! Each tenant owns a settings document and an ordered list of items. The
//! [`QueueStore`] trait is the only way the scheduler and the HTTP layer touch
//! that state; [`SqliteQueueStore`] implements it on SQLite.
//!
//! # Item lifecycle
//!
//! | From         | To           | Via                         |
//! |--------------|--------------|-----------------------------|
//! | `pending`    | `processing` | `try_lock` (tenant-wide lock) |
//! | `pending`    | `failed`     | `expire_pending` (missed window) |
//! | `processing` | `uploaded`   | `set_status`                  |
//! | `processing` | `failed`     | `set_status`                  |

pub mod db;
pub mod error;
pub mod store;
pub mod types;

pub use error::{Result, StoreError};
pub use store::{QueueStore, SqliteQueueStore};
pub use types::{Item, ItemStatus, MediaKind, NewItem, Settings};
