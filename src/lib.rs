//! In-process publish/subscribe event bus.
//!
//! Producers call [`dispatcher::publish`] with a typed [`event_type::EventType`];
//! subscribers register through [`dispatcher::subscribe`] / [`dispatcher::subscribe_ptr`]
//! on a [`sublist::SubList`] (or the implicit process-wide one). Three handler
//! flavors are supported: inline `Sync`, core-owned-worker `AsyncFn`, and
//! user-queue `AsyncTask` — see [`subscription`] and [`queue`].

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod event_type;
pub mod hash;
pub mod metrics;
pub mod queue;
pub mod sublist;
pub mod subscription;
pub mod wakeup;

pub use config::BusConfig;
pub use dispatcher::{global, publish, subscribe, subscribe_ptr, HandlerDescriptor};
pub use error::BusError;
pub use event_type::EventType;
pub use metrics::MetricsSnapshot;
pub use queue::AsyncQueue;
pub use sublist::SubList;
pub use subscription::{AsyncEvent, SubRef, SyncEvent};
pub use wakeup::{ThreadParker, Wakeup};
