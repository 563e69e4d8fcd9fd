//! Host-side bindings for the OpenCL 1.2 API.
//!
//! The crate gives an embedding runtime three things: a uniform [`Handle`]
//! over every native resource kind with the retain/release discipline each
//! kind requires, a [`Notifier`] bridge that carries the driver's
//! asynchronous callbacks onto the embedder's own thread, and a thin
//! translation of the host API entry points in [`api`].
//!
//! The driver itself is consumed through its fixed C ABI; this layer never
//! reinterprets driver semantics, it only marshals calls, data and resource
//! lifetimes across the boundary.

#![warn(missing_docs)]

mod error;
mod handle;
mod notify;

pub mod api;
#[allow(missing_docs)]
pub mod sys;

pub use error::{BridgeError, BridgeResult};
pub use handle::{Handle, HandleKind, NativeRefFn};
pub use notify::{CallbackQueue, CallbackSender, Notification, Notifier};
