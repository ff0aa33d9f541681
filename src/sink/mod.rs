//! The forwarding sink: buffer, drain loop and the handle producers use.
//!
//! ```text
//! watcher ──update_events──► SinkHandle ──► BoundedBuffer ──► EventSink::run (drain loop)
//!                                                                  │
//!                                                     BatchBuilder ─┴─► Dispatcher ─► Transport
//! ```
mod builder;
mod event_sink;

pub use builder::*;
pub use event_sink::*;

#[cfg(test)]
mod event_sink_test;
