//! Reverie — paced stream-of-consciousness generation for personas.
//!
//! A persona and a topic seed a generation loop that asks a text backend
//! for passages, cuts them into short fragments and hands them one at a
//! time to a display that types them out word by word. Periodic tangents
//! keep the stream drifting; a rolling history keeps it coherent.

pub mod core;
pub mod logging;
pub mod schema;

pub use crate::core::pipeline::{StreamEngine, StreamError};
pub use crate::schema::config::StreamConfig;
