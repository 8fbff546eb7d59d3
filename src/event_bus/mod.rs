//! Progress event fan-out for the synthesis pipeline.
//!
//! Stages emit [`Event`]s through a cloneable [`EventEmitter`]; the
//! [`EventBus`] broadcasts them to pluggable sinks (stderr, memory,
//! channel). Events are a side-observer: the pipeline never waits on them.

pub mod bus;
pub mod event;
pub mod sink;

pub use bus::{EventBus, EventEmitter};
pub use event::{Event, Stage};
pub use sink::{ChannelSink, EventSink, MemorySink, StdErrSink};
