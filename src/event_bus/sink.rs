use std::io::{self, Result as IoResult, Stderr, Write};
use std::sync::{Arc, Mutex};

use super::event::Event;

/// Abstraction over an output target that consumes full Event objects.
pub trait EventSink: Sync + Send {
    /// Handle a structured event. Sink decides how to serialize/format it.
    fn handle(&mut self, event: &Event) -> IoResult<()>;
}

/// Stderr sink: one formatted line per event. Stderr keeps progress chatter
/// out of stdout so the final summary stays pipeable.
pub struct StdErrSink {
    handle: Stderr,
}

impl Default for StdErrSink {
    fn default() -> Self {
        Self {
            handle: io::stderr(),
        }
    }
}

impl EventSink for StdErrSink {
    fn handle(&mut self, event: &Event) -> IoResult<()> {
        // Token ticks arrive per chunk; a line per tick would flood the tty.
        if matches!(event, Event::Tokens { .. }) {
            return Ok(());
        }
        writeln!(self.handle, "{event}")?;
        self.handle.flush()
    }
}

/// In-memory sink for testing and snapshots.
#[derive(Clone, Default)]
pub struct MemorySink {
    entries: Arc<Mutex<Vec<Event>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a snapshot of all captured events.
    pub fn snapshot(&self) -> Vec<Event> {
        self.entries.lock().unwrap().clone()
    }
}

impl EventSink for MemorySink {
    fn handle(&mut self, event: &Event) -> IoResult<()> {
        self.entries.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Channel-based sink for streaming to async consumers (e.g., a TUI or a
/// sweep harness collecting progress from several runs).
pub struct ChannelSink {
    tx: flume::Sender<Event>,
}

impl ChannelSink {
    pub fn new(tx: flume::Sender<Event>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn handle(&mut self, event: &Event) -> IoResult<()> {
        self.tx
            .send(event.clone())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "channel receiver dropped"))
    }
}
