use std::sync::{Arc, Mutex};

use tokio::{sync::oneshot, task};

use super::event::Event;
use super::sink::{EventSink, StdErrSink};

/// Receives events from the pipeline and broadcasts them to sinks.
///
/// The bus owns a background listener task; producers hold a cheap
/// [`EventEmitter`] clone. Delivery is best-effort: a full or closed
/// channel never stalls a stage.
pub struct EventBus {
    sinks: Arc<Mutex<Vec<Box<dyn EventSink>>>>,
    event_channel: (flume::Sender<Event>, flume::Receiver<Event>),
    listener: Mutex<Option<ListenerState>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_sink(StdErrSink::default())
    }
}

impl EventBus {
    /// Create an EventBus with a single sink.
    pub fn with_sink<T>(sink: T) -> Self
    where
        T: EventSink + 'static,
    {
        Self::with_sinks(vec![Box::new(sink)])
    }

    /// Create an EventBus with multiple sinks.
    pub fn with_sinks(sinks: Vec<Box<dyn EventSink>>) -> Self {
        Self {
            sinks: Arc::new(Mutex::new(sinks)),
            event_channel: flume::unbounded(),
            listener: Mutex::new(None),
        }
    }

    /// Get an emitter handle so producers can send events.
    pub fn emitter(&self) -> EventEmitter {
        EventEmitter {
            tx: self.event_channel.0.clone(),
        }
    }

    /// Spawn a background task that forwards events to all sinks.
    /// Idempotent: calling multiple times has no effect.
    pub fn listen(&self) {
        let mut guard = self.listener.lock().expect("listener poisoned");
        if guard.is_some() {
            return;
        }

        let receiver = self.event_channel.1.clone();
        let sinks = self.sinks.clone();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let handle = task::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    recv = receiver.recv_async() => match recv {
                        Err(_) => break,
                        Ok(event) => {
                            let mut sinks_guard = sinks.lock().unwrap();
                            for sink in sinks_guard.iter_mut() {
                                if let Err(e) = sink.handle(&event) {
                                    tracing::debug!(error = %e, "event sink write failed");
                                }
                            }
                        }
                    }
                }
            }
        });

        *guard = Some(ListenerState {
            shutdown_tx,
            handle,
        });
    }

    /// Stop the background listener after draining queued events.
    pub async fn shutdown(&self) {
        let state = {
            let mut guard = self.listener.lock().expect("listener poisoned");
            guard.take()
        };
        if let Some(state) = state {
            // Let the listener drain what is already queued.
            while !self.event_channel.1.is_empty() {
                tokio::task::yield_now().await;
            }
            let _ = state.shutdown_tx.send(());
            let _ = state.handle.await;
        }
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.listener.lock() {
            if let Some(state) = guard.take() {
                let _ = state.shutdown_tx.send(());
                state.handle.abort();
            }
        }
    }
}

struct ListenerState {
    shutdown_tx: oneshot::Sender<()>,
    handle: task::JoinHandle<()>,
}

/// Cheap cloneable handle for emitting events into the bus.
#[derive(Clone)]
pub struct EventEmitter {
    tx: flume::Sender<Event>,
}

impl EventEmitter {
    /// Emit an event, best-effort. A disconnected bus is logged at debug
    /// level and otherwise ignored; progress display never gates the run.
    pub fn emit(&self, event: Event) {
        if self.tx.send(event).is_err() {
            tracing::debug!("event bus disconnected; dropping progress event");
        }
    }

    /// An emitter wired to nothing, for tests and library embedding.
    #[must_use]
    pub fn disconnected() -> Self {
        let (tx, _rx) = flume::bounded(0);
        Self { tx }
    }
}
