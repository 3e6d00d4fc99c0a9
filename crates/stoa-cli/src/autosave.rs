//! Background research-log persistence.
//!
//! Two independent paths over one sink: a periodic task that coalesces rapid
//! state changes into one upload per interval, and an immediate flush used on
//! teardown. Both are best-effort; upload failures are logged and never
//! surface to the session.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::debug;

use stoa_core::{LogSink, SessionMeta};
use stoa_gateway::sink::post_best_effort;

const AUTOSAVE_FILENAME: &str = "autosave-log.json";
const UNLOAD_FILENAME: &str = "unload-log.json";

enum Msg {
    Snapshot(Box<Snapshot>),
    Flush(Box<Snapshot>),
    Shutdown,
}

struct Snapshot {
    payload: Value,
    meta: SessionMeta,
}

/// Handle to the saver thread. Dropping it flushes whatever is pending.
pub struct Autosaver {
    tx: mpsc::Sender<Msg>,
    handle: Option<JoinHandle<()>>,
}

impl Autosaver {
    pub fn spawn(sink: Arc<dyn LogSink + Send + Sync>, interval: Duration) -> Self {
        let (tx, rx) = mpsc::channel::<Msg>();
        let handle = std::thread::spawn(move || {
            let mut pending: Option<Box<Snapshot>> = None;
            let mut deadline = Instant::now() + interval;
            loop {
                let timeout = deadline.saturating_duration_since(Instant::now());
                match rx.recv_timeout(timeout) {
                    Ok(Msg::Snapshot(snapshot)) => pending = Some(snapshot),
                    Ok(Msg::Flush(snapshot)) => {
                        pending = None;
                        post_best_effort(
                            sink.as_ref(),
                            &snapshot.payload,
                            UNLOAD_FILENAME,
                            &snapshot.meta,
                        );
                    }
                    Ok(Msg::Shutdown) | Err(RecvTimeoutError::Disconnected) => {
                        if let Some(snapshot) = pending.take() {
                            post_best_effort(
                                sink.as_ref(),
                                &snapshot.payload,
                                AUTOSAVE_FILENAME,
                                &snapshot.meta,
                            );
                        }
                        break;
                    }
                    Err(RecvTimeoutError::Timeout) => {
                        if let Some(snapshot) = pending.take() {
                            debug!("autosave tick");
                            post_best_effort(
                                sink.as_ref(),
                                &snapshot.payload,
                                AUTOSAVE_FILENAME,
                                &snapshot.meta,
                            );
                        }
                        deadline = Instant::now() + interval;
                    }
                }
            }
        });

        Self {
            tx,
            handle: Some(handle),
        }
    }

    /// Queue the latest state. Multiple calls inside one interval collapse
    /// into a single upload of the newest snapshot.
    pub fn notify(&self, payload: Value, meta: &SessionMeta) {
        let _ = self.tx.send(Msg::Snapshot(Box::new(Snapshot {
            payload,
            meta: meta.clone(),
        })));
    }

    /// Upload now, skipping the coalescing window. Used on teardown.
    pub fn flush(&self, payload: Value, meta: &SessionMeta) {
        let _ = self.tx.send(Msg::Flush(Box::new(Snapshot {
            payload,
            meta: meta.clone(),
        })));
    }
}

impl Drop for Autosaver {
    fn drop(&mut self) {
        let _ = self.tx.send(Msg::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
