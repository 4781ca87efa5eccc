//! Display targets the client renders into.
//!
//! A `Page` holds named sinks. The client claims exactly one of them by id at
//! startup and owns it as a `DisplayTarget` for the rest of the session.

use crate::errors::{AppError, Result};
use std::collections::HashMap;
use tokio::sync::watch;

/// Output side of a display target.
pub trait DisplaySink: Send {
    /// Replace whatever the sink currently shows with `fragment`.
    fn write_fragment(&mut self, fragment: &str) -> Result<()>;
}

/// Publishes each fragment on a `watch` channel. Observers only ever see the
/// latest value.
pub struct WatchSink {
    tx: watch::Sender<String>,
}

impl WatchSink {
    pub fn new(tx: watch::Sender<String>) -> Self {
        Self { tx }
    }

    /// Convenience constructor returning the sink with a fresh receiver.
    pub fn channel() -> (Self, watch::Receiver<String>) {
        let (tx, rx) = watch::channel(String::new());
        (Self::new(tx), rx)
    }
}

impl DisplaySink for WatchSink {
    fn write_fragment(&mut self, fragment: &str) -> Result<()> {
        // send_replace never fails, even with every receiver dropped
        self.tx.send_replace(fragment.to_string());
        Ok(())
    }
}

/// The single output location a client renders into.
pub struct DisplayTarget {
    id: String,
    current: Option<String>,
    sink: Box<dyn DisplaySink>,
}

impl DisplayTarget {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Last fragment rendered, if any.
    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Overwrite the target with `fragment`.
    ///
    /// The fragment is recorded even when the sink write fails.
    pub fn render(&mut self, fragment: String) -> Result<()> {
        let res = self.sink.write_fragment(&fragment);
        self.current = Some(fragment);
        res
    }
}

impl std::fmt::Debug for DisplayTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisplayTarget")
            .field("id", &self.id)
            .field("current", &self.current)
            .finish_non_exhaustive()
    }
}

/// Registry of display sinks addressable by id.
#[derive(Default)]
pub struct Page {
    sinks: HashMap<String, Box<dyn DisplaySink>>,
}

impl Page {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `sink` under `id`, replacing any previous sink with that id.
    pub fn register(&mut self, id: impl Into<String>, sink: impl DisplaySink + 'static) {
        self.sinks.insert(id.into(), Box::new(sink));
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sinks.contains_key(id)
    }

    /// Claim the sink registered under `id` as a `DisplayTarget`.
    ///
    /// The sink is removed from the page, so a target has a single owner.
    pub fn locate(&mut self, id: &str) -> Result<DisplayTarget> {
        let sink = self
            .sinks
            .remove(id)
            .ok_or_else(|| AppError::TargetNotFound(id.to_string()))?;
        Ok(DisplayTarget {
            id: id.to_string(),
            current: None,
            sink,
        })
    }
}
