use std::sync::mpsc::{sync_channel, RecvTimeoutError, SyncSender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::engine::Engine;
use crate::storage::{ReportSink, SnapshotLog};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Nudge,
    Stop,
}

pub struct Reporter {
    engine: Arc<Engine>,
    tx: SyncSender<Tick>,
    handle: Option<JoinHandle<()>>,
}

impl Reporter {
    pub fn spawn(
        engine: Arc<Engine>,
        sink: Option<ReportSink>,
        log: Option<SnapshotLog>,
    ) -> Result<Self> {
        let interval = Duration::from_millis(engine.params().report.interval_ms);
        let (tx, rx) = sync_channel(1);
        engine.attach_nudge(tx.clone());
        let worker = Arc::clone(&engine);
        let handle = std::thread::Builder::new()
            .name("searchwatch-reporter".into())
            .spawn(move || loop {
                match rx.recv_timeout(interval) {
                    Ok(Tick::Stop) | Err(RecvTimeoutError::Disconnected) => break,
                    Ok(Tick::Nudge) | Err(RecvTimeoutError::Timeout) => {
                        emit(&worker, sink.as_ref(), log.as_ref());
                    }
                }
            })?;
        Ok(Self {
            engine,
            tx,
            handle: Some(handle),
        })
    }

    pub fn stop(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        self.engine.detach_nudge();
        let _ = self.tx.send(Tick::Stop);
        handle
            .join()
            .map_err(|_| anyhow!("reporter thread panicked"))
    }
}

impl Drop for Reporter {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            tracing::error!("reporter shutdown failed: {err}");
        }
    }
}

fn emit(engine: &Engine, sink: Option<&ReportSink>, log: Option<&SnapshotLog>) {
    let report = engine.snapshot();
    if let Some(sink) = sink {
        if let Err(err) = sink.write(&report) {
            tracing::warn!("snapshot sink write failed: {err:#}");
        }
    }
    if let Some(log) = log {
        if let Err(err) = log.append(&report) {
            tracing::warn!(path = %log.path().display(), "snapshot log append failed: {err:#}");
        }
    }
}
