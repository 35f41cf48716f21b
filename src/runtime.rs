//! Producer loop and its control handle.
//!
//! `Pipeline::spawn` moves a source and an engine onto a dedicated thread that
//! runs, once per iteration:
//!
//! 1. cancellation check
//! 2. drain the command queue into the engine
//! 3. capture the next frame
//! 4. statistics, then mode dispatch
//! 5. publish the annotated frame
//!
//! Notices raised by the engine are forwarded on the status channel, which
//! ends with exactly one `StatusEvent::Stopped`.

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{Receiver, Sender};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::engine::{Command, Control, DetectionEngine, Notice};
use crate::ingest::FrameSource;
use crate::publish::{EventPublisher, FrameEvent, Subscription};
use crate::stats::{FpsMeter, FrameStatistics};

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// Cooperative stop flag shared between the handle, the loop and the source.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// `stop()`, a `Stop` command, or the token was cancelled.
    Cancelled,
    EndOfStream,
    CaptureFailed(String),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Cancelled => f.write_str("cancelled"),
            StopReason::EndOfStream => f.write_str("end of stream"),
            StopReason::CaptureFailed(reason) => write!(f, "capture failed: {}", reason),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusEvent {
    Notice(Notice),
    Stopped(StopReason),
}

/// Handle to a running producer thread.
pub struct Pipeline {
    commands: Sender<Command>,
    status: Receiver<StatusEvent>,
    publisher: EventPublisher,
    cancel: CancellationToken,
    handle: Option<JoinHandle<StopReason>>,
}

impl Pipeline {
    pub fn spawn(
        source: Box<dyn FrameSource>,
        engine: DetectionEngine,
        publisher: EventPublisher,
    ) -> Result<Self> {
        let (commands, command_rx) = crossbeam_channel::unbounded();
        let (status_tx, status) = crossbeam_channel::unbounded();
        let cancel = CancellationToken::new();

        let producer = Producer {
            source,
            engine,
            publisher: publisher.clone(),
            commands: command_rx,
            status: status_tx,
            cancel: cancel.clone(),
        };
        let handle = std::thread::Builder::new()
            .name("trackcam-producer".to_string())
            .spawn(move || producer.run())
            .context("spawn producer thread")?;

        Ok(Self {
            commands,
            status,
            publisher,
            cancel,
            handle: Some(handle),
        })
    }

    /// A sender for the command queue, for use from other threads.
    pub fn commands(&self) -> Sender<Command> {
        self.commands.clone()
    }

    pub fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| anyhow!("producer loop has exited"))
    }

    pub fn subscribe(&self) -> Subscription {
        self.publisher.subscribe()
    }

    pub fn publisher(&self) -> &EventPublisher {
        &self.publisher
    }

    pub fn status(&self) -> &Receiver<StatusEvent> {
        &self.status
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request a stop without waiting for it.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Wait for the loop to exit and return why it stopped.
    pub fn join(mut self) -> Result<StopReason> {
        let handle = self
            .handle
            .take()
            .ok_or_else(|| anyhow!("producer thread already joined"))?;
        handle
            .join()
            .map_err(|_| anyhow!("producer thread panicked"))
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.cancel.cancel();
            if handle.join().is_err() {
                log::error!("runtime: producer thread panicked");
            }
        }
    }
}

struct Producer {
    source: Box<dyn FrameSource>,
    engine: DetectionEngine,
    publisher: EventPublisher,
    commands: Receiver<Command>,
    status: Sender<StatusEvent>,
    cancel: CancellationToken,
}

impl Producer {
    fn run(mut self) -> StopReason {
        log::info!("runtime: producer started on {}", self.source.id());
        let mut fps = FpsMeter::new();
        let mut index = 0u64;
        let mut last_health_log = Instant::now();

        let reason = loop {
            if self.cancel.is_cancelled() {
                break StopReason::Cancelled;
            }

            let control = self.drain_commands();
            self.forward_notices();
            if control == Control::Stop {
                self.cancel.cancel();
                break StopReason::Cancelled;
            }

            let mut frame = match self.source.next_frame(&self.cancel) {
                Ok(Some(frame)) => frame,
                Ok(None) if self.cancel.is_cancelled() => break StopReason::Cancelled,
                Ok(None) => {
                    log::info!("runtime: {} reached end of stream", self.source.id());
                    break StopReason::EndOfStream;
                }
                Err(err) => {
                    log::error!("runtime: capture from {} failed: {}", self.source.id(), err);
                    break StopReason::CaptureFailed(err.to_string());
                }
            };

            let stats = FrameStatistics::compute(&frame);
            let rate = fps.tick(frame.captured_at);
            let report = self.engine.process(&mut frame);
            log::trace!(
                "runtime: frame {} {}/{} tracked={:?}",
                index,
                report.mode,
                report.state,
                report.tracked
            );
            self.publisher.publish(FrameEvent {
                frame,
                stats,
                fps: rate,
                index,
                mode: report.mode,
                state: report.state,
                parameters: report.parameters,
                tracked: report.tracked,
                detections: report.detections,
            });
            index += 1;
            self.forward_notices();

            if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
                log::info!(
                    "runtime: frames={} dropped={} fps={:.1} mode={} state={}",
                    index,
                    self.publisher.dropped(),
                    fps.fps(),
                    self.engine.mode(),
                    self.engine.state()
                );
                last_health_log = Instant::now();
            }
        };

        self.engine.shutdown();
        self.publisher.close();
        let source_id = self.source.id().to_string();
        drop(self.source);
        log::info!("runtime: released {} after {} frame(s) ({})", source_id, index, reason);

        let _ = self.status.send(StatusEvent::Stopped(reason.clone()));
        reason
    }

    /// Apply every queued command. Stops at the first `Stop`.
    fn drain_commands(&mut self) -> Control {
        while let Ok(command) = self.commands.try_recv() {
            log::debug!("runtime: command {:?}", command);
            if self.engine.apply(command) == Control::Stop {
                return Control::Stop;
            }
        }
        Control::Continue
    }

    fn forward_notices(&mut self) {
        for notice in self.engine.take_notices() {
            // The consumer may have dropped the handle; the loop keeps going.
            let _ = self.status.send(StatusEvent::Notice(notice));
        }
    }
}
