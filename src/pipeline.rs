//! Detection loop coordinator.
//!
//! One coordinator thread drives capture, preprocessing, inference and
//! decoding in strict order. Inference runs on a dedicated worker thread that
//! owns the engine; the coordinator submits one tensor and waits for the reply
//! before doing anything else, so at most one engine call is ever in flight.
//!
//! Publishing happens only at the end of a completed cycle, so readers of
//! `LoopHandle::latest` always see a whole batch. Any stage failure stops the
//! loop; there are no retries.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::JoinHandle;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};

use crate::detect::{Decoder, DetectionBatch, InferenceEngine, RawDetections};
use crate::error::{DetectError, LoopError, Stage};
use crate::frame::{InputTensor, Preprocessor};
use crate::ingest::FrameSource;

/// Where the coordinator currently is within a cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoopState {
    #[default]
    Idle,
    Capturing,
    Preprocessing,
    Inferring,
    Decoding,
    Published,
    Stopped,
}

/// Why a loop ended without an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitReason {
    Cancelled,
    CycleLimit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoopExit {
    pub cycles_completed: u64,
    pub reason: ExitReason,
}

/// Point-in-time view of a running loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoopStatus {
    pub state: LoopState,
    pub cycles_completed: u64,
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
struct LoopShared {
    stop: Arc<AtomicBool>,
    state: Mutex<LoopState>,
    latest: RwLock<Option<Arc<DetectionBatch>>>,
    cycles_completed: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl LoopShared {
    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn set_state(&self, state: LoopState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn state(&self) -> LoopState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, batch: DetectionBatch) {
        *self.latest.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(batch));
        self.cycles_completed.fetch_add(1, Ordering::SeqCst);
        self.set_state(LoopState::Published);
    }

    fn record_error(&self, err: &LoopError) {
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(err.to_string());
    }
}

// ---- Inference worker ----

/// Thread that owns the engine. The engine is dropped on this thread once the
/// request channel closes.
struct InferenceWorker {
    requests: Option<Sender<InputTensor>>,
    replies: Receiver<Result<RawDetections>>,
    join: Option<JoinHandle<()>>,
}

impl InferenceWorker {
    fn spawn(mut engine: Box<dyn InferenceEngine>) -> Result<Self> {
        let (request_tx, request_rx) = mpsc::channel::<InputTensor>();
        let (reply_tx, reply_rx) = mpsc::channel();
        let join = std::thread::Builder::new()
            .name("inference".to_string())
            .spawn(move || {
                let name = engine.name();
                for tensor in request_rx {
                    if reply_tx.send(engine.infer(&tensor)).is_err() {
                        break;
                    }
                }
                drop(engine);
                log::debug!("InferenceWorker: released {} engine", name);
            })
            .context("spawn inference worker")?;
        Ok(Self {
            requests: Some(request_tx),
            replies: reply_rx,
            join: Some(join),
        })
    }

    /// Send one tensor and block until the engine answers.
    fn submit(&mut self, tensor: InputTensor) -> Result<RawDetections> {
        let requests = self
            .requests
            .as_ref()
            .ok_or_else(|| anyhow!("inference worker already shut down"))?;
        requests
            .send(tensor)
            .map_err(|_| anyhow!("inference worker exited"))?;
        self.replies
            .recv()
            .map_err(|_| anyhow!("inference worker exited before replying"))?
    }

    fn shutdown(&mut self) -> Result<()> {
        self.requests.take();
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("inference worker thread panicked"))?;
        }
        Ok(())
    }
}

impl Drop for InferenceWorker {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            log::warn!("InferenceWorker: {}", err);
        }
    }
}

// ---- Coordinator ----

/// A configured loop, ready to be spawned.
pub struct DetectionLoop<S: FrameSource> {
    source: S,
    engine: Box<dyn InferenceEngine>,
    preprocessor: Preprocessor,
    decoder: Decoder,
    max_cycles: Option<u64>,
}

impl<S: FrameSource + 'static> DetectionLoop<S> {
    /// `source` must already be connected.
    pub fn new<E>(source: S, engine: E, preprocessor: Preprocessor, decoder: Decoder) -> Self
    where
        E: InferenceEngine + 'static,
    {
        Self {
            source,
            engine: Box::new(engine),
            preprocessor,
            decoder,
            max_cycles: None,
        }
    }

    /// Stop cleanly after this many published batches.
    pub fn with_max_cycles(mut self, max_cycles: Option<u64>) -> Self {
        self.max_cycles = max_cycles;
        self
    }

    /// Warm the engine up, start the worker and the coordinator thread.
    pub fn spawn(self) -> Result<LoopHandle> {
        let DetectionLoop {
            source,
            mut engine,
            preprocessor,
            decoder,
            max_cycles,
        } = self;

        engine
            .warm_up()
            .with_context(|| format!("warm up {} engine", engine.name()))?;
        log::info!(
            "DetectionLoop: {} engine ready, capturing from {}",
            engine.name(),
            source.name()
        );
        let worker = InferenceWorker::spawn(engine)?;

        let shared = Arc::new(LoopShared::default());
        let runner = LoopRunner {
            source,
            preprocessor,
            decoder,
            max_cycles,
            worker,
            shared: shared.clone(),
        };
        let join = std::thread::Builder::new()
            .name("detect-loop".to_string())
            .spawn(move || runner.run())
            .context("spawn detection loop")?;

        Ok(LoopHandle {
            shared,
            join: Some(join),
        })
    }
}

struct LoopRunner<S: FrameSource> {
    source: S,
    preprocessor: Preprocessor,
    decoder: Decoder,
    max_cycles: Option<u64>,
    worker: InferenceWorker,
    shared: Arc<LoopShared>,
}

impl<S: FrameSource> LoopRunner<S> {
    fn run(mut self) -> Result<LoopExit, LoopError> {
        let mut completed = 0u64;
        let outcome = loop {
            if self.shared.stop_requested() {
                break Ok(ExitReason::Cancelled);
            }
            if self.max_cycles.is_some_and(|limit| completed >= limit) {
                break Ok(ExitReason::CycleLimit);
            }
            let cycle = completed + 1;
            match self.cycle(cycle) {
                Ok(Some(batch)) => {
                    log::debug!(
                        "DetectionLoop: cycle {} published {} detections in {} ms",
                        cycle,
                        batch.len(),
                        batch.latency_ms
                    );
                    self.shared.publish(batch);
                    completed = cycle;
                }
                Ok(None) => break Ok(ExitReason::Cancelled),
                Err(err) => break Err(err),
            }
        };

        if let Err(err) = self.worker.shutdown() {
            log::warn!("DetectionLoop: {}", err);
        }
        if let Err(err) = &outcome {
            self.shared.record_error(err);
        }
        self.shared.set_state(LoopState::Stopped);

        match outcome {
            Ok(reason) => {
                log::info!(
                    "DetectionLoop: stopped after {} cycles ({:?})",
                    completed,
                    reason
                );
                Ok(LoopExit {
                    cycles_completed: completed,
                    reason,
                })
            }
            Err(err) => {
                log::error!("DetectionLoop: {}", err);
                Err(err)
            }
        }
    }

    /// Run one cycle. `None` means a stop arrived before publishing.
    fn cycle(&mut self, cycle: u64) -> Result<Option<DetectionBatch>, LoopError> {
        let fail = move |stage: Stage| {
            move |source: DetectError| LoopError {
                cycle,
                stage,
                source,
            }
        };
        let started = Instant::now();

        self.shared.set_state(LoopState::Capturing);
        let frame = self
            .source
            .next_frame()
            .map_err(DetectError::Capture)
            .map_err(fail(Stage::Capturing))?;

        self.shared.set_state(LoopState::Preprocessing);
        let tensor = self
            .preprocessor
            .process(&frame)
            .map_err(fail(Stage::Preprocessing))?;

        self.shared.set_state(LoopState::Inferring);
        let inference_started = Instant::now();
        let raw = self
            .worker
            .submit(tensor)
            .map_err(DetectError::InferenceFailure)
            .map_err(fail(Stage::Inferring))?;
        let inference_ms = inference_started.elapsed().as_millis() as u64;

        self.shared.set_state(LoopState::Decoding);
        let detections = self
            .decoder
            .decode_batch(&raw)
            .map_err(fail(Stage::Decoding))?;

        if self.shared.stop_requested() {
            return Ok(None);
        }
        Ok(Some(DetectionBatch {
            cycle,
            detections,
            latency_ms: started.elapsed().as_millis() as u64,
            inference_ms,
        }))
    }
}

// ---- Handle ----

/// Owner-side handle of a spawned loop. Dropping it stops and joins the loop.
pub struct LoopHandle {
    shared: Arc<LoopShared>,
    join: Option<JoinHandle<Result<LoopExit, LoopError>>>,
}

impl LoopHandle {
    /// Most recently published batch, if any.
    pub fn latest(&self) -> Option<Arc<DetectionBatch>> {
        self.shared
            .latest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn state(&self) -> LoopState {
        self.shared.state()
    }

    pub fn status(&self) -> LoopStatus {
        LoopStatus {
            state: self.shared.state(),
            cycles_completed: self.shared.cycles_completed.load(Ordering::SeqCst),
            last_error: self
                .shared
                .last_error
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }

    /// Request a stop. The in-flight cycle finishes but is not published.
    pub fn stop(&self) {
        self.shared.stop.store(true, Ordering::SeqCst);
    }

    /// Flag that stops the loop when set, for signal handlers.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.shared.stop.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the loop to end. The engine has been released when this returns.
    pub fn join(mut self) -> Result<LoopExit, LoopError> {
        match self.join.take() {
            Some(join) => join
                .join()
                .unwrap_or_else(|panic| std::panic::resume_unwind(panic)),
            None => Ok(LoopExit {
                cycles_completed: self.shared.cycles_completed.load(Ordering::SeqCst),
                reason: ExitReason::Cancelled,
            }),
        }
    }
}

impl Drop for LoopHandle {
    fn drop(&mut self) {
        if let Some(join) = self.join.take() {
            self.stop();
            if join.join().is_err() {
                log::warn!("DetectionLoop: loop thread panicked");
            }
        }
    }
}
