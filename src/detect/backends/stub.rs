use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::detect::backend::{InferenceEngine, RawDetections};
use crate::frame::InputTensor;

#[derive(Debug, Default)]
struct ProbeCounters {
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    overlaps: AtomicUsize,
    warm_ups: AtomicUsize,
    releases: AtomicUsize,
}

/// Shared view of a `StubEngine`'s call history, usable after the engine has
/// moved into a worker (or been dropped).
#[derive(Clone, Debug, Default)]
pub struct StubProbe {
    counters: Arc<ProbeCounters>,
}

impl StubProbe {
    pub fn calls(&self) -> usize {
        self.counters.calls.load(Ordering::SeqCst)
    }

    /// Highest number of `infer` calls observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.counters.max_in_flight.load(Ordering::SeqCst)
    }

    /// Calls that started while another call was still running.
    pub fn overlaps(&self) -> usize {
        self.counters.overlaps.load(Ordering::SeqCst)
    }

    pub fn warm_ups(&self) -> usize {
        self.counters.warm_ups.load(Ordering::SeqCst)
    }

    /// How many times the engine has been dropped.
    pub fn releases(&self) -> usize {
        self.counters.releases.load(Ordering::SeqCst)
    }
}

/// Scripted engine for tests and `stub://` models.
///
/// Every call returns the same outputs. A delay can simulate inference time
/// and a failing call number can simulate an engine fault.
pub struct StubEngine {
    outputs: RawDetections,
    delay: Option<Duration>,
    fail_on_call: Option<usize>,
    probe: StubProbe,
}

impl StubEngine {
    pub fn new(outputs: RawDetections) -> Self {
        Self {
            outputs,
            delay: None,
            fail_on_call: None,
            probe: StubProbe::default(),
        }
    }

    /// Engine that never reports a candidate.
    pub fn empty() -> Self {
        Self::new(RawDetections::default())
    }

    /// Engine that reports one candidate per call.
    pub fn single(class_id: u32, score: f32, bbox: [f32; 4]) -> Self {
        let outputs = RawDetections::from_flat(
            1,
            1,
            bbox.to_vec(),
            vec![score],
            vec![class_id as f32],
        )
        .map(|raw| raw.with_num_detections(vec![1.0]))
        .unwrap_or_default();
        Self::new(outputs)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make the `call`-th call (1-based) fail.
    pub fn fail_on_call(mut self, call: usize) -> Self {
        self.fail_on_call = Some(call);
        self
    }

    pub fn probe(&self) -> StubProbe {
        self.probe.clone()
    }
}

impl InferenceEngine for StubEngine {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn infer(&mut self, tensor: &InputTensor) -> Result<RawDetections> {
        let counters = &self.probe.counters;
        let call = counters.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let running = counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        if running > 1 {
            counters.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        counters.max_in_flight.fetch_max(running, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        counters.in_flight.fetch_sub(1, Ordering::SeqCst);

        if tensor.as_slice().is_empty() {
            return Err(anyhow!("stub engine received an empty tensor"));
        }
        if self.fail_on_call == Some(call) {
            return Err(anyhow!("stub engine failure on call {}", call));
        }
        Ok(self.outputs.clone())
    }

    fn warm_up(&mut self) -> Result<()> {
        self.probe.counters.warm_ups.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for StubEngine {
    fn drop(&mut self) {
        self.probe.counters.releases.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{CapturedFrame, Preprocessor};

    fn tensor() -> InputTensor {
        Preprocessor::new(4)
            .unwrap()
            .process(&CapturedFrame::filled(4, 4, [1, 2, 3, 255]))
            .unwrap()
    }

    #[test]
    fn stub_engine_counts_calls_and_release() {
        let mut engine = StubEngine::single(1, 0.9, [0.1, 0.2, 0.3, 0.4]);
        let probe = engine.probe();

        let out = engine.infer(&tensor()).unwrap();
        assert_eq!(out.candidates(), 1);
        assert_eq!(out.num_detections(), Some(&[1.0][..]));
        engine.infer(&tensor()).unwrap();
        assert_eq!(probe.calls(), 2);
        assert_eq!(probe.overlaps(), 0);
        assert_eq!(probe.max_in_flight(), 1);

        drop(engine);
        assert_eq!(probe.releases(), 1);
    }

    #[test]
    fn stub_engine_fails_on_requested_call() {
        let mut engine = StubEngine::empty().fail_on_call(2);
        assert!(engine.infer(&tensor()).is_ok());
        assert!(engine.infer(&tensor()).is_err());
        assert!(engine.infer(&tensor()).is_ok());
    }
}
