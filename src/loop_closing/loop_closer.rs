//! LoopCloser - Main loop closing thread.
//!
//! This module implements the loop closing thread that:
//! 1. Receives keyframe ids once they are inserted in the shared map
//! 2. Detects loop candidates using the keyframe database
//! 3. Checks temporal consistency across consecutive keyframes
//! 4. Publishes consistent loops on an output channel

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::atlas::map::KeyFrameId;
use crate::system::SharedState;

use super::detector::{detect_loop_candidates, ConsistencyChecker, LoopCandidate, LoopDetectorConfig};

/// Timeout for receiving keyframes from the channel.
const RECV_TIMEOUT: Duration = Duration::from_millis(100);

/// Configuration for the LoopCloser.
#[derive(Debug, Clone, Default)]
pub struct LoopCloserConfig {
    /// Loop detection configuration.
    pub detector: LoopDetectorConfig,
}

/// Statistics for the loop closer.
#[derive(Debug, Default, Clone)]
pub struct LoopCloserStats {
    /// Number of keyframes processed.
    pub keyframes_processed: usize,

    /// Number of keyframes skipped because a loop was detected recently.
    pub keyframes_skipped: usize,

    /// Number of loop candidates detected.
    pub candidates_detected: usize,

    /// Number of temporally consistent loops published.
    pub loops_detected: usize,
}

/// The LoopCloser thread handler.
pub struct LoopCloser {
    /// Shared state with other threads.
    shared: Arc<SharedState>,

    /// Configuration.
    config: LoopCloserConfig,

    /// Consistency checker for temporal validation.
    consistency_checker: ConsistencyChecker,

    /// Keyframe of the last published loop.
    last_loop_kf_id: KeyFrameId,

    /// Where consistent loops are published.
    loop_sender: Sender<LoopCandidate>,

    /// Statistics.
    stats: LoopCloserStats,
}

impl LoopCloser {
    /// Create a new LoopCloser.
    pub fn new(shared: Arc<SharedState>, loop_sender: Sender<LoopCandidate>, config: LoopCloserConfig) -> Self {
        let consistency_checker = ConsistencyChecker::new(&config.detector);

        Self {
            shared,
            config,
            consistency_checker,
            last_loop_kf_id: KeyFrameId::new(0),
            loop_sender,
            stats: LoopCloserStats::default(),
        }
    }

    /// Run the main loop closing thread.
    ///
    /// This function blocks and processes keyframes until the channel is closed
    /// or shutdown is requested.
    pub fn run(&mut self, kf_receiver: Receiver<KeyFrameId>) -> LoopCloserStats {
        tracing::info!("LoopCloser thread started");

        loop {
            // Check for shutdown
            if self.shared.is_shutdown_requested() {
                break;
            }

            // Receive keyframe with timeout
            match kf_receiver.recv_timeout(RECV_TIMEOUT) {
                Ok(kf_id) => {
                    self.process_keyframe(kf_id);
                }
                Err(RecvTimeoutError::Timeout) => {
                    continue;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    tracing::info!("LoopCloser channel disconnected");
                    break;
                }
            }
        }

        tracing::info!(
            "LoopCloser thread exiting. Stats: processed={}, skipped={}, candidates={}, loops={}",
            self.stats.keyframes_processed,
            self.stats.keyframes_skipped,
            self.stats.candidates_detected,
            self.stats.loops_detected
        );

        self.stats.clone()
    }

    /// Process a single keyframe for loop detection.
    ///
    /// Returns the loop published for this keyframe, if any.
    pub fn process_keyframe(&mut self, kf_id: KeyFrameId) -> Option<LoopCandidate> {
        self.stats.keyframes_processed += 1;

        // Skip keyframes too close to the last detected loop
        let gap = self.config.detector.min_keyframes_between_detections;
        if kf_id.0 < self.last_loop_kf_id.0 + gap {
            self.stats.keyframes_skipped += 1;
            return None;
        }

        // Step 1: Detect loop candidates
        let candidates = detect_loop_candidates(
            kf_id,
            &self.shared.map,
            &self.shared.keyframe_db,
            &self.config.detector,
        );

        self.stats.candidates_detected += candidates.len();

        // Step 2: Check temporal consistency. An empty candidate list still
        // advances the history so stale detections age out.
        let candidate = self.consistency_checker.add_and_check(kf_id, &candidates)?;

        tracing::info!(
            "Loop detected: {} -> {} (score: {:.3})",
            candidate.current_kf_id,
            candidate.loop_kf_id,
            candidate.bow_score
        );

        self.stats.loops_detected += 1;
        self.last_loop_kf_id = kf_id;

        // Step 3: Publish
        if self.loop_sender.send(candidate.clone()).is_err() {
            tracing::debug!("Loop receiver dropped, discarding {} -> {}", candidate.current_kf_id, candidate.loop_kf_id);
        }

        Some(candidate)
    }

    /// Get current statistics.
    pub fn stats(&self) -> &LoopCloserStats {
        &self.stats
    }
}

/// Spawn the loop closer thread.
///
/// Returns a handle to the spawned thread, which yields the final statistics.
pub fn spawn_loop_closer(
    shared: Arc<SharedState>,
    kf_receiver: Receiver<KeyFrameId>,
    loop_sender: Sender<LoopCandidate>,
    config: LoopCloserConfig,
) -> anyhow::Result<thread::JoinHandle<LoopCloserStats>> {
    thread::Builder::new()
        .name("loop_closer".into())
        .spawn(move || {
            let mut loop_closer = LoopCloser::new(shared, loop_sender, config);
            loop_closer.run(kf_receiver)
        })
        .context("Failed to spawn loop closer thread")
}
