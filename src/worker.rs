//! The capture loop worker.
//!
//! One dedicated thread runs capture -> encode -> publish on a timed cadence
//! until stopped. Cancellation is cooperative: the loop checks a
//! `ShutdownToken` at the top of every iteration, and the inter-iteration
//! sleep waits on the same token so a stop request interrupts it immediately.
//!
//! The capture source is released exactly once on every exit path (normal
//! fall-through, frame limit, fault-policy exhaustion, panic): the worker
//! holds it in a scoped guard with a one-shot flag, and the slot is closed on
//! exit so blocked readers return.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};

use crate::encode::JpegEncoder;
use crate::slot::SharedSlot;
use crate::source::DisplaySource;

/// What the loop does when a single capture or encode attempt fails.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaultPolicy {
    /// Any iteration failure ends the loop with that error.
    Fatal,
    /// Log and skip the failed iteration; end the loop only after this many
    /// consecutive failures.
    Retry { max_consecutive: u32 },
}

impl Default for FaultPolicy {
    fn default() -> Self {
        FaultPolicy::Retry { max_consecutive: 5 }
    }
}

/// Capture loop settings.
#[derive(Clone, Copy, Debug)]
pub struct CaptureConfig {
    /// Sleep between iterations, in milliseconds. The sole pacing mechanism.
    pub delay_ms: u64,
    /// Stop after this many published frames (`None` = run until stopped).
    pub frame_limit: Option<u64>,
    pub fault_policy: FaultPolicy,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            delay_ms: 1000,
            frame_limit: None,
            fault_policy: FaultPolicy::default(),
        }
    }
}

/// Counters reported by the worker when it exits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub frames_published: u64,
    pub errors: u64,
}

/// Cooperative stop signal shared between the worker and any number of
/// stop requesters.
///
/// `trigger` is idempotent and safe to call concurrently; `sleep_for` is an
/// interruptible sleep that returns early the moment the token fires.
#[derive(Debug, Default)]
pub struct ShutdownToken {
    triggered: Mutex<bool>,
    wake: Condvar,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown and wake any sleeper.
    pub fn trigger(&self) {
        let mut triggered = self
            .triggered
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *triggered = true;
        self.wake.notify_all();
    }

    pub fn is_triggered(&self) -> bool {
        *self
            .triggered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep for `duration` unless triggered first.
    ///
    /// Returns `true` when the full duration elapsed, `false` when the sleep
    /// was cut short (or preempted) by a trigger.
    pub fn sleep_for(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut triggered = self
            .triggered
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while !*triggered {
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            let (guard, _) = self
                .wake
                .wait_timeout(triggered, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            triggered = guard;
        }
        false
    }
}

/// Scoped ownership of the capture source with one-shot release.
struct SourceGuard {
    source: DisplaySource,
    released: bool,
}

impl SourceGuard {
    fn new(source: DisplaySource) -> Self {
        Self {
            source,
            released: false,
        }
    }

    fn source_mut(&mut self) -> &mut DisplaySource {
        &mut self.source
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        log::debug!("releasing capture source");
        self.source.close();
    }
}

impl Drop for SourceGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// Closes the slot when the worker exits, whatever the exit path, so blocked
/// readers return instead of waiting on a dead producer.
struct SlotCloser<'a>(&'a SharedSlot);

impl Drop for SlotCloser<'_> {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// The capture -> encode -> publish worker.
pub struct CaptureLoop {
    source: DisplaySource,
    encoder: JpegEncoder,
    slot: Arc<SharedSlot>,
    config: CaptureConfig,
}

impl CaptureLoop {
    pub fn new(
        source: DisplaySource,
        encoder: JpegEncoder,
        slot: Arc<SharedSlot>,
        config: CaptureConfig,
    ) -> Self {
        Self {
            source,
            encoder,
            slot,
            config,
        }
    }

    /// Start the dedicated worker thread.
    pub fn spawn(self) -> Result<CaptureHandle> {
        let shutdown = Arc::new(ShutdownToken::new());
        let token = shutdown.clone();
        let join = std::thread::Builder::new()
            .name("screenfeed-capture".to_string())
            .spawn(move || self.run(&token))
            .context("spawn capture worker thread")?;
        Ok(CaptureHandle {
            shutdown,
            join: Some(join),
        })
    }

    fn run(self, shutdown: &ShutdownToken) -> Result<LoopStats> {
        let CaptureLoop {
            source,
            encoder,
            slot,
            config,
        } = self;

        let mut guard = SourceGuard::new(source);
        let closer = SlotCloser(&slot);
        let result = Self::run_iterations(&mut guard, &encoder, &slot, &config, shutdown);
        guard.release();
        drop(closer);

        match &result {
            Ok(stats) => log::info!(
                "capture loop exited: {} frames published, {} errors",
                stats.frames_published,
                stats.errors
            ),
            Err(err) => log::error!("capture loop failed: {:#}", err),
        }
        result
    }

    fn run_iterations(
        guard: &mut SourceGuard,
        encoder: &JpegEncoder,
        slot: &SharedSlot,
        config: &CaptureConfig,
        shutdown: &ShutdownToken,
    ) -> Result<LoopStats> {
        let mut stats = LoopStats::default();
        let mut consecutive_failures = 0u32;

        loop {
            if shutdown.is_triggered() {
                break;
            }

            match Self::capture_and_encode(guard.source_mut(), encoder) {
                Ok(bytes) => {
                    consecutive_failures = 0;
                    let seq = slot.publish(bytes);
                    stats.frames_published += 1;
                    log::trace!("published frame {}", seq);
                }
                Err(err) => {
                    stats.errors += 1;
                    match config.fault_policy {
                        FaultPolicy::Fatal => {
                            return Err(err.context("capture iteration failed"));
                        }
                        FaultPolicy::Retry { max_consecutive } => {
                            consecutive_failures += 1;
                            log::warn!(
                                "capture iteration failed ({} of {} consecutive): {:#}",
                                consecutive_failures,
                                max_consecutive,
                                err
                            );
                            if consecutive_failures >= max_consecutive {
                                return Err(err.context(format!(
                                    "giving up after {} consecutive capture failures",
                                    consecutive_failures
                                )));
                            }
                        }
                    }
                }
            }

            if let Some(limit) = config.frame_limit {
                if stats.frames_published >= limit {
                    log::debug!("frame limit {} reached", limit);
                    break;
                }
            }

            if !shutdown.sleep_for(Duration::from_millis(config.delay_ms)) {
                break;
            }
        }

        Ok(stats)
    }

    fn capture_and_encode(source: &mut DisplaySource, encoder: &JpegEncoder) -> Result<Vec<u8>> {
        let frame = source.capture()?;
        encoder.encode(&frame)
    }
}

/// Handle to a running capture worker.
pub struct CaptureHandle {
    shutdown: Arc<ShutdownToken>,
    join: Option<JoinHandle<Result<LoopStats>>>,
}

impl CaptureHandle {
    /// Shared token, e.g. for a signal handler. Triggering it stops the loop.
    pub fn shutdown_token(&self) -> Arc<ShutdownToken> {
        self.shutdown.clone()
    }

    /// Request a stop without waiting. Safe to call any number of times.
    pub fn request_stop(&self) {
        self.shutdown.trigger();
    }

    /// True once the worker thread has exited.
    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Request a stop and wait for the worker to exit.
    pub fn stop(mut self) -> Result<LoopStats> {
        self.shutdown.trigger();
        let join = self
            .join
            .take()
            .ok_or_else(|| anyhow!("capture worker already joined"))?;
        join.join()
            .map_err(|_| anyhow!("capture worker panicked"))?
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        // A dropped handle must not leave the worker running forever.
        self.shutdown.trigger();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn sleep_completes_when_not_triggered() {
        let token = ShutdownToken::new();
        assert!(token.sleep_for(Duration::from_millis(10)));
        assert!(!token.is_triggered());
    }

    #[test]
    fn triggered_token_skips_sleep() {
        let token = ShutdownToken::new();
        token.trigger();
        let start = Instant::now();
        assert!(!token.sleep_for(Duration::from_secs(60)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn trigger_interrupts_sleep_from_another_thread() {
        let token = Arc::new(ShutdownToken::new());
        let sleeper = token.clone();
        let start = Instant::now();
        let worker = std::thread::spawn(move || sleeper.sleep_for(Duration::from_secs(60)));

        std::thread::sleep(Duration::from_millis(20));
        token.trigger();
        token.trigger(); // idempotent

        assert!(!worker.join().unwrap());
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn zero_duration_sleep_still_observes_trigger() {
        let token = ShutdownToken::new();
        assert!(token.sleep_for(Duration::ZERO));
        token.trigger();
        assert!(!token.sleep_for(Duration::ZERO));
    }
}
