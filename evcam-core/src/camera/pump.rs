//! The acquisition thread: polls the events stream and feeds callbacks.

use super::realtime::{sub_buffer_bytes, RealTimeEmulator};
use super::session::{RunThreadStatus, Session};
use crate::error::CameraError;
use crate::facility::WaitResult;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How the main loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopExit {
    /// Stopped on request or end of stream.
    Finished,
    TransferFailed,
}

/// Releases `start()` and clears the running state if the acquisition
/// thread unwinds, e.g. from a panicking callback.
struct UnwindGuard<'a>(&'a Session);

impl Drop for UnwindGuard<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            warn!("Acquisition thread panicked, stopping acquisition");
            self.0.set_is_running(false);
            self.0.mark_pump_started();
        }
    }
}

#[derive(Debug, Default)]
struct Timings {
    poll: Duration,
    process: Duration,
    raw_bytes: usize,
}

impl Session {
    /// Body of the acquisition thread.
    pub(crate) fn run(&self) {
        {
            let mut run = self.run_thread.lock();
            while run.status != RunThreadStatus::Started {
                self.run_thread_cond.wait(&mut run);
            }
            run.status = RunThreadStatus::Running;
        }
        self.run_thread_cond.notify_all();

        let _guard = UnwindGuard(self);
        self.stream.start();
        if let Some(control) = &self.device_control {
            control.start();
            control.reset();
        }

        let mut timings = Timings::default();
        let exit = self.main_loop(&mut timings);
        self.end_run(exit);

        if self.config.print_timings {
            let raw_events = timings.raw_bytes / self.decoder.lock().raw_event_size_bytes().max(1);
            info!(
                poll_ms = timings.poll.as_millis() as u64,
                process_ms = timings.process.as_millis() as u64,
                raw_events,
                "Acquisition timings"
            );
        }
    }

    fn main_loop(&self, timings: &mut Timings) -> LoopExit {
        self.mark_pump_started();

        let mut emulator = RealTimeEmulator::new(self.decoder.lock().last_timestamp());
        let sub_buffer = sub_buffer_bytes(self.decoder.lock().raw_event_size_bytes());
        let emulate = self.from_file && self.emulate_real_time;

        while self.is_running() {
            let polled_at = Instant::now();
            let result = self.stream.wait_next_buffer();
            timings.poll += polled_at.elapsed();

            match result {
                WaitResult::Failed => return LoopExit::TransferFailed,
                WaitResult::EndOfStream => {
                    debug!("Events stream ended");
                    return LoopExit::Finished;
                }
                WaitResult::Empty => continue,
                WaitResult::Ready(_) => {}
            }

            let processed_at = Instant::now();
            let data = self.stream.latest_raw_data();
            timings.raw_bytes += data.len();

            if emulate {
                for chunk in data.chunks(sub_buffer) {
                    if !self.is_running() {
                        break;
                    }
                    // pacing needs the decoded timestamps, callbacks or not
                    self.decode(chunk);
                    self.callbacks.dispatch_raw_data(chunk);

                    let decoded = self.last_timestamp.load(Ordering::SeqCst);
                    if let Some(delay) = emulator.delay(decoded, Instant::now()) {
                        thread::sleep(delay);
                    }
                }
            } else {
                if self.callbacks.has_decode_callbacks() {
                    self.decode(&data);
                }
                self.callbacks.dispatch_raw_data(&data);
            }
            timings.process += processed_at.elapsed();
        }
        LoopExit::Finished
    }

    fn decode(&self, raw: &[u8]) {
        let mut decoder = self.decoder.lock();
        let mut sink = &self.callbacks;
        decoder.decode(raw, &mut sink);
        self.last_timestamp
            .store(decoder.last_timestamp(), Ordering::SeqCst);
    }

    fn end_run(&self, exit: LoopExit) {
        if exit == LoopExit::TransferFailed {
            warn!("Data transfer failed, stopping acquisition");
            self.callbacks
                .notify_runtime_error(&CameraError::DataTransferFailed);
        }
        self.set_is_running(false);
        // a pump that ends before its loop still releases start()
        self.mark_pump_started();
    }
}
