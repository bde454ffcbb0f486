//! Capture handshake between the HTTP consumers and the capture task.
//!
//! A consumer calls [`CaptureCoordinator::request_capture`] and then
//! [`CaptureCoordinator::wait_for_completion`]; the capture task takes the
//! request, captures into the [`FrameStore`] and reports completion. Requests
//! are not queued: several requests issued before the task picks one up are
//! served by a single capture.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use espilicam_shared::CameraStatus;
use log::{debug, info};

use crate::frame::{Frame, FrameStore};

/// Loop state of the capture task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// Movie mode off: every capture is triggered by a request
    WaitingForRequest,
    /// Movie mode on: capture continuously, nobody is waiting
    FreeRunning,
}

/// Result of the capture a consumer waited for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// A new frame was published
    Fresh,
    /// The capture failed, the previous frame is still current
    Stale,
}

#[derive(Debug)]
struct Handshake {
    /// Movie mode as last switched by [`CaptureCoordinator::set_movie_mode`]
    movie_mode: bool,
    /// Live [`MovieModeGuard`]s. Movie mode only runs while this is zero.
    suspended: usize,
    request_pending: bool,
    /// Requests accepted so far
    requested: u64,
    /// Requests whose capture attempt has finished
    served: u64,
    last_capture_ok: bool,
}

impl Handshake {
    fn free_running(&self) -> bool {
        self.movie_mode && self.suspended == 0
    }
}

pub struct CaptureCoordinator {
    frames: FrameStore,
    state: Mutex<Handshake>,
    requested: Condvar,
    completed: Condvar,
    frames_captured: AtomicU64,
    capture_failures: AtomicU64,
}

impl CaptureCoordinator {
    pub fn new(frames: FrameStore) -> Self {
        Self {
            frames,
            // Nothing outstanding: the startup frame counts as complete
            state: Mutex::new(Handshake {
                movie_mode: false,
                suspended: 0,
                request_pending: false,
                requested: 0,
                served: 0,
                last_capture_ok: true,
            }),
            requested: Condvar::new(),
            completed: Condvar::new(),
            frames_captured: AtomicU64::new(0),
            capture_failures: AtomicU64::new(0),
        }
    }

    pub fn frames(&self) -> &FrameStore {
        &self.frames
    }

    /// Snapshot of the most recently published frame
    pub fn latest_frame(&self) -> Arc<Frame> {
        self.frames.latest()
    }

    /// Ask the capture task for a fresh frame. Never blocks.
    pub fn request_capture(&self) {
        let mut state = self.lock();
        if !state.request_pending {
            state.request_pending = true;
            state.requested += 1;
        }
        self.requested.notify_one();
    }

    /// Block until every request issued before this call has been served
    pub fn wait_for_completion(&self) -> CaptureOutcome {
        let state = self.lock();
        let target = state.requested;
        let state = self
            .completed
            .wait_while(state, |s| s.served < target)
            .unwrap_or_else(PoisonError::into_inner);

        if state.last_capture_ok {
            CaptureOutcome::Fresh
        } else {
            CaptureOutcome::Stale
        }
    }

    /// Request a capture and wait for it
    pub fn capture_now(&self) -> CaptureOutcome {
        self.request_capture();
        self.wait_for_completion()
    }

    /// Switch movie mode. Returns `false` and does nothing if the mode is already `enabled`.
    ///
    /// The capture task observes the change on its next loop iteration. While a
    /// [`MovieModeGuard`] is alive the switch is recorded but free-running only
    /// starts once the last guard is dropped.
    pub fn set_movie_mode(&self, enabled: bool) -> bool {
        let mut state = self.lock();
        if state.movie_mode == enabled {
            return false;
        }
        let was_running = state.free_running();
        state.movie_mode = enabled;
        if state.free_running() != was_running {
            self.requested.notify_all();
        }
        let suspended = state.suspended;
        drop(state);

        info!(
            "Movie mode {}{}",
            if enabled { "on" } else { "off" },
            if suspended > 0 { ", suspended while requests are served" } else { "" }
        );
        true
    }

    /// Whether the capture task free-runs, i.e. movie mode is on and not suspended
    pub fn is_movie_mode_on(&self) -> bool {
        self.lock().free_running()
    }

    /// Hold movie mode off until the returned guard is dropped.
    ///
    /// Guards nest and may be dropped in any order; movie mode resumes once
    /// none is left and the mode is still switched on at that point.
    pub fn suspend_movie_mode(&self) -> MovieModeGuard<'_> {
        let mut state = self.lock();
        state.suspended += 1;
        debug!("Movie mode suspended ({} active)", state.suspended);
        MovieModeGuard { coordinator: self }
    }

    fn resume_movie_mode(&self) {
        let mut state = self.lock();
        state.suspended = state.suspended.saturating_sub(1);
        if state.free_running() {
            self.requested.notify_all();
            drop(state);
            debug!("Movie mode resumed");
        }
    }

    pub fn status(&self) -> CameraStatus {
        let frame = self.latest_frame();
        CameraStatus {
            geometry: frame.geometry(),
            movie_mode: self.is_movie_mode_on(),
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            capture_failures: self.capture_failures.load(Ordering::Relaxed),
            sequence: frame.sequence(),
            frame_len: frame.len(),
        }
    }

    pub(crate) fn capture_state(&self) -> CaptureState {
        if self.is_movie_mode_on() {
            CaptureState::FreeRunning
        } else {
            CaptureState::WaitingForRequest
        }
    }

    /// Block until a request arrives or movie mode is switched on.
    ///
    /// Returns the request ticket, or `None` when woken by movie mode.
    pub(crate) fn take_request(&self) -> Option<u64> {
        let state = self.lock();
        let mut state = self
            .requested
            .wait_while(state, |s| !s.request_pending && !s.free_running())
            .unwrap_or_else(PoisonError::into_inner);

        if state.request_pending {
            state.request_pending = false;
            Some(state.requested)
        } else {
            None
        }
    }

    pub(crate) fn complete(&self, ticket: u64, ok: bool) {
        let mut state = self.lock();
        state.served = state.served.max(ticket);
        state.last_capture_ok = ok;
        self.completed.notify_all();
    }

    pub(crate) fn record_capture(&self, ok: bool) {
        let counter = if ok {
            &self.frames_captured
        } else {
            &self.capture_failures
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn lock(&self) -> MutexGuard<'_, Handshake> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Keeps movie mode suspended, see [`CaptureCoordinator::suspend_movie_mode`]
pub struct MovieModeGuard<'a> {
    coordinator: &'a CaptureCoordinator,
}

impl Drop for MovieModeGuard<'_> {
    fn drop(&mut self) {
        self.coordinator.resume_movie_mode();
    }
}
