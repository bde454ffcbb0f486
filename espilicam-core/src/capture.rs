use std::sync::Arc;

use log::{debug, info, warn};

use crate::coordinator::{CaptureCoordinator, CaptureState};
use crate::error::CaptureError;
use crate::frame::FrameInfo;

/// The camera driver's capture primitive
pub trait FrameSource: Send {
    /// Expose the sensor and write one frame into `buf`
    fn capture(&mut self, buf: &mut [u8]) -> Result<FrameInfo, CaptureError>;
}

/// The only writer of the frame store
pub struct CaptureTask<S> {
    source: S,
    coordinator: Arc<CaptureCoordinator>,
}

impl<S: FrameSource> CaptureTask<S> {
    pub fn new(source: S, coordinator: Arc<CaptureCoordinator>) -> Self {
        Self {
            source,
            coordinator,
        }
    }

    /// Run one loop iteration and return the state it ran in.
    ///
    /// In [`CaptureState::WaitingForRequest`] this blocks until a request
    /// arrives; if movie mode is switched on meanwhile it returns without
    /// capturing and the next iteration free-runs.
    pub fn step(&mut self) -> CaptureState {
        let state = self.coordinator.capture_state();
        match state {
            CaptureState::WaitingForRequest => {
                if let Some(ticket) = self.coordinator.take_request() {
                    let ok = self.capture_once();
                    self.coordinator.complete(ticket, ok);
                }
            }
            CaptureState::FreeRunning => {
                self.capture_once();
            }
        }
        state
    }

    pub fn run(mut self) -> ! {
        info!("Capture task started");
        loop {
            self.step();
        }
    }

    fn capture_once(&mut self) -> bool {
        let source = &mut self.source;
        let result = self
            .coordinator
            .frames()
            .capture_with(|buf| source.capture(buf));

        let ok = match result {
            Ok(sequence) => {
                debug!("Captured frame {}", sequence);
                true
            }
            Err(e) => {
                warn!("Camera capture failed: {}", e);
                false
            }
        };
        self.coordinator.record_capture(ok);
        ok
    }
}
