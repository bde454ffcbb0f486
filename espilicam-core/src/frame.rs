//! Double-buffered frame storage.
//!
//! The capture task fills the spare buffer while HTTP handlers read the
//! published one; publishing is a single atomic pointer swap, so a reader
//! holding an [`Arc<Frame>`] never sees a partially overwritten frame.

use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;
use espilicam_shared::FrameGeometry;
use log::debug;

use crate::error::{CaptureError, Error};

/// What a capture wrote into the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub len: usize,
    pub geometry: FrameGeometry,
}

/// One captured frame
#[derive(Debug)]
pub struct Frame {
    data: Vec<u8>,
    len: usize,
    geometry: FrameGeometry,
    sequence: u64,
}

impl Frame {
    fn blank(capacity: usize, geometry: FrameGeometry) -> Option<Self> {
        let mut data = Vec::new();
        data.try_reserve_exact(capacity).ok()?;
        data.resize(capacity, 0);
        let len = geometry.raw_byte_size().unwrap_or(0).min(capacity);
        Some(Self {
            data,
            len,
            geometry,
            sequence: 0,
        })
    }

    /// Valid bytes of the frame
    pub fn data(&self) -> &[u8] {
        &self.data[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    /// 0 for the blank startup frame, then increasing by one per published capture
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Bytes of scanline `row`, or `None` past the last row or past the valid data
    pub fn scanline(&self, row: usize) -> Option<&[u8]> {
        let stride = self.geometry.width as usize * self.geometry.format.bytes_per_pixel()?;
        let start = row.checked_mul(stride)?;
        self.data().get(start..start.checked_add(stride)?)
    }
}

pub struct FrameStore {
    front: ArcSwap<Frame>,
    spare: Mutex<Option<Arc<Frame>>>,
    capacity: usize,
}

impl FrameStore {
    /// Allocate both buffers. Failure here is fatal for the firmware.
    pub fn new(capacity: usize, geometry: FrameGeometry) -> Result<Self, Error> {
        let front = Frame::blank(capacity, geometry).ok_or(Error::FrameBufferAlloc(capacity))?;
        let spare = Frame::blank(capacity, geometry).ok_or(Error::FrameBufferAlloc(capacity))?;

        Ok(Self {
            front: ArcSwap::from_pointee(front),
            spare: Mutex::new(Some(Arc::new(spare))),
            capacity,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Snapshot of the most recently published frame
    pub fn latest(&self) -> Arc<Frame> {
        self.front.load_full()
    }

    /// Fill the spare buffer with `fill` and publish it.
    ///
    /// On failure nothing is published and the current frame stays in place.
    /// Returns the sequence number of the published frame.
    pub fn capture_with<F>(&self, fill: F) -> Result<u64, CaptureError>
    where
        F: FnOnce(&mut [u8]) -> Result<FrameInfo, CaptureError>,
    {
        let mut spare = self.spare.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.front.load();

        let mut back = match spare.take().map(Arc::try_unwrap) {
            Some(Ok(frame)) => frame,
            Some(Err(_shared)) => {
                debug!("Spare frame still held by a reader, allocating a new one");
                self.allocate(current.geometry)?
            }
            None => self.allocate(current.geometry)?,
        };

        let info = match fill(back.data.as_mut_slice()) {
            Ok(info) => info,
            Err(e) => {
                *spare = Some(Arc::new(back));
                return Err(e);
            }
        };
        if info.len > self.capacity {
            *spare = Some(Arc::new(back));
            return Err(CaptureError::FrameTooLarge {
                needed: info.len,
                capacity: self.capacity,
            });
        }

        let sequence = current.sequence + 1;
        back.len = info.len;
        back.geometry = info.geometry;
        back.sequence = sequence;
        drop(current);

        let previous = self.front.swap(Arc::new(back));
        *spare = Some(previous);
        Ok(sequence)
    }

    fn allocate(&self, geometry: FrameGeometry) -> Result<Frame, CaptureError> {
        Frame::blank(self.capacity, geometry).ok_or(CaptureError::OutOfMemory(self.capacity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use espilicam_shared::PixelFormat;

    fn geometry() -> FrameGeometry {
        FrameGeometry::new(4, 2, PixelFormat::Rgb565)
    }

    fn fill_with(value: u8) -> impl FnOnce(&mut [u8]) -> Result<FrameInfo, CaptureError> {
        move |buf: &mut [u8]| {
            buf[..16].fill(value);
            Ok(FrameInfo {
                len: 16,
                geometry: geometry(),
            })
        }
    }

    #[test]
    fn test_startup_frame_is_blank() {
        let store = FrameStore::new(16, geometry()).unwrap();
        let frame = store.latest();
        assert_eq!(frame.sequence(), 0);
        assert_eq!(frame.len(), 16);
        assert!(frame.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_publish_increments_sequence() {
        let store = FrameStore::new(16, geometry()).unwrap();
        assert_eq!(store.capture_with(fill_with(1)).unwrap(), 1);
        assert_eq!(store.capture_with(fill_with(2)).unwrap(), 2);

        let frame = store.latest();
        assert_eq!(frame.sequence(), 2);
        assert!(frame.data().iter().all(|&b| b == 2));
    }

    #[test]
    fn test_reader_snapshot_survives_later_captures() {
        let store = FrameStore::new(16, geometry()).unwrap();
        store.capture_with(fill_with(7)).unwrap();
        let held = store.latest();

        // Two more captures: the second one would reuse `held` if it were free
        store.capture_with(fill_with(8)).unwrap();
        store.capture_with(fill_with(9)).unwrap();

        assert_eq!(held.sequence(), 1);
        assert!(held.data().iter().all(|&b| b == 7));
        assert!(store.latest().data().iter().all(|&b| b == 9));
    }

    #[test]
    fn test_failed_capture_keeps_previous_frame() {
        let store = FrameStore::new(16, geometry()).unwrap();
        store.capture_with(fill_with(5)).unwrap();

        let result = store.capture_with(|buf: &mut [u8]| {
            buf.fill(0xFF);
            Err(CaptureError::NoFrameBuffer)
        });
        assert!(matches!(result, Err(CaptureError::NoFrameBuffer)));

        let frame = store.latest();
        assert_eq!(frame.sequence(), 1);
        assert!(frame.data().iter().all(|&b| b == 5));
    }

    #[test]
    fn test_oversized_frame_is_rejected() {
        let store = FrameStore::new(16, geometry()).unwrap();
        let result = store.capture_with(|_buf: &mut [u8]| {
            Ok(FrameInfo {
                len: 17,
                geometry: geometry(),
            })
        });
        assert!(matches!(
            result,
            Err(CaptureError::FrameTooLarge {
                needed: 17,
                capacity: 16
            })
        ));
        assert_eq!(store.latest().sequence(), 0);
    }

    #[test]
    fn test_scanline_bounds() {
        let store = FrameStore::new(16, geometry()).unwrap();
        let frame = store.latest();
        assert_eq!(frame.scanline(0).map(<[u8]>::len), Some(8));
        assert_eq!(frame.scanline(1).map(<[u8]>::len), Some(8));
        assert!(frame.scanline(2).is_none());
        assert!(frame.scanline(usize::MAX / 8).is_none());
        assert!(frame.scanline(usize::MAX).is_none());
    }

    #[test]
    fn test_unreasonable_capacity_fails_allocation() {
        let result = FrameStore::new(usize::MAX, geometry());
        assert!(matches!(result, Err(Error::FrameBufferAlloc(_))));
    }
}
