use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use tokio::time::{interval, Duration, MissedTickBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameHandle(u64);

pub type FrameCallback = Box<dyn FnOnce()>;

/// Animation-frame scheduling, one callback per request.
pub trait FrameScheduler {
    fn request_frame(&self, callback: FrameCallback) -> FrameHandle;
    fn cancel_frame(&self, handle: FrameHandle);
}

/// Frame scheduler advanced either by hand ([`FrameClock::tick`]) or by a
/// tokio interval ([`FrameClock::drive`]).
pub struct FrameClock {
    next_handle: Cell<u64>,
    pending: RefCell<BTreeMap<FrameHandle, FrameCallback>>,
    fired: Cell<u64>,
    cancelled: Cell<u64>,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameClock {
    pub fn new() -> Self {
        Self {
            next_handle: Cell::new(1),
            pending: RefCell::new(BTreeMap::new()),
            fired: Cell::new(0),
            cancelled: Cell::new(0),
        }
    }

    /// Runs every frame that was pending when the tick started. Frames
    /// requested from inside a callback wait for the next tick.
    pub fn tick(&self) -> usize {
        let due: Vec<FrameHandle> = self.pending.borrow().keys().copied().collect();
        let mut ran = 0;
        for handle in due {
            let callback = self.pending.borrow_mut().remove(&handle);
            if let Some(callback) = callback {
                callback();
                ran += 1;
            }
        }
        self.fired.set(self.fired.get() + ran as u64);
        ran
    }

    pub fn pending_frames(&self) -> usize {
        self.pending.borrow().len()
    }

    pub fn fired_frames(&self) -> u64 {
        self.fired.get()
    }

    pub fn cancelled_frames(&self) -> u64 {
        self.cancelled.get()
    }

    /// Ticks forever at `period`. Meant to be spawned on a `LocalSet`.
    pub async fn drive(self: Rc<Self>, period: Duration) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            self.tick();
        }
    }

    pub fn clear_all(&self) {
        let mut pending = self.pending.borrow_mut();
        self.cancelled
            .set(self.cancelled.get() + pending.len() as u64);
        pending.clear();
    }
}

impl FrameScheduler for FrameClock {
    fn request_frame(&self, callback: FrameCallback) -> FrameHandle {
        let handle = FrameHandle(self.next_handle.get());
        self.next_handle.set(handle.0 + 1);
        self.pending.borrow_mut().insert(handle, callback);
        handle
    }

    fn cancel_frame(&self, handle: FrameHandle) {
        if self.pending.borrow_mut().remove(&handle).is_some() {
            self.cancelled.set(self.cancelled.get() + 1);
        }
    }
}

impl Drop for FrameClock {
    fn drop(&mut self) {
        self.clear_all();
    }
}
