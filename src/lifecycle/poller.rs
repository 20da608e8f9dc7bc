use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tracing::debug;

use crate::dom::{Dom, FrameHandle, FrameScheduler, NodeId};

#[derive(Debug, Clone, PartialEq, Eq)]
enum PollState {
    Idle,
    Running {
        frame: FrameHandle,
        last_value: String,
    },
}

/// Re-submits a toy once per animation frame whenever its input value has
/// changed since the previous frame.
pub struct AutoSubmitPoller {
    dom: Rc<dyn Dom>,
    frames: Rc<dyn FrameScheduler>,
    input: NodeId,
    on_change: Box<dyn Fn()>,
    state: RefCell<PollState>,
    this: Weak<AutoSubmitPoller>,
}

impl AutoSubmitPoller {
    pub fn new<F>(
        dom: Rc<dyn Dom>,
        frames: Rc<dyn FrameScheduler>,
        input: NodeId,
        on_change: F,
    ) -> Rc<Self>
    where
        F: Fn() + 'static,
    {
        Rc::new_cyclic(|this| Self {
            dom,
            frames,
            input,
            on_change: Box::new(on_change),
            state: RefCell::new(PollState::Idle),
            this: this.clone(),
        })
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.state.borrow(), PollState::Running { .. })
    }

    /// Mirrors the checkbox: starts polling when checked, stops when not.
    /// Starting twice keeps the existing loop.
    pub fn set_enabled(&self, enabled: bool) {
        if !enabled {
            self.stop();
            return;
        }
        if self.is_running() {
            return;
        }
        let last_value = self.dom.value(self.input);
        let frame = self.schedule();
        *self.state.borrow_mut() = PollState::Running { frame, last_value };
        debug!(target: "poller", input = %self.input, "auto-submit started");
    }

    /// Cancels the outstanding frame, if any.
    pub fn stop(&self) {
        let previous = std::mem::replace(&mut *self.state.borrow_mut(), PollState::Idle);
        if let PollState::Running { frame, .. } = previous {
            self.frames.cancel_frame(frame);
            debug!(target: "poller", input = %self.input, "auto-submit stopped");
        }
    }

    fn schedule(&self) -> FrameHandle {
        let this = self.this.clone();
        self.frames.request_frame(Box::new(move || {
            if let Some(poller) = this.upgrade() {
                poller.on_frame();
            }
        }))
    }

    fn on_frame(&self) {
        let current = self.dom.value(self.input);
        let changed = match &mut *self.state.borrow_mut() {
            PollState::Idle => return,
            PollState::Running { last_value, .. } => {
                if *last_value == current {
                    false
                } else {
                    *last_value = current;
                    true
                }
            }
        };

        if changed {
            (self.on_change)();
        }

        // The submit path may have stopped the poller.
        if !self.is_running() {
            return;
        }
        let next = self.schedule();
        if let PollState::Running { frame, .. } = &mut *self.state.borrow_mut() {
            *frame = next;
        }
    }
}
