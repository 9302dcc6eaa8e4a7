use std::time::Duration;

use common::CancelToken;
use parking_lot::{Condvar, Mutex};

const WAIT_SLICE: Duration = Duration::from_millis(20);

#[derive(Debug)]
struct State {
    permits: usize,
    closed: bool,
}

/// Counting semaphore bounding how many tiles hold pixels at once.
#[derive(Debug)]
pub(crate) struct Semaphore {
    state: Mutex<State>,
    available: Condvar,
}

impl Semaphore {
    pub(crate) fn new(permits: usize) -> Self {
        Self {
            state: Mutex::new(State {
                permits,
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Blocks until a permit is free. Returns `false` once the semaphore is
    /// closed or `stop` fires.
    pub(crate) fn acquire(&self, stop: &CancelToken) -> bool {
        let mut state = self.state.lock();
        loop {
            if state.closed || stop.is_cancelled() {
                return false;
            }
            if state.permits > 0 {
                state.permits -= 1;
                return true;
            }
            self.available.wait_for(&mut state, WAIT_SLICE);
        }
    }

    pub(crate) fn release(&self) {
        self.state.lock().permits += 1;
        self.available.notify_one();
    }

    /// Wakes every waiter; later acquires fail.
    pub(crate) fn close(&self) {
        self.state.lock().closed = true;
        self.available.notify_all();
    }

    pub(crate) fn available(&self) -> usize {
        self.state.lock().permits
    }
}
