use std::time::Instant;

/// Millisecond time source for the poller.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

pub struct SystemClock {
    started: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        SystemClock {
            started: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

#[cfg(test)]
#[derive(Clone, Default)]
pub struct ManualClock {
    now: std::rc::Rc<std::cell::Cell<u64>>,
}

#[cfg(test)]
impl ManualClock {
    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get() + ms);
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }
}
