//! Advisory progress lines emitted while the cache works.

use tracing::debug;

/// Receiver for status lines. Nothing it does feeds back into the cache.
pub trait StatusSink {
    fn report(&mut self, line: usize, message: &str);
}

/// Default sink: forwards status lines to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TraceStatus;

impl StatusSink for TraceStatus {
    fn report(&mut self, line: usize, message: &str) {
        debug!(line, message, "disk video status");
    }
}

impl<F> StatusSink for F
where
    F: FnMut(usize, &str),
{
    fn report(&mut self, line: usize, message: &str) {
        self(line, message)
    }
}

/// Countdown that fires once every `interval` ticks.
#[derive(Debug)]
pub(crate) struct StatusThrottle {
    remaining: u32,
    interval: u32,
}

impl StatusThrottle {
    pub(crate) fn new(interval: u32) -> Self {
        StatusThrottle {
            remaining: interval,
            interval,
        }
    }

    #[inline(always)]
    pub(crate) fn tick(&mut self) -> bool {
        if self.remaining == 0 {
            self.remaining = self.interval;
            return true;
        }
        self.remaining -= 1;
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttle_fires_every_interval_plus_one() {
        let mut throttle = StatusThrottle::new(3);
        let fired: Vec<bool> = (0..8).map(|_| throttle.tick()).collect();
        assert_eq!(
            fired,
            [false, false, false, true, false, false, false, true]
        );
    }

    #[test]
    fn closures_are_sinks() {
        let mut lines = Vec::new();
        {
            let mut sink = |line: usize, msg: &str| lines.push((line, msg.to_string()));
            sink.report(0, "clearing");
        }
        assert_eq!(lines, [(0, "clearing".to_string())]);
    }
}
