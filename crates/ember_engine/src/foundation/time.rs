//! Time management utilities
//!
//! [`Time`] tracks the variable frame delta and a fixed logic tick. The frame
//! loop calls [`Time::frame_start`] and [`Time::frame_end`] around each frame and
//! runs fixed updates while [`Time::logic_update`] reports a pending tick.

use std::time::Instant;

/// Default fixed logic step in seconds
pub const DEFAULT_FIXED_TIME: f64 = 0.05;

/// Frame and fixed-step clock
#[derive(Debug, Clone)]
pub struct Time {
    origin: Instant,
    fixed_time: f64,
    frame_time: f64,
    delta_time: f64,
    next_logic_tick: f64,
    frame: u64,
}

impl Default for Time {
    fn default() -> Self {
        Self::new(DEFAULT_FIXED_TIME)
    }
}

impl Time {
    /// Create a clock with the given fixed logic step
    pub fn new(fixed_time: f64) -> Self {
        Self {
            origin: Instant::now(),
            fixed_time,
            frame_time: 0.0,
            delta_time: 0.0,
            next_logic_tick: 0.0,
            frame: 0,
        }
    }

    /// Seconds elapsed since the clock was created
    pub fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    /// Mark the beginning of a frame
    pub fn frame_start(&mut self) {
        self.frame_time = self.now();
    }

    /// Mark the end of a frame, updating the delta and frame counter
    pub fn frame_end(&mut self) {
        self.delta_time = self.now() - self.frame_time;
        self.frame += 1;
    }

    /// Timestamp of the current frame start
    pub fn frame_time(&self) -> f64 {
        self.frame_time
    }

    /// Duration of the previous frame in seconds
    pub fn delta_time(&self) -> f64 {
        self.delta_time
    }

    /// Fixed logic step in seconds
    pub fn fixed_time(&self) -> f64 {
        self.fixed_time
    }

    /// Number of completed frames
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Consume one fixed logic step
    pub fn logic_tick(&mut self) {
        self.next_logic_tick += self.fixed_time;
    }

    /// Whether a fixed logic step is due
    pub fn logic_update(&self) -> bool {
        self.now() > self.next_logic_tick
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_counter() {
        let mut time = Time::default();
        time.frame_start();
        time.frame_end();
        time.frame_start();
        time.frame_end();
        assert_eq!(time.frame(), 2);
        assert!(time.delta_time() >= 0.0);
    }

    #[test]
    fn test_logic_tick_catches_up() {
        let mut time = Time::new(10.0);
        std::thread::sleep(std::time::Duration::from_millis(1));
        assert!(time.logic_update());
        time.logic_tick();
        assert!(!time.logic_update());
    }
}
