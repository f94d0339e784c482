use chrono::{Datelike, NaiveDateTime, Timelike};

use crate::profile::series::Window;

/// Calendar position of one interval, as used by the profile shapes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Slot {
    /// Sample index within the window.
    pub index: usize,
    /// Absolute timestamp of the sample.
    pub timestamp: NaiveDateTime,
    /// Fractional hour of day in `[0, 24)`.
    pub hour_of_day: f64,
    /// Day of week, Monday = 0.
    pub weekday: u32,
    /// Day of year, 1-based.
    pub day_of_year: u32,
}

impl Slot {
    fn new(index: usize, timestamp: NaiveDateTime) -> Self {
        Self {
            index,
            timestamp,
            hour_of_day: f64::from(timestamp.hour()) + f64::from(timestamp.minute()) / 60.0,
            weekday: timestamp.weekday().num_days_from_monday(),
            day_of_year: timestamp.ordinal(),
        }
    }

    /// Saturday or Sunday.
    pub fn is_weekend(&self) -> bool {
        self.weekday >= 5
    }
}

/// A simulation clock that walks the intervals of a [`Window`].
///
/// # Examples
///
/// ```
/// use community_sim::profile::series::Window;
/// use community_sim::sim::clock::Clock;
///
/// let mut clock = Clock::new(Window::new(Window::default_start(), 3));
/// let mut hours = Vec::new();
///
/// clock.run(|slot| hours.push(slot.hour_of_day));
/// assert_eq!(hours, vec![0.0, 0.25, 0.5]);
/// ```
pub struct Clock {
    /// Window being walked
    window: Window,
    /// Index of the next interval
    current: usize,
}

impl Clock {
    /// Creates a clock positioned at the first interval of `window`.
    pub fn new(window: Window) -> Self {
        Self { window, current: 0 }
    }

    /// Advances the clock by one interval.
    ///
    /// # Returns
    ///
    /// * `Some(slot)` - The interval the clock was positioned on before advancing
    /// * `None` - If every interval of the window has been visited
    pub fn tick(&mut self) -> Option<Slot> {
        if self.current < self.window.num_intervals {
            let index = self.current;
            self.current += 1;
            Some(Slot::new(index, self.window.timestamp(index)))
        } else {
            None
        }
    }

    /// Runs a function for each remaining interval.
    pub fn run(&mut self, mut f: impl FnMut(Slot)) {
        while let Some(slot) = self.tick() {
            f(slot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(n: usize) -> Window {
        Window::new(Window::default_start(), n)
    }

    #[test]
    fn test_tick() {
        let mut clock = Clock::new(window(2));
        assert_eq!(clock.tick().map(|s| s.index), Some(0));
        assert_eq!(clock.tick().map(|s| s.index), Some(1));
        assert!(clock.tick().is_none());
    }

    #[test]
    fn test_empty_clock() {
        let mut clock = Clock::new(window(0));
        let mut was_called = false;
        clock.run(|_| was_called = true);
        assert!(!was_called);
    }

    #[test]
    fn test_calendar_fields() {
        // 2025-01-01 is a Wednesday.
        let mut clock = Clock::new(window(96 * 4 + 1));
        let mut last = None;
        clock.run(|slot| last = Some(slot));
        let last = last.expect("clock should yield slots");
        assert_eq!(last.day_of_year, 5);
        assert_eq!(last.weekday, 6);
        assert!(last.is_weekend());
        assert_eq!(last.hour_of_day, 0.0);
    }
}
