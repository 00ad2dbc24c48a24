use std::collections::BTreeMap;

/// A clip placed on the playback clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledUnit {
    pub id: u64,
    pub start: f64,
    pub duration: f64,
}

impl ScheduledUnit {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// Chains received clips into gapless playback.
///
/// Each clip starts at `max(now, end of the previous clip)`, so clips never
/// overlap and never start in the past.
#[derive(Debug, Default)]
pub struct PlaybackQueue {
    next_start: f64,
    next_id: u64,
    in_flight: BTreeMap<u64, ScheduledUnit>,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, now: f64, duration: f64) -> ScheduledUnit {
        let start = self.next_start.max(now);
        self.next_id += 1;
        let unit = ScheduledUnit {
            id: self.next_id,
            start,
            duration,
        };
        self.next_start = unit.end();
        self.in_flight.insert(unit.id, unit);
        unit
    }

    /// Forgets a unit that finished playing. Unknown ids are ignored.
    pub fn finish(&mut self, id: u64) -> bool {
        self.in_flight.remove(&id).is_some()
    }

    /// Drops every pending unit and rewinds the cursor to the clock origin.
    /// Returns the ids that must be stopped.
    pub fn interrupt(&mut self) -> Vec<u64> {
        self.next_start = 0.0;
        std::mem::take(&mut self.in_flight).into_keys().collect()
    }

    pub fn next_start(&self) -> f64 {
        self.next_start
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}
