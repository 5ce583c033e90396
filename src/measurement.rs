use std::fmt;

use crate::events::EventList;
use crate::MAX_COUNTERS;

/// Raw counter values indexed by physical counter slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    values: [u64; MAX_COUNTERS],
}

impl Default for Snapshot {
    fn default() -> Self {
        Snapshot {
            values: [0; MAX_COUNTERS],
        }
    }
}

impl Snapshot {
    /// Build a snapshot from a slice of slot values. Slots past the end of
    /// `values` read as zero; values past [`MAX_COUNTERS`] are ignored.
    ///
    /// [`MAX_COUNTERS`]: constant.MAX_COUNTERS.html
    pub fn from_slice(values: &[u64]) -> Self {
        let mut s = Snapshot::default();
        let n = values.len().min(MAX_COUNTERS);
        s.values[..n].copy_from_slice(&values[..n]);
        s
    }

    /// The raw value of counter `slot`.
    pub fn get(&self, slot: usize) -> Option<u64> {
        self.values.get(slot).copied()
    }

    /// Every slot, including those the backend never wrote.
    pub fn as_slice(&self) -> &[u64] {
        &self.values
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [u64] {
        &mut self.values
    }
}

/// The counted value of one requested event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delta<'e> {
    /// The label the event was pushed with.
    pub label: &'e str,
    /// Counter increments between the two snapshots.
    pub value: u64,
}

/// Per-event deltas of a finished measurement, in request order.
///
/// ```ignore
/// # use kpc::{EventList, Kperf};
/// let kperf = Kperf::load()?;
///
/// let mut events = EventList::new();
/// events.push("cycles", "FIXED_CYCLES")?;
///
/// let running = kpc::start(&kperf, &events)?;
/// // measured code
/// let measurement = running.finish()?;
///
/// println!("{}", measurement);
/// println!("cycles: {:?}", measurement.get("cycles"));
/// #
/// # Ok::<(), kpc::error::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Measurement<'e> {
    deltas: Vec<Delta<'e>>,
}

impl<'e> Measurement<'e> {
    /// Attribute the difference between two snapshots back to the requested
    /// events through `counter_map`.
    ///
    /// Counters are monotonic, so the subtraction wraps instead of failing.
    pub(crate) fn compute(
        events: &'e EventList,
        counter_map: &[usize],
        before: &Snapshot,
        after: &Snapshot,
    ) -> Self {
        let deltas = events
            .iter()
            .zip(counter_map)
            .map(|(event, &slot)| Delta {
                label: event.label(),
                value: after.values[slot].wrapping_sub(before.values[slot]),
            })
            .collect();

        Measurement { deltas }
    }

    /// The delta of the first event pushed with `label`.
    pub fn get(&self, label: &str) -> Option<u64> {
        self.deltas
            .iter()
            .find(|d| d.label == label)
            .map(|d| d.value)
    }

    /// The number of deltas, one per requested event.
    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    /// Whether the measurement had no events.
    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    /// Iterate the deltas in request order.
    pub fn iter(&self) -> std::slice::Iter<'_, Delta<'e>> {
        self.deltas.iter()
    }

    /// The deltas in request order.
    pub fn as_slice(&self) -> &[Delta<'e>] {
        &self.deltas
    }
}

impl<'a, 'e> IntoIterator for &'a Measurement<'e> {
    type Item = &'a Delta<'e>;
    type IntoIter = std::slice::Iter<'a, Delta<'e>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'e> fmt::Display for Measurement<'e> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for d in &self.deltas {
            writeln!(f, "{:>16} {}", d.value, d.label)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events(labels: &[&str]) -> EventList {
        let mut events = EventList::new();
        for label in labels {
            events.push(*label, "ANY").unwrap();
        }
        events
    }

    #[test]
    fn test_compute_fixed_counters() {
        let events = events(&["cycles", "instructions"]);
        let before = Snapshot::from_slice(&[1000, 500]);
        let after = Snapshot::from_slice(&[1050, 501]);

        let m = Measurement::compute(&events, &[0, 1], &before, &after);

        assert_eq!(
            m.as_slice(),
            &[
                Delta {
                    label: "cycles",
                    value: 50
                },
                Delta {
                    label: "instructions",
                    value: 1
                },
            ]
        );
    }

    #[test]
    fn test_compute_follows_counter_map() {
        let events = events(&["branches", "cycles"]);
        let before = Snapshot::from_slice(&[100, 0, 7]);
        let after = Snapshot::from_slice(&[160, 0, 9]);

        let m = Measurement::compute(&events, &[2, 0], &before, &after);

        assert_eq!(m.get("branches"), Some(2));
        assert_eq!(m.get("cycles"), Some(60));
    }

    #[test]
    fn test_compute_aliased_slot() {
        let events = events(&["a", "b"]);
        let before = Snapshot::from_slice(&[0, 0, 10]);
        let after = Snapshot::from_slice(&[0, 0, 40]);

        let m = Measurement::compute(&events, &[2, 2], &before, &after);

        let values: Vec<_> = m.iter().map(|d| (d.label, d.value)).collect();
        assert_eq!(values, [("a", 30), ("b", 30)]);
    }

    #[test]
    fn test_compute_wraps() {
        let events = events(&["cycles"]);
        let before = Snapshot::from_slice(&[u64::MAX - 1]);
        let after = Snapshot::from_slice(&[3]);

        let m = Measurement::compute(&events, &[0], &before, &after);
        assert_eq!(m.get("cycles"), Some(5));
    }

    #[test]
    fn test_display() {
        let events = events(&["cycles", "instructions"]);
        let before = Snapshot::from_slice(&[0, 0]);
        let after = Snapshot::from_slice(&[1234, 5]);

        let m = Measurement::compute(&events, &[0, 1], &before, &after);
        assert_eq!(
            m.to_string(),
            "            1234 cycles\n               5 instructions\n"
        );
    }

    #[test]
    fn test_snapshot_from_long_slice() {
        let values: Vec<u64> = (0..40).collect();
        let s = Snapshot::from_slice(&values);
        assert_eq!(s.get(MAX_COUNTERS - 1), Some(MAX_COUNTERS as u64 - 1));
        assert_eq!(s.get(MAX_COUNTERS), None);
    }
}
