use arrayvec::ArrayVec;

use crate::error::{new_error, Error, ErrorKind};
use crate::MAX_COUNTERS;

/// A single requested event.
///
/// `label` is only ever used for reporting; `backend_id` is the name looked
/// up in the backend's event database, such as `"FIXED_CYCLES"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRequest {
    label: String,
    backend_id: String,
}

impl EventRequest {
    /// The name reported alongside the delta.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The event name in the backend's database.
    pub fn backend_id(&self) -> &str {
        &self.backend_id
    }
}

/// An ordered list of events to measure.
///
/// Insertion order is significant: deltas are reported in the order events
/// were pushed. The list never grows past [`MAX_COUNTERS`], the size of the
/// physical counter bank.
///
/// ```
/// use kpc::EventList;
///
/// let mut events = EventList::new();
/// events.push("cycles", "FIXED_CYCLES")?;
/// events.push("instructions", "FIXED_INSTRUCTIONS")?;
///
/// assert_eq!(events.len(), 2);
/// #
/// # Ok::<(), kpc::error::Error>(())
/// ```
///
/// [`MAX_COUNTERS`]: constant.MAX_COUNTERS.html
#[derive(Debug, Clone, Default)]
pub struct EventList {
    requests: ArrayVec<EventRequest, MAX_COUNTERS>,
}

impl EventList {
    /// An empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event.
    ///
    /// Fails with [`CapacityExceeded`] once the list holds [`MAX_COUNTERS`]
    /// requests.
    ///
    /// [`CapacityExceeded`]: error/enum.ErrorKind.html#variant.CapacityExceeded
    /// [`MAX_COUNTERS`]: constant.MAX_COUNTERS.html
    pub fn push(
        &mut self,
        label: impl Into<String>,
        backend_id: impl Into<String>,
    ) -> Result<(), Error> {
        self.requests
            .try_push(EventRequest {
                label: label.into(),
                backend_id: backend_id.into(),
            })
            .map_err(|_| new_error(ErrorKind::CapacityExceeded))
    }

    /// The number of requested events.
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Whether no events were requested.
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// The `index`th request, in push order.
    pub fn get(&self, index: usize) -> Option<&EventRequest> {
        self.requests.get(index)
    }

    /// Iterate the requests in push order.
    pub fn iter(&self) -> std::slice::Iter<'_, EventRequest> {
        self.requests.iter()
    }
}

impl<'a> IntoIterator for &'a EventList {
    type Item = &'a EventRequest;
    type IntoIter = std::slice::Iter<'a, EventRequest>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_preserves_order() {
        let mut events = EventList::new();
        events.push("cycles", "FIXED_CYCLES").unwrap();
        events.push("instructions", "FIXED_INSTRUCTIONS").unwrap();
        events.push("branches", "INST_BRANCH").unwrap();

        let labels: Vec<_> = events.iter().map(EventRequest::label).collect();
        assert_eq!(labels, ["cycles", "instructions", "branches"]);
        assert_eq!(events.get(1).unwrap().backend_id(), "FIXED_INSTRUCTIONS");
    }

    #[test]
    fn test_push_past_capacity() {
        let mut events = EventList::new();
        for i in 0..MAX_COUNTERS {
            events.push(format!("event {}", i), "FIXED_CYCLES").unwrap();
        }

        assert_eq!(
            events.push("one too many", "FIXED_CYCLES").unwrap_err().kind(),
            &ErrorKind::CapacityExceeded
        );
        assert_eq!(events.len(), MAX_COUNTERS);
    }

    #[test]
    fn test_empty() {
        let events = EventList::new();
        assert!(events.is_empty());
        assert!(events.get(0).is_none());
    }
}
