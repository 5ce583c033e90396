use bitflags::bitflags;

bitflags! {
    /// Counter classes, enabled and disabled together.
    ///
    /// A resolved event set reports the union of the classes its events
    /// need; passing an empty mask to the backend stops counting.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CounterClass: u32 {
        /// Counters permanently wired to one event, such as cycles.
        const FIXED        = 1 << 0;
        /// Counters programmed through a configuration word.
        const CONFIGURABLE = 1 << 1;
        /// Counters shared with the power manager.
        const POWER        = 1 << 2;
        /// Raw PMU access.
        const RAWPMU       = 1 << 3;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_bits_retained() {
        let classes = CounterClass::from_bits_retain(0b1_0011);
        assert!(classes.contains(CounterClass::FIXED | CounterClass::CONFIGURABLE));
        assert_eq!(classes.bits(), 0b1_0011);
    }

    #[test]
    fn test_empty_stops_counting() {
        assert_eq!(CounterClass::empty().bits(), 0);
        assert!(CounterClass::empty().is_empty());
    }
}
