#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// `Scope` defines which counting state a hardware call applies to.
pub enum Scope {
	/// `Global` counting is the machine-wide enable switch.
	///
	/// This requires the user to be root.
	Global,

	/// `CurrentThread` counters accumulate only while the calling thread is
	/// scheduled.
	///
	/// Counter snapshots are always read at this scope.
	CurrentThread,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// `Privilege` selects which execution levels an event counts in.
pub enum Privilege {
	/// Count in every privilege level, kernel included.
	#[default]
	All,

	/// Count user space execution only.
	UserOnly,
}
