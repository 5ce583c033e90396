use crate::class::CounterClass;
use crate::error::Error;
use crate::scope::{Privilege, Scope};
use crate::MAX_COUNTERS;

/// The hardware counter provider a measurement runs against.
///
/// The handle types are opaque to this crate. Database and configuration
/// handles only live for the duration of event resolution and are always
/// passed back to [`close_database`] / [`close_config`], whether resolution
/// succeeds or not.
///
/// The counting calls ([`acquire_all_counters`], [`program_config`],
/// [`enable_counting`] and [`read_counters`]) act on process-wide hardware
/// state. The crate guarantees only one measurement drives them at a time.
///
/// [`close_database`]: #tymethod.close_database
/// [`close_config`]: #tymethod.close_config
/// [`acquire_all_counters`]: #tymethod.acquire_all_counters
/// [`program_config`]: #tymethod.program_config
/// [`enable_counting`]: #tymethod.enable_counting
/// [`read_counters`]: #tymethod.read_counters
pub trait Backend {
    /// An event database describing the current CPU.
    type Database;
    /// A configuration being built from database events.
    type Config;
    /// A single database event.
    type Event;

    /// The number of physical counter slots a snapshot holds.
    fn counter_count(&self) -> usize {
        MAX_COUNTERS
    }

    /// Open the event database for the running CPU.
    fn open_current_database(&self) -> Result<Self::Database, Error>;

    /// Release a database opened by `open_current_database`.
    fn close_database(&self, db: Self::Database);

    /// Look up an event by its backend name.
    ///
    /// An `Err` is returned only when the lookup itself fails; a name absent
    /// from the database is `Ok(None)`.
    fn lookup_event(&self, db: &Self::Database, name: &str) -> Result<Option<Self::Event>, Error>;

    /// Create an empty configuration over `db`.
    fn open_config(&self, db: &Self::Database) -> Result<Self::Config, Error>;

    /// Release a configuration created by `open_config`.
    fn close_config(&self, config: Self::Config);

    /// Claim every counter for the configuration, including those normally
    /// reserved by other subsystems.
    fn force_counters(&self, config: &mut Self::Config) -> Result<(), Error>;

    /// Add `event` to `config`, counting at `privilege`.
    ///
    /// Fails with `ConflictingEvents` when the event cannot share the counter
    /// bank with those already added.
    fn add_event(
        &self,
        config: &mut Self::Config,
        event: &Self::Event,
        privilege: Privilege,
    ) -> Result<(), Error>;

    /// The union of counter classes the added events need.
    fn read_class_mask(&self, config: &Self::Config) -> Result<CounterClass, Error>;

    /// The configuration register values to program.
    fn read_hw_config(&self, config: &Self::Config) -> Result<Vec<u64>, Error>;

    /// The physical counter slot of each added event, in insertion order.
    fn read_counter_map(&self, config: &Self::Config) -> Result<Vec<usize>, Error>;

    /// Acquire (`true`) or release (`false`) the whole counter bank.
    fn acquire_all_counters(&self, acquire: bool) -> Result<(), Error>;

    /// Write `config` to the counter registers of `classes`.
    fn program_config(&self, classes: CounterClass, config: &[u64]) -> Result<(), Error>;

    /// Enable counting for `classes` at `scope`. An empty mask disables
    /// counting.
    fn enable_counting(&self, scope: Scope, classes: CounterClass) -> Result<(), Error>;

    /// Fill `buf` with the raw counter values for `scope`, indexed by
    /// physical slot.
    fn read_counters(&self, scope: Scope, buf: &mut [u64]) -> Result<(), Error>;
}
