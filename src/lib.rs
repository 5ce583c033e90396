#![warn(missing_docs)]

//! `kpc-rs` measures Performance Monitor Counter deltas across a region of
//! code.
//!
//! PMCs are part of the CPU hardware and count micro-architectural events
//! such as cycles, retired instructions, branches and branch mispredictions.
//! Event names are specific to each CPU and are resolved through the
//! backend's event database; the counters are programmed for the calling
//! thread, read immediately before and after the measured region, and the
//! difference is reported per requested event.
//!
//! ```ignore
//! use kpc::{EventList, Kperf};
//!
//! let kperf = Kperf::load()?;
//!
//! let mut events = EventList::new();
//! events.push("cycles", "FIXED_CYCLES")?;
//! events.push("instructions", "FIXED_INSTRUCTIONS")?;
//! events.push("branch misses", "BRANCH_MISPRED_NONSPEC")?;
//!
//! let running = kpc::start(&kperf, &events)?;
//! // code to measure
//! let measurement = running.finish()?;
//!
//! print!("{}", measurement);
//! #
//! # Ok::<(), kpc::error::Error>(())
//! ```
//!
//! On macOS the [`Kperf`] backend uses the `kperf` and `kperfdata` private
//! frameworks and requires root. Other counter sources can be plugged in by
//! implementing [`Backend`].
//!
//! [`Kperf`]: struct.Kperf.html
//! [`Backend`]: trait.Backend.html

#[macro_use]
extern crate lazy_static;
extern crate libc;

pub mod error;

mod scope;
pub use self::scope::{Privilege, Scope};

mod class;
pub use self::class::CounterClass;

mod events;
pub use self::events::{EventList, EventRequest};

mod backend;
pub use self::backend::Backend;

mod resolve;
pub use self::resolve::{resolve, Resolution};

mod measurement;
pub use self::measurement::{Delta, Measurement, Snapshot};

mod session;
pub use self::session::{start, Options, Running};

#[cfg(target_os = "macos")]
pub mod kperf;
#[cfg(target_os = "macos")]
pub use self::kperf::Kperf;

/// The largest number of counters read in one snapshot, and so the largest
/// number of events a single measurement can request.
pub const MAX_COUNTERS: usize = 32;
