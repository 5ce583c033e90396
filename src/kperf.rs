//! The kperf backend for macOS.

use std::ffi::{CStr, CString};
use std::io;
use std::mem::size_of;
use std::os::raw::{c_char, c_int};
use std::ptr::{self, NonNull};

use kpc_sys::{
    kpep_config, kpep_db, kpep_event, LoadError, KPC_MAX_COUNTERS,
    KPEP_CONFIG_ERROR_CONFLICTING_EVENTS, KPEP_CONFIG_ERROR_COUNTERS_NOT_FORCED,
    KPEP_CONFIG_ERROR_CUR_SYSTEM_UNKNOWN, KPEP_CONFIG_ERROR_DB_ARCH_UNSUPPORTED,
    KPEP_CONFIG_ERROR_DB_CORRUPT, KPEP_CONFIG_ERROR_DB_NOT_FOUND,
    KPEP_CONFIG_ERROR_DB_PATH_INVALID, KPEP_CONFIG_ERROR_DB_VERSION_UNSUPPORTED,
    KPEP_CONFIG_ERROR_EVENT_NOT_FOUND, KPEP_CONFIG_ERROR_NONE, KPEP_CONFIG_ERROR_OUT_OF_MEMORY,
    KPEP_EVENT_FLAG_ALL, KPEP_EVENT_FLAG_USER,
};

use crate::backend::Backend;
use crate::class::CounterClass;
use crate::error::{new_error, new_error_with_cause, new_os_error, Error, ErrorKind};
use crate::scope::{Privilege, Scope};

/// A kpep event database handle.
#[derive(Debug)]
pub struct Database(NonNull<kpep_db>);

/// A kpep configuration handle.
#[derive(Debug)]
pub struct Config(NonNull<kpep_config>);

/// An event owned by a [`Database`].
///
/// [`Database`]: struct.Database.html
#[derive(Debug)]
pub struct Event(NonNull<kpep_event>);

/// A description of one event in the current CPU's database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventInfo {
    /// The name to pass as a backend id, such as `"INST_RETIRED.ANY"`.
    pub name: String,
    /// A friendlier alias such as `"Cycles"`, if the database has one.
    pub alias: Option<String>,
    /// The database's description of what the event counts.
    pub description: Option<String>,
    /// Whether the event is served by a fixed counter.
    pub is_fixed: bool,
}

/// Performance counters provided by the `kperf` and `kperfdata` private
/// frameworks.
///
/// ```ignore
/// let kperf = Kperf::load()?;
///
/// for event in kperf.events()? {
///     println!("{}", event.name);
/// }
/// #
/// # Ok::<(), kpc::error::Error>(())
/// ```
#[derive(Debug)]
pub struct Kperf {
    kperf: kpc_sys::Kperf,
    kperfdata: kpc_sys::Kperfdata,
}

impl Kperf {
    /// Load both frameworks and check the counters are accessible.
    ///
    /// Fails with [`PermissionDenied`] unless running as root.
    ///
    /// [`PermissionDenied`]: error/enum.ErrorKind.html#variant.PermissionDenied
    pub fn load() -> Result<Self, Error> {
        let kperf = kpc_sys::Kperf::load().map_err(load_error)?;
        let kperfdata = kpc_sys::Kperfdata::load().map_err(load_error)?;

        let mut forced: c_int = 0;
        if unsafe { (kperf.kpc_force_all_ctrs_get)(&mut forced) } != 0 {
            return Err(new_os_error(ErrorKind::PermissionDenied));
        }

        Ok(Kperf { kperf, kperfdata })
    }

    /// List every event the current CPU's database describes.
    pub fn events(&self) -> Result<Vec<EventInfo>, Error> {
        let db = self.open_current_database()?;
        let events = self.describe_events(&db);
        self.close_database(db);
        events
    }

    fn describe_events(&self, db: &Database) -> Result<Vec<EventInfo>, Error> {
        let mut count = 0;
        check(unsafe { (self.kperfdata.kpep_db_events_count)(db.0.as_ptr(), &mut count) })?;

        let mut events: Vec<*mut kpep_event> = vec![ptr::null_mut(); count];
        check(unsafe {
            (self.kperfdata.kpep_db_events)(
                db.0.as_ptr(),
                events.as_mut_ptr(),
                count * size_of::<*mut kpep_event>(),
            )
        })?;

        Ok(events
            .into_iter()
            .filter_map(NonNull::new)
            .map(|ev| {
                let ev = unsafe { ev.as_ref() };
                EventInfo {
                    name: unsafe { string(ev.name) }.unwrap_or_default(),
                    alias: unsafe { string(ev.alias) },
                    description: unsafe { string(ev.description) },
                    is_fixed: ev.is_fixed != 0,
                }
            })
            .collect())
    }
}

impl Backend for Kperf {
    type Database = Database;
    type Config = Config;
    type Event = Event;

    fn open_current_database(&self) -> Result<Database, Error> {
        // A NULL name selects the database of the running CPU.
        let mut db = ptr::null_mut();
        check(unsafe { (self.kperfdata.kpep_db_create)(ptr::null(), &mut db) })?;
        NonNull::new(db)
            .map(Database)
            .ok_or_else(|| new_error(ErrorKind::DatabaseUnavailable))
    }

    fn close_database(&self, db: Database) {
        unsafe { (self.kperfdata.kpep_db_free)(db.0.as_ptr()) };
    }

    fn lookup_event(&self, db: &Database, name: &str) -> Result<Option<Event>, Error> {
        let c_name = CString::new(name).map_err(|_| new_error(ErrorKind::InvalidEventName))?;

        let mut ev = ptr::null_mut();
        match unsafe { (self.kperfdata.kpep_db_event)(db.0.as_ptr(), c_name.as_ptr(), &mut ev) } {
            KPEP_CONFIG_ERROR_NONE | KPEP_CONFIG_ERROR_EVENT_NOT_FOUND => {
                Ok(NonNull::new(ev).map(Event))
            }
            code => Err(kpep_error(code)),
        }
    }

    fn open_config(&self, db: &Database) -> Result<Config, Error> {
        let mut cfg = ptr::null_mut();
        check(unsafe { (self.kperfdata.kpep_config_create)(db.0.as_ptr(), &mut cfg) })?;
        NonNull::new(cfg)
            .map(Config)
            .ok_or_else(|| new_error(ErrorKind::OutOfMemory))
    }

    fn close_config(&self, config: Config) {
        unsafe { (self.kperfdata.kpep_config_free)(config.0.as_ptr()) };
    }

    fn force_counters(&self, config: &mut Config) -> Result<(), Error> {
        check(unsafe { (self.kperfdata.kpep_config_force_counters)(config.0.as_ptr()) })
    }

    fn add_event(
        &self,
        config: &mut Config,
        event: &Event,
        privilege: Privilege,
    ) -> Result<(), Error> {
        let flag = match privilege {
            Privilege::All => KPEP_EVENT_FLAG_ALL,
            Privilege::UserOnly => KPEP_EVENT_FLAG_USER,
        };

        let mut ev = event.0.as_ptr();
        let mut conflicts: u32 = 0;
        match unsafe {
            (self.kperfdata.kpep_config_add_event)(config.0.as_ptr(), &mut ev, flag, &mut conflicts)
        } {
            KPEP_CONFIG_ERROR_NONE => Ok(()),
            KPEP_CONFIG_ERROR_CONFLICTING_EVENTS => Err(new_error(ErrorKind::ConflictingEvents {
                bitmap: conflicts,
            })),
            code => Err(kpep_error(code)),
        }
    }

    fn read_class_mask(&self, config: &Config) -> Result<CounterClass, Error> {
        let mut classes = 0;
        check(unsafe {
            (self.kperfdata.kpep_config_kpc_classes)(config.0.as_ptr(), &mut classes)
        })?;
        Ok(CounterClass::from_bits_retain(classes))
    }

    fn read_hw_config(&self, config: &Config) -> Result<Vec<u64>, Error> {
        let mut regs = vec![0u64; KPC_MAX_COUNTERS];
        check(unsafe {
            (self.kperfdata.kpep_config_kpc)(
                config.0.as_ptr(),
                regs.as_mut_ptr(),
                regs.len() * size_of::<u64>(),
            )
        })?;
        Ok(regs)
    }

    fn read_counter_map(&self, config: &Config) -> Result<Vec<usize>, Error> {
        let mut count = 0;
        check(unsafe { (self.kperfdata.kpep_config_events_count)(config.0.as_ptr(), &mut count) })?;

        let mut map = vec![0usize; KPC_MAX_COUNTERS];
        check(unsafe {
            (self.kperfdata.kpep_config_kpc_map)(
                config.0.as_ptr(),
                map.as_mut_ptr(),
                map.len() * size_of::<usize>(),
            )
        })?;

        map.truncate(count);
        Ok(map)
    }

    fn acquire_all_counters(&self, acquire: bool) -> Result<(), Error> {
        if unsafe { (self.kperf.kpc_force_all_ctrs_set)(acquire as c_int) } != 0 {
            return Err(kpc_error());
        }
        Ok(())
    }

    fn program_config(&self, classes: CounterClass, config: &[u64]) -> Result<(), Error> {
        if config.len() > KPC_MAX_COUNTERS {
            return Err(new_error(ErrorKind::MalformedResolution));
        }

        // kpc_set_config takes a mutable buffer but only reads it.
        let mut regs = [0u64; KPC_MAX_COUNTERS];
        regs[..config.len()].copy_from_slice(config);

        if unsafe { (self.kperf.kpc_set_config)(classes.bits(), regs.as_mut_ptr()) } != 0 {
            return Err(kpc_error());
        }
        Ok(())
    }

    fn enable_counting(&self, scope: Scope, classes: CounterClass) -> Result<(), Error> {
        let ret = match scope {
            Scope::Global => unsafe { (self.kperf.kpc_set_counting)(classes.bits()) },
            Scope::CurrentThread => unsafe { (self.kperf.kpc_set_thread_counting)(classes.bits()) },
        };
        if ret != 0 {
            return Err(kpc_error());
        }
        Ok(())
    }

    fn read_counters(&self, scope: Scope, buf: &mut [u64]) -> Result<(), Error> {
        if scope != Scope::CurrentThread {
            return Err(new_error(ErrorKind::BadScope));
        }

        // tid 0 is the calling thread.
        let ret = unsafe {
            (self.kperf.kpc_get_thread_counters)(0, buf.len() as u32, buf.as_mut_ptr())
        };
        if ret != 0 {
            return Err(kpc_error());
        }
        Ok(())
    }
}

fn check(code: c_int) -> Result<(), Error> {
    match code {
        KPEP_CONFIG_ERROR_NONE => Ok(()),
        code => Err(kpep_error(code)),
    }
}

fn kpep_error(code: c_int) -> Error {
    let kind = match code {
        KPEP_CONFIG_ERROR_CUR_SYSTEM_UNKNOWN => ErrorKind::UnknownSystem,
        KPEP_CONFIG_ERROR_DB_PATH_INVALID
        | KPEP_CONFIG_ERROR_DB_NOT_FOUND
        | KPEP_CONFIG_ERROR_DB_ARCH_UNSUPPORTED
        | KPEP_CONFIG_ERROR_DB_VERSION_UNSUPPORTED
        | KPEP_CONFIG_ERROR_DB_CORRUPT => ErrorKind::DatabaseUnavailable,
        KPEP_CONFIG_ERROR_OUT_OF_MEMORY => ErrorKind::OutOfMemory,
        KPEP_CONFIG_ERROR_CONFLICTING_EVENTS => ErrorKind::ConflictingEvents { bitmap: 0 },
        KPEP_CONFIG_ERROR_COUNTERS_NOT_FORCED => ErrorKind::CountersUnavailable,
        _ => ErrorKind::Unknown,
    };
    new_error_with_cause(kind, io::Error::new(io::ErrorKind::Other, format!("kpep error {}", code)))
}

// kpc calls are sysctl wrappers and report failure through errno.
fn kpc_error() -> Error {
    let err = io::Error::last_os_error();
    let kind = match err.raw_os_error() {
        Some(libc::EPERM) | Some(libc::EACCES) => ErrorKind::PermissionDenied,
        Some(libc::EBUSY) => ErrorKind::CountersUnavailable,
        _ => ErrorKind::Unknown,
    };
    new_error_with_cause(kind, err)
}

fn load_error(err: LoadError) -> Error {
    match err {
        LoadError::Symbol { name } => new_error(ErrorKind::MissingSymbol(name.to_string())),
        err => new_error_with_cause(
            ErrorKind::LibraryUnavailable,
            io::Error::new(io::ErrorKind::Other, err),
        ),
    }
}

unsafe fn string(p: *const c_char) -> Option<String> {
    if p.is_null() {
        return None;
    }
    Some(CStr::from_ptr(p).to_string_lossy().into_owned())
}
