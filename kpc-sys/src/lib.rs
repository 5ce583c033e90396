//! Raw bindings to the macOS `kperf` and `kperfdata` private frameworks.
//!
//! Neither framework ships headers or link stubs, so every function is
//! resolved at runtime with `dlopen(3)`/`dlsym(3)`. The signatures below are
//! reverse engineered and match the frameworks shipped since macOS 10.13.
//!
//! `kperf` programs and reads the counters (each call is a thin wrapper over a
//! `kpc.*` sysctl and requires root). `kperfdata` describes the events of the
//! current CPU using the plists found in `/usr/share/kpep/`.

#![allow(non_camel_case_types)]
#![allow(non_upper_case_globals)]

extern crate libc;

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int, c_void};
use std::ptr::NonNull;
use std::{error, fmt, mem};

/// The maximum number of counters that can be read from every class in one
/// go.
///
/// ARMV7: FIXED: 1, CONFIGURABLE: 4
/// ARM32: FIXED: 2, CONFIGURABLE: 6
/// ARM64: FIXED: 2, CONFIGURABLE: CORE_NCTRS - FIXED (6 or 8)
/// x86: 32
pub const KPC_MAX_COUNTERS: usize = 32;

pub const KPC_CLASS_FIXED: u32 = 0;
pub const KPC_CLASS_CONFIGURABLE: u32 = 1;
pub const KPC_CLASS_POWER: u32 = 2;
pub const KPC_CLASS_RAWPMU: u32 = 3;

pub const KPC_CLASS_FIXED_MASK: u32 = 1 << KPC_CLASS_FIXED;
pub const KPC_CLASS_CONFIGURABLE_MASK: u32 = 1 << KPC_CLASS_CONFIGURABLE;
pub const KPC_CLASS_POWER_MASK: u32 = 1 << KPC_CLASS_POWER;
pub const KPC_CLASS_RAWPMU_MASK: u32 = 1 << KPC_CLASS_RAWPMU;

/// `kpep_config_add_event()` flag counting all privilege levels.
pub const KPEP_EVENT_FLAG_ALL: u32 = 0;
/// `kpep_config_add_event()` flag counting user space only.
pub const KPEP_EVENT_FLAG_USER: u32 = 1;

// kpep_config_error_code
pub const KPEP_CONFIG_ERROR_NONE: c_int = 0;
pub const KPEP_CONFIG_ERROR_INVALID_ARGUMENT: c_int = 1;
pub const KPEP_CONFIG_ERROR_OUT_OF_MEMORY: c_int = 2;
pub const KPEP_CONFIG_ERROR_IO: c_int = 3;
pub const KPEP_CONFIG_ERROR_BUFFER_TOO_SMALL: c_int = 4;
pub const KPEP_CONFIG_ERROR_CUR_SYSTEM_UNKNOWN: c_int = 5;
pub const KPEP_CONFIG_ERROR_DB_PATH_INVALID: c_int = 6;
pub const KPEP_CONFIG_ERROR_DB_NOT_FOUND: c_int = 7;
pub const KPEP_CONFIG_ERROR_DB_ARCH_UNSUPPORTED: c_int = 8;
pub const KPEP_CONFIG_ERROR_DB_VERSION_UNSUPPORTED: c_int = 9;
pub const KPEP_CONFIG_ERROR_DB_CORRUPT: c_int = 10;
pub const KPEP_CONFIG_ERROR_EVENT_NOT_FOUND: c_int = 11;
pub const KPEP_CONFIG_ERROR_CONFLICTING_EVENTS: c_int = 12;
pub const KPEP_CONFIG_ERROR_COUNTERS_NOT_FORCED: c_int = 13;
pub const KPEP_CONFIG_ERROR_EVENT_UNAVAILABLE: c_int = 14;
pub const KPEP_CONFIG_ERROR_ERRNO: c_int = 15;

pub const KPERF_PATH: &str = "/System/Library/PrivateFrameworks/kperf.framework/kperf";
pub const KPERFDATA_PATH: &str =
    "/System/Library/PrivateFrameworks/kperfdata.framework/kperfdata";

/// Opaque kpep event database.
#[repr(C)]
pub struct kpep_db {
    _private: [u8; 0],
}

/// Opaque kpep configuration.
#[repr(C)]
pub struct kpep_config {
    _private: [u8; 0],
}

/// KPEP event (size: 48/28 bytes on 64/32 bit OS).
#[repr(C)]
#[derive(Debug)]
pub struct kpep_event {
    /// Unique name of the event, such as "INST_RETIRED.ANY".
    pub name: *const c_char,
    pub description: *const c_char,
    /// Currently always NULL.
    pub errata: *const c_char,
    /// Alias name, such as "Instructions", "Cycles".
    pub alias: *const c_char,
    /// Fallback event name for fixed counters.
    pub fallback: *const c_char,
    pub mask: u32,
    pub number: u8,
    pub umask: u8,
    pub reserved: u8,
    pub is_fixed: u8,
}

pub type kpc_set_counting_t = unsafe extern "C" fn(classes: u32) -> c_int;
pub type kpc_set_thread_counting_t = unsafe extern "C" fn(classes: u32) -> c_int;
pub type kpc_set_config_t = unsafe extern "C" fn(classes: u32, config: *mut u64) -> c_int;
pub type kpc_get_thread_counters_t =
    unsafe extern "C" fn(tid: u32, buf_count: u32, buf: *mut u64) -> c_int;
pub type kpc_force_all_ctrs_set_t = unsafe extern "C" fn(val: c_int) -> c_int;
pub type kpc_force_all_ctrs_get_t = unsafe extern "C" fn(val_out: *mut c_int) -> c_int;

pub type kpep_config_create_t =
    unsafe extern "C" fn(db: *mut kpep_db, cfg_ptr: *mut *mut kpep_config) -> c_int;
pub type kpep_config_free_t = unsafe extern "C" fn(cfg: *mut kpep_config);
pub type kpep_config_add_event_t = unsafe extern "C" fn(
    cfg: *mut kpep_config,
    ev_ptr: *mut *mut kpep_event,
    flag: u32,
    err: *mut u32,
) -> c_int;
pub type kpep_config_force_counters_t = unsafe extern "C" fn(cfg: *mut kpep_config) -> c_int;
pub type kpep_config_events_count_t =
    unsafe extern "C" fn(cfg: *mut kpep_config, count_ptr: *mut usize) -> c_int;
pub type kpep_config_kpc_t =
    unsafe extern "C" fn(cfg: *mut kpep_config, buf: *mut u64, buf_size: usize) -> c_int;
pub type kpep_config_kpc_classes_t =
    unsafe extern "C" fn(cfg: *mut kpep_config, classes_ptr: *mut u32) -> c_int;
pub type kpep_config_kpc_map_t =
    unsafe extern "C" fn(cfg: *mut kpep_config, buf: *mut usize, buf_size: usize) -> c_int;
pub type kpep_db_create_t =
    unsafe extern "C" fn(name: *const c_char, db_ptr: *mut *mut kpep_db) -> c_int;
pub type kpep_db_free_t = unsafe extern "C" fn(db: *mut kpep_db);
pub type kpep_db_events_count_t =
    unsafe extern "C" fn(db: *mut kpep_db, count: *mut usize) -> c_int;
pub type kpep_db_events_t =
    unsafe extern "C" fn(db: *mut kpep_db, buf: *mut *mut kpep_event, buf_size: usize) -> c_int;
pub type kpep_db_event_t = unsafe extern "C" fn(
    db: *mut kpep_db,
    name: *const c_char,
    ev_ptr: *mut *mut kpep_event,
) -> c_int;

/// Failure to open a framework or resolve one of its symbols.
#[derive(Debug)]
pub enum LoadError {
    Open { path: &'static str, message: String },
    Symbol { name: &'static str },
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::Open { path, message } => write!(f, "failed to load {}: {}", path, message),
            LoadError::Symbol { name } => write!(f, "missing symbol {}", name),
        }
    }
}

impl error::Error for LoadError {}

/// A `dlopen(3)` handle, closed on drop.
#[derive(Debug)]
pub struct Library {
    handle: NonNull<c_void>,
}

// dlopen handles may be used and closed from any thread.
unsafe impl Send for Library {}
unsafe impl Sync for Library {}

impl Library {
    pub fn open(path: &'static str) -> Result<Self, LoadError> {
        let c_path = CString::new(path).map_err(|_| LoadError::Open {
            path,
            message: "path contains a NUL byte".to_string(),
        })?;

        let handle = unsafe { libc::dlopen(c_path.as_ptr(), libc::RTLD_LAZY) };
        match NonNull::new(handle) {
            Some(handle) => Ok(Library { handle }),
            None => Err(LoadError::Open {
                path,
                message: last_dl_error(),
            }),
        }
    }

    /// Resolve `name` to a function pointer of type `T`.
    ///
    /// # Safety
    ///
    /// `T` must be a function pointer type matching the symbol's real
    /// signature.
    pub unsafe fn symbol<T: Copy>(&self, name: &'static str) -> Result<T, LoadError> {
        debug_assert_eq!(mem::size_of::<T>(), mem::size_of::<*mut c_void>());

        let c_name = CString::new(name).map_err(|_| LoadError::Symbol { name })?;
        let ptr = libc::dlsym(self.handle.as_ptr(), c_name.as_ptr());
        if ptr.is_null() {
            return Err(LoadError::Symbol { name });
        }

        Ok(mem::transmute_copy::<*mut c_void, T>(&ptr))
    }
}

impl Drop for Library {
    fn drop(&mut self) {
        unsafe {
            libc::dlclose(self.handle.as_ptr());
        }
    }
}

fn last_dl_error() -> String {
    let msg = unsafe { libc::dlerror() };
    if msg.is_null() {
        return "unknown dlopen error".to_string();
    }
    unsafe { CStr::from_ptr(msg) }.to_string_lossy().into_owned()
}

macro_rules! framework {
    (
        $(#[$meta:meta])*
        pub struct $table:ident in $path:expr => {
            $($name:ident: $ty:ty,)*
        }
    ) => {
        $(#[$meta])*
        pub struct $table {
            $(pub $name: $ty,)*
            _lib: Library,
        }

        impl $table {
            /// Open the framework and resolve every symbol it is expected to
            /// export.
            pub fn load() -> Result<Self, LoadError> {
                let lib = Library::open($path)?;
                Ok($table {
                    $($name: unsafe { lib.symbol::<$ty>(stringify!($name))? },)*
                    _lib: lib,
                })
            }
        }

        impl fmt::Debug for $table {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($table))
                    .field("lib", &self._lib)
                    .finish()
            }
        }
    };
}

framework! {
    /// `kperf.framework`: counter programming and readout.
    pub struct Kperf in KPERF_PATH => {
        kpc_set_counting: kpc_set_counting_t,
        kpc_set_thread_counting: kpc_set_thread_counting_t,
        kpc_set_config: kpc_set_config_t,
        kpc_get_thread_counters: kpc_get_thread_counters_t,
        kpc_force_all_ctrs_set: kpc_force_all_ctrs_set_t,
        kpc_force_all_ctrs_get: kpc_force_all_ctrs_get_t,
    }
}

framework! {
    /// `kperfdata.framework`: the per-CPU event database. These functions do
    /// not require root.
    pub struct Kperfdata in KPERFDATA_PATH => {
        kpep_config_create: kpep_config_create_t,
        kpep_config_free: kpep_config_free_t,
        kpep_config_add_event: kpep_config_add_event_t,
        kpep_config_force_counters: kpep_config_force_counters_t,
        kpep_config_events_count: kpep_config_events_count_t,
        kpep_config_kpc: kpep_config_kpc_t,
        kpep_config_kpc_classes: kpep_config_kpc_classes_t,
        kpep_config_kpc_map: kpep_config_kpc_map_t,
        kpep_db_create: kpep_db_create_t,
        kpep_db_free: kpep_db_free_t,
        kpep_db_events_count: kpep_db_events_count_t,
        kpep_db_events: kpep_db_events_t,
        kpep_db_event: kpep_db_event_t,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_masks() {
        assert_eq!(KPC_CLASS_FIXED_MASK, 1);
        assert_eq!(KPC_CLASS_CONFIGURABLE_MASK, 2);
        assert_eq!(KPC_CLASS_POWER_MASK, 4);
        assert_eq!(KPC_CLASS_RAWPMU_MASK, 8);
    }

    #[test]
    fn test_open_missing_library() {
        match Library::open("/nonexistent/kpc-sys/libnothing.dylib") {
            Err(LoadError::Open { path, message }) => {
                assert_eq!(path, "/nonexistent/kpc-sys/libnothing.dylib");
                assert!(!message.is_empty());
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn test_frameworks_unavailable() {
        assert!(Kperf::load().is_err());
        assert!(Kperfdata::load().is_err());
    }
}
