#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use kpc::error::{Error, ErrorKind};
use kpc::{Backend, CounterClass, Privilege, Scope};

lazy_static::lazy_static! {
    static ref SERIAL: Mutex<()> = Mutex::new(());
}

/// Sessions share one process-wide slot, so tests starting them must not run
/// concurrently.
pub fn serial() -> MutexGuard<'static, ()> {
    SERIAL.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    OpenDatabase,
    OpenConfig,
    ForceCounters,
    AddEvent,
    ReadHwConfig,
    ProgramConfig,
    EnableCounting,
    ReadCounters,
    AcquireAll,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    OpenDatabase,
    CloseDatabase,
    Lookup(String),
    OpenConfig,
    CloseConfig,
    ForceCounters,
    AddEvent(String, Privilege),
    ReadClassMask,
    ReadHwConfig,
    ReadCounterMap,
    AcquireAll(bool),
    ProgramConfig(u32, Vec<u64>),
    EnableCounting(Scope, u32),
    ReadCounters(Scope),
}

impl Call {
    /// Calls that touch the counting hardware rather than the database.
    pub fn is_hardware(&self) -> bool {
        matches!(
            self,
            Call::AcquireAll(_)
                | Call::ProgramConfig(..)
                | Call::EnableCounting(..)
                | Call::ReadCounters(_)
        )
    }
}

/// An in-memory counter provider that records every call it receives.
///
/// Events resolve to the slot given in the catalog; each `read_counters`
/// returns the next queued snapshot.
pub struct MockBackend {
    catalog: HashMap<String, usize>,
    classes: CounterClass,
    hw_config: Vec<u64>,
    counter_count: usize,
    counter_map: Option<Vec<usize>>,
    conflict: Option<u32>,
    failures: HashMap<Op, ErrorKind>,
    snapshots: RefCell<VecDeque<Vec<u64>>>,
    calls: RefCell<Vec<Call>>,
}

impl MockBackend {
    pub fn new() -> Self {
        let catalog = [
            ("FIXED_CYCLES", 0),
            ("FIXED_INSTRUCTIONS", 1),
            ("INST_BRANCH", 2),
            ("BRANCH_MISPRED_NONSPEC", 3),
            ("INST_BRANCH_CALL", 4),
        ]
        .iter()
        .map(|(name, slot)| (name.to_string(), *slot))
        .collect();

        MockBackend {
            catalog,
            classes: CounterClass::FIXED | CounterClass::CONFIGURABLE,
            hw_config: vec![0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88],
            counter_count: kpc::MAX_COUNTERS,
            counter_map: None,
            conflict: None,
            failures: HashMap::new(),
            snapshots: RefCell::new(VecDeque::new()),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn with_event(mut self, name: &str, slot: usize) -> Self {
        self.catalog.insert(name.to_string(), slot);
        self
    }

    pub fn with_snapshots(self, before: &[u64], after: &[u64]) -> Self {
        self.push_snapshot(before);
        self.push_snapshot(after);
        self
    }

    pub fn with_hw_config(mut self, hw_config: Vec<u64>) -> Self {
        self.hw_config = hw_config;
        self
    }

    pub fn with_counter_count(mut self, count: usize) -> Self {
        self.counter_count = count;
        self
    }

    pub fn with_counter_map(mut self, map: Vec<usize>) -> Self {
        self.counter_map = Some(map);
        self
    }

    pub fn with_conflict(mut self, bitmap: u32) -> Self {
        self.conflict = Some(bitmap);
        self
    }

    pub fn failing(mut self, op: Op, kind: ErrorKind) -> Self {
        self.failures.insert(op, kind);
        self
    }

    pub fn push_snapshot(&self, values: &[u64]) {
        self.snapshots.borrow_mut().push_back(values.to_vec());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn hardware_calls(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_hardware).collect()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }

    fn maybe_fail(&self, op: Op) -> Result<(), Error> {
        match self.failures.get(&op) {
            Some(kind) => Err(kind.clone().into()),
            None => Ok(()),
        }
    }
}

impl Backend for MockBackend {
    type Database = ();
    type Config = Vec<usize>;
    type Event = (String, usize);

    fn counter_count(&self) -> usize {
        self.counter_count
    }

    fn open_current_database(&self) -> Result<(), Error> {
        self.record(Call::OpenDatabase);
        self.maybe_fail(Op::OpenDatabase)
    }

    fn close_database(&self, _db: ()) {
        self.record(Call::CloseDatabase);
    }

    fn lookup_event(&self, _db: &(), name: &str) -> Result<Option<(String, usize)>, Error> {
        self.record(Call::Lookup(name.to_string()));
        Ok(self
            .catalog
            .get(name)
            .map(|&slot| (name.to_string(), slot)))
    }

    fn open_config(&self, _db: &()) -> Result<Vec<usize>, Error> {
        self.record(Call::OpenConfig);
        self.maybe_fail(Op::OpenConfig)?;
        Ok(Vec::new())
    }

    fn close_config(&self, _config: Vec<usize>) {
        self.record(Call::CloseConfig);
    }

    fn force_counters(&self, _config: &mut Vec<usize>) -> Result<(), Error> {
        self.record(Call::ForceCounters);
        self.maybe_fail(Op::ForceCounters)
    }

    fn add_event(
        &self,
        config: &mut Vec<usize>,
        event: &(String, usize),
        privilege: Privilege,
    ) -> Result<(), Error> {
        self.record(Call::AddEvent(event.0.clone(), privilege));
        self.maybe_fail(Op::AddEvent)?;
        config.push(event.1);

        match self.conflict {
            Some(bitmap) if config.len() > 1 => {
                Err(ErrorKind::ConflictingEvents { bitmap }.into())
            }
            _ => Ok(()),
        }
    }

    fn read_class_mask(&self, _config: &Vec<usize>) -> Result<CounterClass, Error> {
        self.record(Call::ReadClassMask);
        Ok(self.classes)
    }

    fn read_hw_config(&self, _config: &Vec<usize>) -> Result<Vec<u64>, Error> {
        self.record(Call::ReadHwConfig);
        self.maybe_fail(Op::ReadHwConfig)?;
        Ok(self.hw_config.clone())
    }

    fn read_counter_map(&self, config: &Vec<usize>) -> Result<Vec<usize>, Error> {
        self.record(Call::ReadCounterMap);
        Ok(self.counter_map.clone().unwrap_or_else(|| config.clone()))
    }

    fn acquire_all_counters(&self, acquire: bool) -> Result<(), Error> {
        self.record(Call::AcquireAll(acquire));
        self.maybe_fail(Op::AcquireAll)
    }

    fn program_config(&self, classes: CounterClass, config: &[u64]) -> Result<(), Error> {
        self.record(Call::ProgramConfig(classes.bits(), config.to_vec()));
        self.maybe_fail(Op::ProgramConfig)
    }

    fn enable_counting(&self, scope: Scope, classes: CounterClass) -> Result<(), Error> {
        self.record(Call::EnableCounting(scope, classes.bits()));
        self.maybe_fail(Op::EnableCounting)
    }

    fn read_counters(&self, scope: Scope, buf: &mut [u64]) -> Result<(), Error> {
        self.record(Call::ReadCounters(scope));
        self.maybe_fail(Op::ReadCounters)?;

        let values = self
            .snapshots
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| Error::from(ErrorKind::Unknown))?;
        for (dst, src) in buf.iter_mut().zip(values) {
            *dst = src;
        }
        Ok(())
    }
}
