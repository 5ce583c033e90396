use std::sync::{Mutex, MutexGuard, TryLockError};

use log::{debug, warn};

use crate::backend::Backend;
use crate::class::CounterClass;
use crate::error::{new_error, Error, ErrorKind};
use crate::events::EventList;
use crate::measurement::{Measurement, Snapshot};
use crate::resolve::{resolve, Resolution};
use crate::scope::{Privilege, Scope};
use crate::MAX_COUNTERS;

lazy_static! {
    // The counter bank and its force-acquisition flag are process wide, so
    // only one measurement may hold them at a time.
    static ref ACTIVE_SESSION: Mutex<()> = Mutex::new(());
}

/// Configure measurement parameters.
///
/// Unless specified, events count in every privilege level.
///
/// ```ignore
/// let kperf = Kperf::load()?;
/// let running = Options::default()
///     .privilege(Privilege::UserOnly)
///     .start(&kperf, &events)?;
/// #
/// # Ok::<(), Error>(())
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct Options {
    privilege: Privilege,
}

impl Options {
    /// Select which execution levels the events count in.
    ///
    /// Defaults to [`Privilege::All`].
    ///
    /// [`Privilege::All`]: enum.Privilege.html#variant.All
    pub fn privilege(self, privilege: Privilege) -> Self {
        Self { privilege }
    }

    /// Resolve `events`, program the counters and take the baseline
    /// snapshot.
    ///
    /// Fails with [`SessionActive`] if another measurement is running in
    /// this process. Any resolution error is returned before the hardware is
    /// touched.
    ///
    /// [`SessionActive`]: error/enum.ErrorKind.html#variant.SessionActive
    #[must_use = "counting stops when the handle is dropped"]
    pub fn start<'a, B: Backend>(
        &self,
        backend: &'a B,
        events: &'a EventList,
    ) -> Result<Running<'a, B>, Error> {
        let slot = claim_session()?;

        let resolution = resolve(backend, events, self.privilege)?;
        let classes = resolution.classes();
        let slots = backend.counter_count().min(MAX_COUNTERS);

        debug!("starting measurement of {} events", events.len());

        backend.acquire_all_counters(true)?;

        // From here on, dropping `running` disables counting and releases
        // the counters.
        let mut running = Running {
            backend,
            events,
            resolution,
            before: Snapshot::default(),
            slots,
            finished: false,
            _slot: slot,
        };

        // Don't put anything between these calls: it would be counted.
        let before = &mut running.before.as_mut_slice()[..slots];
        backend
            .program_config(classes, running.resolution.hw_config())
            .and_then(|()| backend.enable_counting(Scope::Global, classes))
            .and_then(|()| backend.enable_counting(Scope::CurrentThread, classes))
            .and_then(|()| backend.read_counters(Scope::CurrentThread, before))?;

        Ok(running)
    }
}

/// Start measuring `events` with the default [`Options`].
///
/// [`Options`]: struct.Options.html
#[must_use = "counting stops when the handle is dropped"]
pub fn start<'a, B: Backend>(
    backend: &'a B,
    events: &'a EventList,
) -> Result<Running<'a, B>, Error> {
    Options::default().start(backend, events)
}

fn claim_session() -> Result<MutexGuard<'static, ()>, Error> {
    match ACTIVE_SESSION.try_lock() {
        Ok(guard) => Ok(guard),
        // A panicking session has already quiesced the hardware in Drop.
        Err(TryLockError::Poisoned(poisoned)) => Ok(poisoned.into_inner()),
        Err(TryLockError::WouldBlock) => Err(new_error(ErrorKind::SessionActive)),
    }
}

/// A handle to a running measurement.
///
/// Counting is per thread: the handle is `!Send` and must be finished on the
/// thread that started it. Dropping the handle without calling [`finish`]
/// stops counting and releases the counters, discarding the result.
///
/// [`finish`]: #method.finish
pub struct Running<'a, B: Backend> {
    backend: &'a B,
    events: &'a EventList,
    resolution: Resolution,
    before: Snapshot,
    slots: usize,
    finished: bool,
    _slot: MutexGuard<'static, ()>,
}

impl<'a, B: Backend> Running<'a, B> {
    /// The resolved hardware configuration of this measurement.
    pub fn resolution(&self) -> &Resolution {
        &self.resolution
    }

    /// The baseline snapshot taken by `start`.
    pub fn before(&self) -> &Snapshot {
        &self.before
    }

    /// The events being measured.
    pub fn events(&self) -> &'a EventList {
        self.events
    }

    /// Stop the measurement and compute the delta of every requested event,
    /// in request order.
    ///
    /// The counters are read before anything else happens. Counting is then
    /// disabled and the counters released, even when the read failed.
    ///
    /// `finish` consumes the handle, so a measurement cannot be finished
    /// twice:
    ///
    /// ```compile_fail
    /// fn twice<B: kpc::Backend>(running: kpc::Running<'_, B>) {
    ///     let _ = running.finish();
    ///     let _ = running.finish();
    /// }
    /// ```
    pub fn finish(mut self) -> Result<Measurement<'a>, Error> {
        let mut after = Snapshot::default();
        let read = self
            .backend
            .read_counters(Scope::CurrentThread, &mut after.as_mut_slice()[..self.slots]);

        self.quiesce();
        read?;

        let measurement = Measurement::compute(
            self.events,
            self.resolution.counter_map(),
            &self.before,
            &after,
        );
        debug!("finished measurement of {} events", measurement.len());

        Ok(measurement)
    }

    // Thread counting stays enabled: the global switch alone stops the
    // counters, and the next `start` reprograms both.
    fn quiesce(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;

        if let Err(e) = self
            .backend
            .enable_counting(Scope::Global, CounterClass::empty())
        {
            warn!("failed to stop counting: {}", e);
        }

        if let Err(e) = self.backend.acquire_all_counters(false) {
            warn!("failed to release counters: {}", e);
        }
    }
}

impl<'a, B: Backend> std::fmt::Debug for Running<'a, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Running")
            .field("resolution", &self.resolution)
            .field("before", &&self.before.as_slice()[..self.slots])
            .field("finished", &self.finished)
            .finish()
    }
}

impl<'a, B: Backend> Drop for Running<'a, B> {
    fn drop(&mut self) {
        self.quiesce();
    }
}
