use log::debug;

use crate::backend::Backend;
use crate::class::CounterClass;
use crate::error::{new_error, Error, ErrorKind};
use crate::events::EventList;
use crate::scope::Privilege;
use crate::MAX_COUNTERS;

/// The hardware configuration derived from an [`EventList`].
///
/// `counter_map()[i]` is the physical counter slot holding the value of the
/// `i`th requested event. Several events may map to the same slot.
///
/// [`EventList`]: struct.EventList.html
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    classes: CounterClass,
    hw_config: Vec<u64>,
    counter_map: Vec<usize>,
}

impl Resolution {
    /// The union of counter classes the events need.
    pub fn classes(&self) -> CounterClass {
        self.classes
    }

    /// Configuration register values, one per counter slot.
    pub fn hw_config(&self) -> &[u64] {
        &self.hw_config
    }

    /// Physical counter slot for each requested event, in request order.
    pub fn counter_map(&self) -> &[usize] {
        &self.counter_map
    }
}

// Closes the database when resolution returns, on every path.
struct DatabaseGuard<'b, B: Backend> {
    backend: &'b B,
    db: Option<B::Database>,
}

impl<'b, B: Backend> DatabaseGuard<'b, B> {
    fn get(&self) -> &B::Database {
        // Only taken in drop.
        self.db.as_ref().unwrap()
    }
}

impl<'b, B: Backend> Drop for DatabaseGuard<'b, B> {
    fn drop(&mut self) {
        if let Some(db) = self.db.take() {
            self.backend.close_database(db);
        }
    }
}

struct ConfigGuard<'b, B: Backend> {
    backend: &'b B,
    config: Option<B::Config>,
}

impl<'b, B: Backend> ConfigGuard<'b, B> {
    fn get(&self) -> &B::Config {
        self.config.as_ref().unwrap()
    }

    fn get_mut(&mut self) -> &mut B::Config {
        self.config.as_mut().unwrap()
    }
}

impl<'b, B: Backend> Drop for ConfigGuard<'b, B> {
    fn drop(&mut self) {
        if let Some(config) = self.config.take() {
            self.backend.close_config(config);
        }
    }
}

/// Resolve `events` against the backend's database for the running CPU.
///
/// Resolution is all or nothing: the first event missing from the database
/// fails the whole call with [`EventNotFound`], and conflicting events fail
/// it with [`ConflictingEvents`]. No counting state is touched; the database
/// and configuration handles are released before returning.
///
/// [`EventNotFound`]: error/enum.ErrorKind.html#variant.EventNotFound
/// [`ConflictingEvents`]: error/enum.ErrorKind.html#variant.ConflictingEvents
pub fn resolve<B: Backend>(
    backend: &B,
    events: &EventList,
    privilege: Privilege,
) -> Result<Resolution, Error> {
    let slots = backend.counter_count().min(MAX_COUNTERS);
    if events.len() > slots {
        return Err(new_error(ErrorKind::CapacityExceeded));
    }

    let db = DatabaseGuard {
        backend,
        db: Some(backend.open_current_database()?),
    };

    // Declared after the database so it is closed first.
    let mut config = ConfigGuard {
        backend,
        config: Some(backend.open_config(db.get())?),
    };

    // Some CPUs refuse events until every counter has been claimed.
    backend.force_counters(config.get_mut())?;

    for request in events {
        let event = match backend.lookup_event(db.get(), request.backend_id())? {
            Some(event) => event,
            None => {
                return Err(new_error(ErrorKind::EventNotFound {
                    label: request.label().to_string(),
                    backend_id: request.backend_id().to_string(),
                }))
            }
        };

        backend.add_event(config.get_mut(), &event, privilege)?;
    }

    let classes = backend.read_class_mask(config.get())?;
    let hw_config = backend.read_hw_config(config.get())?;
    let counter_map = backend.read_counter_map(config.get())?;

    if counter_map.len() != events.len()
        || counter_map
            .iter()
            .any(|&slot| slot >= hw_config.len() || slot >= slots)
    {
        return Err(new_error(ErrorKind::MalformedResolution));
    }

    debug!(
        "resolved {} events: classes={:?} counter_map={:?}",
        events.len(),
        classes,
        counter_map
    );

    Ok(Resolution {
        classes,
        hw_config,
        counter_map,
    })
}
