//! Per-slave session state.
//!
//! Tracks, for each worker identity, which test is in flight and owns the
//! live resource opened for that test. A slave has at most one test in
//! flight; a second start is refused and leaves the first resource alone.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::domain::{HubError, HubResult};

/// A resource owned by a slave's current test.
pub trait SlaveResource: Send {
    /// Release the resource. Must tolerate being called more than once.
    fn close(&mut self);
}

#[derive(Debug)]
struct SlaveSession<R> {
    test_ident: String,
    in_progress: bool,
    resource: Option<R>,
}

impl<R: SlaveResource> SlaveSession<R> {
    fn release(&mut self) {
        if let Some(mut resource) = self.resource.take() {
            resource.close();
        }
    }
}

/// Session state for every slave seen so far.
#[derive(Debug)]
pub struct SlaveRegistry<R> {
    slaves: Mutex<HashMap<String, SlaveSession<R>>>,
}

impl<R> Default for SlaveRegistry<R> {
    fn default() -> Self {
        Self {
            slaves: Mutex::new(HashMap::new()),
        }
    }
}

impl<R: SlaveResource> SlaveRegistry<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `test_ident` on `slaveid`, opening its resource with `open`.
    ///
    /// Fails with [`HubError::SlaveBusy`] if the slave already has a test in
    /// flight. A resource left over from an unclean finish is closed before
    /// the new one is opened. The slot is reserved under the lock and `open`
    /// runs without it, so other slaves are not held up by slow opens.
    pub fn begin<F, E>(&self, slaveid: &str, test_ident: &str, open: F) -> Result<(), E>
    where
        F: FnOnce() -> Result<R, E>,
        E: From<HubError>,
    {
        let leftover = {
            let mut slaves = self.lock();
            let session = slaves
                .entry(slaveid.to_string())
                .or_insert_with(|| SlaveSession {
                    test_ident: String::new(),
                    in_progress: false,
                    resource: None,
                });
            if session.in_progress {
                return Err(HubError::SlaveBusy {
                    slaveid: slaveid.to_string(),
                    in_flight: session.test_ident.clone(),
                    requested: test_ident.to_string(),
                }
                .into());
            }
            session.test_ident = test_ident.to_string();
            session.in_progress = true;
            session.resource.take()
        };
        if let Some(mut resource) = leftover {
            resource.close();
        }

        let opened = open();

        let orphan = {
            let mut slaves = self.lock();
            let session = slaves
                .get_mut(slaveid)
                .filter(|session| session.in_progress && session.test_ident == test_ident);
            match (opened, session) {
                (Ok(resource), Some(session)) => {
                    session.resource = Some(resource);
                    debug!(slaveid, test_ident, "Slave started test");
                    None
                }
                (Ok(resource), None) => Some(resource),
                (Err(e), session) => {
                    if let Some(session) = session {
                        session.in_progress = false;
                    }
                    return Err(e);
                }
            }
        };
        if let Some(mut resource) = orphan {
            debug!(slaveid, test_ident, "Test finished while its resource was opening");
            resource.close();
        }
        Ok(())
    }

    /// Mark the slave idle and close its resource. Returns the finished test.
    pub fn finish(&self, slaveid: &str) -> HubResult<String> {
        let mut slaves = self.lock();
        let Some(session) = slaves.get_mut(slaveid) else {
            warn!(slaveid, "Finish for a slave that never started a test");
            return Err(HubError::UnknownSlave(slaveid.to_string()));
        };
        session.in_progress = false;
        session.release();
        Ok(session.test_ident.clone())
    }

    /// Run `f` against the slave's open resource, if it has one.
    pub fn with_resource<T>(&self, slaveid: &str, f: impl FnOnce(&mut R) -> T) -> Option<T> {
        self.lock()
            .get_mut(slaveid)
            .and_then(|session| session.resource.as_mut())
            .map(f)
    }

    pub fn in_progress(&self, slaveid: &str) -> bool {
        self.lock()
            .get(slaveid)
            .is_some_and(|session| session.in_progress)
    }

    /// Test currently in flight on `slaveid`.
    pub fn current_test(&self, slaveid: &str) -> Option<String> {
        self.lock()
            .get(slaveid)
            .filter(|session| session.in_progress)
            .map(|session| session.test_ident.clone())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SlaveSession<R>>> {
        self.slaves.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
