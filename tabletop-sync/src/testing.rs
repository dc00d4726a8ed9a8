//! Test doubles shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex};

use crate::client::{Authority, RequestError};
use crate::protocol::{Ack, RequestBody};

/// An authority that answers requests from a per-operation script and
/// records everything sent to it. Unscripted requests are rejected, so a
/// test only ever observes the outcomes it set up.
pub(crate) struct ScriptedAuthority {
    script: Mutex<HashMap<&'static str, VecDeque<Result<Ack, RequestError>>>>,
    sent: Mutex<Vec<RequestBody>>,
}

impl ScriptedAuthority {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
        })
    }

    /// Queue the outcome for the next request with this wire name.
    pub fn respond(&self, name: &'static str, outcome: Result<Ack, RequestError>) {
        self.script
            .lock()
            .unwrap()
            .entry(name)
            .or_default()
            .push_back(outcome);
    }

    /// Every request body issued so far, in order.
    pub fn sent(&self) -> Vec<RequestBody> {
        self.sent.lock().unwrap().clone()
    }
}

impl Authority for ScriptedAuthority {
    fn request(
        &self,
        body: RequestBody,
    ) -> impl Future<Output = Result<Ack, RequestError>> + Send {
        let outcome = {
            let mut script = self.script.lock().unwrap();
            script.get_mut(body.name()).and_then(VecDeque::pop_front)
        }
        .unwrap_or_else(|| Ok(Ack::rejected("unscripted request")));
        self.sent.lock().unwrap().push(body);
        async move { outcome }
    }
}
