// Copyright 2026 The Zeta Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Fetch-on-miss driver for partially cloned repositories.
//!
//! Some referenced objects may be absent locally and must be obtained from a
//! remote the first time they are used. The promisor wraps an injected
//! transport, verifies that the returned bytes hash to the requested
//! identifier, and hands them to the object store. Concurrent requests for
//! the same identifier are coalesced into a single transport call.

use std::collections::HashMap;
use std::fmt;
use std::fmt::Debug;
use std::sync::Arc;
use std::sync::Condvar;
use std::sync::Mutex;

use thiserror::Error;

use crate::hash_id::HashID;
use crate::hash_id::hash_bytes;

/// Error raised by a [`PromisorTransport`] implementation.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct TransportError(pub Box<dyn std::error::Error + Send + Sync>);

/// The injected remote side of the promisor model.
///
/// Implementations return the complete canonical encoding (header included)
/// of the requested object, or an error.
pub trait PromisorTransport: Send + Sync {
    fn fetch(&self, hash: &HashID, size_hint: Option<u64>) -> Result<Vec<u8>, TransportError>;
}

/// A promisor fetch failed. The message is shared by all coalesced waiters.
#[derive(Clone, Debug, Error)]
#[error("Fetch of object {hash} failed: {reason}")]
pub struct FetchError {
    pub hash: HashID,
    pub reason: String,
}

enum SlotState {
    Pending,
    Done(Result<(), FetchError>),
}

struct FetchSlot {
    state: Mutex<SlotState>,
    cond: Condvar,
}

/// Coalescing fetch driver. At most one transport call is in flight per
/// distinct identifier; all concurrent callers observe the same outcome.
pub struct Promisor {
    transport: Box<dyn PromisorTransport>,
    in_flight: Mutex<HashMap<HashID, Arc<FetchSlot>>>,
}

impl Promisor {
    pub fn new(transport: Box<dyn PromisorTransport>) -> Self {
        Self {
            transport,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Fetches `hash` and installs the verified bytes via `install`.
    ///
    /// The caller that wins the race performs the transport call; losers
    /// block until it completes and then return its outcome. After an `Ok`
    /// return the object is present in the local store (installed either by
    /// this call or by the coalesced leader).
    pub fn fetch(
        &self,
        hash: &HashID,
        size_hint: Option<u64>,
        install: &(dyn Fn(&[u8]) -> Result<(), String> + Sync),
    ) -> Result<(), FetchError> {
        let (slot, leader) = {
            let mut in_flight = self.in_flight.lock().unwrap();
            match in_flight.get(hash) {
                Some(slot) => (slot.clone(), false),
                None => {
                    let slot = Arc::new(FetchSlot {
                        state: Mutex::new(SlotState::Pending),
                        cond: Condvar::new(),
                    });
                    in_flight.insert(*hash, slot.clone());
                    (slot, true)
                }
            }
        };

        if !leader {
            let mut state = slot.state.lock().unwrap();
            while matches!(*state, SlotState::Pending) {
                state = slot.cond.wait(state).unwrap();
            }
            return match &*state {
                SlotState::Done(result) => result.clone(),
                SlotState::Pending => unreachable!(),
            };
        }

        tracing::debug!(hash = %hash, ?size_hint, "promisor fetch");
        let result = self.fetch_and_install(hash, size_hint, install);
        {
            let mut in_flight = self.in_flight.lock().unwrap();
            in_flight.remove(hash);
        }
        let mut state = slot.state.lock().unwrap();
        *state = SlotState::Done(result.clone());
        slot.cond.notify_all();
        result
    }

    fn fetch_and_install(
        &self,
        hash: &HashID,
        size_hint: Option<u64>,
        install: &(dyn Fn(&[u8]) -> Result<(), String> + Sync),
    ) -> Result<(), FetchError> {
        let fetch_error = |reason: String| FetchError {
            hash: *hash,
            reason,
        };
        let bytes = self
            .transport
            .fetch(hash, size_hint)
            .map_err(|err| fetch_error(err.to_string()))?;
        if hash_bytes(&bytes) != *hash {
            return Err(fetch_error(
                "remote returned bytes that do not hash to the requested identifier".to_owned(),
            ));
        }
        install(&bytes).map_err(fetch_error)
    }
}

impl Debug for Promisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promisor").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use super::*;
    use crate::object::Encode as _;
    use crate::object::ObjectKind;
    use crate::object::encode_header;

    struct CountingTransport {
        bytes: Vec<u8>,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl PromisorTransport for Arc<CountingTransport> {
        fn fetch(&self, _hash: &HashID, _size_hint: Option<u64>) -> Result<Vec<u8>, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            Ok(self.bytes.clone())
        }
    }

    fn blob_bytes(contents: &[u8]) -> Vec<u8> {
        let mut bytes = encode_header(ObjectKind::Blob, contents.len() as u64);
        bytes.extend_from_slice(contents);
        bytes
    }

    #[test]
    fn test_simultaneous_reads_trigger_one_transport_call() {
        let bytes = blob_bytes(b"lazy contents");
        let hash = hash_bytes(&bytes);
        let transport = Arc::new(CountingTransport {
            bytes,
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(50),
        });
        let promisor = Arc::new(Promisor::new(Box::new(transport.clone())));
        let installed = Arc::new(Mutex::new(Vec::<Vec<u8>>::new()));

        std::thread::scope(|scope| {
            for _ in 0..8 {
                let promisor = promisor.clone();
                let installed = installed.clone();
                scope.spawn(move || {
                    let install = |bytes: &[u8]| -> Result<(), String> {
                        installed.lock().unwrap().push(bytes.to_vec());
                        Ok(())
                    };
                    promisor.fetch(&hash, None, &install).unwrap();
                });
            }
        });

        // Exactly one transport call, exactly one install; every reader saw Ok.
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        assert_eq!(installed.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_hash_mismatch_is_rejected() {
        let bytes = blob_bytes(b"contents");
        let other_hash = crate::object::Tree::default().hash();
        let transport = Arc::new(CountingTransport {
            bytes,
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        });
        let promisor = Promisor::new(Box::new(transport));
        let install = |_bytes: &[u8]| -> Result<(), String> { Ok(()) };
        let err = promisor.fetch(&other_hash, Some(8), &install).unwrap_err();
        assert!(err.reason.contains("do not hash"));
    }

    #[test]
    fn test_sequential_fetches_are_not_coalesced() {
        let bytes = blob_bytes(b"contents");
        let hash = hash_bytes(&bytes);
        let transport = Arc::new(CountingTransport {
            bytes,
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        });
        let promisor = Promisor::new(Box::new(transport.clone()));
        let install = |_bytes: &[u8]| -> Result<(), String> { Ok(()) };
        promisor.fetch(&hash, None, &install).unwrap();
        // The in-flight table is cleaned up after completion, so a later miss
        // (e.g. after the local object was pruned) fetches again.
        promisor.fetch(&hash, None, &install).unwrap();
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }
}
