//! One-shot initialization gate for lazy proxies
//!
//! ```text
//! Uninitialized(f) --begin--> Initializing --complete--> Initialized
//!        ^                                      |
//!        +------ failed, or re-armed -----------+
//! ```
//!
//! `begin` takes the callback out of the gate before it runs, so any access the
//! callback makes on its own proxy finds the gate not armed and goes straight
//! through. `set_initializer` called while the callback runs is held back and
//! applied by `complete`, the same as the matching `InitializerControl` call.

use crate::errors::Result;
use std::fmt;
use tracing::{debug, trace, warn};

#[derive(Clone)]
enum GateState<F> {
    Uninitialized(F),
    Initializing,
    Initialized,
}

/// What the running initializer asked the gate to do once it returns
#[derive(Clone)]
enum ControlRequest<F> {
    Keep,
    Clear,
    Replace(F),
}

/// Out-parameter handed to a running initializer
pub struct InitializerControl<F> {
    request: ControlRequest<F>,
}

impl<F> InitializerControl<F> {
    fn new() -> Self {
        Self {
            request: ControlRequest::Keep,
        }
    }

    /// Marks the proxy initialized even if the initializer goes on to fail
    pub fn clear(&mut self) {
        self.request = ControlRequest::Clear;
    }

    /// Arms `initializer` for the next gated access instead of finishing
    pub fn replace(&mut self, initializer: F) {
        self.request = ControlRequest::Replace(initializer);
    }

    pub fn is_cleared(&self) -> bool {
        matches!(self.request, ControlRequest::Clear)
    }
}

impl<F> fmt::Debug for InitializerControl<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let request = match self.request {
            ControlRequest::Keep => "keep",
            ControlRequest::Clear => "clear",
            ControlRequest::Replace(_) => "replace",
        };
        f.debug_struct("InitializerControl")
            .field("request", &request)
            .finish()
    }
}

/// A callback taken out of the gate, to be handed back through `complete`
pub struct PendingInitialization<F> {
    initializer: F,
    pub control: InitializerControl<F>,
}

impl<F> PendingInitialization<F> {
    pub fn initializer(&self) -> &F {
        &self.initializer
    }
}

#[derive(Clone)]
pub struct InitializationGate<F> {
    state: GateState<F>,
    deferred: Option<ControlRequest<F>>,
}

impl<F: Clone> InitializationGate<F> {
    pub fn armed(initializer: F) -> Self {
        Self {
            state: GateState::Uninitialized(initializer),
            deferred: None,
        }
    }

    pub fn initialized() -> Self {
        Self {
            state: GateState::Initialized,
            deferred: None,
        }
    }

    /// True once no initializer is armed, including while one is running
    pub fn is_initialized(&self) -> bool {
        !matches!(self.state, GateState::Uninitialized(_))
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, GateState::Initializing)
    }

    pub fn initializer(&self) -> Option<&F> {
        match &self.state {
            GateState::Uninitialized(f) => Some(f),
            _ => None,
        }
    }

    /// Arms a new initializer, or disarms the gate with `None`.
    /// While an initializer is running the request waits for `complete`.
    pub fn set_initializer(&mut self, initializer: Option<F>) {
        if self.is_running() {
            self.deferred = Some(match initializer {
                Some(f) => ControlRequest::Replace(f),
                None => ControlRequest::Clear,
            });
            return;
        }
        self.state = match initializer {
            Some(f) => GateState::Uninitialized(f),
            None => GateState::Initialized,
        };
    }

    /// Takes the armed callback, leaving the gate in `Initializing`
    pub fn begin(&mut self, operation: &str) -> Option<PendingInitialization<F>> {
        match std::mem::replace(&mut self.state, GateState::Initializing) {
            GateState::Uninitialized(initializer) => {
                trace!(event = "gate_begin", operation = %operation, "Running proxy initializer");
                Some(PendingInitialization {
                    initializer,
                    control: InitializerControl::new(),
                })
            }
            other => {
                self.state = other;
                None
            }
        }
    }

    /// Settles the gate after the callback returned, then hands its result back.
    ///
    /// Success finishes initialization unless the callback re-armed the gate.
    /// Failure re-arms the same callback unless it cleared or replaced itself.
    pub fn complete(&mut self, pending: PendingInitialization<F>, result: Result<()>) -> Result<()> {
        let PendingInitialization {
            initializer,
            control,
        } = pending;

        // An explicit control request wins over a deferred `set_initializer`
        let request = match (control.request, self.deferred.take()) {
            (ControlRequest::Keep, Some(deferred)) => deferred,
            (request, _) => request,
        };

        self.state = match (&result, request) {
            (_, ControlRequest::Replace(next)) => GateState::Uninitialized(next),
            (Ok(()), _) | (Err(_), ControlRequest::Clear) => GateState::Initialized,
            (Err(_), ControlRequest::Keep) => GateState::Uninitialized(initializer),
        };

        match &result {
            Ok(()) => debug!(
                event = "gate_complete",
                initialized = self.is_initialized(),
                "Proxy initializer finished"
            ),
            Err(error) => warn!(
                event = "initializer_failed",
                error = %error,
                initialized = self.is_initialized(),
                "Proxy initializer failed"
            ),
        }

        result
    }
}

impl<F> fmt::Debug for InitializationGate<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            GateState::Uninitialized(_) => "uninitialized",
            GateState::Initializing => "initializing",
            GateState::Initialized => "initialized",
        };
        f.debug_tuple("InitializationGate").field(&state).finish()
    }
}
