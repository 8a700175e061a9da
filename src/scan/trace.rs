use bitvec::prelude::*;

use crate::tap::State;

/// Which shift register a [`TraceListener::on_shift`] call refers to.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RegisterKind {
    /// The instruction register.
    Ir,
    /// A data register (boundary register or otherwise).
    Dr,
}

/// Something that wants to observe TAP activity as it happens.
pub trait TraceListener {
    /// The TAP entered a new state.
    fn on_state(&mut self, _state: State) {}

    /// A register shift completed.
    fn on_shift(&mut self, _kind: RegisterKind, _tdi: &BitSlice<u8, Lsb0>, _tdo: &BitSlice<u8, Lsb0>) {}
}

/// Fans TAP activity out to zero or more [`TraceListener`]s.
#[derive(Default)]
pub struct TraceHub {
    listeners: Vec<Box<dyn TraceListener + Send>>,
}

impl TraceHub {
    /// An empty hub.
    pub fn new() -> Self {
        TraceHub::default()
    }

    /// Subscribe a listener.
    pub fn add_listener(&mut self, listener: Box<dyn TraceListener + Send>) {
        self.listeners.push(listener);
    }

    /// Notify every listener of a state transition.
    pub fn notify_state(&mut self, state: State) {
        for listener in &mut self.listeners {
            listener.on_state(state);
        }
    }

    /// Notify every listener of a completed shift.
    pub fn notify_shift(&mut self, kind: RegisterKind, tdi: &BitSlice<u8, Lsb0>, tdo: &BitSlice<u8, Lsb0>) {
        for listener in &mut self.listeners {
            listener.on_shift(kind, tdi, tdo);
        }
    }
}

impl std::fmt::Debug for TraceHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceHub").field("listeners", &self.listeners.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Counter {
        states: Arc<Mutex<usize>>,
        shifts: Arc<Mutex<usize>>,
    }

    impl TraceListener for Counter {
        fn on_state(&mut self, _state: State) {
            *self.states.lock().unwrap() += 1;
        }
        fn on_shift(&mut self, _kind: RegisterKind, _tdi: &BitSlice<u8, Lsb0>, _tdo: &BitSlice<u8, Lsb0>) {
            *self.shifts.lock().unwrap() += 1;
        }
    }

    #[test]
    fn hub_fans_out_to_every_listener() {
        let states = Arc::new(Mutex::new(0));
        let shifts = Arc::new(Mutex::new(0));
        let mut hub = TraceHub::new();
        hub.add_listener(Box::new(Counter {
            states: states.clone(),
            shifts: shifts.clone(),
        }));
        hub.add_listener(Box::new(Counter {
            states: states.clone(),
            shifts: shifts.clone(),
        }));
        hub.notify_state(State::RunTestIdle);
        hub.notify_shift(RegisterKind::Dr, BitSlice::empty(), BitSlice::empty());
        assert_eq!(*states.lock().unwrap(), 2);
        assert_eq!(*shifts.lock().unwrap(), 2);
    }
}
