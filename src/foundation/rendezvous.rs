use std::sync::{Arc, mpsc};

use parking_lot::Mutex;

type Completion<T> = Box<dyn FnOnce(Vec<T>) + Send>;

struct State<T> {
    expected: usize,
    arrived: Vec<T>,
    on_complete: Option<Completion<T>>,
}

/// Counting join across `N` asynchronous producers.
///
/// Each producer calls [`Rendezvous::arrive`] exactly once. The completion runs once, on the
/// thread of the last arrival, with the values in arrival order. Arrivals past `N` are ignored.
pub struct Rendezvous<T> {
    state: Arc<Mutex<State<T>>>,
}

impl<T> Clone for Rendezvous<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<T: Send + 'static> Rendezvous<T> {
    /// Join `expected` producers. With `expected == 0` the completion runs immediately.
    pub fn new(expected: usize, on_complete: impl FnOnce(Vec<T>) + Send + 'static) -> Self {
        let rv = Self {
            state: Arc::new(Mutex::new(State {
                expected,
                arrived: Vec::with_capacity(expected),
                on_complete: Some(Box::new(on_complete)),
            })),
        };
        if expected == 0 {
            rv.fire_if_complete();
        }
        rv
    }

    /// A rendezvous whose completion is delivered over a channel, for callers that block.
    pub fn channel(expected: usize) -> (Self, mpsc::Receiver<Vec<T>>) {
        let (tx, rx) = mpsc::channel();
        let rv = Self::new(expected, move |values| {
            let _ = tx.send(values);
        });
        (rv, rx)
    }

    pub fn arrive(&self, value: T) {
        {
            let mut st = self.state.lock();
            if st.on_complete.is_none() || st.arrived.len() >= st.expected {
                return;
            }
            st.arrived.push(value);
        }
        self.fire_if_complete();
    }

    /// Producers that have not arrived yet.
    pub fn remaining(&self) -> usize {
        let st = self.state.lock();
        st.expected.saturating_sub(st.arrived.len())
    }

    fn fire_if_complete(&self) {
        let ready = {
            let mut st = self.state.lock();
            if st.arrived.len() < st.expected {
                None
            } else {
                st.on_complete
                    .take()
                    .map(|cb| (cb, std::mem::take(&mut st.arrived)))
            }
        };
        if let Some((cb, values)) = ready {
            cb(values);
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/rendezvous.rs"]
mod tests;
