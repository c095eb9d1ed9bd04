//! The wakeup channel of a live session: a single slot that any
//! number of scopes and background pollers signal into, drained by
//! the session's render loop. Signals are coalesced, never queued.

use std::{sync::{Arc, Condvar, Mutex, MutexGuard},
          time::{Duration, Instant}};

use crate::value::Vars;

#[derive(Debug, Default)]
struct Pending {
    touched: bool,
    /// Latest variable set from outside; replaces older ones.
    update: Option<Vars>,
    closed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    /// New variables for the root; implies a re-render.
    Update(Vars),
    /// Something below the root changed.
    Touched,
    Closed,
}

#[derive(Debug, Clone, Default)]
pub struct Notifier {
    inner: Arc<(Mutex<Pending>, Condvar)>,
}

impl Notifier {
    pub fn new() -> Notifier {
        Notifier::default()
    }

    fn lock(&self) -> MutexGuard<'_, Pending> {
        self.inner.0.lock().expect("never poisoned")
    }

    /// Request a re-render. Any number of touches before the next
    /// `wait` are seen as one. No-op once closed.
    pub fn touch(&self) {
        let mut p = self.lock();
        if p.closed || p.touched {
            return
        }
        p.touched = true;
        self.inner.1.notify_all();
    }

    pub fn push_update(&self, vars: Vars) {
        let mut p = self.lock();
        if p.closed {
            return
        }
        p.update = Some(vars);
        self.inner.1.notify_all();
    }

    /// Wakes up all waiters, including pollers sleeping in
    /// `sleep_unless_closed`.
    pub fn close(&self) {
        let mut p = self.lock();
        p.closed = true;
        self.inner.1.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn take(p: &mut Pending) -> Option<Signal> {
        if p.closed {
            return Some(Signal::Closed)
        }
        if let Some(vars) = p.update.take() {
            // the re-render for the update covers the touch too
            p.touched = false;
            return Some(Signal::Update(vars))
        }
        if p.touched {
            p.touched = false;
            return Some(Signal::Touched)
        }
        None
    }

    /// Drain without blocking.
    pub fn try_take(&self) -> Option<Signal> {
        Notifier::take(&mut self.lock())
    }

    pub fn wait(&self) -> Signal {
        let mut p = self.lock();
        loop {
            if let Some(s) = Notifier::take(&mut p) {
                return s
            }
            p = self.inner.1.wait(p).expect("never poisoned");
        }
    }

    /// None on timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Signal> {
        let deadline = Instant::now() + timeout;
        let mut p = self.lock();
        loop {
            if let Some(s) = Notifier::take(&mut p) {
                return Some(s)
            }
            let now = Instant::now();
            if now >= deadline {
                return None
            }
            p = self.inner.1.wait_timeout(p, deadline - now).expect("never poisoned").0;
        }
    }

    /// Sleep for `d` or until closed; returns false if closed. Does
    /// not consume signals.
    pub fn sleep_unless_closed(&self, d: Duration) -> bool {
        let deadline = Instant::now() + d;
        let mut p = self.lock();
        loop {
            if p.closed {
                return false
            }
            let now = Instant::now();
            if now >= deadline {
                return true
            }
            p = self.inner.1.wait_timeout(p, deadline - now).expect("never poisoned").0;
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{vars, Value};
    use std::thread;

    #[test]
    fn t_touch_coalesces() {
        let n = Notifier::new();
        for _ in 0..10 {
            n.touch();
        }
        assert_eq!(n.try_take(), Some(Signal::Touched));
        assert_eq!(n.try_take(), None);
    }

    #[test]
    fn t_update_wins_and_replaces() {
        let n = Notifier::new();
        n.touch();
        n.push_update(vars([("a", Value::from(1.))]));
        n.push_update(vars([("a", Value::from(2.))]));
        assert_eq!(n.try_take(), Some(Signal::Update(vars([("a", Value::from(2.))]))));
        assert_eq!(n.try_take(), None);
    }

    #[test]
    fn t_close() {
        let n = Notifier::new();
        let n2 = n.clone();
        let h = thread::spawn(move || n2.sleep_unless_closed(Duration::from_secs(60)));
        n.close();
        assert!(!h.join().unwrap());
        n.touch();
        assert_eq!(n.wait(), Signal::Closed);
        assert_eq!(n.wait_timeout(Duration::from_millis(1)), Some(Signal::Closed));
    }

    #[test]
    fn t_wait_across_threads() {
        let n = Notifier::new();
        let n2 = n.clone();
        let h = thread::spawn(move || n2.wait());
        n.touch();
        assert_eq!(h.join().unwrap(), Signal::Touched);
        assert_eq!(n.wait_timeout(Duration::from_millis(10)), None);
    }
}
