//! Scaffold for components that fetch data in the background: one
//! thread per poller, started by the first live render, calling the
//! fetch function every interval and touching the session whenever
//! the result changes.

use std::{sync::{Arc, Mutex},
          thread::{self, JoinHandle},
          time::Duration};

use anyhow::{anyhow, Result};
use kstring::KString;

use crate::{component::Component,
            dt,
            info,
            notify::Notifier,
            scope::Scope,
            value::Value,
            warn};

/// How often the thread checks for session close and disposal.
const TICK: Duration = Duration::from_millis(50);

type Fetch = dyn Fn() -> Result<Value> + Send + Sync;

/// The most recent fetch result; errors are kept as their message.
type Latest = Option<Result<Value, String>>;

struct Running {
    stop: Notifier,
    thread: JoinHandle<()>,
}

/// The thread touches the notifier of the scope whose render started
/// it, and ends with that session.
pub struct Poller {
    name: KString,
    interval: Duration,
    fetch: Arc<Fetch>,
    latest: Arc<Mutex<Latest>>,
    running: Mutex<Option<Running>>,
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("Poller({:?}, {:?})", self.name, self.interval))
    }
}

fn store(latest: &Mutex<Latest>, result: Result<Value>) -> bool {
    let new = result.map_err(|e| format!("{e:#}"));
    let mut latest = latest.lock().expect("never poisoned");
    if latest.as_ref() == Some(&new) {
        false
    } else {
        *latest = Some(new);
        true
    }
}

impl Poller {
    pub fn new(name: impl Into<KString>,
               interval: Duration,
               fetch: impl Fn() -> Result<Value> + Send + Sync + 'static) -> Poller {
        Poller {
            name: name.into(),
            interval,
            fetch: Arc::new(fetch),
            latest: Default::default(),
            running: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().expect("never poisoned").as_ref()
            .map_or(false, |r| !r.thread.is_finished())
    }

    /// Start the thread unless it's running; one that ended because
    /// its session closed is replaced.
    fn start(&self, session: Notifier) -> Result<()> {
        let mut running = self.running.lock().expect("never poisoned");
        if let Some(r) = running.as_ref() {
            if !r.thread.is_finished() {
                return Ok(())
            }
        }
        if let Some(Running { thread, .. }) = running.take() {
            let _ = thread.join();
        }
        info!("starting poller {:?}", self.name);
        // the first result is there for the first render
        store(&self.latest, (self.fetch)());

        let stop = Notifier::new();
        let thread = {
            let stop = stop.clone();
            let fetch = self.fetch.clone();
            let latest = self.latest.clone();
            let interval = self.interval;
            let name = self.name.clone();
            thread::Builder::new()
                .name(format!("poller {name}"))
                .spawn(move || {
                    loop {
                        let mut slept = Duration::ZERO;
                        while slept < interval {
                            let d = TICK.min(interval - slept);
                            if !stop.sleep_unless_closed(d) || session.is_closed() {
                                return
                            }
                            slept += d;
                        }
                        dt!("poll", name.as_str());
                        if store(&latest, fetch()) {
                            session.touch();
                        }
                    }
                })?
        };
        *running = Some(Running { stop, thread });
        Ok(())
    }
}

impl Component for Poller {
    fn name(&self) -> &str {
        &self.name
    }

    /// The latest result; Null before the first fetch (always on dry
    /// runs).
    fn render(&self, scope: &Arc<Scope>) -> Result<Value> {
        if !scope.dry_run() && !scope.is_closed() {
            self.start(scope.notifier().clone())?;
        }
        match &*self.latest.lock().expect("never poisoned") {
            None => Ok(Value::Null),
            Some(Ok(v)) => Ok(v.clone()),
            Some(Err(msg)) => Err(anyhow!("poller {:?}: {msg}", self.name.as_str())),
        }
    }

    /// Stops the thread; returns after it has exited. Rendering again
    /// starts a new one.
    fn dispose(&self) -> Result<()> {
        let running = self.running.lock().expect("never poisoned").take();
        if let Some(Running { stop, thread }) = running {
            stop.close();
            if thread.join().is_err() {
                warn!("poller {:?} thread panicked", self.name);
            }
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::{notify::Signal, value::Vars};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn counting_poller(counter: Arc<AtomicU32>) -> Poller {
        Poller::new("count", Duration::from_millis(10), move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            Ok(Value::from(n as f64))
        })
    }

    #[test]
    fn t_dry_run_never_starts() {
        let counter = Arc::new(AtomicU32::new(0));
        let p = counting_poller(counter.clone());
        let scope = Scope::new(Vars::new(), Notifier::new(), true);
        assert_eq!(p.render(&scope).unwrap(), Value::Null);
        assert!(!p.is_running());
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn t_touches_and_stops_on_dispose() {
        let counter = Arc::new(AtomicU32::new(0));
        let p = counting_poller(counter.clone());
        let notifier = Notifier::new();
        let scope = Scope::new(Vars::new(), notifier.clone(), false);
        assert_eq!(p.render(&scope).unwrap(), Value::from(0.));
        assert!(p.is_running());
        assert_eq!(notifier.wait_timeout(Duration::from_secs(5)), Some(Signal::Touched));
        assert!(p.render(&scope).unwrap() != Value::from(0.));
        p.dispose().unwrap();
        assert!(!p.is_running());
        let n = counter.load(Ordering::SeqCst);
        let _ = notifier.try_take();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(counter.load(Ordering::SeqCst), n);
        assert_eq!(notifier.try_take(), None);
        // a new render starts over
        p.render(&scope).unwrap();
        assert!(p.is_running());
        p.dispose().unwrap();
    }

    #[test]
    fn t_stops_on_session_close() {
        let p = Poller::new("same", Duration::from_millis(5), || Ok(Value::from("x")));
        let notifier = Notifier::new();
        let scope = Scope::new(Vars::new(), notifier.clone(), false);
        p.render(&scope).unwrap();
        notifier.close();
        let running = p.running.lock().unwrap().take().unwrap();
        running.thread.join().unwrap();
        // closed sessions don't start pollers
        p.render(&scope).unwrap();
        assert!(!p.is_running());
    }

    #[test]
    fn t_errors_are_rendered_as_errors() {
        let p = Poller::new("bad", Duration::from_secs(60), || Err(anyhow!("unreachable host")));
        let scope = Scope::root(Vars::new());
        let e = p.render(&scope).unwrap_err();
        assert_eq!(e.to_string(), "poller \"bad\": unreachable host");
        p.dispose().unwrap();
    }
}
