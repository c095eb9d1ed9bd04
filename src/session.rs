//! Live rendering: a session renders its root component, then renders
//! again whenever variables are pushed from outside or something in
//! the tree touched the session, until it is closed.

use std::sync::Arc;

use anyhow::Result;

use crate::{component::Component,
            dt,
            info,
            notify::{Notifier, Signal},
            scope::{ResponseMeta, Scope},
            value::{Value, Vars},
            warn};

/// The outcome of one render pass.
#[derive(Debug)]
pub struct Rendered {
    /// Counts from 1.
    pub pass: u64,
    pub result: Result<Value>,
    pub response: ResponseMeta,
}

#[derive(Debug)]
pub struct Session {
    root: Arc<dyn Component>,
    notifier: Notifier,
    vars: Vars,
    dry_run: bool,
    passes: u64,
}

impl Session {
    pub fn new(root: Arc<dyn Component>, vars: Vars) -> Session {
        Session {
            root,
            notifier: Notifier::new(),
            vars,
            dry_run: false,
            passes: 0,
        }
    }

    /// A session whose components must not start background work.
    pub fn dry(root: Arc<dyn Component>, vars: Vars) -> Session {
        Session { dry_run: true, ..Session::new(root, vars) }
    }

    /// For pushing updates and closing from other threads.
    pub fn notifier(&self) -> Notifier {
        self.notifier.clone()
    }

    pub fn passes(&self) -> u64 {
        self.passes
    }

    /// Render once with the current variables. Each pass gets a fresh
    /// scope tree (and thus fresh response metadata).
    pub fn render(&mut self) -> Rendered {
        self.passes += 1;
        dt!("Session::render", self.passes);
        let scope = Scope::new(self.vars.clone(), self.notifier.clone(), self.dry_run);
        let result = self.root.render(&scope);
        Rendered {
            pass: self.passes,
            result,
            response: scope.response(),
        }
    }

    /// Render, then re-render on every signal until the session is
    /// closed or `emit` fails, then dispose the root. A burst of
    /// touches during a render pass causes a single further pass.
    pub fn run(mut self, mut emit: impl FnMut(Rendered) -> Result<()>) -> Result<()> {
        let r = self.run_loop(&mut emit);
        self.notifier.close();
        let d = self.root.dispose();
        if let Err(e) = &d {
            warn!("disposing {:?}: {:#}", self.root.name(), e);
        }
        r.and(d)
    }

    fn run_loop(&mut self, emit: &mut impl FnMut(Rendered) -> Result<()>) -> Result<()> {
        loop {
            emit(self.render())?;
            match self.notifier.wait() {
                Signal::Update(vars) => self.vars = vars,
                Signal::Touched => (),
                Signal::Closed => {
                    info!("session for {:?} closed after {} passes",
                          self.root.name(), self.passes);
                    return Ok(())
                }
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::{component::FnComponent, value::vars};
    use std::{sync::{atomic::{AtomicU32, Ordering}, mpsc}, thread, time::Duration};

    #[test]
    fn t_render_and_updates() {
        let root = Arc::new(FnComponent::new("hello", |scope: &Arc<Scope>| {
            if scope.get("status").is_some() {
                scope.set_status(201);
            }
            Ok(Value::from(format!("hi {}", scope.get("name").unwrap_or_default())))
        }));
        let session = Session::new(root, vars([("name", Value::from("a"))]));
        let notifier = session.notifier();
        let (tx, rx) = mpsc::channel();
        let h = thread::spawn(move || session.run(move |r| {
            tx.send((r.result.unwrap(), r.response.status))
                .map_err(|_| anyhow::anyhow!("receiver gone"))
        }));
        assert_eq!(rx.recv().unwrap(), (Value::from("hi a"), None));
        notifier.push_update(vars([("name", Value::from("b")), ("status", Value::Null)]));
        assert_eq!(rx.recv().unwrap(), (Value::from("hi b"), Some(201)));
        notifier.close();
        h.join().unwrap().unwrap();
    }

    #[test]
    fn t_touches_coalesce_into_one_pass() {
        let renders = Arc::new(AtomicU32::new(0));
        let (started_tx, started_rx) = mpsc::channel();
        let (go_tx, go_rx) = mpsc::channel::<()>();
        let started_tx = std::sync::Mutex::new(started_tx);
        let go_rx = std::sync::Mutex::new(go_rx);
        let root = {
            let renders = renders.clone();
            Arc::new(FnComponent::new("slow", move |_: &Arc<Scope>| {
                let n = renders.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    // hold the first pass until the touches are in
                    started_tx.lock().unwrap().send(()).ok();
                    go_rx.lock().unwrap().recv().ok();
                }
                Ok(Value::Null)
            }))
        };
        let session = Session::new(root, Vars::new());
        let notifier = session.notifier();
        let (tx, rx) = mpsc::channel();
        let h = thread::spawn(move || session.run(move |r| {
            tx.send(r.pass).map_err(|_| anyhow::anyhow!("receiver gone"))
        }));
        started_rx.recv().unwrap();
        for _ in 0..10 {
            notifier.touch();
        }
        go_tx.send(()).unwrap();
        assert_eq!(rx.recv().unwrap(), 1);
        assert_eq!(rx.recv().unwrap(), 2);
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        notifier.close();
        h.join().unwrap().unwrap();
        assert_eq!(renders.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn t_close_disposes() {
        #[derive(Debug)]
        struct Disposable(Arc<AtomicU32>);
        impl Component for Disposable {
            fn name(&self) -> &str {
                "disposable"
            }
            fn render(&self, _: &Arc<Scope>) -> Result<Value> {
                Ok(Value::Null)
            }
            fn dispose(&self) -> Result<()> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }
        let disposed = Arc::new(AtomicU32::new(0));
        let session = Session::new(Arc::new(Disposable(disposed.clone())), Vars::new());
        // a failing emit ends the session too
        let r = session.run(|_| anyhow::bail!("client gone"));
        assert_eq!(r.unwrap_err().to_string(), "client gone");
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn t_dry_session() {
        let root = Arc::new(FnComponent::new("d", |scope: &Arc<Scope>| Ok(Value::from(scope.dry_run()))));
        let mut session = Session::dry(root, Vars::new());
        assert_eq!(session.render().result.unwrap(), Value::from(true));
        assert_eq!(session.passes(), 1);
    }
}
