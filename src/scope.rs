//! Variable environments. Scopes form a tree rooted at the render
//! session; all scopes of one tree share the session's `Notifier`, the
//! dry-run flag and the response side channel (status, headers).

use std::sync::{Arc, Mutex};

use kstring::KString;

use crate::{notify::Notifier,
            value::{Value, Vars}};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// Only the scope's own bindings are visible (component calls).
    Isolated,
    /// Own bindings, then the parent's (loop iterations, `var` bodies).
    Inherit,
    /// Transparent: lookups and binds go to the parent (conditional
    /// branches, plain `<c>`).
    Branch,
}

/// Status and headers a component may set for the transport layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseMeta {
    pub status: Option<u16>,
    pub headers: Vec<(KString, KString)>,
}

#[derive(Debug)]
struct Shared {
    notifier: Notifier,
    dry_run: bool,
    response: Mutex<ResponseMeta>,
}

#[derive(Debug)]
pub struct Scope {
    vars: Mutex<Vars>,
    parent: Option<Arc<Scope>>,
    lookup: Lookup,
    shared: Arc<Shared>,
}

impl Scope {
    pub fn new(vars: Vars, notifier: Notifier, dry_run: bool) -> Arc<Scope> {
        Arc::new(Scope {
            vars: Mutex::new(vars),
            parent: None,
            lookup: Lookup::Isolated,
            shared: Arc::new(Shared {
                notifier,
                dry_run,
                response: Mutex::new(ResponseMeta::default()),
            }),
        })
    }

    /// A root with its own notifier, for one-off renders.
    pub fn root(vars: Vars) -> Arc<Scope> {
        Scope::new(vars, Notifier::new(), false)
    }

    fn child(self: &Arc<Self>, vars: Vars, lookup: Lookup) -> Arc<Scope> {
        Arc::new(Scope {
            vars: Mutex::new(vars),
            parent: Some(self.clone()),
            lookup,
            shared: self.shared.clone(),
        })
    }

    /// A scope seeing `vars` only.
    pub fn spawn(self: &Arc<Self>, vars: Vars) -> Arc<Scope> {
        self.child(vars, Lookup::Isolated)
    }

    /// A scope seeing `vars` on top of everything visible here.
    pub fn spawn_inherit(self: &Arc<Self>, vars: Vars) -> Arc<Scope> {
        self.child(vars, Lookup::Inherit)
    }

    pub fn spawn_branch(self: &Arc<Self>) -> Arc<Scope> {
        self.child(Vars::new(), Lookup::Branch)
    }

    pub fn lookup(&self) -> Lookup {
        self.lookup
    }

    pub fn parent(&self) -> Option<&Arc<Scope>> {
        self.parent.as_ref()
    }

    fn own(&self) -> Vars {
        self.vars.lock().expect("never poisoned").clone()
    }

    /// All visible bindings, merged.
    pub fn vars(&self) -> Vars {
        match (self.lookup, &self.parent) {
            (Lookup::Isolated, _) | (_, None) => self.own(),
            (Lookup::Inherit, Some(parent)) => {
                let mut all = parent.vars();
                all.extend(self.own());
                all
            }
            (Lookup::Branch, Some(parent)) => parent.vars(),
        }
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(v) = self.vars.lock().expect("never poisoned").get(name) {
            return Some(v.clone())
        }
        match (self.lookup, &self.parent) {
            (Lookup::Inherit | Lookup::Branch, Some(parent)) => parent.get(name),
            _ => None
        }
    }

    /// Bind `name`; branch scopes bind in their parent.
    pub fn bind(&self, name: impl Into<KString>, value: Value) {
        match (self.lookup, &self.parent) {
            (Lookup::Branch, Some(parent)) => parent.bind(name, value),
            _ => {
                self.vars.lock().expect("never poisoned").insert(name.into(), value);
            }
        }
    }

    pub fn notifier(&self) -> &Notifier {
        &self.shared.notifier
    }

    /// Ask the session to render again.
    pub fn touch(&self) {
        self.shared.notifier.touch()
    }

    /// Set for validation passes; components must not cause side
    /// effects then.
    pub fn dry_run(&self) -> bool {
        self.shared.dry_run
    }

    pub fn is_closed(&self) -> bool {
        self.shared.notifier.is_closed()
    }

    pub fn set_status(&self, status: u16) {
        self.shared.response.lock().expect("never poisoned").status = Some(status);
    }

    pub fn add_header(&self, name: impl Into<KString>, value: impl Into<KString>) {
        self.shared.response.lock().expect("never poisoned")
            .headers.push((name.into(), value.into()));
    }

    pub fn response(&self) -> ResponseMeta {
        self.shared.response.lock().expect("never poisoned").clone()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::{notify::Signal, value::vars};

    #[test]
    fn t_lookup_modes() {
        let root = Scope::root(vars([("a", Value::from(1.)), ("b", Value::from(2.))]));
        let isolated = root.spawn(vars([("c", Value::from(3.))]));
        assert_eq!(isolated.get("a"), None);
        assert_eq!(isolated.vars().len(), 1);
        let inherit = root.spawn_inherit(vars([("b", Value::from(20.))]));
        assert_eq!(inherit.get("a"), Some(Value::from(1.)));
        assert_eq!(inherit.vars().get("b"), Some(&Value::from(20.)));
        let branch = inherit.spawn_branch();
        branch.bind("x", Value::from("y"));
        assert_eq!(inherit.get("x"), Some(Value::from("y")));
        assert_eq!(root.get("x"), None);
        assert_eq!(branch.vars().get("b"), Some(&Value::from(20.)));
    }

    #[test]
    fn t_shared_state() {
        let root = Scope::new(Vars::new(), Notifier::new(), true);
        let child = root.spawn(Vars::new()).spawn_inherit(Vars::new());
        assert!(child.dry_run());
        child.touch();
        child.touch();
        assert_eq!(root.notifier().try_take(), Some(Signal::Touched));
        assert_eq!(root.notifier().try_take(), None);
        child.set_status(404);
        child.add_header("X-A", "b");
        assert_eq!(root.response().status, Some(404));
        assert_eq!(root.response().headers.len(), 1);
    }
}
