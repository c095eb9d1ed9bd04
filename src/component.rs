//! The component capability set, and components written in Rust.

use std::{fmt::Debug, path::Path, sync::Arc};

use anyhow::Result;
use kstring::KString;

use crate::{error::{ArgError, FragmentNotFound, ImportError},
            scope::Scope,
            shape::Shape,
            value::{Value, Vars}};

pub trait Component: Debug + Send + Sync {
    /// The name used in diagnostics (the import name, or the file
    /// name for top level components).
    fn name(&self) -> &str;

    /// Render with the variables visible in `scope`. May be called
    /// any number of times on the same instance during a live
    /// session; components holding state across calls must
    /// synchronize it themselves. The result is markup
    /// (`Value::Html`), a string or structured data.
    fn render(&self, scope: &Arc<Scope>) -> Result<Value>;

    /// Release background resources. After this returns, the
    /// component must not touch any scope anymore.
    fn dispose(&self) -> Result<()> {
        Ok(())
    }

    /// The shape of the variables the component accepts. None means
    /// any.
    fn input_shape(&self) -> Option<Shape> {
        None
    }
}

pub trait Importer: Debug + Send + Sync {
    /// Resolve `name` (the part after `c:`); `from` is the file of
    /// the importing document, if any. Must return
    /// `ImportError::NotFound` when nothing by this name exists, so
    /// that callers can tell missing components from broken ones.
    fn import(&self, name: &str, from: Option<&Path>)
              -> Result<Arc<dyn Component>, ImportError>;
}

/// An importer that knows nothing, for documents without imports.
#[derive(Debug, Default)]
pub struct NoImports;

impl Importer for NoImports {
    fn import(&self, name: &str, _from: Option<&Path>)
              -> Result<Arc<dyn Component>, ImportError> {
        Err(ImportError::NotFound { name: KString::from_ref(name) })
    }
}

/// A component implemented by a closure.
pub struct FnComponent<F>
where F: Fn(&Arc<Scope>) -> Result<Value> + Send + Sync
{
    name: KString,
    input_shape: Option<Shape>,
    f: F,
}

impl<F> FnComponent<F>
where F: Fn(&Arc<Scope>) -> Result<Value> + Send + Sync
{
    pub fn new(name: impl Into<KString>, f: F) -> Self {
        FnComponent { name: name.into(), input_shape: None, f }
    }

    pub fn with_input_shape(mut self, shape: Shape) -> Self {
        self.input_shape = Some(shape);
        self
    }
}

impl<F> Debug for FnComponent<F>
where F: Fn(&Arc<Scope>) -> Result<Value> + Send + Sync
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("FnComponent({:?})", self.name))
    }
}

impl<F> Component for FnComponent<F>
where F: Fn(&Arc<Scope>) -> Result<Value> + Send + Sync
{
    fn name(&self) -> &str {
        &self.name
    }

    fn render(&self, scope: &Arc<Scope>) -> Result<Value> {
        (self.f)(scope)
    }

    fn input_shape(&self) -> Option<Shape> {
        self.input_shape.clone()
    }
}

/// Fail on arguments `shape` doesn't know about. `_`, the body of
/// the import, is always accepted.
pub fn check_args(component: &str, shape: &Shape, args: &Vars) -> Result<(), ArgError> {
    for name in args.keys() {
        if name != "_" && shape.field(name).is_none() {
            return Err(ArgError::Unrecognized {
                component: KString::from_ref(component),
                name: name.clone(),
            })
        }
    }
    Ok(())
}

/// Render fully, then keep only the subtree whose `id` attribute is
/// `fragment`. Non-markup results are returned as they are.
pub fn render_fragment(component: &dyn Component, scope: &Arc<Scope>, fragment: &str)
                       -> Result<Value> {
    match component.render(scope)? {
        Value::Html(markup) => markup.fragment(fragment)
            .map(Value::Html)
            .ok_or_else(|| FragmentNotFound {
                component: KString::from_ref(component.name()),
                id: KString::from_ref(fragment),
            }.into()),
        v => Ok(v),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::html::Markup;

    #[test]
    fn t_fn_component() {
        let c = FnComponent::new("hello", |scope: &Arc<Scope>| {
            let name = scope.get("name").unwrap_or_default();
            Ok(Value::from(format!("Hello {name}")))
        }).with_input_shape(Shape::object([("name".into(), Shape::String)]));
        let scope = Scope::root(crate::value::vars([("name", Value::from("you"))]));
        assert_eq!(c.render(&scope).unwrap(), Value::from("Hello you"));
        assert!(c.input_shape().unwrap().field("name").is_some());
        assert!(c.dispose().is_ok());
        assert_eq!(format!("{c:?}"), "FnComponent(\"hello\")");
    }

    #[test]
    fn t_check_args() {
        let shape = Shape::object([("name".into(), Shape::String)]);
        let args = crate::value::vars([("name", Value::from("x")), ("_", Value::Null)]);
        assert!(check_args("c", &shape, &args).is_ok());
        let args = crate::value::vars([("name", Value::from("x")), ("age", Value::from(3.))]);
        let e = check_args("c", &shape, &args).unwrap_err();
        assert_eq!(e.to_string(), "unrecognized argument \"age\" for component \"c\"");
        assert!(check_args("c", &Shape::Any, &args).is_ok());
    }

    #[test]
    fn t_no_imports() {
        let e = NoImports.import("x", None).unwrap_err();
        assert!(e.is_not_found());
    }

    #[test]
    fn t_render_fragment() {
        let c = FnComponent::new("t", |_: &Arc<Scope>| Ok(Value::Html(Markup::text("x"))));
        let scope = Scope::root(Vars::new());
        let e = render_fragment(&c, &scope, "main").unwrap_err();
        assert!(e.is::<FragmentNotFound>());
        let c = FnComponent::new("t", |_: &Arc<Scope>| Ok(Value::from(1.)));
        assert_eq!(render_fragment(&c, &scope, "main").unwrap(), Value::from(1.));
    }
}
