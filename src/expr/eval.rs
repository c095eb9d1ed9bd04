//! Tree walking evaluation of parsed expressions.

use std::{collections::HashMap, sync::{Arc, Mutex}};

use kstring::KString;
use itertools::Itertools;

use crate::{value::{Value, Vars, format_number},
            nodt};
use super::{EvalError, Evaluator, parser::{parse, Expr, BinOp, UnaryOp}};

fn type_error(msg: String) -> EvalError {
    EvalError::Type(msg)
}

fn call_error(name: &str, message: impl Into<String>) -> EvalError {
    EvalError::Call { name: KString::from_ref(name), message: message.into() }
}

/// The default evaluator. Parsed expressions are cached by source
/// text.
#[derive(Debug, Default)]
pub struct ExprEvaluator {
    cache: Mutex<HashMap<KString, Arc<Expr>>>,
}

impl ExprEvaluator {
    pub fn new() -> ExprEvaluator {
        ExprEvaluator::default()
    }

    fn parsed(&self, expr: &str) -> Result<Arc<Expr>, EvalError> {
        if let Ok(cache) = self.cache.lock() {
            if let Some(e) = cache.get(expr) {
                return Ok(e.clone())
            }
        }
        let e = Arc::new(parse(expr)?);
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(KString::from_ref(expr), e.clone());
        }
        Ok(e)
    }

    pub fn eval_str(&self, expr: &str, env: &Vars) -> Result<Value, EvalError> {
        nodt!("eval_str", expr);
        let e = self.parsed(expr)?;
        eval(&e, env)
    }
}

impl Evaluator for ExprEvaluator {
    fn evaluate(&self, expr: &str, env: &Vars) -> anyhow::Result<Value> {
        Ok(self.eval_str(expr, env)?)
    }
}

fn number(v: &Value, what: &str) -> Result<f64, EvalError> {
    v.as_number().ok_or_else(
        || type_error(format!("{what}: expecting a number, got {}", v.type_name())))
}

fn compare(op: BinOp, a: &Value, b: &Value) -> Result<bool, EvalError> {
    let ord = match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.partial_cmp(y),
        (Value::String(x), Value::String(y)) => Some(x.as_str().cmp(y.as_str())),
        _ => return Err(type_error(format!("cannot compare {} with {}",
                                           a.type_name(), b.type_name())))
    };
    let ord = match ord {
        Some(o) => o,
        None => return Ok(false), // NaN
    };
    Ok(match op {
        BinOp::Lt => ord.is_lt(),
        BinOp::Le => ord.is_le(),
        BinOp::Gt => ord.is_gt(),
        BinOp::Ge => ord.is_ge(),
        _ => unreachable!("not a comparison: {op:?}")
    })
}

fn contains(container: &Value, item: &Value) -> Result<bool, EvalError> {
    match container {
        Value::Array(items) => Ok(items.contains(item)),
        Value::Object(m) => match item {
            Value::String(k) => Ok(m.contains_key(k)),
            _ => Ok(false),
        },
        Value::String(s) => match item {
            Value::String(sub) => Ok(s.contains(sub.as_str())),
            other => Ok(s.contains(other.to_string().as_str())),
        },
        Value::Null => Ok(false),
        other => Err(type_error(format!("cannot search in {}", other.type_name())))
    }
}

fn add(a: Value, b: Value) -> Result<Value, EvalError> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => Ok(Value::Number(x + y)),
        (Value::Array(mut x), Value::Array(y)) => {
            x.extend(y);
            Ok(Value::Array(x))
        }
        (a @ Value::String(_), b) | (a, b @ Value::String(_)) =>
            Ok(Value::from(format!("{a}{b}"))),
        (a, b) => Err(type_error(format!("cannot add {} and {}",
                                         a.type_name(), b.type_name())))
    }
}

fn binary(op: BinOp, l: &Expr, r: &Expr, env: &Vars) -> Result<Value, EvalError> {
    match op {
        // short circuiting, JavaScript style operand results
        BinOp::And => {
            let a = eval(l, env)?;
            if a.is_truthy() { eval(r, env) } else { Ok(a) }
        }
        BinOp::Or => {
            let a = eval(l, env)?;
            if a.is_truthy() { Ok(a) } else { eval(r, env) }
        }
        BinOp::Coalesce => {
            let a = eval(l, env)?;
            if a.is_null() { eval(r, env) } else { Ok(a) }
        }
        _ => {
            let a = eval(l, env)?;
            let b = eval(r, env)?;
            match op {
                BinOp::Eq => Ok(Value::Bool(a == b)),
                BinOp::NotEq => Ok(Value::Bool(a != b)),
                BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge =>
                    Ok(Value::Bool(compare(op, &a, &b)?)),
                BinOp::In => Ok(Value::Bool(contains(&b, &a)?)),
                BinOp::Add => add(a, b),
                BinOp::Sub => Ok(Value::Number(number(&a, "-")? - number(&b, "-")?)),
                BinOp::Mul => Ok(Value::Number(number(&a, "*")? * number(&b, "*")?)),
                BinOp::Div => {
                    let d = number(&b, "/")?;
                    if d == 0. {
                        return Err(type_error("division by zero".into()))
                    }
                    Ok(Value::Number(number(&a, "/")? / d))
                }
                BinOp::Rem => {
                    let d = number(&b, "%")?;
                    if d == 0. {
                        return Err(type_error("division by zero".into()))
                    }
                    Ok(Value::Number(number(&a, "%")? % d))
                }
                BinOp::And | BinOp::Or | BinOp::Coalesce => unreachable!()
            }
        }
    }
}

fn member(v: &Value, name: &str) -> Value {
    match (v, name) {
        (Value::Array(items), "length") => Value::from(items.len() as i64),
        (Value::String(s), "length") => Value::from(s.chars().count() as i64),
        (Value::Object(m), _) => m.get(name).cloned().unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn index(v: &Value, i: &Value) -> Result<Value, EvalError> {
    match (v, i) {
        (Value::Array(items), Value::Number(n)) => {
            if n.fract() != 0. {
                return Err(type_error(format!("non-integer index {n}")))
            }
            let n = *n as i64;
            let idx = if n < 0 { items.len() as i64 + n } else { n };
            Ok(usize::try_from(idx).ok().and_then(|i| items.get(i)).cloned()
               .unwrap_or(Value::Null))
        }
        (Value::String(s), Value::Number(n)) => Ok(
            s.chars().nth(*n as usize).map(|c| Value::from(c.to_string()))
                .unwrap_or(Value::Null)),
        (Value::Object(_), Value::String(k)) => Ok(member(v, k)),
        (Value::Null, _) => Ok(Value::Null),
        _ => Err(type_error(format!("cannot index {} with {}", v.type_name(), i.type_name())))
    }
}

fn arity(name: &str, args: &[Value], min: usize, max: usize) -> Result<(), EvalError> {
    if args.len() < min || args.len() > max {
        Err(call_error(name, format!("expecting {} arguments, got {}",
                                     if min == max { min.to_string() }
                                     else { format!("{min}..{max}") },
                                     args.len())))
    } else {
        Ok(())
    }
}

fn string_arg<'v>(name: &str, v: &'v Value) -> Result<&'v str, EvalError> {
    v.as_str().ok_or_else(
        || call_error(name, format!("expecting a string, got {}", v.type_name())))
}

fn builtin(name: &str, args: Vec<Value>) -> Result<Value, EvalError> {
    match name {
        "len" => {
            arity(name, &args, 1, 1)?;
            let n = match &args[0] {
                Value::Array(v) => v.len(),
                Value::Object(m) => m.len(),
                Value::String(s) => s.chars().count(),
                Value::Null => 0,
                other => return Err(call_error(name, format!("no length for {}",
                                                             other.type_name())))
            };
            Ok(Value::from(n as i64))
        }
        "upper" | "lower" | "trim" => {
            arity(name, &args, 1, 1)?;
            let s = string_arg(name, &args[0])?;
            Ok(Value::from(match name {
                "upper" => s.to_uppercase(),
                "lower" => s.to_lowercase(),
                _ => s.trim().to_string(),
            }))
        }
        "join" => {
            arity(name, &args, 1, 2)?;
            let sep = match args.get(1) {
                Some(v) => string_arg(name, v)?,
                None => ",",
            };
            match &args[0] {
                Value::Array(items) => Ok(Value::from(items.iter().join(sep))),
                other => Err(call_error(name, format!("expecting an array, got {}",
                                                      other.type_name())))
            }
        }
        "split" => {
            arity(name, &args, 2, 2)?;
            let s = string_arg(name, &args[0])?;
            let sep = string_arg(name, &args[1])?;
            Ok(Value::Array(if sep.is_empty() {
                s.chars().map(|c| Value::from(c.to_string())).collect()
            } else {
                s.split(sep).map(Value::from).collect()
            }))
        }
        "keys" | "values" => {
            arity(name, &args, 1, 1)?;
            match &args[0] {
                Value::Object(m) => Ok(Value::Array(
                    if name == "keys" {
                        m.keys().map(|k| Value::String(k.clone())).collect()
                    } else {
                        m.values().cloned().collect()
                    })),
                other => Err(call_error(name, format!("expecting an object, got {}",
                                                      other.type_name())))
            }
        }
        "string" => {
            arity(name, &args, 1, 1)?;
            Ok(Value::from(args[0].to_string()))
        }
        "number" => {
            arity(name, &args, 1, 1)?;
            match &args[0] {
                Value::Number(n) => Ok(Value::Number(*n)),
                Value::Bool(b) => Ok(Value::Number(if *b { 1. } else { 0. })),
                Value::String(s) => s.trim().parse::<f64>().map(Value::Number).map_err(
                    |_| call_error(name, format!("not a number: {s:?}"))),
                other => Err(call_error(name, format!("cannot convert {}",
                                                      other.type_name())))
            }
        }
        "range" => {
            arity(name, &args, 1, 2)?;
            let (from, to) = if args.len() == 1 {
                (0., number(&args[0], name)?)
            } else {
                (number(&args[0], name)?, number(&args[1], name)?)
            };
            // integers stay exact below 2^53
            const EXACT: f64 = 9007199254740992.;
            if !(from.abs() < EXACT && to.abs() < EXACT) {
                return Err(call_error(name, format!("bounds out of range: {from}, {to}")))
            }
            let n = (to - from).ceil().max(0.);
            if n > 1e6 {
                return Err(call_error(name, "range too large"))
            }
            Ok(Value::Array((0..n as u64).map(|k| Value::Number(from + k as f64)).collect()))
        }
        "contains" => {
            arity(name, &args, 2, 2)?;
            Ok(Value::Bool(contains(&args[0], &args[1])?))
        }
        "format_number" => {
            arity(name, &args, 1, 1)?;
            Ok(Value::from(format_number(number(&args[0], name)?)))
        }
        _ => Err(EvalError::UnknownFunction(KString::from_ref(name)))
    }
}

pub fn eval(e: &Expr, env: &Vars) -> Result<Value, EvalError> {
    match e {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Ident(name) => env.get(name).cloned()
            .ok_or_else(|| EvalError::UnknownIdent(name.clone())),
        Expr::Array(items) => Ok(Value::Array(
            items.iter().map(|i| eval(i, env)).collect::<Result<_, _>>()?)),
        Expr::Object(fields) => {
            let mut m = Vars::new();
            for (k, v) in fields {
                m.insert(k.clone(), eval(v, env)?);
            }
            Ok(Value::Object(m))
        }
        Expr::Member(obj, name) => Ok(member(&eval(obj, env)?, name)),
        Expr::Index(obj, i) => index(&eval(obj, env)?, &eval(i, env)?),
        Expr::Call(name, args) => {
            let args = args.iter().map(|a| eval(a, env)).collect::<Result<Vec<_>, _>>()?;
            builtin(name, args)
        }
        Expr::Unary(UnaryOp::Not, e) => Ok(Value::Bool(!eval(e, env)?.is_truthy())),
        Expr::Unary(UnaryOp::Neg, e) => Ok(Value::Number(-number(&eval(e, env)?, "-")?)),
        Expr::Binary(op, l, r) => binary(*op, l, r, env),
        Expr::Cond(c, t, f) => if eval(c, env)?.is_truthy() {
            eval(t, env)
        } else {
            eval(f, env)
        },
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::vars;
    use serde_json::json;

    fn ev(expr: &str) -> Value {
        let env = vars([
            ("n", Value::from(42.)),
            ("name", Value::from("Ann")),
            ("xs", Value::from_json(json!([1, 2, 3]))),
            ("user", Value::from_json(json!({"first": "A", "tags": ["x"]}))),
            ("nothing", Value::Null),
        ]);
        ExprEvaluator::new().eval_str(expr, &env).unwrap()
    }

    #[test]
    fn t_arithmetic() {
        assert_eq!(ev("n+1"), Value::from(43.));
        assert_eq!(ev("(1 + 2) * 3 - 4 / 2"), Value::from(7.));
        assert_eq!(ev("7 % 4"), Value::from(3.));
        assert_eq!(ev("-n"), Value::from(-42.));
        assert_eq!(ev("'a' + 1"), Value::from("a1"));
        assert_eq!(ev("name + '!'"), Value::from("Ann!"));
    }

    #[test]
    fn t_logic() {
        assert_eq!(ev("n > 40 && n < 50"), Value::Bool(true));
        assert_eq!(ev("nothing ?? 'dflt'"), Value::from("dflt"));
        assert_eq!(ev("nothing || name"), Value::from("Ann"));
        assert_eq!(ev("not (1 == 1)"), Value::Bool(false));
        assert_eq!(ev("2 in xs"), Value::Bool(true));
        assert_eq!(ev("'first' in user"), Value::Bool(true));
        assert_eq!(ev("n == 42 ? 'yes' : 'no'"), Value::from("yes"));
    }

    #[test]
    fn t_access_and_builtins() {
        assert_eq!(ev("user.first"), Value::from("A"));
        assert_eq!(ev("user.tags[0]"), Value::from("x"));
        assert_eq!(ev("user.missing"), Value::Null);
        assert_eq!(ev("xs[-1]"), Value::from(3.));
        assert_eq!(ev("xs.length"), Value::from(3.));
        assert_eq!(ev("len(name)"), Value::from(3.));
        assert_eq!(ev("upper(name)"), Value::from("ANN"));
        assert_eq!(ev("join(xs, '-')"), Value::from("1-2-3"));
        assert_eq!(ev("split('a,b', ',')"), Value::from_json(json!(["a", "b"])));
        assert_eq!(ev("range(3)"), Value::from_json(json!([0, 1, 2])));
        assert_eq!(ev("range(2, 4.5)"), Value::from_json(json!([2, 3, 4])));
        assert_eq!(ev("range(5, 2)"), Value::from_json(json!([])));
        assert_eq!(ev("keys({b: 1, a: 2})"), Value::from_json(json!(["a", "b"])));
        assert_eq!(ev("number(' 5 ')"), Value::from(5.));
    }

    #[test]
    fn t_errors() {
        let e = ExprEvaluator::new();
        let env = Vars::new();
        assert_eq!(e.eval_str("nope", &env), Err(EvalError::UnknownIdent("nope".into())));
        assert!(matches!(e.eval_str("frob(1)", &env), Err(EvalError::UnknownFunction(_))));
        assert!(matches!(e.eval_str("1 / 0", &env), Err(EvalError::Type(_))));
        // counting by 1 would never get there at this magnitude
        assert!(e.eval_str("range(number('1e16'), number('1e16') + 10)", &env).is_err());
        assert!(e.eval_str("range(0, 2000000)", &env).is_err());
        assert!(matches!(e.eval_str("'a' - 1", &env), Err(EvalError::Type(_))));
        assert!(matches!(e.eval_str("1 +", &env), Err(EvalError::Syntax { .. })));
    }
}
