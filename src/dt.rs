//! Debug trace: nested enter/leave lines on stderr, indented by call
//! depth. Enabled at runtime via `set_enabled` or the `CHTML_TRACE`
//! env var; `nodt!` compiles a trace point out completely.

use std::{cell::Cell, sync::atomic::{AtomicBool, Ordering}};

use lazy_static::lazy_static;

thread_local! {
    static LEVEL: Cell<u32> = Cell::new(0);
}

fn trace_env_get() -> bool {
    match std::env::var("CHTML_TRACE") {
        Ok(v) => !matches!(v.as_str(), "0" | "" | "off" | "false" | "no"),
        Err(_) => false
    }
}

lazy_static! {
    static ref ENABLED: AtomicBool = AtomicBool::new(trace_env_get());
}

pub fn set_enabled(on: bool) {
    ENABLED.store(on, Ordering::Relaxed)
}

pub fn enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

const INDENT: &str = "                                                                                                ";

fn indent(n: u32) -> &'static str {
    &INDENT[0..(n as usize).min(INDENT.len())]
}

pub struct DtGuard {
    pub string: Option<String>
}

impl Drop for DtGuard {
    fn drop(&mut self) {
        if let Some(s) = &self.string {
            let l: u32 = LEVEL.with(|c| {
                let new = c.get().saturating_sub(1);
                c.set(new);
                new
            });
            eprintln!("{}{}[90m<- ({}){}[0m",
                      indent(l),
                      27 as char,
                      s,
                      27 as char);
        }
    }
}

pub fn enter(s: &str) {
    let l: u32 = LEVEL.with(|c| {
        let old = c.get();
        c.set(old + 1);
        old
    });
    eprintln!("{}-> ({})", indent(l), s);
}

/// Trace entry into the current block; the leave line is printed when
/// the block is exited.
#[macro_export]
macro_rules! dt {
    ($namestr:expr $(,$arg:expr)*) => {
        let _dt_guard = $crate::dt::DtGuard {
            string: if $crate::dt::enabled() {
                let mut s = String::new();
                s.push_str($namestr);
                $(
                    s.push_str(&format!(" {:?}", $arg));
                )*
                $crate::dt::enter(&s);
                Some(s)
            } else {
                None
            }
        };
    }
}

#[macro_export]
macro_rules! nodt {
    ($namestr:expr $(,$arg:expr)*) => {
    }
}
