//! Printing diagnostics to stderr. `warn!` is always on, prefix the
//! name with `no` to compile a statement out.

use std::sync::atomic::{AtomicBool, Ordering};

/// Set via `set_verbose` (or `CHTML_VERBOSE` through `Config`);
/// gates `info!` only, `warn!` is unconditional.
pub static VERBOSE: AtomicBool = AtomicBool::new(false);

pub fn set_verbose(on: bool) {
    VERBOSE.store(on, Ordering::Relaxed)
}

pub fn verbose() -> bool {
    VERBOSE.load(Ordering::Relaxed)
}

#[macro_export]
macro_rules! warn {
    ($formatstr:expr $(,$arg:expr)*) => { {
        use std::io::Write;
        let mut outp = std::io::BufWriter::new(std::io::stderr().lock());
        let _ = write!(&mut outp, "W: ");
        let _ = write!(&mut outp, $formatstr $(,$arg)*);
        let _ = writeln!(&mut outp, " at {:?} line {}", file!(), line!());
        let _ = outp.flush();
    } }
}

#[macro_export]
macro_rules! nowarn {
    ($formatstr:expr $(,$arg:expr)*) => {
    }
}

/// Like `warn!` but only printed when verbose output was requested.
#[macro_export]
macro_rules! info {
    ($formatstr:expr $(,$arg:expr)*) => { {
        if $crate::warn::verbose() {
            use std::io::Write;
            let mut outp = std::io::BufWriter::new(std::io::stderr().lock());
            let _ = write!(&mut outp, "I: ");
            let _ = write!(&mut outp, $formatstr $(,$arg)*);
            let _ = writeln!(&mut outp);
            let _ = outp.flush();
        }
    } }
}
