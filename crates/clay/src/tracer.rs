//! Engine observability hooks.
//!
//! The engine reports a handful of interesting events through the
//! [`Tracer`] trait: module loads, invocation-entry installation and
//! resolution, and external-procedure calls. The default [`NoopTracer`]
//! makes the hooks free; [`StderrTracer`] prints one line per event and is
//! what the CLI enables under `CLAY_TRACE=1`.

/// Receiver for engine events. All methods default to no-ops so tracers
/// implement only what they care about.
pub trait Tracer {
    /// A module finished loading and initializing.
    fn module_loaded(&mut self, name: &str) {
        let _ = name;
    }

    /// A fresh invocation entry was installed for `callable` at `arity`.
    fn entry_installed(&mut self, callable: &str, arity: usize) {
        let _ = (callable, arity);
    }

    /// An invocation entry's return type was resolved by the analyzer.
    fn entry_resolved(&mut self, callable: &str, return_type: &str) {
        let _ = (callable, return_type);
    }

    /// An external procedure is about to be invoked through the backend.
    fn external_call(&mut self, name: &str) {
        let _ = name;
    }
}

/// Discards every event.
#[derive(Default)]
pub struct NoopTracer;

impl Tracer for NoopTracer {}

/// Prints one line per event to stderr.
#[derive(Default)]
pub struct StderrTracer;

impl Tracer for StderrTracer {
    fn module_loaded(&mut self, name: &str) {
        eprintln!("[clay] module loaded: {name}");
    }

    fn entry_installed(&mut self, callable: &str, arity: usize) {
        eprintln!("[clay] invoke entry installed: {callable}/{arity}");
    }

    fn entry_resolved(&mut self, callable: &str, return_type: &str) {
        eprintln!("[clay] invoke entry resolved: {callable} -> {return_type}");
    }

    fn external_call(&mut self, name: &str) {
        eprintln!("[clay] external call: {name}");
    }
}
