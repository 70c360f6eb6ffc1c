//! The driver: load a program, analyze `main`, then evaluate it.
//!
//! Analysis and evaluation share one engine context — and therefore one
//! set of invocation tables — so every specialization resolved while
//! type-propagating `main` is reused verbatim by the interpreter.

use std::path::Path;

use crate::{
    analyzer,
    backend::HostFn,
    context::Context,
    error::CompileResult,
    evaluator,
    loader,
    tracer::Tracer,
    types,
    value,
};

/// Result of running a program end to end.
#[derive(Debug)]
pub struct RunOutcome {
    /// `main`'s inferred return type, as reported by analysis.
    pub return_type: String,
    pub return_by_ref: bool,
    /// The evaluated result's type and printed value.
    pub value_type: String,
    pub value: String,
}

pub struct Runner {
    ctx: Context,
}

impl Runner {
    pub fn new() -> Self {
        Self { ctx: Context::new() }
    }

    /// Adds a root directory for dotted-name module resolution.
    pub fn add_search_path(&self, path: impl Into<std::path::PathBuf>) {
        loader::add_search_path(&self.ctx, path);
    }

    pub fn set_tracer(&self, tracer: Box<dyn Tracer>) {
        self.ctx.set_tracer(tracer);
    }

    /// Exposes a host function to `external` declarations under `name`.
    pub fn register_external(&self, name: impl Into<String>, thunk: HostFn) {
        self.ctx.backend.register(name, thunk);
    }

    /// `allocateMemory` blocks not yet released; zero after a leak-free
    /// run.
    pub fn outstanding_allocations(&self) -> usize {
        self.ctx.outstanding_allocations()
    }

    /// Loads `path` and its imports, infers `main`'s return type, runs
    /// `main`, and reports both.
    pub fn run_file(&self, path: &Path) -> CompileResult<RunOutcome> {
        let ctx = &self.ctx;
        let module = loader::load_program(ctx, path)?;
        let main_object = module.env().lookup(ctx, ctx.intern("main"))?;
        let main_callable = evaluator::object_to_cobject(ctx, main_object)?;

        let Some(rinfo) = analyzer::analyze_invoke(ctx, &main_callable, &[])? else {
            return Err(ctx.error("recursive type propagation"));
        };
        let return_type = types::type_print(ctx, rinfo.ty)?;

        let result = evaluator::invoke(ctx, &main_callable, &[])?;
        let value_type = types::type_print(ctx, result.ty)?;
        let printed = value::value_print(ctx, &result)?;

        Ok(RunOutcome {
            return_type,
            return_by_ref: rinfo.by_ref,
            value_type,
            value: printed,
        })
    }
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}
