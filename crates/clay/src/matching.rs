//! The match engine: testing a code template against an argument vector.
//!
//! The same algorithm runs in two modes — against concrete values during
//! evaluation and against analyses during type propagation — so arguments
//! are abstracted behind the [`Argument`] trait: a thing with a type that
//! can produce a compile-time value on demand and knows how to enter a
//! specialization's scope.

use std::rc::Rc;

use crate::{
    analyzer::Analysis,
    ast::{Code, FormalArg},
    context::Context,
    env::{Env, Object},
    error::{CompileError, CompileResult},
    evaluator,
    pattern::{self, PatternCell},
    source::Location,
    types::TypeId,
    value::Value,
};

/// An actual argument, concrete or analyzed.
pub trait Argument {
    /// The argument's runtime type.
    fn arg_type(&self, ctx: &Context) -> CompileResult<TypeId>;

    /// The argument's compile-time value, demanded when matching a static
    /// formal or keying an invocation entry.
    fn arg_value(&self, ctx: &Context) -> CompileResult<Rc<Value>>;

    /// The object bound under a value formal's name inside the
    /// specialization scope.
    fn bind_object(&self, ctx: &Context) -> CompileResult<Object>;

    /// Source location for argument-mismatch diagnostics.
    fn location(&self) -> Option<Location> {
        None
    }
}

impl Argument for Rc<Value> {
    fn arg_type(&self, _ctx: &Context) -> CompileResult<TypeId> {
        Ok(self.ty)
    }

    fn arg_value(&self, _ctx: &Context) -> CompileResult<Rc<Value>> {
        Ok(Rc::clone(self))
    }

    fn bind_object(&self, _ctx: &Context) -> CompileResult<Object> {
        // owned arguments enter the scope as non-owning aliases so the
        // binding never takes over the caller's storage
        if self.owned {
            Ok(Object::Value(Rc::new(self.alias())))
        } else {
            Ok(Object::Value(Rc::clone(self)))
        }
    }
}

impl Argument for Rc<Analysis> {
    fn arg_type(&self, _ctx: &Context) -> CompileResult<TypeId> {
        Ok(self.ty)
    }

    fn arg_value(&self, ctx: &Context) -> CompileResult<Rc<Value>> {
        self.evaluate(ctx)
    }

    fn bind_object(&self, _ctx: &Context) -> CompileResult<Object> {
        Ok(Object::Analysis(Analysis::new(self.ty, false, false)))
    }

    fn location(&self) -> Option<Location> {
        self.source_location()
    }
}

/// Outcome of matching one code template against an argument vector.
pub enum MatchResult {
    Success(Env),
    ArgCountError,
    ArgMismatch(usize),
    PredicateFailure,
}

/// Matches `code` against `args` in its defining environment.
///
/// On success the returned environment binds every pattern variable to its
/// inferred value, and the predicate (if any) has already passed.
pub fn match_invoke<A: Argument>(
    ctx: &Context,
    code: &Rc<Code>,
    code_env: &Env,
    args: &[A],
) -> CompileResult<MatchResult> {
    if args.len() != code.formal_args.len() {
        return Ok(MatchResult::ArgCountError);
    }
    let pattern_env = code_env.child();
    let mut cells = Vec::with_capacity(code.pattern_vars.len());
    for &var in &code.pattern_vars {
        let cell = PatternCell::unbound(Some(var));
        pattern_env.add_local(ctx, var, Object::Cell(Rc::clone(&cell)))?;
        cells.push(cell);
    }
    for (i, (arg, formal)) in args.iter().zip(&code.formal_args).enumerate() {
        if !match_formal_arg(ctx, arg, formal, &pattern_env)? {
            return Ok(MatchResult::ArgMismatch(i));
        }
    }
    let scope_env = code_env.child();
    for (&var, cell) in code.pattern_vars.iter().zip(&cells) {
        let v = pattern::deref_cell(ctx, cell)?;
        scope_env.add_local(ctx, var, Object::Value(v))?;
    }
    if let Some(predicate) = &code.predicate {
        if !evaluator::evaluate_to_bool(ctx, predicate, &scope_env)? {
            return Ok(MatchResult::PredicateFailure);
        }
    }
    Ok(MatchResult::Success(scope_env))
}

pub fn match_formal_arg<A: Argument>(
    ctx: &Context,
    arg: &A,
    formal: &FormalArg,
    env: &Env,
) -> CompileResult<bool> {
    match formal {
        FormalArg::Value { ty: None, .. } => Ok(true),
        FormalArg::Value { ty: Some(ty), .. } => {
            let pattern = pattern::evaluate_pattern(ctx, ty, env)?;
            pattern::unify_type(ctx, &pattern, arg.arg_type(ctx)?)
        }
        FormalArg::Static { pattern, .. } => {
            let pattern = pattern::evaluate_pattern(ctx, pattern, env)?;
            pattern::unify(ctx, &pattern, &arg.arg_value(ctx)?)
        }
    }
}

/// Turns a failed match into the fatal diagnostic, pointing argument
/// mismatches at the offending argument.
pub fn signal_match_error<A: Argument>(ctx: &Context, result: &MatchResult, args: &[A]) -> CompileError {
    match result {
        MatchResult::Success(_) => unreachable!("successful match is not an error"),
        MatchResult::ArgCountError => ctx.error("incorrect no. of arguments"),
        MatchResult::ArgMismatch(i) => {
            ctx.error_at(args[*i].location(), format!("mismatch at argument {}", i + 1))
        }
        MatchResult::PredicateFailure => ctx.error("predicate failure"),
    }
}

/// Extends a matched environment with the value formals bound to the
/// actual arguments.
pub fn bind_value_args<A: Argument>(
    ctx: &Context,
    matched_env: &Env,
    args: &[A],
    code: &Rc<Code>,
) -> CompileResult<Env> {
    let env = matched_env.child();
    for (arg, formal) in args.iter().zip(&code.formal_args) {
        if let FormalArg::Value { name, .. } = formal {
            env.add_local(ctx, *name, arg.bind_object(ctx)?)?;
        }
    }
    Ok(env)
}
