//! The abstract evaluator: type propagation without runtime effects.
//!
//! Analyzing an expression yields `(type, is_temp, is_static)`. Static
//! expressions can be demanded as compile-time values, which is how
//! analysis drives pattern matching and invocation-table keys without
//! running the program.
//!
//! Recursion is handled through the invocation entry's tri-state guard:
//! entering analysis latches `Analyzing`, a reentrant lookup of the same
//! entry returns the unknown-type sentinel (`Ok(None)` here), and callers
//! propagate it. `if` merges its branches so one resolved side is enough;
//! a block whose tail suspended but that already committed a return type
//! still resolves. Bodies that finish with no committed type return void.
//! If the top level never makes progress, the diagnostic is "recursive
//! type propagation".

use std::{cell::RefCell, rc::Rc};

use crate::{
    ast::{
        BindingKind, Code, Expr, ExprKind, ExternalProc, Overloadable, Procedure, Record, Stmt, StmtKind,
    },
    cobject::CObject,
    context::Context,
    desugar,
    env::{Env, Object},
    error::CompileResult,
    evaluator,
    invoke::{self, EntryState, InvokeEntry},
    matching::{self, MatchResult},
    pattern::PatternCell,
    primops,
    source::Location,
    types::{self, TypeId},
    value::{self, Lowered, Value},
};

/// Result of analyzing one expression.
pub struct Analysis {
    pub ty: TypeId,
    pub is_temp: bool,
    pub is_static: bool,
    expr: RefCell<Option<Rc<Expr>>>,
    env: RefCell<Option<Env>>,
    value: RefCell<Option<Rc<Value>>>,
}

impl Analysis {
    pub fn new(ty: TypeId, is_temp: bool, is_static: bool) -> Rc<Self> {
        Rc::new(Self {
            ty,
            is_temp,
            is_static,
            expr: RefCell::new(None),
            env: RefCell::new(None),
            value: RefCell::new(None),
        })
    }

    fn attach(&self, expr: &Rc<Expr>, env: &Env) {
        *self.expr.borrow_mut() = Some(Rc::clone(expr));
        *self.env.borrow_mut() = Some(env.clone());
    }

    pub fn source_location(&self) -> Option<Location> {
        self.expr.borrow().as_ref().and_then(|e| e.location.clone())
    }

    /// Demands the expression's compile-time value; cached after the first
    /// evaluation.
    pub fn evaluate(&self, ctx: &Context) -> CompileResult<Rc<Value>> {
        if let Some(v) = self.value.borrow().as_ref() {
            return Ok(Rc::clone(v));
        }
        let expr = self
            .expr
            .borrow()
            .clone()
            .ok_or_else(|| ctx.error("expression is not static"))?;
        let env = self
            .env
            .borrow()
            .clone()
            .ok_or_else(|| ctx.error("expression is not static"))?;
        let v = evaluator::evaluate_to_static(ctx, &expr, &env)?;
        *self.value.borrow_mut() = Some(Rc::clone(&v));
        Ok(v)
    }

    pub fn evaluate_type(&self, ctx: &Context) -> CompileResult<TypeId> {
        value::value_to_type(ctx, self.evaluate(ctx)?.as_ref())
    }
}

/// Resolved return shape of an invocation.
#[derive(Clone, Copy)]
pub struct RetInfo {
    pub ty: TypeId,
    pub by_ref: bool,
}

/// Accumulates the return type of a body; every `return`/`returnref` in
/// one body must agree on both the type and the by-ref flag.
#[derive(Default)]
pub struct ReturnInfo {
    pub ty: Option<TypeId>,
    pub by_ref: bool,
}

impl ReturnInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, ctx: &Context, ty: TypeId, by_ref: bool) -> CompileResult<()> {
        match self.ty {
            None => {
                self.ty = Some(ty);
                self.by_ref = by_ref;
                Ok(())
            }
            Some(existing) if existing == ty && self.by_ref == by_ref => Ok(()),
            Some(_) => Err(ctx.error("return type mismatch")),
        }
    }
}

fn static_temp(ty: TypeId) -> Rc<Analysis> {
    Analysis::new(ty, true, true)
}

fn all_static(args: &[Rc<Analysis>]) -> bool {
    args.iter().all(|a| a.is_static)
}

fn int_literal_type(ctx: &Context, suffix: Option<&str>) -> CompileResult<TypeId> {
    match suffix {
        None | Some("i32") => Ok(TypeId::INT32),
        Some("i8") => Ok(TypeId::INT8),
        Some("i16") => Ok(TypeId::INT16),
        Some("i64") => Ok(TypeId::INT64),
        Some("u8") => Ok(TypeId::UINT8),
        Some("u16") => Ok(TypeId::UINT16),
        Some("u32") => Ok(TypeId::UINT32),
        Some("u64") => Ok(TypeId::UINT64),
        Some("f32") => Ok(TypeId::FLOAT32),
        Some("f64") => Ok(TypeId::FLOAT64),
        Some(other) => Err(ctx.error(format!("invalid literal suffix: {other}"))),
    }
}

fn float_literal_type(ctx: &Context, suffix: Option<&str>) -> CompileResult<TypeId> {
    match suffix {
        None | Some("f64") => Ok(TypeId::FLOAT64),
        Some("f32") => Ok(TypeId::FLOAT32),
        Some(other) => Err(ctx.error(format!("invalid float literal suffix: {other}"))),
    }
}

type AnalyzeResult = CompileResult<Option<Rc<Analysis>>>;

fn analyze_list(ctx: &Context, exprs: &[Rc<Expr>], env: &Env) -> CompileResult<Option<Vec<Rc<Analysis>>>> {
    let mut out = Vec::with_capacity(exprs.len());
    for expr in exprs {
        match analyze(ctx, expr, env)? {
            Some(a) => out.push(a),
            None => return Ok(None),
        }
    }
    Ok(Some(out))
}

pub fn analyze(ctx: &Context, expr: &Rc<Expr>, env: &Env) -> AnalyzeResult {
    let _guard = ctx.push_location(expr.location.clone());
    let result = analyze2(ctx, expr, env)?;
    if let Some(analysis) = &result {
        analysis.attach(expr, env);
    }
    Ok(result)
}

fn analyze2(ctx: &Context, expr: &Rc<Expr>, env: &Env) -> AnalyzeResult {
    match &expr.kind {
        ExprKind::BoolLiteral(_) => Ok(Some(static_temp(TypeId::BOOL))),

        ExprKind::IntLiteral { suffix, .. } => {
            Ok(Some(static_temp(int_literal_type(ctx, suffix.as_deref())?)))
        }

        ExprKind::FloatLiteral { suffix, .. } => {
            Ok(Some(static_temp(float_literal_type(ctx, suffix.as_deref())?)))
        }

        ExprKind::CharLiteral { value, converted } => {
            let converted = desugar::cached_expr(converted, || desugar::convert_char_literal(ctx, *value))?;
            analyze(ctx, &converted, env)
        }

        ExprKind::StringLiteral { value, converted } => {
            let converted = desugar::cached_expr(converted, || desugar::convert_string_literal(ctx, value))?;
            analyze(ctx, &converted, env)
        }

        ExprKind::NameRef(name) => match env.lookup(ctx, *name)? {
            Object::Value(v) => Ok(Some(static_temp(v.ty))),
            Object::Analysis(a) => Ok(Some(Analysis::new(a.ty, false, false))),
            _ => Ok(Some(static_temp(TypeId::COMPILER_OBJECT))),
        },

        ExprKind::Tuple { args, converted } => {
            let converted = desugar::cached_expr(converted, || {
                desugar::convert_tuple(ctx, args, expr.location.clone())
            })?;
            analyze(ctx, &converted, env)
        }

        ExprKind::Array { args, converted } => {
            let converted = desugar::cached_expr(converted, || {
                desugar::convert_array(ctx, args, expr.location.clone())
            })?;
            analyze(ctx, &converted, env)
        }

        ExprKind::Indexing { expr: head, args } => {
            let Some(indexable) = analyze(ctx, head, env)? else {
                return Ok(None);
            };
            if !indexable.is_static {
                return Err(ctx.error("invalid indexing operation"));
            }
            let lowered = value::lower(ctx, evaluator::evaluate_to_static(ctx, head, env)?);
            let Some(args) = analyze_list(ctx, args, env)? else {
                return Ok(None);
            };
            let rinfo = match lowered {
                Lowered::Object(obj) => analyze_indexing(ctx, &obj)?,
                Lowered::Value(_) => return Err(ctx.error("invalid indexing operation")),
            };
            Ok(Some(Analysis::new(rinfo.ty, !rinfo.by_ref, all_static(&args))))
        }

        ExprKind::Call { expr: callee, args } => {
            let Some(callable) = analyze(ctx, callee, env)? else {
                return Ok(None);
            };
            if !callable.is_static {
                return Err(ctx.error("invalid call operation"));
            }
            let lowered = value::lower(ctx, evaluator::evaluate_to_static(ctx, callee, env)?);
            let Some(args) = analyze_list(ctx, args, env)? else {
                return Ok(None);
            };
            let obj = match lowered {
                Lowered::Object(obj) => obj,
                Lowered::Value(_) => return Err(ctx.error("invalid call operation")),
            };
            let Some(rinfo) = analyze_invoke(ctx, &obj, &args)? else {
                return Ok(None);
            };
            Ok(Some(Analysis::new(rinfo.ty, !rinfo.by_ref, all_static(&args))))
        }

        ExprKind::FieldRef { expr: base, name } => {
            let name_value = value::co_to_value(ctx, &CObject::Name(*name))?;
            let name_expr = Expr::synthetic(ExprKind::ValueExpr(name_value));
            let exprs = [Rc::clone(base), name_expr];
            let Some(args) = analyze_list(ctx, &exprs, env)? else {
                return Ok(None);
            };
            let Some(rinfo) = analyze_invoke(ctx, &CObject::PrimOp(primops::PrimOp::RecordFieldRefByName), &args)?
            else {
                return Ok(None);
            };
            Ok(Some(Analysis::new(rinfo.ty, !rinfo.by_ref, all_static(&args))))
        }

        ExprKind::TupleRef { expr: base, index } => {
            let index_value = value::int_to_value(ctx, i32::try_from(*index).expect("tuple index fits in int32"))?;
            let index_expr = Expr::synthetic(ExprKind::ValueExpr(index_value));
            let exprs = [Rc::clone(base), index_expr];
            let Some(args) = analyze_list(ctx, &exprs, env)? else {
                return Ok(None);
            };
            let Some(rinfo) = analyze_invoke(ctx, &CObject::PrimOp(primops::PrimOp::TupleRef), &args)? else {
                return Ok(None);
            };
            Ok(Some(Analysis::new(rinfo.ty, !rinfo.by_ref, all_static(&args))))
        }

        ExprKind::UnaryOp { op, expr: operand, converted } => {
            let converted = desugar::cached_expr(converted, || {
                desugar::convert_unary_op(ctx, *op, operand, expr.location.clone())
            })?;
            analyze(ctx, &converted, env)
        }

        ExprKind::BinaryOp {
            op,
            left,
            right,
            converted,
        } => {
            let converted = desugar::cached_expr(converted, || {
                desugar::convert_binary_op(ctx, *op, left, right, expr.location.clone())
            })?;
            analyze(ctx, &converted, env)
        }

        ExprKind::And { left, right } => {
            let (Some(a1), Some(a2)) = (analyze(ctx, left, env)?, analyze(ctx, right, env)?) else {
                return Ok(None);
            };
            if a1.ty != a2.ty {
                return Err(ctx.error("type mismatch in 'and' expression"));
            }
            Ok(Some(Analysis::new(
                a1.ty,
                a1.is_temp || a2.is_temp,
                a1.is_static && a2.is_static,
            )))
        }

        ExprKind::Or { left, right } => {
            let (Some(a1), Some(a2)) = (analyze(ctx, left, env)?, analyze(ctx, right, env)?) else {
                return Ok(None);
            };
            if a1.ty != a2.ty {
                return Err(ctx.error("type mismatch in 'or' expression"));
            }
            Ok(Some(Analysis::new(
                a1.ty,
                a1.is_temp || a2.is_temp,
                a1.is_static && a2.is_static,
            )))
        }

        ExprKind::Scoped { env: captured, expr } => analyze(ctx, expr, captured),

        ExprKind::ValueExpr(v) => Ok(Some(static_temp(v.ty))),
    }
}

//
// indexing
//

fn analyze_indexing(ctx: &Context, obj: &CObject) -> CompileResult<RetInfo> {
    match obj {
        CObject::Record(_) => Ok(RetInfo {
            ty: TypeId::COMPILER_OBJECT,
            by_ref: false,
        }),
        CObject::PrimOp(primops::PrimOp::Pointer | primops::PrimOp::Array | primops::PrimOp::Tuple) => Ok(RetInfo {
            ty: TypeId::COMPILER_OBJECT,
            by_ref: false,
        }),
        _ => Err(ctx.error("invalid indexing operation")),
    }
}

//
// invocation
//

/// Analyzes invoking `obj` with `args`; `Ok(None)` is the recursion
/// sentinel.
pub fn analyze_invoke(ctx: &Context, obj: &CObject, args: &[Rc<Analysis>]) -> CompileResult<Option<RetInfo>> {
    match obj {
        CObject::Record(record) => analyze_invoke_record(ctx, record, args).map(Some),
        CObject::Type(ty) => Ok(Some(RetInfo {
            ty: *ty,
            by_ref: false,
        })),
        CObject::Procedure(procedure) => analyze_invoke_procedure(ctx, procedure, args),
        CObject::Overloadable(overloadable) => analyze_invoke_overloadable(ctx, overloadable, args),
        CObject::External(external) => analyze_invoke_external(ctx, external).map(Some),
        CObject::PrimOp(op) => primops::analyze_prim_op(ctx, *op, args).map(Some),
        CObject::Name(_) => Err(ctx.error("invalid operation")),
    }
}

fn analyze_invoke_record(ctx: &Context, record: &Rc<Record>, args: &[Rc<Analysis>]) -> CompileResult<RetInfo> {
    types::ensure_arity(ctx, args.len(), record.formal_args.len())?;
    let module = ctx.module(record.module.get().expect("record installed in a module"));
    let env = module.env().child();
    let mut cells = Vec::with_capacity(record.pattern_vars.len());
    for &var in &record.pattern_vars {
        let cell = PatternCell::unbound(Some(var));
        env.add_local(ctx, var, Object::Cell(Rc::clone(&cell)))?;
        cells.push(cell);
    }
    for (i, (arg, formal)) in args.iter().zip(&record.formal_args).enumerate() {
        if !matching::match_formal_arg(ctx, arg, formal, &env)? {
            return Err(ctx.error(format!("mismatch at argument {}", i + 1)));
        }
    }
    let mut cell_values = Vec::with_capacity(cells.len());
    for cell in &cells {
        cell_values.push(crate::pattern::deref_cell(ctx, cell)?);
    }
    let ty = types::record_type(ctx, record, &cell_values)?;
    Ok(RetInfo { ty, by_ref: false })
}

fn stamp_resolved(ctx: &Context, name: &str, entry: &InvokeEntry, rinfo: &ReturnInfo) -> CompileResult<RetInfo> {
    let ty = rinfo.ty.expect("analyzed body committed a return type");
    entry.return_type.set(Some(ty));
    entry.return_by_ref.set(rinfo.by_ref);
    entry.state.set(EntryState::Resolved);
    ctx.tracer
        .borrow_mut()
        .entry_resolved(name, &types::type_print(ctx, ty)?);
    Ok(RetInfo {
        ty,
        by_ref: rinfo.by_ref,
    })
}

fn analyze_invoke_procedure(
    ctx: &Context,
    procedure: &Rc<Procedure>,
    args: &[Rc<Analysis>],
) -> CompileResult<Option<RetInfo>> {
    let (entry, table) = invoke::lookup_procedure_invoke(ctx, procedure, args)?;
    if let Some(ty) = entry.return_type.get() {
        return Ok(Some(RetInfo {
            ty,
            by_ref: entry.return_by_ref.get(),
        }));
    }
    if entry.state.get() == EntryState::Analyzing {
        return Ok(None);
    }
    entry.state.set(EntryState::Analyzing);

    let env = ctx
        .module(procedure.module.get().expect("procedure installed in a module"))
        .env()
        .clone();
    let outcome = analyze_specialization(ctx, &procedure.code, &env, args);
    match outcome {
        Ok(Some(rinfo)) => Ok(Some(stamp_resolved(
            ctx,
            &ctx.name_text(procedure.name),
            &entry,
            &rinfo,
        )?)),
        Ok(None) => {
            // a failed match never leaves a latched entry behind
            table.remove_entry(&entry);
            let result = matching::match_invoke(ctx, &procedure.code, &env, args)?;
            Err(matching::signal_match_error(ctx, &result, args))
        }
        Err(err) => {
            table.remove_entry(&entry);
            Err(err)
        }
    }
}

fn analyze_invoke_overloadable(
    ctx: &Context,
    overloadable: &Rc<Overloadable>,
    args: &[Rc<Analysis>],
) -> CompileResult<Option<RetInfo>> {
    let (entry, table) = invoke::lookup_overloadable_invoke(ctx, overloadable, args)?;
    if let Some(ty) = entry.return_type.get() {
        return Ok(Some(RetInfo {
            ty,
            by_ref: entry.return_by_ref.get(),
        }));
    }
    if entry.state.get() == EntryState::Analyzing {
        return Ok(None);
    }
    entry.state.set(EntryState::Analyzing);

    let overloads = overloadable.overloads.borrow().clone();
    for overload in overloads {
        let env = ctx
            .module(overload.module.get().expect("overload installed in a module"))
            .env()
            .clone();
        match analyze_specialization(ctx, &overload.code, &env, args) {
            Ok(Some(rinfo)) => {
                return Ok(Some(stamp_resolved(
                    ctx,
                    &ctx.name_text(overloadable.name),
                    &entry,
                    &rinfo,
                )?));
            }
            Ok(None) => continue,
            Err(err) => {
                table.remove_entry(&entry);
                return Err(err);
            }
        }
    }
    table.remove_entry(&entry);
    Err(ctx.error("no matching overload"))
}

/// Matches one code template and, on success, analyzes its body.
/// `Ok(None)` means the template did not match.
fn analyze_specialization(
    ctx: &Context,
    code: &Rc<Code>,
    code_env: &Env,
    args: &[Rc<Analysis>],
) -> CompileResult<Option<ReturnInfo>> {
    let result = matching::match_invoke(ctx, code, code_env, args)?;
    let MatchResult::Success(matched_env) = result else {
        return Ok(None);
    };
    let env = matching::bind_value_args(ctx, &matched_env, args, code)?;
    let mut rinfo = ReturnInfo::new();
    if !analyze_code_body(ctx, code, &env, &mut rinfo)? {
        return Err(ctx.error("recursive type propagation"));
    }
    Ok(Some(rinfo))
}

fn analyze_invoke_external(ctx: &Context, external: &Rc<ExternalProc>) -> CompileResult<RetInfo> {
    let (_, return_type, _) = evaluator::init_external(ctx, external)?;
    Ok(RetInfo {
        ty: return_type,
        by_ref: false,
    })
}

//
// bodies and statements
//

pub fn analyze_code_body(ctx: &Context, code: &Rc<Code>, env: &Env, rinfo: &mut ReturnInfo) -> CompileResult<bool> {
    if !analyze_statement(ctx, &code.body, env, rinfo)? {
        return Ok(false);
    }
    if rinfo.ty.is_none() {
        rinfo.set(ctx, TypeId::VOID, false)?;
    }
    Ok(true)
}

/// Returns false when this statement suspended on the recursion sentinel.
fn analyze_statement(ctx: &Context, stmt: &Rc<Stmt>, env: &Env, rinfo: &mut ReturnInfo) -> CompileResult<bool> {
    let _guard = ctx.push_location(stmt.location.clone());
    match &stmt.kind {
        StmtKind::Block(statements) => {
            let mut env = env.clone();
            let mut inner = ReturnInfo::new();
            let mut suspended = false;
            for statement in statements {
                if let StmtKind::Binding { .. } = statement.kind {
                    match analyze_binding(ctx, statement, &env)? {
                        Some(extended) => env = extended,
                        None => {
                            suspended = true;
                            break;
                        }
                    }
                } else if !analyze_statement(ctx, statement, &env, &mut inner)? {
                    suspended = true;
                    break;
                }
            }
            if suspended && inner.ty.is_none() {
                return Ok(false);
            }
            if let Some(ty) = inner.ty {
                rinfo.set(ctx, ty, inner.by_ref)?;
            }
            Ok(true)
        }

        StmtKind::Label(_) | StmtKind::Binding { .. } | StmtKind::Assignment { .. } | StmtKind::Goto(_) => Ok(true),

        StmtKind::Return(expr) => match expr {
            None => {
                rinfo.set(ctx, TypeId::VOID, false)?;
                Ok(true)
            }
            Some(expr) => match analyze(ctx, expr, env)? {
                None => Ok(false),
                Some(result) => {
                    rinfo.set(ctx, result.ty, false)?;
                    Ok(true)
                }
            },
        },

        StmtKind::ReturnRef(expr) => match analyze(ctx, expr, env)? {
            None => Ok(false),
            Some(result) => {
                rinfo.set(ctx, result.ty, true)?;
                Ok(true)
            }
        },

        StmtKind::If {
            then_part, else_part, ..
        } => {
            let then_resolved = analyze_statement(ctx, then_part, env, rinfo)?;
            let else_resolved = match else_part {
                Some(else_part) => analyze_statement(ctx, else_part, env, rinfo)?,
                None => true,
            };
            // either branch resolving is progress; the other may retry
            Ok(then_resolved || else_resolved)
        }

        StmtKind::ExprStatement(_) => Ok(true),

        StmtKind::While { body, .. } => {
            analyze_statement(ctx, body, env, rinfo)?;
            Ok(true)
        }

        StmtKind::Break | StmtKind::Continue => Ok(true),

        StmtKind::For {
            variable,
            expr,
            body,
            converted,
        } => {
            let converted =
                desugar::cached_stmt(converted, || desugar::convert_for_statement(ctx, *variable, expr, body))?;
            analyze_statement(ctx, &converted, env, rinfo)
        }
    }
}

/// Extends the environment with one binding; `Ok(None)` when the
/// initializer suspended on the recursion sentinel.
fn analyze_binding(ctx: &Context, stmt: &Rc<Stmt>, env: &Env) -> CompileResult<Option<Env>> {
    let StmtKind::Binding { kind, name, expr } = &stmt.kind else {
        unreachable!("caller checked for a binding");
    };
    let _guard = ctx.push_location(stmt.location.clone());
    let extended = env.child();
    match kind {
        BindingKind::Var | BindingKind::Ref => {
            let Some(right) = analyze(ctx, expr, env)? else {
                return Ok(None);
            };
            extended.add_local(ctx, *name, Object::Analysis(right))?;
        }
        BindingKind::Static => {
            let right = evaluator::evaluate_to_static(ctx, expr, env)?;
            extended.add_local(ctx, *name, Object::Value(right))?;
        }
    }
    Ok(Some(extended))
}
