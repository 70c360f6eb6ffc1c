//! The concrete evaluator: a tree-walking interpreter over typed values.
//!
//! Expression evaluation mirrors the analyzer's walk but produces values.
//! Owning intermediates are installed into the current temp block and are
//! destroyed when it pops; every statement-level entry point that can
//! produce rvalues opens its own block and closes it on all exit paths,
//! including errors.
//!
//! Statements evaluate to an optional [`StatementResult`]: `goto` unwinds
//! blocks until a label catches it, `break`/`continue` unwind to the
//! nearest loop, `return`/`returnref` unwind to the calling invocation.
//! Labels are collected by a pre-pass that stops at the first binding and
//! is re-run after each binding executes, so a forward `goto` can only
//! land on labels whose bindings are already live.

use std::rc::Rc;

use ahash::AHashMap;
use smallvec::SmallVec;

use crate::{
    ast::{
        BindingKind, Code, Expr, ExprKind, ExternalProc, ExternalSig, Overloadable, Procedure, Record, Stmt,
        StmtKind,
    },
    backend::FnHandle,
    cobject::CObject,
    context::Context,
    desugar,
    env::{Env, ModuleId, Object},
    error::CompileResult,
    intern::NameId,
    invoke,
    matching::{self, MatchResult},
    pattern::PatternCell,
    primops::{self, PrimOp},
    source::Location,
    types::{self, TypeId, TypeKind},
    value::{self, Lowered, Value},
};

//
// entry points that open their own temp block
//

/// Evaluates to an owning value, cloning a non-owning result out of the
/// temp block before it pops.
pub fn evaluate_to_static(ctx: &Context, expr: &Rc<Expr>, env: &Env) -> CompileResult<Rc<Value>> {
    let _guard = ctx.push_location(expr.location.clone());
    ctx.push_temp_block();
    let result = (|| {
        let v = evaluate_non_void2(ctx, expr, env)?;
        if v.owned { Ok(v) } else { value::clone_value(ctx, &v) }
    })();
    let popped = ctx.pop_temp_block();
    let v = result?;
    popped?;
    Ok(v)
}

pub fn evaluate_type(ctx: &Context, expr: &Rc<Expr>, env: &Env) -> CompileResult<TypeId> {
    let _guard = ctx.push_location(expr.location.clone());
    ctx.push_temp_block();
    let result = (|| {
        let v = evaluate_non_void2(ctx, expr, env)?;
        value::value_to_type(ctx, &v)
    })();
    let popped = ctx.pop_temp_block();
    let ty = result?;
    popped?;
    Ok(ty)
}

pub fn evaluate_non_void_type(ctx: &Context, expr: &Rc<Expr>, env: &Env) -> CompileResult<TypeId> {
    let ty = evaluate_type(ctx, expr, env)?;
    if ty == TypeId::VOID {
        let _guard = ctx.push_location(expr.location.clone());
        return Err(ctx.error("void type not allowed here"));
    }
    Ok(ty)
}

pub fn evaluate_to_bool(ctx: &Context, expr: &Rc<Expr>, env: &Env) -> CompileResult<bool> {
    let _guard = ctx.push_location(expr.location.clone());
    ctx.push_temp_block();
    let result = (|| {
        let v = evaluate_non_void2(ctx, expr, env)?;
        value::value_to_bool(ctx, &v)
    })();
    let popped = ctx.pop_temp_block();
    let b = result?;
    popped?;
    Ok(b)
}

//
// entry points that reuse the caller's temp block
//

fn evaluate_non_void(ctx: &Context, expr: &Rc<Expr>, env: &Env) -> CompileResult<Rc<Value>> {
    let _guard = ctx.push_location(expr.location.clone());
    evaluate_non_void2(ctx, expr, env)
}

fn evaluate(ctx: &Context, expr: &Rc<Expr>, env: &Env) -> CompileResult<Rc<Value>> {
    let _guard = ctx.push_location(expr.location.clone());
    evaluate2(ctx, expr, env)
}

/// Evaluates a subexpression, installing an owning result into the current
/// temp block so it survives until the enclosing statement finishes.
fn evaluate_nested(ctx: &Context, expr: &Rc<Expr>, env: &Env) -> CompileResult<Rc<Value>> {
    let _guard = ctx.push_location(expr.location.clone());
    let v = evaluate_non_void2(ctx, expr, env)?;
    if v.owned {
        ctx.install_temp(Rc::clone(&v));
    }
    Ok(v)
}

fn evaluate_non_void2(ctx: &Context, expr: &Rc<Expr>, env: &Env) -> CompileResult<Rc<Value>> {
    let v = evaluate2(ctx, expr, env)?;
    if v.ty == TypeId::VOID {
        return Err(ctx.error("expecting non void-type expression"));
    }
    Ok(v)
}

fn evaluate2(ctx: &Context, expr: &Rc<Expr>, env: &Env) -> CompileResult<Rc<Value>> {
    match &expr.kind {
        ExprKind::BoolLiteral(x) => value::bool_to_value(ctx, *x),

        ExprKind::IntLiteral { text, suffix } => eval_int_literal(ctx, text, suffix.as_deref()),

        ExprKind::FloatLiteral { text, suffix } => eval_float_literal(ctx, text, suffix.as_deref()),

        ExprKind::CharLiteral { value, converted } => {
            let converted = desugar::cached_expr(converted, || desugar::convert_char_literal(ctx, *value))?;
            evaluate(ctx, &converted, env)
        }

        ExprKind::StringLiteral { value, converted } => {
            let converted = desugar::cached_expr(converted, || desugar::convert_string_literal(ctx, value))?;
            evaluate(ctx, &converted, env)
        }

        ExprKind::NameRef(name) => match env.lookup(ctx, *name)? {
            Object::Value(v) => {
                if v.owned {
                    // owned values in scope are statics; clone so the
                    // binding's storage stays untouched
                    value::clone_value(ctx, &v)
                } else {
                    Ok(v)
                }
            }
            obj => value::co_to_value(ctx, &object_to_cobject(ctx, obj)?),
        },

        ExprKind::Tuple { args, converted } => {
            let converted = desugar::cached_expr(converted, || {
                desugar::convert_tuple(ctx, args, expr.location.clone())
            })?;
            evaluate(ctx, &converted, env)
        }

        ExprKind::Array { args, converted } => {
            let converted = desugar::cached_expr(converted, || {
                desugar::convert_array(ctx, args, expr.location.clone())
            })?;
            evaluate(ctx, &converted, env)
        }

        ExprKind::Indexing { expr: head, args } => {
            let thing = evaluate_nested(ctx, head, env)?;
            let mut arg_values: SmallVec<[Rc<Value>; 4]> = SmallVec::with_capacity(args.len());
            for arg in args {
                arg_values.push(evaluate_nested(ctx, arg, env)?);
            }
            match value::lower(ctx, thing) {
                Lowered::Object(obj) => invoke_indexing(ctx, &obj, &arg_values),
                Lowered::Value(_) => Err(ctx.error("invalid indexing operation")),
            }
        }

        ExprKind::Call { expr: callee, args } => {
            let thing = evaluate_nested(ctx, callee, env)?;
            let mut arg_values: SmallVec<[Rc<Value>; 4]> = SmallVec::with_capacity(args.len());
            for arg in args {
                arg_values.push(evaluate_nested(ctx, arg, env)?);
            }
            match value::lower(ctx, thing) {
                Lowered::Object(obj) => invoke(ctx, &obj, &arg_values),
                Lowered::Value(_) => Err(ctx.error("invalid operation")),
            }
        }

        ExprKind::FieldRef { expr: base, name } => {
            let thing = evaluate_nested(ctx, base, env)?;
            let name_value = value::co_to_value(ctx, &CObject::Name(*name))?;
            invoke(
                ctx,
                &CObject::PrimOp(PrimOp::RecordFieldRefByName),
                &[thing, name_value],
            )
        }

        ExprKind::TupleRef { expr: base, index } => {
            let thing = evaluate_nested(ctx, base, env)?;
            let index_value = value::int_to_value(ctx, i32::try_from(*index).expect("tuple index fits in int32"))?;
            invoke(ctx, &CObject::PrimOp(PrimOp::TupleRef), &[thing, index_value])
        }

        ExprKind::UnaryOp { op, expr: operand, converted } => {
            let converted = desugar::cached_expr(converted, || {
                desugar::convert_unary_op(ctx, *op, operand, expr.location.clone())
            })?;
            evaluate(ctx, &converted, env)
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
            evaluate(ctx, &converted, env)
        }

        ExprKind::And { left, right } => {
            let v1 = evaluate(ctx, left, env)?;
            let truth = invoke(ctx, &CObject::PrimOp(PrimOp::BoolTruth), &[Rc::clone(&v1)])?;
            if !value::value_to_bool(ctx, &truth)? {
                return Ok(v1);
            }
            evaluate(ctx, right, env)
        }

        ExprKind::Or { left, right } => {
            let v1 = evaluate(ctx, left, env)?;
            let truth = invoke(ctx, &CObject::PrimOp(PrimOp::BoolTruth), &[Rc::clone(&v1)])?;
            if value::value_to_bool(ctx, &truth)? {
                return Ok(v1);
            }
            evaluate(ctx, right, env)
        }

        ExprKind::Scoped { env: captured, expr } => evaluate(ctx, expr, captured),

        ExprKind::ValueExpr(v) => value::clone_value(ctx, v),
    }
}

pub(crate) fn object_to_cobject(ctx: &Context, obj: Object) -> CompileResult<CObject> {
    match obj {
        Object::Record(x) => Ok(CObject::Record(x)),
        Object::Procedure(x) => Ok(CObject::Procedure(x)),
        Object::Overloadable(x) => Ok(CObject::Overloadable(x)),
        Object::External(x) => Ok(CObject::External(x)),
        Object::PrimOp(op) => Ok(CObject::PrimOp(op)),
        Object::Type(ty) => Ok(CObject::Type(ty)),
        Object::Value(_) | Object::Analysis(_) | Object::Cell(_) => Err(ctx.error("invalid compiler object")),
    }
}

//
// literals
//

fn parse_int_text(text: &str) -> Option<i128> {
    let (negative, rest) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let (radix, digits) = match rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X")) {
        Some(digits) => (16, digits),
        None => (10, rest),
    };
    let magnitude = i128::from_str_radix(digits, radix).ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

fn make_int<T: Copy + TryFrom<i128>>(ctx: &Context, ty: TypeId, text: &str, name: &str) -> CompileResult<Rc<Value>> {
    let Some(parsed) = parse_int_text(text) else {
        return Err(ctx.error(format!("invalid {name} literal")));
    };
    let Ok(narrowed) = T::try_from(parsed) else {
        return Err(ctx.error(format!("{name} literal out of range")));
    };
    let v = Value::alloc(ctx, ty)?;
    v.write_scalar(narrowed);
    Ok(v)
}

fn make_float32(ctx: &Context, text: &str) -> CompileResult<Rc<Value>> {
    let Ok(parsed) = text.parse::<f64>() else {
        return Err(ctx.error("invalid float32 literal"));
    };
    let narrowed = parsed as f32;
    if parsed.is_finite() && narrowed.is_infinite() {
        return Err(ctx.error("float32 literal out of range"));
    }
    let v = Value::alloc(ctx, TypeId::FLOAT32)?;
    v.write_scalar(narrowed);
    Ok(v)
}

fn make_float64(ctx: &Context, text: &str) -> CompileResult<Rc<Value>> {
    let Ok(parsed) = text.parse::<f64>() else {
        return Err(ctx.error("invalid float64 literal"));
    };
    if parsed.is_infinite() {
        return Err(ctx.error("float64 literal out of range"));
    }
    let v = Value::alloc(ctx, TypeId::FLOAT64)?;
    v.write_scalar(parsed);
    Ok(v)
}

fn eval_int_literal(ctx: &Context, text: &str, suffix: Option<&str>) -> CompileResult<Rc<Value>> {
    match suffix {
        Some("i8") => make_int::<i8>(ctx, TypeId::INT8, text, "int8"),
        Some("i16") => make_int::<i16>(ctx, TypeId::INT16, text, "int16"),
        None | Some("i32") => make_int::<i32>(ctx, TypeId::INT32, text, "int32"),
        Some("i64") => make_int::<i64>(ctx, TypeId::INT64, text, "int64"),
        Some("u8") => make_int::<u8>(ctx, TypeId::UINT8, text, "uint8"),
        Some("u16") => make_int::<u16>(ctx, TypeId::UINT16, text, "uint16"),
        Some("u32") => make_int::<u32>(ctx, TypeId::UINT32, text, "uint32"),
        Some("u64") => make_int::<u64>(ctx, TypeId::UINT64, text, "uint64"),
        Some("f32") => make_float32(ctx, text),
        Some("f64") => make_float64(ctx, text),
        Some(other) => Err(ctx.error(format!("invalid literal suffix: {other}"))),
    }
}

fn eval_float_literal(ctx: &Context, text: &str, suffix: Option<&str>) -> CompileResult<Rc<Value>> {
    match suffix {
        Some("f32") => make_float32(ctx, text),
        None | Some("f64") => make_float64(ctx, text),
        Some(other) => Err(ctx.error(format!("invalid float literal suffix: {other}"))),
    }
}

//
// invocation
//

fn invoke_indexing(ctx: &Context, obj: &CObject, args: &[Rc<Value>]) -> CompileResult<Rc<Value>> {
    match obj {
        CObject::Record(record) => {
            types::ensure_arity(ctx, args.len(), record.pattern_vars.len())?;
            let ty = types::record_type(ctx, record, args)?;
            value::co_to_value(ctx, &CObject::Type(ty))
        }
        CObject::PrimOp(PrimOp::Pointer) => primops::invoke_prim_op(ctx, PrimOp::PointerType, args),
        CObject::PrimOp(PrimOp::Array) => primops::invoke_prim_op(ctx, PrimOp::ArrayType, args),
        CObject::PrimOp(PrimOp::Tuple) => primops::invoke_prim_op(ctx, PrimOp::TupleType, args),
        _ => Err(ctx.error("invalid indexing operation")),
    }
}

fn definition_env(ctx: &Context, module: Option<ModuleId>) -> Env {
    let module = ctx.module(module.expect("item installed in a module"));
    module.env().clone()
}

/// Invokes any callable with concrete argument values.
pub fn invoke(ctx: &Context, callable: &CObject, args: &[Rc<Value>]) -> CompileResult<Rc<Value>> {
    match callable {
        CObject::Record(record) => invoke_record(ctx, record, args),
        CObject::Type(ty) => invoke_type(ctx, *ty, args),
        CObject::Procedure(procedure) => invoke_procedure(ctx, procedure, args),
        CObject::Overloadable(overloadable) => invoke_overloadable(ctx, overloadable, args),
        CObject::External(external) => invoke_external(ctx, external, args),
        CObject::PrimOp(op) => primops::invoke_prim_op(ctx, *op, args),
        CObject::Name(_) => Err(ctx.error("invalid operation")),
    }
}

/// A record used as a constructor: infer the record type from the
/// arguments, then construct it from the non-static ones.
fn invoke_record(ctx: &Context, record: &Rc<Record>, args: &[Rc<Value>]) -> CompileResult<Rc<Value>> {
    types::ensure_arity(ctx, args.len(), record.formal_args.len())?;
    let env = definition_env(ctx, record.module.get()).child();
    let mut cells = Vec::with_capacity(record.pattern_vars.len());
    for &var in &record.pattern_vars {
        let cell = PatternCell::unbound(Some(var));
        env.add_local(ctx, var, Object::Cell(Rc::clone(&cell)))?;
        cells.push(cell);
    }
    let mut non_static_args = Vec::with_capacity(args.len());
    for (i, (arg, formal)) in args.iter().zip(&record.formal_args).enumerate() {
        if !matching::match_formal_arg(ctx, arg, formal, &env)? {
            return Err(ctx.error(format!("mismatch at argument {}", i + 1)));
        }
        if !formal.is_static() {
            non_static_args.push(Rc::clone(arg));
        }
    }
    let mut cell_values = Vec::with_capacity(cells.len());
    for cell in &cells {
        cell_values.push(crate::pattern::deref_cell(ctx, cell)?);
    }
    let ty = types::record_type(ctx, record, &cell_values)?;
    invoke_type(ctx, ty, &non_static_args)
}

/// Type used as a constructor: default-construct on zero arguments, copy
/// on one argument of the same type, element-wise construct otherwise.
fn invoke_type(ctx: &Context, ty: TypeId, args: &[Rc<Value>]) -> CompileResult<Rc<Value>> {
    if args.is_empty() {
        let v = Value::alloc(ctx, ty)?;
        value::value_init(ctx, &v)?;
        return Ok(v);
    }
    if args.len() == 1 && args[0].ty == ty {
        return value::clone_value(ctx, &args[0]);
    }
    match ctx.type_data(ty).kind {
        TypeKind::Array { size, .. } => {
            types::ensure_arity(ctx, args.len(), size)?;
            let v = Value::alloc(ctx, ty)?;
            for (i, (dest, arg)) in value::array_elements(ctx, &v)?.iter().zip(args).enumerate() {
                if arg.ty != dest.ty {
                    return Err(ctx.error(format!("type mismatch at argument {}", i + 1)));
                }
                value::value_copy(ctx, dest, arg)?;
            }
            Ok(v)
        }
        TypeKind::Tuple { ref elements } => {
            types::ensure_arity(ctx, args.len(), elements.len())?;
            let v = Value::alloc(ctx, ty)?;
            for (i, (dest, arg)) in value::struct_elements(ctx, &v)?.iter().zip(args).enumerate() {
                if arg.ty != dest.ty {
                    return Err(ctx.error(format!("type mismatch at argument {}", i + 1)));
                }
                value::value_copy(ctx, dest, arg)?;
            }
            Ok(v)
        }
        TypeKind::Record { .. } => {
            let fields = types::record_fields(ctx, ty)?;
            types::ensure_arity(ctx, args.len(), fields.types.len())?;
            let v = Value::alloc(ctx, ty)?;
            for (i, (dest, arg)) in value::struct_elements(ctx, &v)?.iter().zip(args).enumerate() {
                if arg.ty != dest.ty {
                    return Err(ctx.error(format!("type mismatch at argument {}", i + 1)));
                }
                value::value_copy(ctx, dest, arg)?;
            }
            Ok(v)
        }
        _ => Err(ctx.error("invalid constructor")),
    }
}

fn invoke_procedure(ctx: &Context, procedure: &Rc<Procedure>, args: &[Rc<Value>]) -> CompileResult<Rc<Value>> {
    let (entry, _table) = invoke::lookup_procedure_invoke(ctx, procedure, args)?;
    let installed = entry.env.borrow().clone();
    if let Some(matched_env) = installed {
        let code = entry.code.borrow().clone().expect("entry with env carries code");
        let env = matching::bind_value_args(ctx, &matched_env, args, &code)?;
        return eval_code_body(ctx, &code, &env);
    }
    let code_env = definition_env(ctx, procedure.module.get());
    let result = matching::match_invoke(ctx, &procedure.code, &code_env, args)?;
    match result {
        MatchResult::Success(matched_env) => {
            *entry.env.borrow_mut() = Some(matched_env.clone());
            *entry.code.borrow_mut() = Some(Rc::clone(&procedure.code));
            let env = matching::bind_value_args(ctx, &matched_env, args, &procedure.code)?;
            eval_code_body(ctx, &procedure.code, &env)
        }
        result => Err(matching::signal_match_error(ctx, &result, args)),
    }
}

fn invoke_overloadable(
    ctx: &Context,
    overloadable: &Rc<Overloadable>,
    args: &[Rc<Value>],
) -> CompileResult<Rc<Value>> {
    let (entry, _table) = invoke::lookup_overloadable_invoke(ctx, overloadable, args)?;
    let installed = entry.env.borrow().clone();
    if let Some(matched_env) = installed {
        let code = entry.code.borrow().clone().expect("entry with env carries code");
        let env = matching::bind_value_args(ctx, &matched_env, args, &code)?;
        return eval_code_body(ctx, &code, &env);
    }
    let overloads = overloadable.overloads.borrow().clone();
    for overload in overloads {
        let code_env = definition_env(ctx, overload.module.get());
        let result = matching::match_invoke(ctx, &overload.code, &code_env, args)?;
        if let MatchResult::Success(matched_env) = result {
            *entry.env.borrow_mut() = Some(matched_env.clone());
            *entry.code.borrow_mut() = Some(Rc::clone(&overload.code));
            let env = matching::bind_value_args(ctx, &matched_env, args, &overload.code)?;
            return eval_code_body(ctx, &overload.code, &env);
        }
    }
    Err(ctx.error("no matching overload"))
}

//
// external procedures
//

/// Resolves an external procedure's signature and backend function on
/// first use.
pub fn init_external(ctx: &Context, external: &Rc<ExternalProc>) -> CompileResult<(Vec<TypeId>, TypeId, FnHandle)> {
    if let Some(sig) = external.resolved.get() {
        return Ok((sig.arg_types.clone(), sig.return_type, sig.handle));
    }
    let env = definition_env(ctx, external.module.get());
    let mut arg_types = Vec::with_capacity(external.args.len());
    for arg in &external.args {
        arg_types.push(evaluate_non_void_type(ctx, &arg.ty, &env)?);
    }
    let return_type = evaluate_type(ctx, &external.return_type, &env)?;
    let handle = ctx.backend.build_function(&ctx.name_text(external.name))?;
    let sig = ExternalSig {
        arg_types,
        return_type,
        handle,
    };
    let _ = external.resolved.set(sig);
    let sig = external.resolved.get().expect("external signature just resolved");
    Ok((sig.arg_types.clone(), sig.return_type, sig.handle))
}

fn invoke_external(ctx: &Context, external: &Rc<ExternalProc>, args: &[Rc<Value>]) -> CompileResult<Rc<Value>> {
    let (arg_types, return_type, handle) = init_external(ctx, external)?;
    types::ensure_arity(ctx, args.len(), arg_types.len())?;
    for (i, (arg, &expected)) in args.iter().zip(&arg_types).enumerate() {
        if arg.ty != expected {
            return Err(ctx.error(format!("type mismatch at argument {}", i + 1)));
        }
    }
    ctx.tracer.borrow_mut().external_call(&ctx.name_text(external.name));
    let arg_ptrs: Vec<*mut u8> = args.iter().map(|a| a.data_ptr()).collect();
    let out = Value::alloc(ctx, return_type)?;
    ctx.backend.invoke(handle, &arg_ptrs, out.data_ptr());
    Ok(out)
}

//
// statements
//

enum StatementResult {
    Goto(NameId, Option<Location>),
    Break,
    Continue,
    Return(Rc<Value>),
}

/// Runs a matched specialization's body and yields its return value (void
/// when the body falls off the end).
pub fn eval_code_body(ctx: &Context, code: &Rc<Code>, env: &Env) -> CompileResult<Rc<Value>> {
    match eval_statement(ctx, &code.body, env)? {
        None => Value::alloc(ctx, TypeId::VOID),
        Some(StatementResult::Return(v)) => Ok(v),
        Some(StatementResult::Goto(label, location)) => Err(ctx.error_at(
            location,
            format!("label not found: {}", ctx.name_text(label)),
        )),
        Some(StatementResult::Break) => Err(ctx.error("invalid break statement")),
        Some(StatementResult::Continue) => Err(ctx.error("invalid continue statement")),
    }
}

struct LabelInfo {
    env: Env,
    position: usize,
}

/// Collects labels from `start` up to (not including) the next binding;
/// re-run after each binding so goto targets past a binding only exist
/// once that binding has executed.
fn collect_labels(statements: &[Rc<Stmt>], start: usize, labels: &mut AHashMap<NameId, LabelInfo>, env: &Env) {
    for (position, stmt) in statements.iter().enumerate().skip(start) {
        match &stmt.kind {
            StmtKind::Label(name) => {
                labels.insert(
                    *name,
                    LabelInfo {
                        env: env.clone(),
                        position,
                    },
                );
            }
            StmtKind::Binding { .. } => return,
            _ => {}
        }
    }
}

fn eval_block(ctx: &Context, statements: &[Rc<Stmt>], env: &Env) -> CompileResult<Option<StatementResult>> {
    let mut block_temps: Vec<Rc<Value>> = Vec::new();
    let result = eval_block_inner(ctx, statements, env, &mut block_temps);
    let mut destroy_error = None;
    for temp in block_temps.into_iter().rev() {
        if let Err(err) = ctx.release_value(temp) {
            destroy_error.get_or_insert(err);
        }
    }
    let result = result?;
    match destroy_error {
        Some(err) => Err(err),
        None => Ok(result),
    }
}

fn eval_block_inner(
    ctx: &Context,
    statements: &[Rc<Stmt>],
    env: &Env,
    block_temps: &mut Vec<Rc<Value>>,
) -> CompileResult<Option<StatementResult>> {
    let mut env = env.clone();
    let mut labels: AHashMap<NameId, LabelInfo> = AHashMap::new();
    collect_labels(statements, 0, &mut labels, &env);
    let mut i = 0;
    while i < statements.len() {
        let stmt = &statements[i];
        match &stmt.kind {
            StmtKind::Binding { .. } => {
                env = eval_binding(ctx, stmt, &env, block_temps)?;
                collect_labels(statements, i + 1, &mut labels, &env);
            }
            StmtKind::Label(_) => {}
            _ => {
                if let Some(result) = eval_statement(ctx, stmt, &env)? {
                    if let StatementResult::Goto(name, _) = &result {
                        if let Some(info) = labels.get(name) {
                            env = info.env.clone();
                            i = info.position;
                            continue;
                        }
                    }
                    return Ok(Some(result));
                }
            }
        }
        i += 1;
    }
    Ok(None)
}

fn eval_statement(ctx: &Context, stmt: &Rc<Stmt>, env: &Env) -> CompileResult<Option<StatementResult>> {
    let _guard = ctx.push_location(stmt.location.clone());
    match &stmt.kind {
        StmtKind::Block(statements) => eval_block(ctx, statements, env),

        StmtKind::Label(_) | StmtKind::Binding { .. } => Err(ctx.error("invalid statement")),

        StmtKind::Assignment { left, right } => {
            ctx.push_temp_block();
            let result = (|| {
                // right before left
                let right_value = evaluate_non_void(ctx, right, env)?;
                let left_value = evaluate_non_void(ctx, left, env)?;
                if left_value.owned {
                    return Err(ctx.error("cannot assign to a temp"));
                }
                value::value_assign(ctx, &left_value, &right_value)
            })();
            let popped = ctx.pop_temp_block();
            result?;
            popped?;
            Ok(None)
        }

        StmtKind::Goto(label) => Ok(Some(StatementResult::Goto(*label, stmt.location.clone()))),

        StmtKind::Return(expr) => match expr {
            None => Ok(Some(StatementResult::Return(Value::alloc(ctx, TypeId::VOID)?))),
            Some(expr) => {
                let v = evaluate_to_static(ctx, expr, env)?;
                Ok(Some(StatementResult::Return(v)))
            }
        },

        StmtKind::ReturnRef(expr) => {
            ctx.push_temp_block();
            let result = (|| {
                let v = evaluate_non_void(ctx, expr, env)?;
                if v.owned {
                    return Err(ctx.error("cannot return a temporary by reference"));
                }
                Ok(v)
            })();
            let popped = ctx.pop_temp_block();
            let v = result?;
            popped?;
            Ok(Some(StatementResult::Return(v)))
        }

        StmtKind::If {
            condition,
            then_part,
            else_part,
        } => {
            if evaluate_to_bool(ctx, condition, env)? {
                eval_statement(ctx, then_part, env)
            } else if let Some(else_part) = else_part {
                eval_statement(ctx, else_part, env)
            } else {
                Ok(None)
            }
        }

        StmtKind::ExprStatement(expr) => {
            ctx.push_temp_block();
            let result = evaluate(ctx, expr, env);
            let popped = ctx.pop_temp_block();
            result?;
            popped?;
            Ok(None)
        }

        StmtKind::While { condition, body } => {
            loop {
                if !evaluate_to_bool(ctx, condition, env)? {
                    break;
                }
                match eval_statement(ctx, body, env)? {
                    None | Some(StatementResult::Continue) => {}
                    Some(StatementResult::Break) => break,
                    Some(result) => return Ok(Some(result)),
                }
            }
            Ok(None)
        }

        StmtKind::Break => Ok(Some(StatementResult::Break)),

        StmtKind::Continue => Ok(Some(StatementResult::Continue)),

        StmtKind::For {
            variable,
            expr,
            body,
            converted,
        } => {
            let converted =
                desugar::cached_stmt(converted, || desugar::convert_for_statement(ctx, *variable, expr, body))?;
            eval_statement(ctx, &converted, env)
        }
    }
}

/// Evaluates one binding and extends the environment.
///
/// `var` clones an unowned result, parks the storage in the block temps,
/// and binds a non-owning alias so assignments mutate the same slot.
/// `ref` aliases owned results the same way and binds unowned ones
/// directly. `static` clones immediately and keeps the owned value on the
/// environment frame, outliving the block.
fn eval_binding(ctx: &Context, stmt: &Rc<Stmt>, env: &Env, block_temps: &mut Vec<Rc<Value>>) -> CompileResult<Env> {
    let StmtKind::Binding { kind, name, expr } = &stmt.kind else {
        unreachable!("caller checked for a binding");
    };
    let _guard = ctx.push_location(stmt.location.clone());
    ctx.push_temp_block();
    let result = (|| {
        let right = evaluate_non_void(ctx, expr, env)?;
        Ok(match kind {
            BindingKind::Var => {
                let owned = if right.owned { right } else { value::clone_value(ctx, &right)? };
                let alias = Rc::new(owned.alias());
                block_temps.push(owned);
                Object::Value(alias)
            }
            BindingKind::Ref => {
                if right.owned {
                    let alias = Rc::new(right.alias());
                    block_temps.push(right);
                    Object::Value(alias)
                } else {
                    Object::Value(right)
                }
            }
            BindingKind::Static => {
                let owned = if right.owned { right } else { value::clone_value(ctx, &right)? };
                Object::Value(owned)
            }
        })
    })();
    let popped = ctx.pop_temp_block();
    let object = result?;
    popped?;
    let extended = env.child();
    extended.add_local(ctx, *name, object)?;
    Ok(extended)
}
