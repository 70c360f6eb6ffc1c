//! Invocation tables: per-callable memoization of specializations.
//!
//! A table is created per callable (per arity for overloadables) the first
//! time it is invoked. Its static-flag vector is fixed by the first
//! overload registered at that arity — `static` formals key by compile-time
//! value, value formals by runtime type — and every later overload must
//! agree. Entries live in a power-of-two array of buckets (64, never
//! resized) with linear search inside a bucket.
//!
//! An entry's lifecycle is `Fresh → Analyzing → Resolved`: the analyzer
//! latches `Analyzing` as its recursion guard, reentrant lookups observe it
//! and return the unknown-type sentinel, and a failed body analysis removes
//! the entry instead of leaving it latched.

use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use crate::{
    ast::{Code, FormalArg, Overloadable, Procedure},
    cobject::CObject,
    context::Context,
    env::Env,
    error::CompileResult,
    matching::Argument,
    types::{self, TypeId},
    value::{self, Value},
};

const INVOKE_BUCKETS: usize = 64;

/// Key of one argument position: the type for dynamic positions, a cloned
/// compile-time value for static positions.
pub enum ArgKey {
    Type(TypeId),
    Static(Rc<Value>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Fresh,
    Analyzing,
    Resolved,
}

pub struct InvokeEntry {
    pub args_key: Vec<ArgKey>,
    /// Matched specialization, installed by the first concrete call.
    pub env: RefCell<Option<Env>>,
    pub code: RefCell<Option<Rc<Code>>>,
    /// Inferred return type, written once when analysis resolves.
    pub return_type: Cell<Option<TypeId>>,
    pub return_by_ref: Cell<bool>,
    pub state: Cell<EntryState>,
}

pub struct InvokeTable {
    is_static_flags: Vec<bool>,
    buckets: RefCell<Vec<Vec<Rc<InvokeEntry>>>>,
}

impl InvokeTable {
    pub fn new(formal_args: &[FormalArg]) -> Rc<Self> {
        Rc::new(Self {
            is_static_flags: formal_args.iter().map(FormalArg::is_static).collect(),
            buckets: RefCell::new(vec![Vec::new(); INVOKE_BUCKETS]),
        })
    }

    pub fn arity(&self) -> usize {
        self.is_static_flags.len()
    }

    pub fn is_static_flags(&self) -> &[bool] {
        &self.is_static_flags
    }

    pub fn entry_count(&self) -> usize {
        self.buckets.borrow().iter().map(Vec::len).sum()
    }

    /// Drops an entry whose analysis failed, so the table never holds a
    /// latched-but-dead specialization.
    pub fn remove_entry(&self, entry: &Rc<InvokeEntry>) {
        for bucket in self.buckets.borrow_mut().iter_mut() {
            if let Some(pos) = bucket.iter().position(|e| Rc::ptr_eq(e, entry)) {
                bucket.remove(pos);
                return;
            }
        }
    }
}

fn hash_args<A: Argument>(ctx: &Context, flags: &[bool], args: &[A]) -> CompileResult<u64> {
    let mut hash = 0u64;
    for (arg, &is_static) in args.iter().zip(flags) {
        if is_static {
            hash = hash.wrapping_add(value::value_hash(ctx, arg.arg_value(ctx)?.as_ref())?);
        } else {
            let ty = arg.arg_type(ctx)?;
            hash = hash.wrapping_add(u64::from(ctx.co_index(&CObject::Type(ty)).0));
        }
    }
    Ok(hash)
}

fn matching_args<A: Argument>(
    ctx: &Context,
    flags: &[bool],
    args: &[A],
    entry: &InvokeEntry,
) -> CompileResult<bool> {
    for ((arg, &is_static), key) in args.iter().zip(flags).zip(&entry.args_key) {
        let matched = match (is_static, key) {
            (false, ArgKey::Type(ty)) => arg.arg_type(ctx)? == *ty,
            (true, ArgKey::Static(v)) => value::value_equals(ctx, arg.arg_value(ctx)?.as_ref(), v)?,
            _ => false,
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Finds the entry memoizing this argument vector, installing a fresh one
/// on first sight.
pub fn find_matching_entry<A: Argument>(
    ctx: &Context,
    callable_name: &str,
    table: &InvokeTable,
    args: &[A],
) -> CompileResult<Rc<InvokeEntry>> {
    let flags = &table.is_static_flags;
    let bucket_index = (hash_args(ctx, flags, args)? as usize) & (INVOKE_BUCKETS - 1);

    let candidates: Vec<Rc<InvokeEntry>> = table.buckets.borrow()[bucket_index].clone();
    for entry in candidates {
        if matching_args(ctx, flags, args, &entry)? {
            return Ok(entry);
        }
    }

    let mut args_key = Vec::with_capacity(args.len());
    for (arg, &is_static) in args.iter().zip(flags) {
        if is_static {
            let v = arg.arg_value(ctx)?;
            args_key.push(ArgKey::Static(value::clone_value(ctx, &v)?));
        } else {
            args_key.push(ArgKey::Type(arg.arg_type(ctx)?));
        }
    }
    let entry = Rc::new(InvokeEntry {
        args_key,
        env: RefCell::new(None),
        code: RefCell::new(None),
        return_type: Cell::new(None),
        return_by_ref: Cell::new(false),
        state: Cell::new(EntryState::Fresh),
    });
    table.buckets.borrow_mut()[bucket_index].push(Rc::clone(&entry));
    ctx.tracer.borrow_mut().entry_installed(callable_name, args.len());
    Ok(entry)
}

//
// procedure lookup
//

pub fn lookup_procedure_invoke<A: Argument>(
    ctx: &Context,
    procedure: &Rc<Procedure>,
    args: &[A],
) -> CompileResult<(Rc<InvokeEntry>, Rc<InvokeTable>)> {
    let table = Rc::clone(
        procedure
            .invoke_table
            .get_or_init(|| InvokeTable::new(&procedure.code.formal_args)),
    );
    types::ensure_arity(ctx, args.len(), table.arity())?;
    let entry = find_matching_entry(ctx, &ctx.name_text(procedure.name), &table, args)?;
    Ok((entry, table))
}

//
// overloadable lookup
//

fn init_overloadable_invoke_tables(ctx: &Context, overloadable: &Overloadable) -> CompileResult<()> {
    let overloads = overloadable.overloads.borrow().clone();
    let mut tables = overloadable.invoke_tables.borrow_mut();
    for overload in overloads {
        let formal_args = &overload.code.formal_args;
        let arity = formal_args.len();
        if tables.len() <= arity {
            tables.resize(arity + 1, None);
        }
        match &tables[arity] {
            None => tables[arity] = Some(InvokeTable::new(formal_args)),
            Some(table) => {
                // the first overload at this arity fixed the flags; the
                // rest must agree position by position
                for (formal, &is_static) in formal_args.iter().zip(table.is_static_flags()) {
                    if is_static && !formal.is_static() {
                        return Err(ctx.error_at(formal.location(), "expecting static argument"));
                    }
                    if !is_static && formal.is_static() {
                        return Err(ctx.error_at(formal.location(), "expecting non static argument"));
                    }
                }
            }
        }
    }
    Ok(())
}

pub fn lookup_overloadable_invoke<A: Argument>(
    ctx: &Context,
    overloadable: &Rc<Overloadable>,
    args: &[A],
) -> CompileResult<(Rc<InvokeEntry>, Rc<InvokeTable>)> {
    if overloadable.invoke_tables.borrow().is_empty() {
        init_overloadable_invoke_tables(ctx, overloadable)?;
    }
    let table = {
        let tables = overloadable.invoke_tables.borrow();
        match tables.get(args.len()) {
            Some(Some(table)) => Rc::clone(table),
            _ => return Err(ctx.error("no matching overload")),
        }
    };
    let entry = find_matching_entry(ctx, &ctx.name_text(overloadable.name), &table, args)?;
    Ok((entry, table))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::int_to_value;

    fn value_formal(ctx: &Context, name: &str) -> FormalArg {
        FormalArg::Value {
            name: ctx.intern(name),
            ty: None,
            location: None,
        }
    }

    #[test]
    fn entries_memoize_on_dynamic_type() {
        let ctx = Context::new();
        let table = InvokeTable::new(&[value_formal(&ctx, "x")]);
        assert_eq!(table.is_static_flags(), &[false]);

        let a = int_to_value(&ctx, 1).unwrap();
        let b = int_to_value(&ctx, 2).unwrap();
        let e1 = find_matching_entry(&ctx, "f", &table, &[a]).unwrap();
        // a different value of the same type reuses the entry
        let e2 = find_matching_entry(&ctx, "f", &table, &[b]).unwrap();
        assert!(Rc::ptr_eq(&e1, &e2));
        assert_eq!(table.entry_count(), 1);

        let c = value::bool_to_value(&ctx, true).unwrap();
        let e3 = find_matching_entry(&ctx, "f", &table, &[c]).unwrap();
        assert!(!Rc::ptr_eq(&e1, &e3));
        assert_eq!(table.entry_count(), 2);
    }

    #[test]
    fn entries_memoize_on_static_value() {
        let ctx = Context::new();
        let table = InvokeTable::new(&[FormalArg::Static {
            pattern: crate::ast::Expr::synthetic(crate::ast::ExprKind::BoolLiteral(true)),
            location: None,
        }]);
        assert_eq!(table.is_static_flags(), &[true]);

        let one = int_to_value(&ctx, 1).unwrap();
        let one_again = int_to_value(&ctx, 1).unwrap();
        let two = int_to_value(&ctx, 2).unwrap();
        let e1 = find_matching_entry(&ctx, "f", &table, &[one]).unwrap();
        let e2 = find_matching_entry(&ctx, "f", &table, &[one_again]).unwrap();
        let e3 = find_matching_entry(&ctx, "f", &table, &[two]).unwrap();
        assert!(Rc::ptr_eq(&e1, &e2));
        assert!(!Rc::ptr_eq(&e1, &e3));
        assert_eq!(table.entry_count(), 2);
    }

    #[test]
    fn removed_entry_is_recreated_fresh() {
        let ctx = Context::new();
        let table = InvokeTable::new(&[value_formal(&ctx, "x")]);
        let a = int_to_value(&ctx, 1).unwrap();
        let e1 = find_matching_entry(&ctx, "f", &table, &[Rc::clone(&a)]).unwrap();
        e1.state.set(EntryState::Analyzing);
        table.remove_entry(&e1);
        assert_eq!(table.entry_count(), 0);
        let e2 = find_matching_entry(&ctx, "f", &table, &[a]).unwrap();
        assert!(!Rc::ptr_eq(&e1, &e2));
        assert_eq!(e2.state.get(), EntryState::Fresh);
    }
}
