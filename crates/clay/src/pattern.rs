//! Patterns and one-way unification.
//!
//! Patterns encode the shape a callable accepts. A pattern cell is a logic
//! variable: unbound it binds to whatever it is unified against, bound it
//! succeeds only on structural equality. Constructor patterns (array,
//! tuple, pointer, record) succeed against a *type* of the matching
//! constructor with all sub-patterns succeeding recursively; against a
//! *value* they require a compiler-object handle to a type and recurse on
//! that.
//!
//! Cells are transient: a failed match discards the whole pattern
//! environment, a successful one dereferences each cell exactly once,
//! cloning non-owning bindings so their lifetime detaches from the match
//! attempt.

use std::{cell::RefCell, rc::Rc};

use crate::{
    ast::{Expr, ExprKind, Record},
    cobject::CObject,
    context::Context,
    env::{Env, Object},
    error::CompileResult,
    evaluator,
    intern::NameId,
    primops::PrimOp,
    types::{self, TypeId, TypeKind},
    value::{self, Lowered, Value},
};

pub struct PatternCell {
    pub name: Option<NameId>,
    pub value: RefCell<Option<Rc<Value>>>,
}

impl PatternCell {
    pub fn unbound(name: Option<NameId>) -> Rc<Self> {
        Rc::new(Self {
            name,
            value: RefCell::new(None),
        })
    }

    pub fn bound(value: Rc<Value>) -> Rc<Self> {
        Rc::new(Self {
            name: None,
            value: RefCell::new(Some(value)),
        })
    }
}

pub enum Pattern {
    Cell(Rc<PatternCell>),
    ArrayType {
        element: Rc<Pattern>,
        size: Rc<Pattern>,
    },
    TupleType {
        elements: Vec<Rc<Pattern>>,
    },
    PointerType {
        pointee: Rc<Pattern>,
    },
    RecordType {
        record: Rc<Record>,
        params: Vec<Rc<Pattern>>,
    },
}

/// Evaluates an expression as a pattern. Name references resolve pattern
/// cells in scope; indexing of `Pointer`/`Array`/`Tuple`/record heads
/// builds constructor patterns; anything else evaluates statically into a
/// bound cell.
pub fn evaluate_pattern(ctx: &Context, expr: &Rc<Expr>, env: &Env) -> CompileResult<Rc<Pattern>> {
    match &expr.kind {
        ExprKind::NameRef(name) => {
            if let Object::Cell(cell) = env.lookup(ctx, *name)? {
                return Ok(Rc::new(Pattern::Cell(cell)));
            }
        }
        ExprKind::Indexing { expr: head, args } => {
            let thing = evaluator::evaluate_to_static(ctx, head, env)?;
            let mut arg_patterns = Vec::with_capacity(args.len());
            for arg in args {
                arg_patterns.push(evaluate_pattern(ctx, arg, env)?);
            }
            return match value::lower(ctx, thing) {
                Lowered::Object(obj) => indexing_pattern(ctx, &obj, arg_patterns),
                Lowered::Value(_) => Err(ctx.error("invalid indexing pattern")),
            };
        }
        _ => {}
    }
    let v = evaluator::evaluate_to_static(ctx, expr, env)?;
    Ok(Rc::new(Pattern::Cell(PatternCell::bound(v))))
}

fn indexing_pattern(ctx: &Context, obj: &CObject, args: Vec<Rc<Pattern>>) -> CompileResult<Rc<Pattern>> {
    match obj {
        CObject::Record(record) => {
            types::ensure_arity(ctx, args.len(), record.pattern_vars.len())?;
            Ok(Rc::new(Pattern::RecordType {
                record: Rc::clone(record),
                params: args,
            }))
        }
        CObject::PrimOp(PrimOp::Pointer) => {
            types::ensure_arity(ctx, args.len(), 1)?;
            let mut args = args;
            Ok(Rc::new(Pattern::PointerType {
                pointee: args.pop().expect("one pattern argument"),
            }))
        }
        CObject::PrimOp(PrimOp::Array) => {
            types::ensure_arity(ctx, args.len(), 2)?;
            let mut args = args;
            let size = args.pop().expect("two pattern arguments");
            let element = args.pop().expect("two pattern arguments");
            Ok(Rc::new(Pattern::ArrayType { element, size }))
        }
        CObject::PrimOp(PrimOp::Tuple) => {
            if args.len() < 2 {
                return Err(ctx.error("tuples require at least two elements"));
            }
            Ok(Rc::new(Pattern::TupleType { elements: args }))
        }
        _ => Err(ctx.error("invalid indexing pattern")),
    }
}

/// Unifies a pattern against a value.
pub fn unify(ctx: &Context, pattern: &Rc<Pattern>, v: &Rc<Value>) -> CompileResult<bool> {
    if let Pattern::Cell(cell) = pattern.as_ref() {
        let bound = cell.value.borrow().clone();
        return match bound {
            None => {
                *cell.value.borrow_mut() = Some(Rc::clone(v));
                Ok(true)
            }
            Some(existing) => value::value_equals(ctx, &existing, v),
        };
    }
    if v.ty != TypeId::COMPILER_OBJECT {
        return Ok(false);
    }
    match value::value_to_co(ctx, v)? {
        CObject::Type(ty) => unify_type(ctx, pattern, ty),
        _ => Ok(false),
    }
}

/// Unifies a pattern against a type.
pub fn unify_type(ctx: &Context, pattern: &Rc<Pattern>, ty: TypeId) -> CompileResult<bool> {
    match pattern.as_ref() {
        Pattern::Cell(_) => {
            let v = value::co_to_value(ctx, &CObject::Type(ty))?;
            unify(ctx, pattern, &v)
        }
        Pattern::ArrayType { element, size } => {
            let data = ctx.type_data(ty);
            let TypeKind::Array {
                element: elem_ty,
                size: n,
            } = data.kind
            else {
                return Ok(false);
            };
            if !unify_type(ctx, element, elem_ty)? {
                return Ok(false);
            }
            let n = i32::try_from(n).map_err(|_| ctx.error("array size out of range"))?;
            unify(ctx, size, &value::int_to_value(ctx, n)?)
        }
        Pattern::TupleType { elements } => {
            let data = ctx.type_data(ty);
            let TypeKind::Tuple { elements: tys } = &data.kind else {
                return Ok(false);
            };
            if elements.len() != tys.len() {
                return Ok(false);
            }
            for (pattern, &ty) in elements.iter().zip(tys.iter()) {
                if !unify_type(ctx, pattern, ty)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Pattern::PointerType { pointee } => {
            let data = ctx.type_data(ty);
            let TypeKind::Pointer { pointee: pointee_ty } = data.kind else {
                return Ok(false);
            };
            unify_type(ctx, pointee, pointee_ty)
        }
        Pattern::RecordType { record, params } => {
            let data = ctx.type_data(ty);
            let TypeKind::Record {
                record: r,
                params: param_values,
            } = &data.kind
            else {
                return Ok(false);
            };
            if !Rc::ptr_eq(record, r) || params.len() != param_values.len() {
                return Ok(false);
            }
            for (pattern, v) in params.iter().zip(param_values.iter()) {
                if !unify(ctx, pattern, v)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
    }
}

/// Reads a cell's binding out of a finished match; non-owning bindings are
/// cloned so they outlive the match attempt.
pub fn deref_cell(ctx: &Context, cell: &Rc<PatternCell>) -> CompileResult<Rc<Value>> {
    let bound = cell.value.borrow().clone();
    let Some(v) = bound else {
        let message = match cell.name {
            Some(name) => format!("unresolved pattern variable: {}", ctx.name_text(name)),
            None => "unresolved pattern variable".to_owned(),
        };
        return Err(ctx.error(message));
    };
    if v.owned {
        Ok(v)
    } else {
        value::clone_value(ctx, &v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::array_type;

    #[test]
    fn unbound_cell_binds_and_rechecks() {
        let ctx = Context::new();
        let cell = PatternCell::unbound(None);
        let pattern = Rc::new(Pattern::Cell(Rc::clone(&cell)));
        assert!(unify_type(&ctx, &pattern, TypeId::INT32).unwrap());
        // second unification against the same type succeeds
        assert!(unify_type(&ctx, &pattern, TypeId::INT32).unwrap());
        // a different type no longer unifies
        assert!(!unify_type(&ctx, &pattern, TypeId::BOOL).unwrap());
    }

    #[test]
    fn array_pattern_destructures_element_and_size() {
        let ctx = Context::new();
        let elem_cell = PatternCell::unbound(None);
        let size_cell = PatternCell::unbound(None);
        let pattern = Rc::new(Pattern::ArrayType {
            element: Rc::new(Pattern::Cell(Rc::clone(&elem_cell))),
            size: Rc::new(Pattern::Cell(Rc::clone(&size_cell))),
        });
        let arr = array_type(&ctx, TypeId::INT8, 3);
        assert!(unify_type(&ctx, &pattern, arr).unwrap());

        let elem = deref_cell(&ctx, &elem_cell).unwrap();
        assert_eq!(value::value_to_type(&ctx, &elem).unwrap(), TypeId::INT8);
        let size = deref_cell(&ctx, &size_cell).unwrap();
        assert_eq!(value::value_to_int(&ctx, &size).unwrap(), 3);
    }

    #[test]
    fn constructor_pattern_rejects_other_kinds() {
        let ctx = Context::new();
        let pattern = Rc::new(Pattern::PointerType {
            pointee: Rc::new(Pattern::Cell(PatternCell::unbound(None))),
        });
        assert!(!unify_type(&ctx, &pattern, TypeId::INT32).unwrap());
    }

    #[test]
    fn unresolved_cell_is_fatal_on_deref() {
        let ctx = Context::new();
        let cell = PatternCell::unbound(None);
        assert!(deref_cell(&ctx, &cell).is_err());
    }
}
