//! Cached syntactic-sugar rewrites, shared by the analyzer and the
//! concrete evaluator.
//!
//! Each rewrite is memoized on the AST node's `OnceCell` slot, so a node
//! is desugared at most once no matter how many specializations walk it.
//! Rewrites that reference other modules (`core` operator functions, the
//! `_char`/`_string` constructors, the primitives) wrap the name in a
//! captured-environment expression so resolution is independent of the
//! scope the sugar appears in.
//!
//! The `for` rewrite introduces the fresh names `%expr` and `%iter`. The
//! `%` prefix is reserved: the lexer can never produce it in a user
//! identifier, while the interner and environments accept it.

use std::{cell::OnceCell, rc::Rc};

use crate::{
    ast::{BinaryOpKind, BindingKind, Expr, ExprKind, Stmt, StmtKind, UnaryOpKind},
    context::Context,
    error::CompileResult,
    intern::NameId,
    source::Location,
};

/// Returns the cached rewrite, building it on first visit.
pub fn cached_expr(
    cell: &OnceCell<Rc<Expr>>,
    build: impl FnOnce() -> CompileResult<Rc<Expr>>,
) -> CompileResult<Rc<Expr>> {
    if let Some(expr) = cell.get() {
        return Ok(Rc::clone(expr));
    }
    let expr = build()?;
    let _ = cell.set(Rc::clone(&expr));
    Ok(expr)
}

pub fn cached_stmt(
    cell: &OnceCell<Rc<Stmt>>,
    build: impl FnOnce() -> CompileResult<Rc<Stmt>>,
) -> CompileResult<Rc<Stmt>> {
    if let Some(stmt) = cell.get() {
        return Ok(Rc::clone(stmt));
    }
    let stmt = build()?;
    let _ = cell.set(Rc::clone(&stmt));
    Ok(stmt)
}

/// A name reference evaluated in another module's scope.
pub fn module_name_ref(ctx: &Context, module: &str, name: &str) -> CompileResult<Rc<Expr>> {
    let module = ctx.module_by_name(module)?;
    let name_ref = Expr::synthetic(ExprKind::NameRef(ctx.intern(name)));
    Ok(Expr::synthetic(ExprKind::Scoped {
        env: module.env().clone(),
        expr: name_ref,
    }))
}

pub fn core_name_ref(ctx: &Context, name: &str) -> CompileResult<Rc<Expr>> {
    module_name_ref(ctx, "core", name)
}

pub fn prim_name_ref(ctx: &Context, name: &str) -> CompileResult<Rc<Expr>> {
    module_name_ref(ctx, "__primitives__", name)
}

fn call(callable: Rc<Expr>, args: Vec<Rc<Expr>>, location: Option<Location>) -> Rc<Expr> {
    Expr::new(ExprKind::Call { expr: callable, args }, location)
}

/// `'c'` becomes `Char(<code>#i8)` with `Char` from the `_char` module.
pub fn convert_char_literal(ctx: &Context, value: u8) -> CompileResult<Rc<Expr>> {
    let code = Expr::synthetic(ExprKind::IntLiteral {
        text: (value as i8).to_string(),
        suffix: Some("i8".to_owned()),
    });
    Ok(call(module_name_ref(ctx, "_char", "Char")?, vec![code], None))
}

/// `"..."` becomes `string([Char(..), ..])` with `string` from the
/// `_string` module.
pub fn convert_string_literal(ctx: &Context, value: &str) -> CompileResult<Rc<Expr>> {
    let mut chars = Vec::with_capacity(value.len());
    for byte in value.bytes() {
        chars.push(convert_char_literal(ctx, byte)?);
    }
    let char_array = Expr::synthetic(ExprKind::Array {
        args: chars,
        converted: OnceCell::new(),
    });
    Ok(call(
        module_name_ref(ctx, "_string", "string")?,
        vec![char_array],
        None,
    ))
}

/// One-element tuples are the element; larger ones call the `tuple`
/// primitive.
pub fn convert_tuple(ctx: &Context, args: &[Rc<Expr>], location: Option<Location>) -> CompileResult<Rc<Expr>> {
    if args.len() == 1 {
        return Ok(Rc::clone(&args[0]));
    }
    Ok(call(prim_name_ref(ctx, "tuple")?, args.to_vec(), location))
}

pub fn convert_array(ctx: &Context, args: &[Rc<Expr>], location: Option<Location>) -> CompileResult<Rc<Expr>> {
    Ok(call(prim_name_ref(ctx, "array")?, args.to_vec(), location))
}

pub fn convert_unary_op(
    ctx: &Context,
    op: UnaryOpKind,
    operand: &Rc<Expr>,
    location: Option<Location>,
) -> CompileResult<Rc<Expr>> {
    let callable = match op {
        UnaryOpKind::Dereference => prim_name_ref(ctx, "pointerDereference")?,
        UnaryOpKind::AddressOf => prim_name_ref(ctx, "addressOf")?,
        UnaryOpKind::Plus => core_name_ref(ctx, "plus")?,
        UnaryOpKind::Minus => core_name_ref(ctx, "minus")?,
        UnaryOpKind::Not => prim_name_ref(ctx, "boolNot")?,
    };
    Ok(call(callable, vec![Rc::clone(operand)], location))
}

pub fn convert_binary_op(
    ctx: &Context,
    op: BinaryOpKind,
    left: &Rc<Expr>,
    right: &Rc<Expr>,
    location: Option<Location>,
) -> CompileResult<Rc<Expr>> {
    let name = match op {
        BinaryOpKind::Add => "add",
        BinaryOpKind::Subtract => "subtract",
        BinaryOpKind::Multiply => "multiply",
        BinaryOpKind::Divide => "divide",
        BinaryOpKind::Remainder => "remainder",
        BinaryOpKind::Equals => "equals?",
        BinaryOpKind::NotEquals => "notEquals?",
        BinaryOpKind::Lesser => "lesser?",
        BinaryOpKind::LesserEquals => "lesserEquals?",
        BinaryOpKind::Greater => "greater?",
        BinaryOpKind::GreaterEquals => "greaterEquals?",
    };
    Ok(call(
        core_name_ref(ctx, name)?,
        vec![Rc::clone(left), Rc::clone(right)],
        location,
    ))
}

/// Rewrites `for (x in e) body` into
/// `{ ref %expr = e; var %iter = iterator(%expr);
///    while (hasNext?(%iter)) { ref x = next(%iter); body } }`.
pub fn convert_for_statement(
    ctx: &Context,
    variable: NameId,
    expr: &Rc<Expr>,
    body: &Rc<Stmt>,
) -> CompileResult<Rc<Stmt>> {
    let expr_var = ctx.intern("%expr");
    let iter_var = ctx.intern("%iter");

    let mut statements = Vec::with_capacity(3);
    statements.push(Stmt::synthetic(StmtKind::Binding {
        kind: BindingKind::Ref,
        name: expr_var,
        expr: Rc::clone(expr),
    }));

    let iterator_call = call(
        core_name_ref(ctx, "iterator")?,
        vec![Expr::synthetic(ExprKind::NameRef(expr_var))],
        None,
    );
    statements.push(Stmt::synthetic(StmtKind::Binding {
        kind: BindingKind::Var,
        name: iter_var,
        expr: iterator_call,
    }));

    let has_next_call = call(
        core_name_ref(ctx, "hasNext?")?,
        vec![Expr::synthetic(ExprKind::NameRef(iter_var))],
        None,
    );
    let next_call = call(
        core_name_ref(ctx, "next")?,
        vec![Expr::synthetic(ExprKind::NameRef(iter_var))],
        None,
    );
    let while_body = Stmt::synthetic(StmtKind::Block(vec![
        Stmt::synthetic(StmtKind::Binding {
            kind: BindingKind::Ref,
            name: variable,
            expr: next_call,
        }),
        Rc::clone(body),
    ]));
    statements.push(Stmt::synthetic(StmtKind::While {
        condition: has_next_call,
        body: while_body,
    }));

    Ok(Stmt::synthetic(StmtKind::Block(statements)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_are_cached_on_the_node() {
        let cell = OnceCell::new();
        let first = cached_expr(&cell, || Ok(Expr::synthetic(ExprKind::BoolLiteral(true)))).unwrap();
        // the second visit must reuse the converted node, not rebuild it
        let second = cached_expr(&cell, || unreachable!("already converted")).unwrap();
        assert!(Rc::ptr_eq(&first, &second));
    }
}
