//! The abstract syntax tree and top-level items.
//!
//! Nodes are reference counted because the engine aliases them freely: an
//! overload's `Code` is shared by every invocation entry specialized from
//! it, and captured-environment expressions pair an existing node with a
//! new scope. Syntactic-sugar nodes (char/string literals, tuples, arrays,
//! operators, `for`) carry a `OnceCell` slot holding their desugared form
//! so each node is rewritten at most once, no matter how many times the
//! analyzer and the evaluator walk it.

use std::{
    cell::{Cell, OnceCell, RefCell},
    rc::Rc,
};

use crate::{
    cobject::CoIndex,
    env::{Env, ModuleId},
    intern::NameId,
    invoke::InvokeTable,
    source::Location,
    value::Value,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOpKind {
    Dereference,
    AddressOf,
    Plus,
    Minus,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOpKind {
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
    Equals,
    NotEquals,
    Lesser,
    LesserEquals,
    Greater,
    GreaterEquals,
}

pub struct Expr {
    pub kind: ExprKind,
    pub location: Option<Location>,
}

impl Expr {
    pub fn new(kind: ExprKind, location: Option<Location>) -> Rc<Self> {
        Rc::new(Self { kind, location })
    }

    /// A synthesized node with no source location (used by desugarings).
    pub fn synthetic(kind: ExprKind) -> Rc<Self> {
        Self::new(kind, None)
    }
}

pub enum ExprKind {
    BoolLiteral(bool),
    IntLiteral {
        text: String,
        suffix: Option<String>,
    },
    FloatLiteral {
        text: String,
        suffix: Option<String>,
    },
    CharLiteral {
        value: u8,
        converted: OnceCell<Rc<Expr>>,
    },
    StringLiteral {
        value: String,
        converted: OnceCell<Rc<Expr>>,
    },
    NameRef(NameId),
    Tuple {
        args: Vec<Rc<Expr>>,
        converted: OnceCell<Rc<Expr>>,
    },
    Array {
        args: Vec<Rc<Expr>>,
        converted: OnceCell<Rc<Expr>>,
    },
    Indexing {
        expr: Rc<Expr>,
        args: Vec<Rc<Expr>>,
    },
    Call {
        expr: Rc<Expr>,
        args: Vec<Rc<Expr>>,
    },
    FieldRef {
        expr: Rc<Expr>,
        name: NameId,
    },
    TupleRef {
        expr: Rc<Expr>,
        index: u32,
    },
    UnaryOp {
        op: UnaryOpKind,
        expr: Rc<Expr>,
        converted: OnceCell<Rc<Expr>>,
    },
    BinaryOp {
        op: BinaryOpKind,
        left: Rc<Expr>,
        right: Rc<Expr>,
        converted: OnceCell<Rc<Expr>>,
    },
    And {
        left: Rc<Expr>,
        right: Rc<Expr>,
    },
    Or {
        left: Rc<Expr>,
        right: Rc<Expr>,
    },
    /// An expression paired with the environment it must be evaluated in,
    /// regardless of the scope it is reached from. Produced when desugarings
    /// reference names from other modules (`core`, `__primitives__`, …).
    Scoped {
        env: Env,
        expr: Rc<Expr>,
    },
    /// A ready-made value wrapped as an expression (field names and tuple
    /// indices lowered to primitive calls).
    ValueExpr(Rc<Value>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    Var,
    Ref,
    Static,
}

pub struct Stmt {
    pub kind: StmtKind,
    pub location: Option<Location>,
}

impl Stmt {
    pub fn new(kind: StmtKind, location: Option<Location>) -> Rc<Self> {
        Rc::new(Self { kind, location })
    }

    pub fn synthetic(kind: StmtKind) -> Rc<Self> {
        Self::new(kind, None)
    }
}

pub enum StmtKind {
    Block(Vec<Rc<Stmt>>),
    Label(NameId),
    Binding {
        kind: BindingKind,
        name: NameId,
        expr: Rc<Expr>,
    },
    Assignment {
        left: Rc<Expr>,
        right: Rc<Expr>,
    },
    Goto(NameId),
    Return(Option<Rc<Expr>>),
    ReturnRef(Rc<Expr>),
    If {
        condition: Rc<Expr>,
        then_part: Rc<Stmt>,
        else_part: Option<Rc<Stmt>>,
    },
    ExprStatement(Rc<Expr>),
    While {
        condition: Rc<Expr>,
        body: Rc<Stmt>,
    },
    Break,
    Continue,
    For {
        variable: NameId,
        expr: Rc<Expr>,
        body: Rc<Stmt>,
        converted: OnceCell<Rc<Stmt>>,
    },
}

/// A formal argument of a code template or a record field list.
pub enum FormalArg {
    /// `name : Type` or bare `name` — matched by the runtime type of the
    /// argument.
    Value {
        name: NameId,
        ty: Option<Rc<Expr>>,
        location: Option<Location>,
    },
    /// `static pattern` — matched by the compile-time value of the
    /// argument.
    Static {
        pattern: Rc<Expr>,
        location: Option<Location>,
    },
}

impl FormalArg {
    pub fn is_static(&self) -> bool {
        matches!(self, Self::Static { .. })
    }

    pub fn location(&self) -> Option<Location> {
        match self {
            Self::Value { location, .. } | Self::Static { location, .. } => location.clone(),
        }
    }
}

/// A code template: pattern variables, an optional predicate, formal
/// arguments, and a body.
pub struct Code {
    pub pattern_vars: Vec<NameId>,
    pub predicate: Option<Rc<Expr>>,
    pub formal_args: Vec<FormalArg>,
    pub body: Rc<Stmt>,
}

pub struct Record {
    pub name: NameId,
    pub pattern_vars: Vec<NameId>,
    pub formal_args: Vec<FormalArg>,
    pub module: Cell<Option<ModuleId>>,
    pub co_index: Cell<Option<CoIndex>>,
    pub location: Option<Location>,
}

pub struct Procedure {
    pub name: NameId,
    pub code: Rc<Code>,
    pub module: Cell<Option<ModuleId>>,
    pub invoke_table: OnceCell<Rc<InvokeTable>>,
    pub co_index: Cell<Option<CoIndex>>,
    pub location: Option<Location>,
}

/// A standalone overload case, attached to its overloadable during module
/// initialization.
pub struct Overload {
    pub name: NameId,
    pub code: Rc<Code>,
    pub module: Cell<Option<ModuleId>>,
    pub location: Option<Location>,
}

pub struct Overloadable {
    pub name: NameId,
    pub overloads: RefCell<Vec<Rc<Overload>>>,
    /// One invocation table per arity, created on first lookup.
    pub invoke_tables: RefCell<Vec<Option<Rc<InvokeTable>>>>,
    pub module: Cell<Option<ModuleId>>,
    pub co_index: Cell<Option<CoIndex>>,
    pub location: Option<Location>,
}

pub struct ExternalArg {
    pub name: NameId,
    pub ty: Rc<Expr>,
}

/// Signature of an external procedure once its type expressions have been
/// evaluated and the backend function has been built.
pub struct ExternalSig {
    pub arg_types: Vec<crate::types::TypeId>,
    pub return_type: crate::types::TypeId,
    pub handle: crate::backend::FnHandle,
}

pub struct ExternalProc {
    pub name: NameId,
    pub args: Vec<ExternalArg>,
    pub return_type: Rc<Expr>,
    pub resolved: OnceCell<ExternalSig>,
    pub module: Cell<Option<ModuleId>>,
    pub co_index: Cell<Option<CoIndex>>,
    pub location: Option<Location>,
}

/// A top-level item as it appears in a module body.
#[derive(Clone)]
pub enum Item {
    Record(Rc<Record>),
    Procedure(Rc<Procedure>),
    Overload(Rc<Overload>),
    Overloadable(Rc<Overloadable>),
    External(Rc<ExternalProc>),
}

/// A dotted module name, e.g. `a.b.c`.
#[derive(Clone)]
pub struct DottedName {
    pub parts: Vec<NameId>,
    pub location: Option<Location>,
}

/// Parser output: a module body before the loader installs it.
pub struct ParsedModule {
    pub imports: Vec<DottedName>,
    pub exports: Vec<NameId>,
    pub items: Vec<Item>,
}
