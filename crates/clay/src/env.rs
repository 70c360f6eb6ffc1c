//! Environments, modules, and name lookup.
//!
//! Lexical scopes are a linked list of frames; the root frame of every
//! top-level item's scope points at its defining *module* by id rather
//! than by reference, which is what breaks the strong cycle between
//! environments and module definitions. A lookup that reaches a module
//! switches to global lookup: the module's own globals first, then,
//! recursively, the public globals of its imports, with a per-module
//! `lookup_busy` latch breaking import cycles.
//!
//! Public visibility: `export name;` marks a global public. A module with
//! no export items publishes all of its globals.

use std::{
    cell::{Cell, OnceCell, RefCell},
    rc::Rc,
};

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::{
    analyzer::Analysis,
    ast::{ExternalProc, Item, Overloadable, Procedure, Record},
    context::Context,
    error::CompileResult,
    intern::NameId,
    pattern::PatternCell,
    primops::PrimOp,
    types::TypeId,
    value::Value,
};

/// Anything an environment can bind a name to.
#[derive(Clone)]
pub enum Object {
    Value(Rc<Value>),
    Analysis(Rc<Analysis>),
    Cell(Rc<PatternCell>),
    Record(Rc<Record>),
    Procedure(Rc<Procedure>),
    Overloadable(Rc<Overloadable>),
    External(Rc<ExternalProc>),
    PrimOp(PrimOp),
    Type(TypeId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleId(u32);

impl ModuleId {
    pub fn new(index: usize) -> Self {
        Self(u32::try_from(index).expect("module table overflow"))
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

pub struct Module {
    pub id: ModuleId,
    pub name: String,
    pub imports: RefCell<Vec<ModuleId>>,
    pub exports: Vec<NameId>,
    pub items: Vec<Item>,
    pub globals: RefCell<IndexMap<NameId, Object>>,
    env: OnceCell<Env>,
    pub initialized: Cell<bool>,
    lookup_busy: Cell<bool>,
}

impl Module {
    pub fn new(id: ModuleId, name: impl Into<String>, exports: Vec<NameId>, items: Vec<Item>) -> Rc<Self> {
        let module = Rc::new(Self {
            id,
            name: name.into(),
            imports: RefCell::new(Vec::new()),
            exports,
            items,
            globals: RefCell::new(IndexMap::new()),
            env: OnceCell::new(),
            initialized: Cell::new(false),
            lookup_busy: Cell::new(false),
        });
        module
            .env
            .set(Env::module_root(id))
            .unwrap_or_else(|_| unreachable!("module env set once"));
        module
    }

    /// The module's root environment; lookups that fall off this frame go
    /// to global lookup.
    pub fn env(&self) -> &Env {
        self.env.get().expect("module env initialized at construction")
    }

    fn is_public(&self, name: NameId) -> bool {
        self.exports.is_empty() || self.exports.contains(&name)
    }
}

/// Installs a module global; duplicate definitions are fatal.
pub fn add_global(ctx: &Context, module: &Module, name: NameId, obj: Object) -> CompileResult<()> {
    if module.globals.borrow_mut().insert(name, obj).is_some() {
        return Err(ctx.error(format!("duplicate definition: {}", ctx.name_text(name))));
    }
    Ok(())
}

/// Looks a name up in a module's globals, then in the public globals of its
/// imports. The busy latch makes cyclic imports resolve to "not found here"
/// instead of recursing forever.
pub fn lookup_global(ctx: &Context, module: &Rc<Module>, name: NameId) -> Option<Object> {
    if module.lookup_busy.get() {
        return None;
    }
    module.lookup_busy.set(true);
    let mut result = module.globals.borrow().get(&name).cloned();
    if result.is_none() {
        let imports = module.imports.borrow().clone();
        for import in imports {
            let imported = ctx.module(import);
            if let Some(obj) = lookup_public(ctx, &imported, name) {
                result = Some(obj);
                break;
            }
        }
    }
    module.lookup_busy.set(false);
    result
}

/// Like [`lookup_global`] but only for names on the module's export list.
pub fn lookup_public(ctx: &Context, module: &Rc<Module>, name: NameId) -> Option<Object> {
    if !module.is_public(name) {
        return None;
    }
    lookup_global(ctx, module, name)
}

enum EnvParent {
    None,
    Env(Env),
    Module(ModuleId),
}

struct EnvFrame {
    parent: EnvParent,
    entries: RefCell<AHashMap<NameId, Object>>,
}

/// A lexical environment frame; cloning shares the frame.
#[derive(Clone)]
pub struct Env(Rc<EnvFrame>);

impl Env {
    pub fn root() -> Self {
        Self(Rc::new(EnvFrame {
            parent: EnvParent::None,
            entries: RefCell::new(AHashMap::new()),
        }))
    }

    pub fn module_root(module: ModuleId) -> Self {
        Self(Rc::new(EnvFrame {
            parent: EnvParent::Module(module),
            entries: RefCell::new(AHashMap::new()),
        }))
    }

    /// A fresh frame whose parent is this environment.
    pub fn child(&self) -> Self {
        Self(Rc::new(EnvFrame {
            parent: EnvParent::Env(self.clone()),
            entries: RefCell::new(AHashMap::new()),
        }))
    }

    pub fn add_local(&self, ctx: &Context, name: NameId, obj: Object) -> CompileResult<()> {
        if self.0.entries.borrow_mut().insert(name, obj).is_some() {
            return Err(ctx.error(format!("duplicate binding: {}", ctx.name_text(name))));
        }
        Ok(())
    }

    pub fn lookup(&self, ctx: &Context, name: NameId) -> CompileResult<Object> {
        let mut frame = self.clone();
        loop {
            if let Some(obj) = frame.0.entries.borrow().get(&name) {
                return Ok(obj.clone());
            }
            let parent = match &frame.0.parent {
                EnvParent::None => None,
                EnvParent::Env(parent) => Some(parent.clone()),
                EnvParent::Module(id) => {
                    let module = ctx.module(*id);
                    if let Some(obj) = lookup_global(ctx, &module, name) {
                        return Ok(obj);
                    }
                    None
                }
            };
            match parent {
                Some(parent) => frame = parent,
                None => break,
            }
        }
        Err(ctx.error(format!("unknown name: {}", ctx.name_text(name))))
    }
}
