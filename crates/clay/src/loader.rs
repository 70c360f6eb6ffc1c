//! Module loading: search paths, dotted names, the synthesized
//! `__primitives__` module, and module initialization.
//!
//! Modules are located by dotted name — `a.b.c` maps to `a/b/c.clay` under
//! any configured search path — and cached by that name, so a module loads
//! and initializes exactly once. `__primitives__` is synthesized in memory
//! with the primitive operators (under their `?`-suffixed surface names)
//! and the base type names. The support modules `core`, `_char`, and
//! `_string` load with every program because literal and operator
//! desugarings resolve against their scopes.
//!
//! Initialization runs after a module and its transitive imports are
//! installed: imports initialize first, then the module's standalone
//! overloads attach to their overloadables, newest registration first.

use std::{path::Path, rc::Rc};

use strum::IntoEnumIterator;

use crate::{
    ast::{Item, ParsedModule},
    cobject::CObject,
    context::Context,
    env::{self, Module, Object},
    error::CompileResult,
    evaluator,
    lexer, parser,
    primops::PrimOp,
    source::{Location, Source},
    types::{self, TypeId},
};

pub fn add_search_path(ctx: &Context, path: impl Into<std::path::PathBuf>) {
    ctx.search_paths.borrow_mut().push(path.into());
}

/// Loads the program rooted at `path` along with the support modules, and
/// initializes everything. The returned module holds `main`.
pub fn load_program(ctx: &Context, path: &Path) -> CompileResult<Rc<Module>> {
    for name in ["__primitives__", "core", "_char", "_string"] {
        load_module_by_name(ctx, name, None)?;
    }
    let source = load_source_file(ctx, path)?;
    let name = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("__main__")
        .to_owned();
    let parsed = parse_source(ctx, &source)?;
    let module = install_module(ctx, &name, parsed)?;
    for name in ["core", "_char", "_string"] {
        let support = ctx.module_by_name(name)?;
        init_module(ctx, &support)?;
    }
    init_module(ctx, &module)?;
    Ok(module)
}

fn load_source_file(ctx: &Context, path: &Path) -> CompileResult<Rc<Source>> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Source::new(path.display().to_string(), text)),
        Err(_) => Err(ctx.error(format!("unable to open file: {}", path.display()))),
    }
}

fn parse_source(ctx: &Context, source: &Rc<Source>) -> CompileResult<ParsedModule> {
    let tokens = lexer::tokenize(source, &mut ctx.interns.borrow_mut())?;
    parser::parse(source, tokens)
}

fn locate_module(ctx: &Context, relative: &str) -> Option<std::path::PathBuf> {
    ctx.search_paths
        .borrow()
        .iter()
        .map(|root| root.join(relative))
        .find(|candidate| candidate.is_file())
}

fn load_module_by_name(ctx: &Context, name: &str, location: Option<Location>) -> CompileResult<Rc<Module>> {
    if let Some(module) = ctx.loaded_module(name) {
        return Ok(module);
    }
    if name == "__primitives__" {
        return make_primitives_module(ctx);
    }
    let relative = format!("{}.clay", name.replace('.', "/"));
    let Some(path) = locate_module(ctx, &relative) else {
        return Err(ctx.error_at(location, format!("module not found: {name}")));
    };
    let source = load_source_file(ctx, &path)?;
    let parsed = parse_source(ctx, &source)?;
    install_module(ctx, name, parsed)
}

/// Registers a parsed module, loads its imports, and installs its globals.
/// Registration happens before imports load, which is what lets import
/// cycles resolve.
fn install_module(ctx: &Context, name: &str, parsed: ParsedModule) -> CompileResult<Rc<Module>> {
    let ParsedModule {
        imports,
        exports,
        items,
    } = parsed;
    let module = Module::new(ctx.next_module_id(), name, exports, items);
    ctx.add_module(name, &module);
    for dotted in imports {
        let key = dotted
            .parts
            .iter()
            .map(|&part| ctx.name_text(part))
            .collect::<Vec<_>>()
            .join(".");
        let imported = load_module_by_name(ctx, &key, dotted.location.clone())?;
        module.imports.borrow_mut().push(imported.id);
    }
    install_globals(ctx, &module)?;
    Ok(module)
}

fn install_globals(ctx: &Context, module: &Rc<Module>) -> CompileResult<()> {
    for item in &module.items {
        match item {
            Item::Record(record) => {
                record.module.set(Some(module.id));
                // a record with no pattern variables denotes one concrete
                // type; install the type itself
                if record.pattern_vars.is_empty() {
                    let ty = types::record_type(ctx, record, &[])?;
                    env::add_global(ctx, module, record.name, Object::Type(ty))?;
                } else {
                    env::add_global(ctx, module, record.name, Object::Record(Rc::clone(record)))?;
                }
            }
            Item::Procedure(procedure) => {
                procedure.module.set(Some(module.id));
                env::add_global(ctx, module, procedure.name, Object::Procedure(Rc::clone(procedure)))?;
            }
            Item::Overloadable(overloadable) => {
                overloadable.module.set(Some(module.id));
                env::add_global(
                    ctx,
                    module,
                    overloadable.name,
                    Object::Overloadable(Rc::clone(overloadable)),
                )?;
            }
            Item::External(external) => {
                external.module.set(Some(module.id));
                env::add_global(ctx, module, external.name, Object::External(Rc::clone(external)))?;
            }
            Item::Overload(overload) => {
                overload.module.set(Some(module.id));
            }
        }
    }
    Ok(())
}

/// Initializes a module once: imports first, then overload registration in
/// program order with the newest registration dispatched first.
pub fn init_module(ctx: &Context, module: &Rc<Module>) -> CompileResult<()> {
    if module.initialized.get() {
        return Ok(());
    }
    module.initialized.set(true);
    let imports = module.imports.borrow().clone();
    for import in imports {
        let imported = ctx.module(import);
        init_module(ctx, &imported)?;
    }
    for item in &module.items {
        if let Item::Overload(overload) = item {
            match module.env().lookup(ctx, overload.name)? {
                Object::Overloadable(overloadable) => {
                    overloadable.overloads.borrow_mut().insert(0, Rc::clone(overload));
                }
                _ => {
                    return Err(ctx.error_at(
                        overload.location.clone(),
                        format!("overload target is not overloadable: {}", ctx.name_text(overload.name)),
                    ));
                }
            }
        }
    }
    ctx.tracer.borrow_mut().module_loaded(&module.name);
    Ok(())
}

fn make_primitives_module(ctx: &Context) -> CompileResult<Rc<Module>> {
    let module = Module::new(ctx.next_module_id(), "__primitives__", Vec::new(), Vec::new());
    ctx.add_module("__primitives__", &module);

    let base_types = [
        ("Bool", TypeId::BOOL),
        ("Int8", TypeId::INT8),
        ("Int16", TypeId::INT16),
        ("Int32", TypeId::INT32),
        ("Int64", TypeId::INT64),
        ("UInt8", TypeId::UINT8),
        ("UInt16", TypeId::UINT16),
        ("UInt32", TypeId::UINT32),
        ("UInt64", TypeId::UINT64),
        ("Float32", TypeId::FLOAT32),
        ("Float64", TypeId::FLOAT64),
        ("Void", TypeId::VOID),
    ];
    for (name, ty) in base_types {
        env::add_global(ctx, &module, ctx.intern(name), Object::Type(ty))?;
    }
    for op in PrimOp::iter() {
        env::add_global(ctx, &module, ctx.intern(op.surface_name()), Object::PrimOp(op))?;
    }
    module.initialized.set(true);
    Ok(module)
}

/// Resolves a public name from the `core` module into a callable.
pub fn core_name(ctx: &Context, name: &str) -> CompileResult<CObject> {
    let module = ctx.module_by_name("core")?;
    let Some(obj) = env::lookup_public(ctx, &module, ctx.intern(name)) else {
        return Err(ctx.error(format!("core name not found: {name}")));
    };
    evaluator::object_to_cobject(ctx, obj)
}
