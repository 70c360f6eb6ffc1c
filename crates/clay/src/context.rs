//! The single-threaded engine context.
//!
//! One [`Context`] owns every process-wide table: the identifier interner,
//! the type store, the compiler-object table, the module registry, the
//! temp-block stack, the location stack, the raw-allocation registry, the
//! backend, and the tracer. The specialization engine is a recursive walk
//! over shared structures, so the tables sit behind interior mutability and
//! every engine function takes `&Context`; borrows are kept short and never
//! held across calls that may re-enter the engine.

use std::{
    alloc::Layout,
    cell::RefCell,
    path::PathBuf,
    rc::Rc,
};

use ahash::AHashMap;

use crate::{
    backend::Backend,
    cobject::{CObject, CoIndex, CoTable},
    env::{Module, ModuleId},
    error::{CompileError, CompileResult},
    intern::{Interns, NameId},
    source::Location,
    tracer::{NoopTracer, Tracer},
    types::{TypeData, TypeId, TypeStore},
    value::{self, Value},
};

pub struct Context {
    pub(crate) interns: RefCell<Interns>,
    pub(crate) types: RefCell<TypeStore>,
    pub(crate) cobjects: RefCell<CoTable>,
    modules: RefCell<Vec<Rc<Module>>>,
    modules_by_name: RefCell<AHashMap<String, ModuleId>>,
    temp_blocks: RefCell<Vec<Vec<Rc<Value>>>>,
    locations: RefCell<Vec<Option<Location>>>,
    allocations: RefCell<AHashMap<usize, Layout>>,
    pub(crate) search_paths: RefCell<Vec<PathBuf>>,
    pub(crate) backend: Backend,
    pub(crate) tracer: RefCell<Box<dyn Tracer>>,
}

impl Context {
    pub fn new() -> Self {
        Self {
            interns: RefCell::new(Interns::new()),
            types: RefCell::new(TypeStore::new()),
            cobjects: RefCell::new(CoTable::new()),
            modules: RefCell::new(Vec::new()),
            modules_by_name: RefCell::new(AHashMap::new()),
            temp_blocks: RefCell::new(Vec::new()),
            locations: RefCell::new(Vec::new()),
            allocations: RefCell::new(AHashMap::new()),
            search_paths: RefCell::new(Vec::new()),
            backend: Backend::new(),
            tracer: RefCell::new(Box::new(NoopTracer)),
        }
    }

    pub fn set_tracer(&self, tracer: Box<dyn Tracer>) {
        *self.tracer.borrow_mut() = tracer;
    }

    //
    // identifiers
    //

    pub fn intern(&self, text: &str) -> NameId {
        self.interns.borrow_mut().intern(text)
    }

    pub fn name_text(&self, name: NameId) -> String {
        self.interns.borrow().text(name).to_owned()
    }

    //
    // types
    //

    pub(crate) fn type_data(&self, id: TypeId) -> Rc<TypeData> {
        self.types.borrow().get(id)
    }

    //
    // compiler objects
    //

    pub(crate) fn co_index(&self, obj: &CObject) -> CoIndex {
        let type_data = match obj {
            CObject::Type(id) => Some(self.type_data(*id)),
            _ => None,
        };
        self.cobjects.borrow_mut().intern(obj, type_data.as_ref())
    }

    pub(crate) fn co_object(&self, index: CoIndex) -> CObject {
        self.cobjects.borrow().get(index).clone()
    }

    //
    // modules
    //

    pub(crate) fn add_module(&self, name: &str, module: &Rc<Module>) {
        self.modules.borrow_mut().push(Rc::clone(module));
        self.modules_by_name.borrow_mut().insert(name.to_owned(), module.id);
    }

    pub(crate) fn next_module_id(&self) -> ModuleId {
        ModuleId::new(self.modules.borrow().len())
    }

    pub(crate) fn module(&self, id: ModuleId) -> Rc<Module> {
        Rc::clone(&self.modules.borrow()[id.index()])
    }

    pub(crate) fn module_by_name(&self, name: &str) -> CompileResult<Rc<Module>> {
        match self.modules_by_name.borrow().get(name) {
            Some(&id) => Ok(self.module(id)),
            None => Err(self.error(format!("module not loaded: {name}"))),
        }
    }

    pub(crate) fn loaded_module(&self, name: &str) -> Option<Rc<Module>> {
        self.modules_by_name.borrow().get(name).map(|&id| self.module(id))
    }

    //
    // location stack
    //

    /// Pushes a location for the duration of the returned guard. `None`
    /// entries keep the stack aligned with the walk; diagnostics use the
    /// top non-empty location.
    pub(crate) fn push_location(&self, location: Option<Location>) -> LocationGuard<'_> {
        self.locations.borrow_mut().push(location);
        LocationGuard { ctx: self }
    }

    pub(crate) fn top_location(&self) -> Option<Location> {
        self.locations.borrow().iter().rev().find_map(Clone::clone)
    }

    /// A fatal error carrying the current top location.
    pub(crate) fn error(&self, message: impl Into<String>) -> CompileError {
        CompileError::new(message, self.top_location())
    }

    /// A fatal error at an explicit location, falling back to the stack.
    pub(crate) fn error_at(&self, location: Option<Location>, message: impl Into<String>) -> CompileError {
        CompileError::new(message, location.or_else(|| self.top_location()))
    }

    //
    // temp blocks
    //

    pub(crate) fn push_temp_block(&self) {
        self.temp_blocks.borrow_mut().push(Vec::new());
    }

    /// Pops the current temp block, destroying every value it still owns,
    /// newest first. Runs on error paths too, so non-escaping values are
    /// destroyed before the driver reports the failure.
    pub(crate) fn pop_temp_block(&self) -> CompileResult<()> {
        let block = self
            .temp_blocks
            .borrow_mut()
            .pop()
            .expect("temp block stack underflow");
        let mut first_error = None;
        for temp in block.into_iter().rev() {
            if let Err(err) = self.release_value(temp) {
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Installs an owning value into the current temp block.
    pub(crate) fn install_temp(&self, value: Rc<Value>) {
        debug_assert!(value.owned);
        self.temp_blocks
            .borrow_mut()
            .last_mut()
            .expect("no active temp block")
            .push(value);
    }

    /// Runs the type-directed destructor when this reference is the last
    /// one; the buffer itself is released by `Value`'s drop.
    pub(crate) fn release_value(&self, value: Rc<Value>) -> CompileResult<()> {
        if Rc::strong_count(&value) == 1 && value.owned {
            value::value_destroy(self, &value)?;
        }
        Ok(())
    }

    //
    // raw allocations (allocateMemory / freeMemory)
    //

    pub(crate) fn allocate_raw(&self, size: usize) -> *mut u8 {
        let layout = Layout::from_size_align(size.max(1), 16).expect("allocation layout");
        // SAFETY: layout has non-zero size.
        let ptr = unsafe { std::alloc::alloc_zeroed(layout) };
        if ptr.is_null() {
            std::alloc::handle_alloc_error(layout);
        }
        self.allocations.borrow_mut().insert(ptr as usize, layout);
        ptr
    }

    pub(crate) fn free_raw(&self, ptr: *mut u8) -> CompileResult<()> {
        let Some(layout) = self.allocations.borrow_mut().remove(&(ptr as usize)) else {
            return Err(self.error("freeMemory of an unknown pointer"));
        };
        // SAFETY: the pointer came from allocate_raw with this layout and
        // was removed from the registry, so it is freed exactly once.
        unsafe { std::alloc::dealloc(ptr, layout) };
        Ok(())
    }

    /// Number of `allocateMemory` blocks not yet freed. Tests use this to
    /// observe leak balance.
    pub fn outstanding_allocations(&self) -> usize {
        self.allocations.borrow().len()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) struct LocationGuard<'a> {
    ctx: &'a Context,
}

impl Drop for LocationGuard<'_> {
    fn drop(&mut self) {
        self.ctx.locations.borrow_mut().pop();
    }
}
