//! Hash-consed types.
//!
//! Two structurally equal types are the same [`TypeId`]: constructors
//! intern into fixed power-of-two bucket tables (linear search within a
//! bucket, no resizing). The base types are created once and addressed by
//! constants; array/tuple/pointer/record types are interned on demand.
//!
//! Record types carry their value parameters as cloned owned values and
//! compare them with structural equality, which may dispatch to user
//! `equals?` overloads. Record field types are computed lazily the first
//! time they are asked for, under a one-shot guard, by evaluating the
//! field type expressions with the pattern variables bound to the type's
//! parameters.

use std::{
    cell::{Cell, OnceCell},
    rc::Rc,
};

use indexmap::IndexMap;

use crate::{
    ast::{FormalArg, Record},
    backend::{Backend, StructLayout},
    cobject::{CObject, CoIndex},
    context::Context,
    env::Object,
    error::CompileResult,
    evaluator,
    intern::NameId,
    value::{self, Value},
};

/// Identity handle of an interned type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(u32);

impl TypeId {
    pub const BOOL: Self = Self(0);
    pub const INT8: Self = Self(1);
    pub const INT16: Self = Self(2);
    pub const INT32: Self = Self(3);
    pub const INT64: Self = Self(4);
    pub const UINT8: Self = Self(5);
    pub const UINT16: Self = Self(6);
    pub const UINT32: Self = Self(7);
    pub const UINT64: Self = Self(8);
    pub const FLOAT32: Self = Self(9);
    pub const FLOAT64: Self = Self(10);
    pub const COMPILER_OBJECT: Self = Self(11);
    pub const VOID: Self = Self(12);

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone)]
pub enum TypeKind {
    Bool,
    Integer { bits: u8, signed: bool },
    Float { bits: u8 },
    Array { element: TypeId, size: usize },
    Tuple { elements: Vec<TypeId> },
    Pointer { pointee: TypeId },
    Record { record: Rc<Record>, params: Vec<Rc<Value>> },
    CompilerObject,
    Void,
}

/// Field types of a record type, in declaration order, plus the
/// name-to-index map.
pub struct RecordFields {
    pub types: Vec<TypeId>,
    pub index_map: IndexMap<NameId, usize>,
}

pub struct TypeData {
    pub kind: TypeKind,
    size: Cell<Option<usize>>,
    layout: OnceCell<Rc<StructLayout>>,
    fields: OnceCell<Rc<RecordFields>>,
    pub co_index: Cell<Option<CoIndex>>,
}

impl TypeData {
    fn new(kind: TypeKind) -> Rc<Self> {
        Rc::new(Self {
            kind,
            size: Cell::new(None),
            layout: OnceCell::new(),
            fields: OnceCell::new(),
            co_index: Cell::new(None),
        })
    }
}

const TYPE_BUCKETS: usize = 1024;

pub struct TypeStore {
    types: Vec<Rc<TypeData>>,
    array_buckets: Vec<Vec<TypeId>>,
    tuple_buckets: Vec<Vec<TypeId>>,
    pointer_buckets: Vec<Vec<TypeId>>,
    record_buckets: Vec<Vec<TypeId>>,
}

impl TypeStore {
    pub fn new() -> Self {
        let mut store = Self {
            types: Vec::new(),
            array_buckets: vec![Vec::new(); TYPE_BUCKETS],
            tuple_buckets: vec![Vec::new(); TYPE_BUCKETS],
            pointer_buckets: vec![Vec::new(); TYPE_BUCKETS],
            record_buckets: vec![Vec::new(); TYPE_BUCKETS],
        };
        // creation order must match the TypeId constants
        store.push(TypeKind::Bool);
        for bits in [8u8, 16, 32, 64] {
            store.push(TypeKind::Integer { bits, signed: true });
        }
        for bits in [8u8, 16, 32, 64] {
            store.push(TypeKind::Integer { bits, signed: false });
        }
        store.push(TypeKind::Float { bits: 32 });
        store.push(TypeKind::Float { bits: 64 });
        store.push(TypeKind::CompilerObject);
        store.push(TypeKind::Void);
        store
    }

    fn push(&mut self, kind: TypeKind) -> TypeId {
        let id = TypeId(u32::try_from(self.types.len()).expect("type table overflow"));
        self.types.push(TypeData::new(kind));
        id
    }

    pub fn get(&self, id: TypeId) -> Rc<TypeData> {
        Rc::clone(&self.types[id.index()])
    }
}

impl Default for TypeStore {
    fn default() -> Self {
        Self::new()
    }
}

pub fn int_type(bits: u8, signed: bool) -> TypeId {
    match (bits, signed) {
        (8, true) => TypeId::INT8,
        (16, true) => TypeId::INT16,
        (32, true) => TypeId::INT32,
        (64, true) => TypeId::INT64,
        (8, false) => TypeId::UINT8,
        (16, false) => TypeId::UINT16,
        (32, false) => TypeId::UINT32,
        (64, false) => TypeId::UINT64,
        _ => panic!("invalid integer width: {bits}"),
    }
}

pub fn float_type(bits: u8) -> TypeId {
    match bits {
        32 => TypeId::FLOAT32,
        64 => TypeId::FLOAT64,
        _ => panic!("invalid float width: {bits}"),
    }
}

pub fn array_type(ctx: &Context, element: TypeId, size: usize) -> TypeId {
    let bucket = (element.index() + size) & (TYPE_BUCKETS - 1);
    let mut store = ctx.types.borrow_mut();
    for &id in &store.array_buckets[bucket] {
        let data = store.get(id);
        if let TypeKind::Array { element: e, size: n } = &data.kind {
            if *e == element && *n == size {
                return id;
            }
        }
    }
    let id = store.push(TypeKind::Array { element, size });
    store.array_buckets[bucket].push(id);
    id
}

pub fn tuple_type(ctx: &Context, elements: Vec<TypeId>) -> TypeId {
    let bucket = elements.iter().map(|t| t.index()).sum::<usize>() & (TYPE_BUCKETS - 1);
    let mut store = ctx.types.borrow_mut();
    for &id in &store.tuple_buckets[bucket] {
        let data = store.get(id);
        if let TypeKind::Tuple { elements: e } = &data.kind {
            if *e == elements {
                return id;
            }
        }
    }
    let id = store.push(TypeKind::Tuple { elements });
    store.tuple_buckets[bucket].push(id);
    id
}

pub fn pointer_type(ctx: &Context, pointee: TypeId) -> TypeId {
    let bucket = pointee.index() & (TYPE_BUCKETS - 1);
    let mut store = ctx.types.borrow_mut();
    for &id in &store.pointer_buckets[bucket] {
        let data = store.get(id);
        if let TypeKind::Pointer { pointee: p } = &data.kind {
            if *p == pointee {
                return id;
            }
        }
    }
    let id = store.push(TypeKind::Pointer { pointee });
    store.pointer_buckets[bucket].push(id);
    id
}

/// Interns a record type. Parameter comparison uses structural value
/// equality, which may run user code, so the bucket is rescanned for
/// entries that appeared while comparing.
pub fn record_type(ctx: &Context, record: &Rc<Record>, params: &[Rc<Value>]) -> CompileResult<TypeId> {
    let mut hash = u64::from(ctx.co_index(&CObject::Record(Rc::clone(record))).0);
    for param in params {
        hash = hash.wrapping_add(value::value_hash(ctx, param)?);
    }
    let bucket = (hash as usize) & (TYPE_BUCKETS - 1);

    let mut checked = 0;
    loop {
        let candidates: Vec<TypeId> = ctx.types.borrow().record_buckets[bucket][checked..].to_vec();
        if candidates.is_empty() {
            break;
        }
        for id in candidates {
            checked += 1;
            let data = ctx.type_data(id);
            let (r, p) = match &data.kind {
                TypeKind::Record { record: r, params: p } => (r, p),
                _ => continue,
            };
            if !Rc::ptr_eq(r, record) || p.len() != params.len() {
                continue;
            }
            let mut matches = true;
            for (a, b) in p.iter().zip(params) {
                if !value::value_equals(ctx, a, b)? {
                    matches = false;
                    break;
                }
            }
            if matches {
                return Ok(id);
            }
        }
    }

    let mut cloned = Vec::with_capacity(params.len());
    for param in params {
        cloned.push(value::clone_value(ctx, param)?);
    }
    let mut store = ctx.types.borrow_mut();
    let id = store.push(TypeKind::Record {
        record: Rc::clone(record),
        params: cloned,
    });
    store.record_buckets[bucket].push(id);
    Ok(id)
}

/// Initializes (once) and returns a record type's fields.
pub fn record_fields(ctx: &Context, id: TypeId) -> CompileResult<Rc<RecordFields>> {
    let data = ctx.type_data(id);
    if let Some(fields) = data.fields.get() {
        return Ok(Rc::clone(fields));
    }
    let (record, params) = match &data.kind {
        TypeKind::Record { record, params } => (record, params),
        _ => return Err(ctx.error("record type expected")),
    };
    debug_assert_eq!(record.pattern_vars.len(), params.len());
    let module = ctx.module(record.module.get().expect("record installed in a module"));
    let env = module.env().child();
    for (var, param) in record.pattern_vars.iter().zip(params) {
        env.add_local(ctx, *var, Object::Value(Rc::clone(param)))?;
    }
    let mut types = Vec::new();
    let mut index_map = IndexMap::new();
    for arg in &record.formal_args {
        match arg {
            FormalArg::Value { name, ty, .. } => {
                let Some(ty) = ty else {
                    return Err(ctx.error("record field requires a type"));
                };
                index_map.insert(*name, types.len());
                types.push(evaluator::evaluate_non_void_type(ctx, ty, &env)?);
            }
            FormalArg::Static { .. } => {}
        }
    }
    let fields = Rc::new(RecordFields { types, index_map });
    // a reentrant initialization wins the race; keep whichever landed
    let _ = data.fields.set(fields);
    Ok(Rc::clone(data.fields.get().expect("record fields just initialized")))
}

pub fn type_size(ctx: &Context, id: TypeId) -> CompileResult<usize> {
    let data = ctx.type_data(id);
    if let Some(size) = data.size.get() {
        return Ok(size);
    }
    let size = match data.kind {
        TypeKind::Bool => 1,
        TypeKind::Integer { bits, .. } | TypeKind::Float { bits } => usize::from(bits) / 8,
        TypeKind::Pointer { .. } => 8,
        TypeKind::CompilerObject => 4,
        TypeKind::Void => 0,
        TypeKind::Array { element, size } => type_size(ctx, element)? * size,
        TypeKind::Tuple { .. } | TypeKind::Record { .. } => struct_layout(ctx, id)?.size,
    };
    data.size.set(Some(size));
    Ok(size)
}

pub fn type_align(ctx: &Context, id: TypeId) -> CompileResult<usize> {
    let data = ctx.type_data(id);
    Ok(match data.kind {
        TypeKind::Bool => 1,
        TypeKind::Integer { bits, .. } | TypeKind::Float { bits } => usize::from(bits) / 8,
        TypeKind::Pointer { .. } => 8,
        TypeKind::CompilerObject => 4,
        TypeKind::Void => 1,
        TypeKind::Array { element, .. } => type_align(ctx, element)?,
        TypeKind::Tuple { .. } | TypeKind::Record { .. } => struct_layout(ctx, id)?.align,
    })
}

/// Byte offsets of a tuple's or record's elements, cached on the type.
pub fn struct_layout(ctx: &Context, id: TypeId) -> CompileResult<Rc<StructLayout>> {
    let data = ctx.type_data(id);
    if let Some(layout) = data.layout.get() {
        return Ok(Rc::clone(layout));
    }
    let element_types: Vec<TypeId> = match data.kind {
        TypeKind::Tuple { ref elements } => elements.clone(),
        TypeKind::Record { .. } => record_fields(ctx, id)?.types.clone(),
        _ => return Err(ctx.error("tuple or record type expected")),
    };
    let mut fields = Vec::with_capacity(element_types.len());
    for element in element_types {
        fields.push((type_size(ctx, element)?, type_align(ctx, element)?));
    }
    let layout = Rc::new(Backend::struct_layout(&fields));
    let _ = data.layout.set(layout);
    Ok(Rc::clone(data.layout.get().expect("layout just initialized")))
}

pub fn type_print(ctx: &Context, id: TypeId) -> CompileResult<String> {
    let data = ctx.type_data(id);
    Ok(match data.kind {
        TypeKind::Bool => "Bool".to_owned(),
        TypeKind::Integer { bits, signed } => {
            if signed {
                format!("Int{bits}")
            } else {
                format!("UInt{bits}")
            }
        }
        TypeKind::Float { bits } => format!("Float{bits}"),
        TypeKind::Array { element, size } => {
            format!("Array[{}, {}]", type_print(ctx, element)?, size)
        }
        TypeKind::Tuple { ref elements } => {
            let mut out = String::from("Tuple[");
            for (i, element) in elements.iter().enumerate() {
                if i != 0 {
                    out.push_str(", ");
                }
                out.push_str(&type_print(ctx, *element)?);
            }
            out.push(']');
            out
        }
        TypeKind::Pointer { pointee } => format!("Pointer[{}]", type_print(ctx, pointee)?),
        TypeKind::Record {
            ref record,
            ref params,
        } => {
            let mut out = ctx.name_text(record.name);
            if !params.is_empty() {
                out.push('[');
                for (i, param) in params.iter().enumerate() {
                    if i != 0 {
                        out.push_str(", ");
                    }
                    out.push_str(&value::value_print(ctx, param)?);
                }
                out.push(']');
            }
            out
        }
        TypeKind::CompilerObject => "CompilerObject".to_owned(),
        TypeKind::Void => "Void".to_owned(),
    })
}

//
// type expectation helpers
//

pub fn ensure_arity(ctx: &Context, actual: usize, expected: usize) -> CompileResult<()> {
    if actual != expected {
        return Err(ctx.error("incorrect no. of arguments"));
    }
    Ok(())
}

pub fn ensure_primitive_type(ctx: &Context, id: TypeId) -> CompileResult<()> {
    if matches!(ctx.type_data(id).kind, TypeKind::Record { .. }) {
        return Err(ctx.error("primitive type expected"));
    }
    Ok(())
}

pub fn ensure_same_type(ctx: &Context, a: TypeId, b: TypeId) -> CompileResult<()> {
    if a != b {
        return Err(ctx.error("type mismatch"));
    }
    Ok(())
}

pub fn ensure_numeric_type(ctx: &Context, id: TypeId) -> CompileResult<()> {
    match ctx.type_data(id).kind {
        TypeKind::Integer { .. } | TypeKind::Float { .. } => Ok(()),
        _ => Err(ctx.error("numeric type expected")),
    }
}

pub fn ensure_integer_type(ctx: &Context, id: TypeId) -> CompileResult<()> {
    match ctx.type_data(id).kind {
        TypeKind::Integer { .. } => Ok(()),
        _ => Err(ctx.error("integer type expected")),
    }
}

pub fn ensure_pointer_type(ctx: &Context, id: TypeId) -> CompileResult<()> {
    match ctx.type_data(id).kind {
        TypeKind::Pointer { .. } => Ok(()),
        _ => Err(ctx.error("pointer type expected")),
    }
}

pub fn ensure_array_type(ctx: &Context, id: TypeId) -> CompileResult<()> {
    match ctx.type_data(id).kind {
        TypeKind::Array { .. } => Ok(()),
        _ => Err(ctx.error("array type expected")),
    }
}

pub fn ensure_tuple_type(ctx: &Context, id: TypeId) -> CompileResult<()> {
    match ctx.type_data(id).kind {
        TypeKind::Tuple { .. } => Ok(()),
        _ => Err(ctx.error("tuple type expected")),
    }
}

pub fn ensure_record_type(ctx: &Context, id: TypeId) -> CompileResult<()> {
    match ctx.type_data(id).kind {
        TypeKind::Record { .. } => Ok(()),
        _ => Err(ctx.error("record type expected")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;

    #[test]
    fn constructed_types_are_identical() {
        let ctx = Context::new();
        let a = array_type(&ctx, TypeId::INT32, 4);
        let b = array_type(&ctx, TypeId::INT32, 4);
        let c = array_type(&ctx, TypeId::INT32, 5);
        assert_eq!(a, b);
        assert_ne!(a, c);

        let t1 = tuple_type(&ctx, vec![TypeId::INT32, TypeId::BOOL]);
        let t2 = tuple_type(&ctx, vec![TypeId::INT32, TypeId::BOOL]);
        let t3 = tuple_type(&ctx, vec![TypeId::BOOL, TypeId::INT32]);
        assert_eq!(t1, t2);
        assert_ne!(t1, t3);

        let p1 = pointer_type(&ctx, a);
        let p2 = pointer_type(&ctx, b);
        assert_eq!(p1, p2);
    }

    #[test]
    fn sizes_follow_c_layout_rules() {
        let ctx = Context::new();
        assert_eq!(type_size(&ctx, TypeId::BOOL).unwrap(), 1);
        assert_eq!(type_size(&ctx, TypeId::INT64).unwrap(), 8);
        assert_eq!(type_size(&ctx, TypeId::COMPILER_OBJECT).unwrap(), 4);
        assert_eq!(type_size(&ctx, TypeId::VOID).unwrap(), 0);

        let arr = array_type(&ctx, TypeId::INT16, 3);
        assert_eq!(type_size(&ctx, arr).unwrap(), 6);

        // (Int8, Int64) pads to 16 bytes with the second element at 8
        let tup = tuple_type(&ctx, vec![TypeId::INT8, TypeId::INT64]);
        assert_eq!(type_size(&ctx, tup).unwrap(), 16);
        let layout = struct_layout(&ctx, tup).unwrap();
        assert_eq!(layout.offsets, vec![0, 8]);
    }

    #[test]
    fn type_printing() {
        let ctx = Context::new();
        let arr = array_type(&ctx, TypeId::INT32, 2);
        let ptr = pointer_type(&ctx, arr);
        assert_eq!(type_print(&ctx, ptr).unwrap(), "Pointer[Array[Int32, 2]]");
        let tup = tuple_type(&ctx, vec![TypeId::BOOL, TypeId::FLOAT64]);
        assert_eq!(type_print(&ctx, tup).unwrap(), "Tuple[Bool, Float64]");
    }
}
