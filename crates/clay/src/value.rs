//! Values: a type plus a raw byte buffer, with explicit ownership.
//!
//! An owning value holds the allocation for its bytes; a non-owning value
//! is a view into another value's buffer (a `ref` binding, a field
//! reference, a dereferenced pointer). Construction, destruction, copy,
//! assignment, equality, and hashing are all type-directed: scalars are
//! byte operations, arrays and tuples recurse structurally through the
//! layout, and records dispatch to the `init`/`destroy`/`copy`/`assign`/
//! `equals?`/`hash` overloadables in the core module.
//!
//! NOTE: `Clone` is intentionally not implemented. Duplicating a value
//! requires the engine context (record fields may carry user-defined copy
//! semantics), so all duplication goes through [`clone_value`]. Dropping a
//! `Value` releases only its buffer; the type-directed destructor runs
//! exactly once, at temp-block pop or binding teardown, via
//! [`value_destroy`].

use std::{alloc::Layout, rc::Rc};

use crate::{
    cobject::CObject,
    context::Context,
    error::CompileResult,
    evaluator,
    loader,
    types::{self, TypeId, TypeKind},
};

const VALUE_ALIGN: usize = 16;

#[derive(Debug)]
pub struct Value {
    pub ty: TypeId,
    ptr: *mut u8,
    len: usize,
    pub owned: bool,
}

impl Value {
    /// Allocates an owning, zero-filled value of `ty`.
    pub fn alloc(ctx: &Context, ty: TypeId) -> CompileResult<Rc<Self>> {
        let len = types::type_size(ctx, ty)?;
        let ptr = if len == 0 {
            std::ptr::null_mut()
        } else {
            let layout = Layout::from_size_align(len, VALUE_ALIGN).expect("value layout");
            // SAFETY: layout has non-zero size.
            let ptr = unsafe { std::alloc::alloc_zeroed(layout) };
            if ptr.is_null() {
                std::alloc::handle_alloc_error(layout);
            }
            ptr
        };
        Ok(Rc::new(Self {
            ty,
            ptr,
            len,
            owned: true,
        }))
    }

    /// A non-owning view of `len` bytes at `ptr`.
    pub fn view(ty: TypeId, ptr: *mut u8, len: usize) -> Self {
        Self {
            ty,
            ptr,
            len,
            owned: false,
        }
    }

    /// A non-owning alias of this value's buffer.
    pub fn alias(&self) -> Self {
        Self::view(self.ty, self.ptr, self.len)
    }

    pub fn data_ptr(&self) -> *mut u8 {
        self.ptr
    }

    pub fn read_scalar<T: Copy>(&self) -> T {
        debug_assert!(self.len >= size_of::<T>());
        // SAFETY: the buffer holds at least size_of::<T>() bytes; reads go
        // through read_unaligned because views may sit at field offsets.
        unsafe { self.ptr.cast::<T>().read_unaligned() }
    }

    pub fn write_scalar<T: Copy>(&self, value: T) {
        debug_assert!(self.len >= size_of::<T>());
        // SAFETY: as in read_scalar; single-threaded engine, no aliasing
        // writes can race.
        unsafe { self.ptr.cast::<T>().write_unaligned(value) };
    }

    /// View of the element at a byte offset within this value.
    fn element_view(&self, ty: TypeId, offset: usize, len: usize) -> Self {
        debug_assert!(offset + len <= self.len);
        // SAFETY: offset stays within this value's buffer.
        let ptr = unsafe { self.ptr.add(offset) };
        Self::view(ty, ptr, len)
    }
}

impl Drop for Value {
    fn drop(&mut self) {
        if self.owned && self.len > 0 {
            let layout = Layout::from_size_align(self.len, VALUE_ALIGN).expect("value layout");
            // SAFETY: owned buffers were allocated in Value::alloc with
            // exactly this layout.
            unsafe { std::alloc::dealloc(self.ptr, layout) };
        }
    }
}

/// Walks the elements of an array value.
pub(crate) fn array_elements(ctx: &Context, v: &Value) -> CompileResult<Vec<Value>> {
    let data = ctx.type_data(v.ty);
    let TypeKind::Array { element, size } = data.kind else {
        return Err(ctx.error("array type expected"));
    };
    let elem_size = types::type_size(ctx, element)?;
    Ok((0..size)
        .map(|i| v.element_view(element, i * elem_size, elem_size))
        .collect())
}

/// Walks the elements of a tuple or record value through its layout.
pub(crate) fn struct_elements(ctx: &Context, v: &Value) -> CompileResult<Vec<Value>> {
    let element_types: Vec<TypeId> = match ctx.type_data(v.ty).kind {
        TypeKind::Tuple { ref elements } => elements.clone(),
        TypeKind::Record { .. } => types::record_fields(ctx, v.ty)?.types.clone(),
        _ => return Err(ctx.error("tuple or record type expected")),
    };
    let layout = types::struct_layout(ctx, v.ty)?;
    element_types
        .iter()
        .zip(&layout.offsets)
        .map(|(&ty, &offset)| Ok(v.element_view(ty, offset, types::type_size(ctx, ty)?)))
        .collect()
}

fn invoke_core(ctx: &Context, name: &str, args: Vec<Rc<Value>>) -> CompileResult<Rc<Value>> {
    let callable = loader::core_name(ctx, name)?;
    evaluator::invoke(ctx, &callable, &args)
}

//
// init / destroy
//

pub fn value_init(ctx: &Context, dest: &Value) -> CompileResult<()> {
    match ctx.type_data(dest.ty).kind {
        TypeKind::Bool
        | TypeKind::Integer { .. }
        | TypeKind::Float { .. }
        | TypeKind::Pointer { .. }
        | TypeKind::CompilerObject
        | TypeKind::Void => Ok(()),
        TypeKind::Array { .. } => {
            for element in array_elements(ctx, dest)? {
                value_init(ctx, &element)?;
            }
            Ok(())
        }
        TypeKind::Tuple { .. } => {
            for element in struct_elements(ctx, dest)? {
                value_init(ctx, &element)?;
            }
            Ok(())
        }
        TypeKind::Record { .. } => {
            invoke_core(ctx, "init", vec![Rc::new(dest.alias())])?;
            Ok(())
        }
    }
}

pub fn value_destroy(ctx: &Context, dest: &Value) -> CompileResult<()> {
    match ctx.type_data(dest.ty).kind {
        TypeKind::Bool
        | TypeKind::Integer { .. }
        | TypeKind::Float { .. }
        | TypeKind::Pointer { .. }
        | TypeKind::CompilerObject
        | TypeKind::Void => Ok(()),
        TypeKind::Array { .. } => {
            for element in array_elements(ctx, dest)? {
                value_destroy(ctx, &element)?;
            }
            Ok(())
        }
        TypeKind::Tuple { .. } => {
            for element in struct_elements(ctx, dest)? {
                value_destroy(ctx, &element)?;
            }
            Ok(())
        }
        TypeKind::Record { .. } => {
            invoke_core(ctx, "destroy", vec![Rc::new(dest.alias())])?;
            Ok(())
        }
    }
}

//
// copy / assign
//

fn memcpy_value(ctx: &Context, dest: &Value, src: &Value) -> CompileResult<()> {
    let size = types::type_size(ctx, dest.ty)?;
    if size > 0 {
        // SAFETY: both buffers hold `size` bytes; regions may not overlap
        // because owned buffers are distinct allocations and views of the
        // same buffer are only memcpy'd with identical offsets, where the
        // copy is a no-op byte-wise.
        unsafe { std::ptr::copy(src.data_ptr(), dest.data_ptr(), size) };
    }
    Ok(())
}

pub fn value_copy(ctx: &Context, dest: &Value, src: &Value) -> CompileResult<()> {
    if dest.ty != src.ty {
        invoke_core(ctx, "copy", vec![Rc::new(dest.alias()), Rc::new(src.alias())])?;
        return Ok(());
    }
    match ctx.type_data(dest.ty).kind {
        TypeKind::Bool
        | TypeKind::Integer { .. }
        | TypeKind::Float { .. }
        | TypeKind::Pointer { .. }
        | TypeKind::CompilerObject
        | TypeKind::Void => memcpy_value(ctx, dest, src),
        TypeKind::Array { .. } => {
            for (d, s) in array_elements(ctx, dest)?.iter().zip(&array_elements(ctx, src)?) {
                value_copy(ctx, d, s)?;
            }
            Ok(())
        }
        TypeKind::Tuple { .. } => {
            for (d, s) in struct_elements(ctx, dest)?.iter().zip(&struct_elements(ctx, src)?) {
                value_copy(ctx, d, s)?;
            }
            Ok(())
        }
        TypeKind::Record { .. } => {
            invoke_core(ctx, "copy", vec![Rc::new(dest.alias()), Rc::new(src.alias())])?;
            Ok(())
        }
    }
}

pub fn value_assign(ctx: &Context, dest: &Value, src: &Value) -> CompileResult<()> {
    if dest.ty != src.ty {
        invoke_core(ctx, "assign", vec![Rc::new(dest.alias()), Rc::new(src.alias())])?;
        return Ok(());
    }
    match ctx.type_data(dest.ty).kind {
        TypeKind::Bool
        | TypeKind::Integer { .. }
        | TypeKind::Float { .. }
        | TypeKind::Pointer { .. }
        | TypeKind::CompilerObject
        | TypeKind::Void => memcpy_value(ctx, dest, src),
        TypeKind::Array { .. } => {
            for (d, s) in array_elements(ctx, dest)?.iter().zip(&array_elements(ctx, src)?) {
                value_assign(ctx, d, s)?;
            }
            Ok(())
        }
        TypeKind::Tuple { .. } => {
            for (d, s) in struct_elements(ctx, dest)?.iter().zip(&struct_elements(ctx, src)?) {
                value_assign(ctx, d, s)?;
            }
            Ok(())
        }
        TypeKind::Record { .. } => {
            invoke_core(ctx, "assign", vec![Rc::new(dest.alias()), Rc::new(src.alias())])?;
            Ok(())
        }
    }
}

/// Duplicates `src` into a fresh owning value.
pub fn clone_value(ctx: &Context, src: &Value) -> CompileResult<Rc<Value>> {
    let dest = Value::alloc(ctx, src.ty)?;
    value_copy(ctx, &dest, src)?;
    Ok(dest)
}

//
// equality / hashing
//

pub fn value_equals(ctx: &Context, a: &Value, b: &Value) -> CompileResult<bool> {
    if a.ty != b.ty {
        let result = invoke_core(ctx, "equals?", vec![Rc::new(a.alias()), Rc::new(b.alias())])?;
        return value_to_bool(ctx, &result);
    }
    match ctx.type_data(a.ty).kind {
        TypeKind::Bool
        | TypeKind::Integer { .. }
        | TypeKind::Float { .. }
        | TypeKind::Pointer { .. }
        | TypeKind::CompilerObject
        | TypeKind::Void => {
            let size = types::type_size(ctx, a.ty)?;
            // SAFETY: both buffers hold `size` bytes.
            let equal = unsafe {
                std::slice::from_raw_parts(a.data_ptr(), size) == std::slice::from_raw_parts(b.data_ptr(), size)
            };
            Ok(equal)
        }
        TypeKind::Array { .. } => {
            for (x, y) in array_elements(ctx, a)?.iter().zip(&array_elements(ctx, b)?) {
                if !value_equals(ctx, x, y)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        TypeKind::Tuple { .. } => {
            for (x, y) in struct_elements(ctx, a)?.iter().zip(&struct_elements(ctx, b)?) {
                if !value_equals(ctx, x, y)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        TypeKind::Record { .. } => {
            let result = invoke_core(ctx, "equals?", vec![Rc::new(a.alias()), Rc::new(b.alias())])?;
            value_to_bool(ctx, &result)
        }
    }
}

pub fn value_hash(ctx: &Context, a: &Value) -> CompileResult<u64> {
    match ctx.type_data(a.ty).kind {
        TypeKind::Bool => Ok(u64::from(a.read_scalar::<u8>())),
        TypeKind::Integer { bits, .. } => Ok(match bits {
            8 => u64::from(a.read_scalar::<u8>()),
            16 => u64::from(a.read_scalar::<u16>()),
            32 => u64::from(a.read_scalar::<u32>()),
            64 => a.read_scalar::<u64>(),
            _ => unreachable!("invalid integer width"),
        }),
        TypeKind::Float { bits } => Ok(match bits {
            32 => a.read_scalar::<f32>() as i64 as u64,
            64 => a.read_scalar::<f64>() as i64 as u64,
            _ => unreachable!("invalid float width"),
        }),
        TypeKind::Pointer { .. } => Ok(a.read_scalar::<usize>() as u64),
        TypeKind::CompilerObject => Ok(u64::from(a.read_scalar::<u32>())),
        TypeKind::Void => Ok(0),
        TypeKind::Array { .. } => {
            let mut hash = 0u64;
            for element in array_elements(ctx, a)? {
                hash = hash.wrapping_add(value_hash(ctx, &element)?);
            }
            Ok(hash)
        }
        TypeKind::Tuple { .. } => {
            let mut hash = 0u64;
            for element in struct_elements(ctx, a)? {
                hash = hash.wrapping_add(value_hash(ctx, &element)?);
            }
            Ok(hash)
        }
        TypeKind::Record { .. } => {
            let result = invoke_core(ctx, "hash", vec![Rc::new(a.alias())])?;
            Ok(value_to_int(ctx, &result)? as u64)
        }
    }
}

//
// conversions
//

pub fn bool_to_value(ctx: &Context, x: bool) -> CompileResult<Rc<Value>> {
    let v = Value::alloc(ctx, TypeId::BOOL)?;
    v.write_scalar::<u8>(u8::from(x));
    Ok(v)
}

pub fn int_to_value(ctx: &Context, x: i32) -> CompileResult<Rc<Value>> {
    let v = Value::alloc(ctx, TypeId::INT32)?;
    v.write_scalar::<i32>(x);
    Ok(v)
}

pub fn value_to_int(ctx: &Context, v: &Value) -> CompileResult<i32> {
    if v.ty != TypeId::INT32 {
        return Err(ctx.error("expecting value of int32 type"));
    }
    Ok(v.read_scalar::<i32>())
}

pub fn value_to_bool(ctx: &Context, v: &Value) -> CompileResult<bool> {
    if v.ty != TypeId::BOOL {
        return Err(ctx.error("expecting value of bool type"));
    }
    Ok(v.read_scalar::<u8>() != 0)
}

pub fn co_to_value(ctx: &Context, obj: &CObject) -> CompileResult<Rc<Value>> {
    let v = Value::alloc(ctx, TypeId::COMPILER_OBJECT)?;
    v.write_scalar::<u32>(ctx.co_index(obj).0);
    Ok(v)
}

pub fn value_to_co(ctx: &Context, v: &Value) -> CompileResult<CObject> {
    if v.ty != TypeId::COMPILER_OBJECT {
        return Err(ctx.error("expecting compiler object type"));
    }
    Ok(ctx.co_object(crate::cobject::CoIndex(v.read_scalar::<u32>())))
}

pub fn value_to_type(ctx: &Context, v: &Value) -> CompileResult<TypeId> {
    match value_to_co(ctx, v) {
        Ok(CObject::Type(id)) => Ok(id),
        _ => Err(ctx.error("expecting a type")),
    }
}

/// A lowered value: a compiler-object handle raised back to its object, or
/// the value itself when it is not of compiler-object type.
pub enum Lowered {
    Object(CObject),
    Value(Rc<Value>),
}

pub fn lower(ctx: &Context, v: Rc<Value>) -> Lowered {
    if v.ty == TypeId::COMPILER_OBJECT {
        Lowered::Object(ctx.co_object(crate::cobject::CoIndex(v.read_scalar::<u32>())))
    } else {
        Lowered::Value(v)
    }
}

//
// printing
//

pub fn co_print(ctx: &Context, obj: &CObject) -> CompileResult<String> {
    Ok(match obj {
        CObject::Name(name) => ctx.name_text(*name),
        CObject::Record(x) => ctx.name_text(x.name),
        CObject::Procedure(x) => ctx.name_text(x.name),
        CObject::Overloadable(x) => ctx.name_text(x.name),
        CObject::External(x) => ctx.name_text(x.name),
        CObject::PrimOp(op) => op.surface_name().to_owned(),
        CObject::Type(id) => types::type_print(ctx, *id)?,
    })
}

fn float_text(value: f64) -> String {
    let mut buffer = ryu::Buffer::new();
    buffer.format(value).to_owned()
}

fn float32_text(value: f32) -> String {
    let mut buffer = ryu::Buffer::new();
    buffer.format(value).to_owned()
}

pub fn value_print(ctx: &Context, a: &Value) -> CompileResult<String> {
    Ok(match ctx.type_data(a.ty).kind {
        TypeKind::Bool => {
            if value_to_bool(ctx, a)? {
                "true".to_owned()
            } else {
                "false".to_owned()
            }
        }
        TypeKind::Integer { bits, signed } => {
            if signed {
                match bits {
                    8 => format!("{}#i8", a.read_scalar::<i8>()),
                    16 => format!("{}#i16", a.read_scalar::<i16>()),
                    32 => format!("{}", a.read_scalar::<i32>()),
                    64 => format!("{}#i64", a.read_scalar::<i64>()),
                    _ => unreachable!("invalid integer width"),
                }
            } else {
                match bits {
                    8 => format!("{}#u8", a.read_scalar::<u8>()),
                    16 => format!("{}#u16", a.read_scalar::<u16>()),
                    32 => format!("{}#u32", a.read_scalar::<u32>()),
                    64 => format!("{}#u64", a.read_scalar::<u64>()),
                    _ => unreachable!("invalid integer width"),
                }
            }
        }
        TypeKind::Float { bits } => match bits {
            32 => format!("{}#f32", float32_text(a.read_scalar::<f32>())),
            64 => format!("{}#f64", float_text(a.read_scalar::<f64>())),
            _ => unreachable!("invalid float width"),
        },
        TypeKind::Array { .. } => {
            let mut out = String::from("[");
            for (i, element) in array_elements(ctx, a)?.iter().enumerate() {
                if i != 0 {
                    out.push_str(", ");
                }
                out.push_str(&value_print(ctx, element)?);
            }
            out.push(']');
            out
        }
        TypeKind::Tuple { .. } => {
            let mut out = String::from("(");
            for (i, element) in struct_elements(ctx, a)?.iter().enumerate() {
                if i != 0 {
                    out.push_str(", ");
                }
                out.push_str(&value_print(ctx, element)?);
            }
            out.push(')');
            out
        }
        TypeKind::Pointer { .. } => {
            format!(
                "{}({:#x})",
                types::type_print(ctx, a.ty)?,
                a.read_scalar::<usize>()
            )
        }
        TypeKind::Record { .. } => {
            let mut out = types::type_print(ctx, a.ty)?;
            out.push('(');
            for (i, element) in struct_elements(ctx, a)?.iter().enumerate() {
                if i != 0 {
                    out.push_str(", ");
                }
                out.push_str(&value_print(ctx, element)?);
            }
            out.push(')');
            out
        }
        TypeKind::CompilerObject => co_print(ctx, &value_to_co(ctx, a)?)?,
        TypeKind::Void => "void".to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::types::{array_type, tuple_type};

    #[test]
    fn clone_produces_equal_distinct_buffer() {
        let ctx = Context::new();
        let v = int_to_value(&ctx, 42).unwrap();
        let w = clone_value(&ctx, &v).unwrap();
        assert!(value_equals(&ctx, &v, &w).unwrap());
        assert_ne!(v.data_ptr(), w.data_ptr());
        assert!(w.owned);
    }

    #[test]
    fn hash_agrees_with_equality() {
        let ctx = Context::new();
        let a = int_to_value(&ctx, 7).unwrap();
        let b = int_to_value(&ctx, 7).unwrap();
        assert!(value_equals(&ctx, &a, &b).unwrap());
        assert_eq!(value_hash(&ctx, &a).unwrap(), value_hash(&ctx, &b).unwrap());
    }

    #[test]
    fn structural_equality_over_tuples() {
        let ctx = Context::new();
        let tup = tuple_type(&ctx, vec![TypeId::INT32, TypeId::BOOL]);
        let a = Value::alloc(&ctx, tup).unwrap();
        let b = Value::alloc(&ctx, tup).unwrap();
        assert!(value_equals(&ctx, &a, &b).unwrap());
        let elements = struct_elements(&ctx, &a).unwrap();
        elements[0].write_scalar::<i32>(5);
        assert!(!value_equals(&ctx, &a, &b).unwrap());
    }

    #[test]
    fn printing_formats() {
        let ctx = Context::new();
        let v = int_to_value(&ctx, 5).unwrap();
        assert_eq!(value_print(&ctx, &v).unwrap(), "5");
        let b = bool_to_value(&ctx, true).unwrap();
        assert_eq!(value_print(&ctx, &b).unwrap(), "true");

        let arr_ty = array_type(&ctx, TypeId::INT32, 2);
        let arr = Value::alloc(&ctx, arr_ty).unwrap();
        assert_eq!(value_print(&ctx, &arr).unwrap(), "[0, 0]");
    }

    #[test]
    fn zero_sized_void_value() {
        let ctx = Context::new();
        let v = Value::alloc(&ctx, TypeId::VOID).unwrap();
        assert_eq!(value_print(&ctx, &v).unwrap(), "void");
    }
}
