//! The closed set of primitive operators.
//!
//! Each primitive has two faces kept side by side here: the analyzer's
//! type-level contract ([`analyze_prim_op`]) and the concrete evaluation
//! ([`invoke_prim_op`]). Arity and operand kinds are checked in both.
//!
//! Surface names follow the `__primitives__` convention: a trailing `P` in
//! the operator name becomes `?` (`TypeP` is bound as `Type?`).
//!
//! Numeric kernels are width-generic over the host types; integer
//! arithmetic wraps, integer division and remainder by zero are fatal
//! diagnostics, float division follows IEEE. Operand-order conventions
//! vary per primitive and are preserved as-is: `numericConvert`,
//! `pointerCast`, `intToPointer`, `allocateMemory`, and `pointerToInt` all
//! take the target/pointee type as the first argument.

use std::rc::Rc;

use num_traits::{AsPrimitive, CheckedDiv, CheckedRem, Float, PrimInt, ToPrimitive, WrappingAdd, WrappingMul,
    WrappingNeg, WrappingSub};
use strum::{EnumIter, IntoStaticStr};

use crate::{
    analyzer::{Analysis, RetInfo},
    cobject::CObject,
    context::Context,
    error::CompileResult,
    types::{self, TypeId, TypeKind},
    value::{self, Value},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, IntoStaticStr)]
pub enum PrimOp {
    #[strum(serialize = "Type?")]
    TypeP,
    #[strum(serialize = "TypeSize")]
    TypeSize,

    #[strum(serialize = "primitiveInit")]
    PrimitiveInit,
    #[strum(serialize = "primitiveDestroy")]
    PrimitiveDestroy,
    #[strum(serialize = "primitiveCopy")]
    PrimitiveCopy,
    #[strum(serialize = "primitiveAssign")]
    PrimitiveAssign,
    #[strum(serialize = "primitiveEquals?")]
    PrimitiveEqualsP,
    #[strum(serialize = "primitiveHash")]
    PrimitiveHash,

    #[strum(serialize = "BoolType?")]
    BoolTypeP,
    #[strum(serialize = "boolNot")]
    BoolNot,
    #[strum(serialize = "boolTruth")]
    BoolTruth,

    #[strum(serialize = "IntegerType?")]
    IntegerTypeP,
    #[strum(serialize = "SignedIntegerType?")]
    SignedIntegerTypeP,
    #[strum(serialize = "FloatType?")]
    FloatTypeP,
    #[strum(serialize = "numericEquals?")]
    NumericEqualsP,
    #[strum(serialize = "numericLesser?")]
    NumericLesserP,
    #[strum(serialize = "numericAdd")]
    NumericAdd,
    #[strum(serialize = "numericSubtract")]
    NumericSubtract,
    #[strum(serialize = "numericMultiply")]
    NumericMultiply,
    #[strum(serialize = "numericDivide")]
    NumericDivide,
    #[strum(serialize = "numericNegate")]
    NumericNegate,

    #[strum(serialize = "integerRemainder")]
    IntegerRemainder,
    #[strum(serialize = "integerShiftLeft")]
    IntegerShiftLeft,
    #[strum(serialize = "integerShiftRight")]
    IntegerShiftRight,
    #[strum(serialize = "integerBitwiseAnd")]
    IntegerBitwiseAnd,
    #[strum(serialize = "integerBitwiseOr")]
    IntegerBitwiseOr,
    #[strum(serialize = "integerBitwiseXor")]
    IntegerBitwiseXor,

    #[strum(serialize = "numericConvert")]
    NumericConvert,

    #[strum(serialize = "VoidType?")]
    VoidTypeP,

    #[strum(serialize = "CompilerObjectType?")]
    CompilerObjectTypeP,

    #[strum(serialize = "PointerType?")]
    PointerTypeP,
    #[strum(serialize = "PointerType")]
    PointerType,
    #[strum(serialize = "Pointer")]
    Pointer,
    #[strum(serialize = "PointeeType")]
    PointeeType,

    #[strum(serialize = "addressOf")]
    AddressOf,
    #[strum(serialize = "pointerDereference")]
    PointerDereference,
    #[strum(serialize = "pointerToInt")]
    PointerToInt,
    #[strum(serialize = "intToPointer")]
    IntToPointer,
    #[strum(serialize = "pointerCast")]
    PointerCast,
    #[strum(serialize = "allocateMemory")]
    AllocateMemory,
    #[strum(serialize = "freeMemory")]
    FreeMemory,

    #[strum(serialize = "ArrayType?")]
    ArrayTypeP,
    #[strum(serialize = "ArrayType")]
    ArrayType,
    #[strum(serialize = "Array")]
    Array,
    #[strum(serialize = "ArrayElementType")]
    ArrayElementType,
    #[strum(serialize = "ArraySize")]
    ArraySize,
    #[strum(serialize = "array")]
    MakeArray,
    #[strum(serialize = "arrayRef")]
    ArrayRef,

    #[strum(serialize = "TupleType?")]
    TupleTypeP,
    #[strum(serialize = "TupleType")]
    TupleType,
    #[strum(serialize = "Tuple")]
    Tuple,
    #[strum(serialize = "TupleSize")]
    TupleSize,
    #[strum(serialize = "TupleElementType")]
    TupleElementType,
    #[strum(serialize = "TupleElementOffset")]
    TupleElementOffset,
    #[strum(serialize = "tuple")]
    MakeTuple,
    #[strum(serialize = "tupleRef")]
    TupleRef,

    #[strum(serialize = "RecordType?")]
    RecordTypeP,
    #[strum(serialize = "RecordType")]
    RecordType,
    #[strum(serialize = "RecordFieldCount")]
    RecordFieldCount,
    #[strum(serialize = "RecordFieldType")]
    RecordFieldType,
    #[strum(serialize = "RecordFieldOffset")]
    RecordFieldOffset,
    #[strum(serialize = "RecordFieldIndex")]
    RecordFieldIndex,
    #[strum(serialize = "recordFieldRef")]
    RecordFieldRef,
    #[strum(serialize = "recordFieldRefByName")]
    RecordFieldRefByName,
    #[strum(serialize = "recordInit")]
    RecordInit,
    #[strum(serialize = "recordDestroy")]
    RecordDestroy,
    #[strum(serialize = "recordCopy")]
    RecordCopy,
    #[strum(serialize = "recordAssign")]
    RecordAssign,
    #[strum(serialize = "recordEquals?")]
    RecordEqualsP,
    #[strum(serialize = "recordHash")]
    RecordHash,
}

impl PrimOp {
    /// The name this primitive is bound under in `__primitives__`.
    pub fn surface_name(self) -> &'static str {
        self.into()
    }
}

//
// type-level contracts
//

fn ret(ty: TypeId) -> RetInfo {
    RetInfo { ty, by_ref: false }
}

fn ret_ref(ty: TypeId) -> RetInfo {
    RetInfo { ty, by_ref: true }
}

pub fn analyze_prim_op(ctx: &Context, op: PrimOp, args: &[Rc<Analysis>]) -> CompileResult<RetInfo> {
    match op {
        PrimOp::TypeP
        | PrimOp::BoolTypeP
        | PrimOp::IntegerTypeP
        | PrimOp::SignedIntegerTypeP
        | PrimOp::FloatTypeP
        | PrimOp::VoidTypeP
        | PrimOp::CompilerObjectTypeP
        | PrimOp::PointerTypeP
        | PrimOp::ArrayTypeP
        | PrimOp::TupleTypeP
        | PrimOp::RecordTypeP
        | PrimOp::BoolNot
        | PrimOp::BoolTruth
        | PrimOp::NumericEqualsP
        | PrimOp::NumericLesserP
        | PrimOp::PrimitiveEqualsP
        | PrimOp::RecordEqualsP => Ok(ret(TypeId::BOOL)),

        PrimOp::TypeSize
        | PrimOp::ArraySize
        | PrimOp::TupleSize
        | PrimOp::TupleElementOffset
        | PrimOp::RecordFieldCount
        | PrimOp::RecordFieldOffset
        | PrimOp::RecordFieldIndex
        | PrimOp::PrimitiveHash
        | PrimOp::RecordHash => Ok(ret(TypeId::INT32)),

        PrimOp::PrimitiveInit
        | PrimOp::PrimitiveDestroy
        | PrimOp::PrimitiveCopy
        | PrimOp::PrimitiveAssign
        | PrimOp::FreeMemory
        | PrimOp::RecordInit
        | PrimOp::RecordDestroy
        | PrimOp::RecordCopy
        | PrimOp::RecordAssign => Ok(ret(TypeId::VOID)),

        PrimOp::NumericAdd
        | PrimOp::NumericSubtract
        | PrimOp::NumericMultiply
        | PrimOp::NumericDivide
        | PrimOp::IntegerRemainder
        | PrimOp::IntegerShiftLeft
        | PrimOp::IntegerShiftRight
        | PrimOp::IntegerBitwiseAnd
        | PrimOp::IntegerBitwiseOr
        | PrimOp::IntegerBitwiseXor => {
            types::ensure_arity(ctx, args.len(), 2)?;
            Ok(ret(args[0].ty))
        }
        PrimOp::NumericNegate => {
            types::ensure_arity(ctx, args.len(), 1)?;
            Ok(ret(args[0].ty))
        }

        PrimOp::NumericConvert => {
            types::ensure_arity(ctx, args.len(), 2)?;
            Ok(ret(args[0].evaluate_type(ctx)?))
        }

        PrimOp::PointerType
        | PrimOp::PointeeType
        | PrimOp::ArrayType
        | PrimOp::ArrayElementType
        | PrimOp::TupleType
        | PrimOp::TupleElementType
        | PrimOp::RecordType
        | PrimOp::RecordFieldType => Ok(ret(TypeId::COMPILER_OBJECT)),

        PrimOp::Pointer => Err(ctx.error("Pointer type constructor cannot be invoked")),
        PrimOp::Array => Err(ctx.error("Array type constructor cannot be invoked")),
        PrimOp::Tuple => Err(ctx.error("Tuple type constructor cannot be invoked")),

        PrimOp::AddressOf => {
            types::ensure_arity(ctx, args.len(), 1)?;
            Ok(ret(types::pointer_type(ctx, args[0].ty)))
        }
        PrimOp::PointerDereference => {
            types::ensure_arity(ctx, args.len(), 1)?;
            types::ensure_pointer_type(ctx, args[0].ty)?;
            let TypeKind::Pointer { pointee } = ctx.type_data(args[0].ty).kind else {
                unreachable!("pointer type checked above");
            };
            Ok(ret_ref(pointee))
        }
        PrimOp::PointerToInt => {
            types::ensure_arity(ctx, args.len(), 2)?;
            Ok(ret(args[0].evaluate_type(ctx)?))
        }
        PrimOp::IntToPointer | PrimOp::PointerCast | PrimOp::AllocateMemory => {
            types::ensure_arity(ctx, args.len(), 2)?;
            let pointee = args[0].evaluate_type(ctx)?;
            Ok(ret(types::pointer_type(ctx, pointee)))
        }

        PrimOp::MakeArray => {
            if args.is_empty() {
                return Err(ctx.error("at least one argument required for creating an array"));
            }
            Ok(ret(types::array_type(ctx, args[0].ty, args.len())))
        }
        PrimOp::ArrayRef => {
            types::ensure_arity(ctx, args.len(), 2)?;
            types::ensure_array_type(ctx, args[0].ty)?;
            let TypeKind::Array { element, .. } = ctx.type_data(args[0].ty).kind else {
                unreachable!("array type checked above");
            };
            Ok(ret_ref(element))
        }

        PrimOp::MakeTuple => {
            if args.len() < 2 {
                return Err(ctx.error("tuples require at least two elements"));
            }
            let elements = args.iter().map(|a| a.ty).collect();
            Ok(ret(types::tuple_type(ctx, elements)))
        }
        PrimOp::TupleRef => {
            types::ensure_arity(ctx, args.len(), 2)?;
            types::ensure_tuple_type(ctx, args[0].ty)?;
            let index = value::value_to_int(ctx, args[1].evaluate(ctx)?.as_ref())?;
            let data = ctx.type_data(args[0].ty);
            let TypeKind::Tuple { elements } = &data.kind else {
                unreachable!("tuple type checked above");
            };
            let Ok(index) = usize::try_from(index) else {
                return Err(ctx.error("tuple type index out of range"));
            };
            match elements.get(index) {
                Some(&ty) => Ok(ret_ref(ty)),
                None => Err(ctx.error("tuple type index out of range")),
            }
        }

        PrimOp::RecordFieldRef => {
            types::ensure_arity(ctx, args.len(), 2)?;
            types::ensure_record_type(ctx, args[0].ty)?;
            let index = value::value_to_int(ctx, args[1].evaluate(ctx)?.as_ref())?;
            let fields = types::record_fields(ctx, args[0].ty)?;
            let Ok(index) = usize::try_from(index) else {
                return Err(ctx.error("field index out of range"));
            };
            match fields.types.get(index) {
                Some(&ty) => Ok(ret_ref(ty)),
                None => Err(ctx.error("field index out of range")),
            }
        }
        PrimOp::RecordFieldRefByName => {
            types::ensure_arity(ctx, args.len(), 2)?;
            types::ensure_record_type(ctx, args[0].ty)?;
            let CObject::Name(name) = value::value_to_co(ctx, args[1].evaluate(ctx)?.as_ref())? else {
                return Err(ctx.error("expecting an identifier value"));
            };
            let fields = types::record_fields(ctx, args[0].ty)?;
            match fields.index_map.get(&name) {
                Some(&index) => Ok(ret_ref(fields.types[index])),
                None => Err(ctx.error("field not in record")),
            }
        }
    }
}

//
// numeric kernels
//

#[derive(Clone, Copy)]
enum NumericBin {
    Equals,
    Lesser,
    Add,
    Subtract,
    Multiply,
    Divide,
}

#[derive(Clone, Copy)]
enum IntegerBin {
    Remainder,
    ShiftLeft,
    ShiftRight,
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,
}

macro_rules! dispatch_integer {
    ($ctx:expr, $ty:expr, $fn:ident ( $($arg:expr),* )) => {
        match $ctx.type_data($ty).kind {
            TypeKind::Integer { bits: 8, signed: true } => $fn::<i8>($($arg),*),
            TypeKind::Integer { bits: 16, signed: true } => $fn::<i16>($($arg),*),
            TypeKind::Integer { bits: 32, signed: true } => $fn::<i32>($($arg),*),
            TypeKind::Integer { bits: 64, signed: true } => $fn::<i64>($($arg),*),
            TypeKind::Integer { bits: 8, signed: false } => $fn::<u8>($($arg),*),
            TypeKind::Integer { bits: 16, signed: false } => $fn::<u16>($($arg),*),
            TypeKind::Integer { bits: 32, signed: false } => $fn::<u32>($($arg),*),
            TypeKind::Integer { bits: 64, signed: false } => $fn::<u64>($($arg),*),
            _ => Err($ctx.error("integer type expected")),
        }
    };
}

macro_rules! dispatch_float {
    ($ctx:expr, $ty:expr, $fn:ident ( $($arg:expr),* )) => {
        match $ctx.type_data($ty).kind {
            TypeKind::Float { bits: 32 } => $fn::<f32>($($arg),*),
            TypeKind::Float { bits: 64 } => $fn::<f64>($($arg),*),
            _ => Err($ctx.error("numeric type expected")),
        }
    };
}

fn int_numeric_bin<T>(ctx: &Context, op: NumericBin, a: &Value, b: &Value) -> CompileResult<Rc<Value>>
where
    T: PrimInt + WrappingAdd + WrappingSub + WrappingMul + CheckedDiv + 'static,
{
    let x = a.read_scalar::<T>();
    let y = b.read_scalar::<T>();
    let result = match op {
        NumericBin::Equals => return value::bool_to_value(ctx, x == y),
        NumericBin::Lesser => return value::bool_to_value(ctx, x < y),
        NumericBin::Add => x.wrapping_add(&y),
        NumericBin::Subtract => x.wrapping_sub(&y),
        NumericBin::Multiply => x.wrapping_mul(&y),
        NumericBin::Divide => x
            .checked_div(&y)
            .ok_or_else(|| ctx.error("integer division by zero"))?,
    };
    let out = Value::alloc(ctx, a.ty)?;
    out.write_scalar(result);
    Ok(out)
}

fn float_numeric_bin<T>(ctx: &Context, op: NumericBin, a: &Value, b: &Value) -> CompileResult<Rc<Value>>
where
    T: Float + Copy + 'static,
{
    let x = a.read_scalar::<T>();
    let y = b.read_scalar::<T>();
    let result = match op {
        NumericBin::Equals => return value::bool_to_value(ctx, x == y),
        NumericBin::Lesser => return value::bool_to_value(ctx, x < y),
        NumericBin::Add => x + y,
        NumericBin::Subtract => x - y,
        NumericBin::Multiply => x * y,
        NumericBin::Divide => x / y,
    };
    let out = Value::alloc(ctx, a.ty)?;
    out.write_scalar(result);
    Ok(out)
}

fn numeric_binary(ctx: &Context, op: NumericBin, a: &Value, b: &Value) -> CompileResult<Rc<Value>> {
    match ctx.type_data(a.ty).kind {
        TypeKind::Integer { .. } => dispatch_integer!(ctx, a.ty, int_numeric_bin(ctx, op, a, b)),
        TypeKind::Float { .. } => dispatch_float!(ctx, a.ty, float_numeric_bin(ctx, op, a, b)),
        _ => Err(ctx.error("numeric type expected")),
    }
}

fn int_integer_bin<T>(ctx: &Context, op: IntegerBin, a: &Value, b: &Value) -> CompileResult<Rc<Value>>
where
    T: PrimInt + CheckedRem + ToPrimitive + 'static,
{
    let x = a.read_scalar::<T>();
    let y = b.read_scalar::<T>();
    let result = match op {
        IntegerBin::Remainder => x
            .checked_rem(&y)
            .ok_or_else(|| ctx.error("integer division by zero"))?,
        IntegerBin::ShiftLeft | IntegerBin::ShiftRight => {
            let bits = size_of::<T>() * 8;
            let shift = y
                .to_usize()
                .filter(|&s| s < bits)
                .ok_or_else(|| ctx.error("shift amount out of range"))?;
            match op {
                IntegerBin::ShiftLeft => x << shift,
                _ => x >> shift,
            }
        }
        IntegerBin::BitwiseAnd => x & y,
        IntegerBin::BitwiseOr => x | y,
        IntegerBin::BitwiseXor => x ^ y,
    };
    let out = Value::alloc(ctx, a.ty)?;
    out.write_scalar(result);
    Ok(out)
}

fn int_negate<T>(ctx: &Context, a: &Value) -> CompileResult<Rc<Value>>
where
    T: PrimInt + WrappingNeg + 'static,
{
    let out = Value::alloc(ctx, a.ty)?;
    out.write_scalar(a.read_scalar::<T>().wrapping_neg());
    Ok(out)
}

fn float_negate<T>(ctx: &Context, a: &Value) -> CompileResult<Rc<Value>>
where
    T: Float + Copy + 'static,
{
    let out = Value::alloc(ctx, a.ty)?;
    out.write_scalar(-a.read_scalar::<T>());
    Ok(out)
}

fn numeric_negate(ctx: &Context, a: &Value) -> CompileResult<Rc<Value>> {
    match ctx.type_data(a.ty).kind {
        TypeKind::Integer { .. } => dispatch_integer!(ctx, a.ty, int_negate(ctx, a)),
        TypeKind::Float { .. } => dispatch_float!(ctx, a.ty, float_negate(ctx, a)),
        _ => Err(ctx.error("numeric type expected")),
    }
}

enum NumSource {
    Int(i128),
    Float(f64),
}

fn read_numeric(ctx: &Context, v: &Value) -> CompileResult<NumSource> {
    Ok(match ctx.type_data(v.ty).kind {
        TypeKind::Integer { bits, signed: true } => NumSource::Int(match bits {
            8 => i128::from(v.read_scalar::<i8>()),
            16 => i128::from(v.read_scalar::<i16>()),
            32 => i128::from(v.read_scalar::<i32>()),
            64 => i128::from(v.read_scalar::<i64>()),
            _ => unreachable!("invalid integer width"),
        }),
        TypeKind::Integer { bits, signed: false } => NumSource::Int(match bits {
            8 => i128::from(v.read_scalar::<u8>()),
            16 => i128::from(v.read_scalar::<u16>()),
            32 => i128::from(v.read_scalar::<u32>()),
            64 => i128::from(v.read_scalar::<u64>()),
            _ => unreachable!("invalid integer width"),
        }),
        TypeKind::Float { bits } => NumSource::Float(match bits {
            32 => f64::from(v.read_scalar::<f32>()),
            64 => v.read_scalar::<f64>(),
            _ => unreachable!("invalid float width"),
        }),
        _ => return Err(ctx.error("numeric type expected")),
    })
}

fn write_converted<T>(ctx: &Context, target: TypeId, src: NumSource) -> CompileResult<Rc<Value>>
where
    T: Copy + 'static,
    i128: AsPrimitive<T>,
    f64: AsPrimitive<T>,
{
    let out = Value::alloc(ctx, target)?;
    let result: T = match src {
        NumSource::Int(v) => v.as_(),
        NumSource::Float(f) => f.as_(),
    };
    out.write_scalar(result);
    Ok(out)
}

fn numeric_convert(ctx: &Context, target: TypeId, a: &Value) -> CompileResult<Rc<Value>> {
    let src = read_numeric(ctx, a)?;
    match ctx.type_data(target).kind {
        TypeKind::Integer { .. } => dispatch_integer!(ctx, target, write_converted(ctx, target, src)),
        TypeKind::Float { .. } => dispatch_float!(ctx, target, write_converted(ctx, target, src)),
        _ => Err(ctx.error("numeric type expected")),
    }
}

fn pointer_to_int(ctx: &Context, target: TypeId, address: usize) -> CompileResult<Rc<Value>> {
    let src = NumSource::Int(address as i128);
    dispatch_integer!(ctx, target, write_converted(ctx, target, src))
}

//
// concrete evaluation
//

pub fn invoke_prim_op(ctx: &Context, op: PrimOp, args: &[Rc<Value>]) -> CompileResult<Rc<Value>> {
    match op {
        PrimOp::TypeP => {
            types::ensure_arity(ctx, args.len(), 1)?;
            let obj = value::value_to_co(ctx, &args[0])?;
            value::bool_to_value(ctx, matches!(obj, CObject::Type(_)))
        }
        PrimOp::TypeSize => {
            types::ensure_arity(ctx, args.len(), 1)?;
            let ty = value::value_to_type(ctx, &args[0])?;
            let size = i32::try_from(types::type_size(ctx, ty)?).expect("type size fits in int32");
            value::int_to_value(ctx, size)
        }

        PrimOp::PrimitiveInit => {
            types::ensure_arity(ctx, args.len(), 1)?;
            types::ensure_primitive_type(ctx, args[0].ty)?;
            value::value_init(ctx, &args[0])?;
            Value::alloc(ctx, TypeId::VOID)
        }
        PrimOp::PrimitiveDestroy => {
            types::ensure_arity(ctx, args.len(), 1)?;
            types::ensure_primitive_type(ctx, args[0].ty)?;
            value::value_destroy(ctx, &args[0])?;
            Value::alloc(ctx, TypeId::VOID)
        }
        PrimOp::PrimitiveCopy => {
            types::ensure_arity(ctx, args.len(), 2)?;
            types::ensure_primitive_type(ctx, args[0].ty)?;
            types::ensure_same_type(ctx, args[0].ty, args[1].ty)?;
            value::value_copy(ctx, &args[0], &args[1])?;
            Value::alloc(ctx, TypeId::VOID)
        }
        PrimOp::PrimitiveAssign => {
            types::ensure_arity(ctx, args.len(), 2)?;
            types::ensure_primitive_type(ctx, args[0].ty)?;
            types::ensure_same_type(ctx, args[0].ty, args[1].ty)?;
            value::value_assign(ctx, &args[0], &args[1])?;
            Value::alloc(ctx, TypeId::VOID)
        }
        PrimOp::PrimitiveEqualsP => {
            types::ensure_arity(ctx, args.len(), 2)?;
            types::ensure_primitive_type(ctx, args[0].ty)?;
            types::ensure_same_type(ctx, args[0].ty, args[1].ty)?;
            let equal = value::value_equals(ctx, &args[0], &args[1])?;
            value::bool_to_value(ctx, equal)
        }
        PrimOp::PrimitiveHash => {
            types::ensure_arity(ctx, args.len(), 1)?;
            types::ensure_primitive_type(ctx, args[0].ty)?;
            let hash = value::value_hash(ctx, &args[0])?;
            value::int_to_value(ctx, hash as i32)
        }

        PrimOp::BoolTypeP => {
            types::ensure_arity(ctx, args.len(), 1)?;
            let ty = value::value_to_type(ctx, &args[0])?;
            value::bool_to_value(ctx, ty == TypeId::BOOL)
        }
        PrimOp::BoolNot => {
            types::ensure_arity(ctx, args.len(), 1)?;
            let x = value::value_to_bool(ctx, &args[0])?;
            value::bool_to_value(ctx, !x)
        }
        PrimOp::BoolTruth => {
            types::ensure_arity(ctx, args.len(), 1)?;
            let x = value::value_to_bool(ctx, &args[0])?;
            value::bool_to_value(ctx, x)
        }

        PrimOp::IntegerTypeP => {
            types::ensure_arity(ctx, args.len(), 1)?;
            let ty = value::value_to_type(ctx, &args[0])?;
            value::bool_to_value(ctx, matches!(ctx.type_data(ty).kind, TypeKind::Integer { .. }))
        }
        PrimOp::SignedIntegerTypeP => {
            types::ensure_arity(ctx, args.len(), 1)?;
            let ty = value::value_to_type(ctx, &args[0])?;
            let signed = matches!(ctx.type_data(ty).kind, TypeKind::Integer { signed: true, .. });
            value::bool_to_value(ctx, signed)
        }
        PrimOp::FloatTypeP => {
            types::ensure_arity(ctx, args.len(), 1)?;
            let ty = value::value_to_type(ctx, &args[0])?;
            value::bool_to_value(ctx, matches!(ctx.type_data(ty).kind, TypeKind::Float { .. }))
        }

        PrimOp::NumericEqualsP
        | PrimOp::NumericLesserP
        | PrimOp::NumericAdd
        | PrimOp::NumericSubtract
        | PrimOp::NumericMultiply
        | PrimOp::NumericDivide => {
            types::ensure_arity(ctx, args.len(), 2)?;
            types::ensure_numeric_type(ctx, args[0].ty)?;
            types::ensure_same_type(ctx, args[0].ty, args[1].ty)?;
            let bin = match op {
                PrimOp::NumericEqualsP => NumericBin::Equals,
                PrimOp::NumericLesserP => NumericBin::Lesser,
                PrimOp::NumericAdd => NumericBin::Add,
                PrimOp::NumericSubtract => NumericBin::Subtract,
                PrimOp::NumericMultiply => NumericBin::Multiply,
                _ => NumericBin::Divide,
            };
            numeric_binary(ctx, bin, &args[0], &args[1])
        }
        PrimOp::NumericNegate => {
            types::ensure_arity(ctx, args.len(), 1)?;
            types::ensure_numeric_type(ctx, args[0].ty)?;
            numeric_negate(ctx, &args[0])
        }

        PrimOp::IntegerRemainder
        | PrimOp::IntegerShiftLeft
        | PrimOp::IntegerShiftRight
        | PrimOp::IntegerBitwiseAnd
        | PrimOp::IntegerBitwiseOr
        | PrimOp::IntegerBitwiseXor => {
            types::ensure_arity(ctx, args.len(), 2)?;
            types::ensure_integer_type(ctx, args[0].ty)?;
            types::ensure_same_type(ctx, args[0].ty, args[1].ty)?;
            let bin = match op {
                PrimOp::IntegerRemainder => IntegerBin::Remainder,
                PrimOp::IntegerShiftLeft => IntegerBin::ShiftLeft,
                PrimOp::IntegerShiftRight => IntegerBin::ShiftRight,
                PrimOp::IntegerBitwiseAnd => IntegerBin::BitwiseAnd,
                PrimOp::IntegerBitwiseOr => IntegerBin::BitwiseOr,
                _ => IntegerBin::BitwiseXor,
            };
            dispatch_integer!(ctx, args[0].ty, int_integer_bin(ctx, bin, &args[0], &args[1]))
        }

        PrimOp::NumericConvert => {
            types::ensure_arity(ctx, args.len(), 2)?;
            let target = value::value_to_type(ctx, &args[0])?;
            types::ensure_numeric_type(ctx, target)?;
            types::ensure_numeric_type(ctx, args[1].ty)?;
            numeric_convert(ctx, target, &args[1])
        }

        PrimOp::VoidTypeP => {
            types::ensure_arity(ctx, args.len(), 1)?;
            let ty = value::value_to_type(ctx, &args[0])?;
            value::bool_to_value(ctx, ty == TypeId::VOID)
        }
        PrimOp::CompilerObjectTypeP => {
            types::ensure_arity(ctx, args.len(), 1)?;
            let ty = value::value_to_type(ctx, &args[0])?;
            value::bool_to_value(ctx, ty == TypeId::COMPILER_OBJECT)
        }

        PrimOp::PointerTypeP => {
            types::ensure_arity(ctx, args.len(), 1)?;
            let ty = value::value_to_type(ctx, &args[0])?;
            value::bool_to_value(ctx, matches!(ctx.type_data(ty).kind, TypeKind::Pointer { .. }))
        }
        PrimOp::PointerType => {
            types::ensure_arity(ctx, args.len(), 1)?;
            let ty = value::value_to_type(ctx, &args[0])?;
            value::co_to_value(ctx, &CObject::Type(types::pointer_type(ctx, ty)))
        }
        PrimOp::Pointer => Err(ctx.error("Pointer type constructor cannot be invoked")),
        PrimOp::PointeeType => {
            types::ensure_arity(ctx, args.len(), 1)?;
            let ty = value::value_to_type(ctx, &args[0])?;
            types::ensure_pointer_type(ctx, ty)?;
            let TypeKind::Pointer { pointee } = ctx.type_data(ty).kind else {
                unreachable!("pointer type checked above");
            };
            value::co_to_value(ctx, &CObject::Type(pointee))
        }

        PrimOp::AddressOf => {
            types::ensure_arity(ctx, args.len(), 1)?;
            let out = Value::alloc(ctx, types::pointer_type(ctx, args[0].ty))?;
            out.write_scalar(args[0].data_ptr() as usize);
            Ok(out)
        }
        PrimOp::PointerDereference => {
            types::ensure_arity(ctx, args.len(), 1)?;
            types::ensure_pointer_type(ctx, args[0].ty)?;
            let TypeKind::Pointer { pointee } = ctx.type_data(args[0].ty).kind else {
                unreachable!("pointer type checked above");
            };
            let address = args[0].read_scalar::<usize>();
            let size = types::type_size(ctx, pointee)?;
            Ok(Rc::new(Value::view(pointee, address as *mut u8, size)))
        }
        PrimOp::PointerToInt => {
            types::ensure_arity(ctx, args.len(), 2)?;
            let target = value::value_to_type(ctx, &args[0])?;
            types::ensure_integer_type(ctx, target)?;
            types::ensure_pointer_type(ctx, args[1].ty)?;
            pointer_to_int(ctx, target, args[1].read_scalar::<usize>())
        }
        PrimOp::IntToPointer => {
            types::ensure_arity(ctx, args.len(), 2)?;
            let pointee = value::value_to_type(ctx, &args[0])?;
            types::ensure_integer_type(ctx, args[1].ty)?;
            let NumSource::Int(address) = read_numeric(ctx, &args[1])? else {
                unreachable!("integer type checked above");
            };
            let out = Value::alloc(ctx, types::pointer_type(ctx, pointee))?;
            out.write_scalar(address as usize);
            Ok(out)
        }
        PrimOp::PointerCast => {
            types::ensure_arity(ctx, args.len(), 2)?;
            let pointee = value::value_to_type(ctx, &args[0])?;
            types::ensure_pointer_type(ctx, args[1].ty)?;
            let out = Value::alloc(ctx, types::pointer_type(ctx, pointee))?;
            out.write_scalar(args[1].read_scalar::<usize>());
            Ok(out)
        }
        PrimOp::AllocateMemory => {
            types::ensure_arity(ctx, args.len(), 2)?;
            let ty = value::value_to_type(ctx, &args[0])?;
            let count = value::value_to_int(ctx, &args[1])?;
            let Ok(count) = usize::try_from(count) else {
                return Err(ctx.error("invalid allocation count"));
            };
            let ptr = ctx.allocate_raw(types::type_size(ctx, ty)? * count);
            let out = Value::alloc(ctx, types::pointer_type(ctx, ty))?;
            out.write_scalar(ptr as usize);
            Ok(out)
        }
        PrimOp::FreeMemory => {
            types::ensure_arity(ctx, args.len(), 1)?;
            types::ensure_pointer_type(ctx, args[0].ty)?;
            let address = args[0].read_scalar::<usize>();
            ctx.free_raw(address as *mut u8)?;
            Value::alloc(ctx, TypeId::VOID)
        }

        PrimOp::ArrayTypeP => {
            types::ensure_arity(ctx, args.len(), 1)?;
            let ty = value::value_to_type(ctx, &args[0])?;
            value::bool_to_value(ctx, matches!(ctx.type_data(ty).kind, TypeKind::Array { .. }))
        }
        PrimOp::ArrayType => {
            types::ensure_arity(ctx, args.len(), 2)?;
            let element = value::value_to_type(ctx, &args[0])?;
            let size = value::value_to_int(ctx, &args[1])?;
            let Ok(size) = usize::try_from(size) else {
                return Err(ctx.error("invalid array size"));
            };
            value::co_to_value(ctx, &CObject::Type(types::array_type(ctx, element, size)))
        }
        PrimOp::Array => Err(ctx.error("Array type constructor cannot be invoked")),
        PrimOp::ArrayElementType => {
            types::ensure_arity(ctx, args.len(), 1)?;
            let ty = value::value_to_type(ctx, &args[0])?;
            types::ensure_array_type(ctx, ty)?;
            let TypeKind::Array { element, .. } = ctx.type_data(ty).kind else {
                unreachable!("array type checked above");
            };
            value::co_to_value(ctx, &CObject::Type(element))
        }
        PrimOp::ArraySize => {
            types::ensure_arity(ctx, args.len(), 1)?;
            let ty = value::value_to_type(ctx, &args[0])?;
            types::ensure_array_type(ctx, ty)?;
            let TypeKind::Array { size, .. } = ctx.type_data(ty).kind else {
                unreachable!("array type checked above");
            };
            value::int_to_value(ctx, i32::try_from(size).expect("array size fits in int32"))
        }
        PrimOp::MakeArray => {
            if args.is_empty() {
                return Err(ctx.error("at least one argument required for creating an array"));
            }
            let element = args[0].ty;
            let out = Value::alloc(ctx, types::array_type(ctx, element, args.len()))?;
            for (i, (dest, arg)) in value::array_elements(ctx, &out)?.iter().zip(args).enumerate() {
                if arg.ty != element {
                    return Err(ctx.error(format!("type mismatch at argument {}", i + 1)));
                }
                value::value_copy(ctx, dest, arg)?;
            }
            Ok(out)
        }
        PrimOp::ArrayRef => {
            types::ensure_arity(ctx, args.len(), 2)?;
            types::ensure_array_type(ctx, args[0].ty)?;
            let index = value::value_to_int(ctx, &args[1])?;
            let TypeKind::Array { element, size } = ctx.type_data(args[0].ty).kind else {
                unreachable!("array type checked above");
            };
            let valid = usize::try_from(index).ok().filter(|&i| i < size);
            let Some(index) = valid else {
                return Err(ctx.error("array index out of range"));
            };
            let element_size = types::type_size(ctx, element)?;
            // SAFETY: index is within the array, so the element stays
            // inside the argument's buffer.
            let ptr = unsafe { args[0].data_ptr().add(index * element_size) };
            Ok(Rc::new(Value::view(element, ptr, element_size)))
        }

        PrimOp::TupleTypeP => {
            types::ensure_arity(ctx, args.len(), 1)?;
            let ty = value::value_to_type(ctx, &args[0])?;
            value::bool_to_value(ctx, matches!(ctx.type_data(ty).kind, TypeKind::Tuple { .. }))
        }
        PrimOp::TupleType => {
            if args.len() < 2 {
                return Err(ctx.error("tuple type requires at least two element types"));
            }
            let mut elements = Vec::with_capacity(args.len());
            for arg in args {
                elements.push(value::value_to_type(ctx, arg)?);
            }
            value::co_to_value(ctx, &CObject::Type(types::tuple_type(ctx, elements)))
        }
        PrimOp::Tuple => Err(ctx.error("Tuple type constructor cannot be invoked")),
        PrimOp::TupleSize => {
            types::ensure_arity(ctx, args.len(), 1)?;
            let ty = value::value_to_type(ctx, &args[0])?;
            types::ensure_tuple_type(ctx, ty)?;
            let data = ctx.type_data(ty);
            let TypeKind::Tuple { elements } = &data.kind else {
                unreachable!("tuple type checked above");
            };
            value::int_to_value(ctx, i32::try_from(elements.len()).expect("tuple size fits in int32"))
        }
        PrimOp::TupleElementType => {
            types::ensure_arity(ctx, args.len(), 2)?;
            let ty = value::value_to_type(ctx, &args[0])?;
            types::ensure_tuple_type(ctx, ty)?;
            let index = value::value_to_int(ctx, &args[1])?;
            let data = ctx.type_data(ty);
            let TypeKind::Tuple { elements } = &data.kind else {
                unreachable!("tuple type checked above");
            };
            let element = usize::try_from(index)
                .ok()
                .and_then(|i| elements.get(i).copied())
                .ok_or_else(|| ctx.error("tuple type index out of range"))?;
            value::co_to_value(ctx, &CObject::Type(element))
        }
        PrimOp::TupleElementOffset => {
            types::ensure_arity(ctx, args.len(), 2)?;
            let ty = value::value_to_type(ctx, &args[0])?;
            types::ensure_tuple_type(ctx, ty)?;
            let index = value::value_to_int(ctx, &args[1])?;
            let layout = types::struct_layout(ctx, ty)?;
            let offset = usize::try_from(index)
                .ok()
                .and_then(|i| layout.offsets.get(i).copied())
                .ok_or_else(|| ctx.error("tuple type index out of range"))?;
            value::int_to_value(ctx, i32::try_from(offset).expect("offset fits in int32"))
        }
        PrimOp::MakeTuple => {
            if args.len() < 2 {
                return Err(ctx.error("tuples require at least two elements"));
            }
            let elements = args.iter().map(|a| a.ty).collect();
            let out = Value::alloc(ctx, types::tuple_type(ctx, elements))?;
            for (dest, arg) in value::struct_elements(ctx, &out)?.iter().zip(args) {
                value::value_copy(ctx, dest, arg)?;
            }
            Ok(out)
        }
        PrimOp::TupleRef => {
            types::ensure_arity(ctx, args.len(), 2)?;
            types::ensure_tuple_type(ctx, args[0].ty)?;
            let index = value::value_to_int(ctx, &args[1])?;
            let elements = value::struct_elements(ctx, &args[0])?;
            let element = usize::try_from(index)
                .ok()
                .and_then(|i| elements.get(i))
                .ok_or_else(|| ctx.error("tuple type index out of range"))?;
            Ok(Rc::new(element.alias()))
        }

        PrimOp::RecordTypeP => {
            types::ensure_arity(ctx, args.len(), 1)?;
            let ty = value::value_to_type(ctx, &args[0])?;
            value::bool_to_value(ctx, matches!(ctx.type_data(ty).kind, TypeKind::Record { .. }))
        }
        PrimOp::RecordType => {
            if args.is_empty() {
                return Err(ctx.error("incorrect no. of arguments"));
            }
            let CObject::Record(record) = value::value_to_co(ctx, &args[0])? else {
                return Err(ctx.error("invalid record argument"));
            };
            if record.pattern_vars.len() != args.len() - 1 {
                return Err(ctx.error("incorrect no. of arguments"));
            }
            let params: Vec<Rc<Value>> = args[1..].to_vec();
            let ty = types::record_type(ctx, &record, &params)?;
            value::co_to_value(ctx, &CObject::Type(ty))
        }
        PrimOp::RecordFieldCount => {
            types::ensure_arity(ctx, args.len(), 1)?;
            let ty = value::value_to_type(ctx, &args[0])?;
            types::ensure_record_type(ctx, ty)?;
            let fields = types::record_fields(ctx, ty)?;
            value::int_to_value(ctx, i32::try_from(fields.types.len()).expect("field count fits in int32"))
        }
        PrimOp::RecordFieldType => {
            types::ensure_arity(ctx, args.len(), 2)?;
            let ty = value::value_to_type(ctx, &args[0])?;
            types::ensure_record_type(ctx, ty)?;
            let index = value::value_to_int(ctx, &args[1])?;
            let fields = types::record_fields(ctx, ty)?;
            let field = usize::try_from(index)
                .ok()
                .and_then(|i| fields.types.get(i).copied())
                .ok_or_else(|| ctx.error("field index out of range"))?;
            value::co_to_value(ctx, &CObject::Type(field))
        }
        PrimOp::RecordFieldOffset => {
            types::ensure_arity(ctx, args.len(), 2)?;
            let ty = value::value_to_type(ctx, &args[0])?;
            types::ensure_record_type(ctx, ty)?;
            let index = value::value_to_int(ctx, &args[1])?;
            let layout = types::struct_layout(ctx, ty)?;
            let offset = usize::try_from(index)
                .ok()
                .and_then(|i| layout.offsets.get(i).copied())
                .ok_or_else(|| ctx.error("field index out of range"))?;
            value::int_to_value(ctx, i32::try_from(offset).expect("offset fits in int32"))
        }
        PrimOp::RecordFieldIndex => {
            types::ensure_arity(ctx, args.len(), 2)?;
            let ty = value::value_to_type(ctx, &args[0])?;
            types::ensure_record_type(ctx, ty)?;
            let CObject::Name(name) = value::value_to_co(ctx, &args[1])? else {
                return Err(ctx.error("expecting an identifier value"));
            };
            let fields = types::record_fields(ctx, ty)?;
            let index = fields
                .index_map
                .get(&name)
                .copied()
                .ok_or_else(|| ctx.error("field not in record"))?;
            value::int_to_value(ctx, i32::try_from(index).expect("field index fits in int32"))
        }

        PrimOp::RecordFieldRef => {
            types::ensure_arity(ctx, args.len(), 2)?;
            types::ensure_record_type(ctx, args[0].ty)?;
            let index = value::value_to_int(ctx, &args[1])?;
            let fields = value::struct_elements(ctx, &args[0])?;
            let field = usize::try_from(index)
                .ok()
                .and_then(|i| fields.get(i))
                .ok_or_else(|| ctx.error("field index out of range"))?;
            Ok(Rc::new(field.alias()))
        }
        PrimOp::RecordFieldRefByName => {
            types::ensure_arity(ctx, args.len(), 2)?;
            types::ensure_record_type(ctx, args[0].ty)?;
            let CObject::Name(name) = value::value_to_co(ctx, &args[1])? else {
                return Err(ctx.error("expecting an identifier value"));
            };
            let field_info = types::record_fields(ctx, args[0].ty)?;
            let index = field_info
                .index_map
                .get(&name)
                .copied()
                .ok_or_else(|| ctx.error("field not in record"))?;
            let fields = value::struct_elements(ctx, &args[0])?;
            Ok(Rc::new(fields[index].alias()))
        }

        PrimOp::RecordInit => {
            types::ensure_arity(ctx, args.len(), 1)?;
            types::ensure_record_type(ctx, args[0].ty)?;
            for field in value::struct_elements(ctx, &args[0])? {
                value::value_init(ctx, &field)?;
            }
            Value::alloc(ctx, TypeId::VOID)
        }
        PrimOp::RecordDestroy => {
            types::ensure_arity(ctx, args.len(), 1)?;
            types::ensure_record_type(ctx, args[0].ty)?;
            for field in value::struct_elements(ctx, &args[0])? {
                value::value_destroy(ctx, &field)?;
            }
            Value::alloc(ctx, TypeId::VOID)
        }
        PrimOp::RecordCopy => {
            types::ensure_arity(ctx, args.len(), 2)?;
            types::ensure_record_type(ctx, args[0].ty)?;
            types::ensure_same_type(ctx, args[0].ty, args[1].ty)?;
            let dests = value::struct_elements(ctx, &args[0])?;
            let srcs = value::struct_elements(ctx, &args[1])?;
            for (dest, src) in dests.iter().zip(&srcs) {
                value::value_copy(ctx, dest, src)?;
            }
            Value::alloc(ctx, TypeId::VOID)
        }
        PrimOp::RecordAssign => {
            types::ensure_arity(ctx, args.len(), 2)?;
            types::ensure_record_type(ctx, args[0].ty)?;
            types::ensure_same_type(ctx, args[0].ty, args[1].ty)?;
            let dests = value::struct_elements(ctx, &args[0])?;
            let srcs = value::struct_elements(ctx, &args[1])?;
            for (dest, src) in dests.iter().zip(&srcs) {
                value::value_assign(ctx, dest, src)?;
            }
            Value::alloc(ctx, TypeId::VOID)
        }
        PrimOp::RecordEqualsP => {
            types::ensure_arity(ctx, args.len(), 2)?;
            types::ensure_record_type(ctx, args[0].ty)?;
            types::ensure_same_type(ctx, args[0].ty, args[1].ty)?;
            let lefts = value::struct_elements(ctx, &args[0])?;
            let rights = value::struct_elements(ctx, &args[1])?;
            for (left, right) in lefts.iter().zip(&rights) {
                if !value::value_equals(ctx, left, right)? {
                    return value::bool_to_value(ctx, false);
                }
            }
            value::bool_to_value(ctx, true)
        }
        PrimOp::RecordHash => {
            types::ensure_arity(ctx, args.len(), 1)?;
            types::ensure_record_type(ctx, args[0].ty)?;
            let mut hash = 0u64;
            for field in value::struct_elements(ctx, &args[0])? {
                hash = hash.wrapping_add(value::value_hash(ctx, &field)?);
            }
            value::int_to_value(ctx, hash as i32)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{bool_to_value, int_to_value, value_print, value_to_bool, value_to_int};

    fn int8(ctx: &Context, x: i8) -> Rc<Value> {
        let v = Value::alloc(ctx, TypeId::INT8).unwrap();
        v.write_scalar(x);
        v
    }

    #[test]
    fn integer_arithmetic_wraps() {
        let ctx = Context::new();
        let a = int8(&ctx, 127);
        let b = int8(&ctx, 1);
        let sum = invoke_prim_op(&ctx, PrimOp::NumericAdd, &[a, b]).unwrap();
        assert_eq!(sum.read_scalar::<i8>(), -128);
    }

    #[test]
    fn division_by_zero_is_fatal() {
        let ctx = Context::new();
        let a = int_to_value(&ctx, 1).unwrap();
        let b = int_to_value(&ctx, 0).unwrap();
        let err = invoke_prim_op(&ctx, PrimOp::NumericDivide, &[a, b]).unwrap_err();
        assert!(err.message.contains("division by zero"));
    }

    #[test]
    fn mixed_operand_types_are_rejected() {
        let ctx = Context::new();
        let a = int_to_value(&ctx, 1).unwrap();
        let b = int8(&ctx, 1);
        assert!(invoke_prim_op(&ctx, PrimOp::NumericAdd, &[a, b]).is_err());
    }

    #[test]
    fn numeric_convert_takes_target_type_first() {
        let ctx = Context::new();
        let target = value::co_to_value(&ctx, &CObject::Type(TypeId::FLOAT64)).unwrap();
        let x = int_to_value(&ctx, 2).unwrap();
        let converted = invoke_prim_op(&ctx, PrimOp::NumericConvert, &[target, x]).unwrap();
        assert_eq!(converted.ty, TypeId::FLOAT64);
        assert!((converted.read_scalar::<f64>() - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn tuple_ref_checks_bounds() {
        let ctx = Context::new();
        let a = int_to_value(&ctx, 1).unwrap();
        let b = bool_to_value(&ctx, true).unwrap();
        let tup = invoke_prim_op(&ctx, PrimOp::MakeTuple, &[a, b]).unwrap();
        assert_eq!(value_print(&ctx, &tup).unwrap(), "(1, true)");

        let second = invoke_prim_op(&ctx, PrimOp::TupleRef, &[Rc::clone(&tup), int_to_value(&ctx, 1).unwrap()]).unwrap();
        assert!(value_to_bool(&ctx, &second).unwrap());
        assert!(!second.owned);

        let err = invoke_prim_op(&ctx, PrimOp::TupleRef, &[tup, int_to_value(&ctx, 2).unwrap()]).unwrap_err();
        assert!(err.message.contains("out of range"));
    }

    #[test]
    fn pointer_round_trip() {
        let ctx = Context::new();
        let ty = value::co_to_value(&ctx, &CObject::Type(TypeId::INT32)).unwrap();
        let one = int_to_value(&ctx, 1).unwrap();
        let p = invoke_prim_op(&ctx, PrimOp::AllocateMemory, &[ty, one]).unwrap();
        assert_eq!(ctx.outstanding_allocations(), 1);

        let slot = invoke_prim_op(&ctx, PrimOp::PointerDereference, &[Rc::clone(&p)]).unwrap();
        value::value_assign(&ctx, &slot, &int_to_value(&ctx, 7).unwrap()).unwrap();
        let read_back = invoke_prim_op(&ctx, PrimOp::PointerDereference, &[Rc::clone(&p)]).unwrap();
        assert_eq!(value_to_int(&ctx, &read_back).unwrap(), 7);

        invoke_prim_op(&ctx, PrimOp::FreeMemory, &[p]).unwrap();
        assert_eq!(ctx.outstanding_allocations(), 0);
    }
}
