//! The compiler-object table.
//!
//! First-class language objects — types, records, procedures, overloadables,
//! external procedures, primitive operators, and interned identifiers — are
//! handed out to user programs as 32-bit handles into this process-wide,
//! push-only table. A value of compiler-object type is such a handle; this
//! is how "types as values" and "procedures as arguments" work without a
//! universal object root.
//!
//! Handles are assigned lazily the first time an object is lowered, and are
//! cached on the object itself (a `Cell` on items and type data, a reverse
//! map for identifiers), so lowering then raising a handle always yields
//! the original object.

use std::{cell::Cell, rc::Rc};

use ahash::AHashMap;

use crate::{
    ast::{ExternalProc, Overloadable, Procedure, Record},
    intern::NameId,
    primops::PrimOp,
    types::{TypeData, TypeId},
};

/// A 32-bit handle into the compiler-object table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CoIndex(pub u32);

impl CoIndex {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// An object that can appear as a compiler-object value.
#[derive(Clone)]
pub enum CObject {
    Name(NameId),
    Record(Rc<Record>),
    Procedure(Rc<Procedure>),
    Overloadable(Rc<Overloadable>),
    External(Rc<ExternalProc>),
    PrimOp(PrimOp),
    Type(TypeId),
}

/// Push-only storage; the per-object index cells live on the objects, the
/// reverse maps here cover the copyable kinds (identifiers, primitives).
#[derive(Default)]
pub struct CoTable {
    objects: Vec<CObject>,
    names: AHashMap<NameId, CoIndex>,
    prim_ops: AHashMap<PrimOp, CoIndex>,
}

impl CoTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, obj: &CObject) -> CoIndex {
        let index = CoIndex(u32::try_from(self.objects.len()).expect("compiler-object table overflow"));
        self.objects.push(obj.clone());
        index
    }

    /// Interns `obj`, reusing the handle cached on the object when present.
    /// `type_data` must be supplied for `CObject::Type` (it carries the
    /// handle cell for the type).
    pub fn intern(&mut self, obj: &CObject, type_data: Option<&Rc<TypeData>>) -> CoIndex {
        match obj {
            CObject::Name(name) => {
                if let Some(&index) = self.names.get(name) {
                    return index;
                }
                let index = self.push(obj);
                self.names.insert(*name, index);
                index
            }
            CObject::PrimOp(op) => {
                if let Some(&index) = self.prim_ops.get(op) {
                    return index;
                }
                let index = self.push(obj);
                self.prim_ops.insert(*op, index);
                index
            }
            CObject::Record(x) => self.intern_cell(&x.co_index, obj),
            CObject::Procedure(x) => self.intern_cell(&x.co_index, obj),
            CObject::Overloadable(x) => self.intern_cell(&x.co_index, obj),
            CObject::External(x) => self.intern_cell(&x.co_index, obj),
            CObject::Type(_) => {
                let data = type_data.expect("type data required to intern a type handle");
                self.intern_cell(&data.co_index, obj)
            }
        }
    }

    fn intern_cell(&mut self, cell: &Cell<Option<CoIndex>>, obj: &CObject) -> CoIndex {
        if let Some(index) = cell.get() {
            return index;
        }
        let index = self.push(obj);
        cell.set(Some(index));
        index
    }

    pub fn get(&self, index: CoIndex) -> &CObject {
        &self.objects[index.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intern::Interns;

    #[test]
    fn handles_round_trip_to_the_same_object() {
        let mut interns = Interns::new();
        let name = interns.intern("second");
        let mut table = CoTable::new();

        let first = table.intern(&CObject::Name(name), None);
        let again = table.intern(&CObject::Name(name), None);
        assert_eq!(first, again);
        assert!(matches!(table.get(first), CObject::Name(n) if *n == name));

        let op = table.intern(&CObject::PrimOp(PrimOp::TupleRef), None);
        assert_ne!(first, op);
        assert!(matches!(table.get(op), CObject::PrimOp(PrimOp::TupleRef)));
    }
}
