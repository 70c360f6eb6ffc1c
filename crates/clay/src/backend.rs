//! The native backend: value layout and the external-procedure bridge.
//!
//! The engine depends on its backend only through a narrow interface —
//! scalar sizes, struct layouts, and "build a function of this name, then
//! invoke it with one pointer per argument slot". The original
//! implementation satisfied it with an LLVM JIT; this backend computes
//! layouts with C struct rules and resolves external procedures against a
//! registry of host thunks keyed by name.
//!
//! The wrapper convention is preserved: a thunk receives a pointer to each
//! argument slot and, when the return type is not void, a pointer to an
//! output slot it must store through.

use std::{cell::RefCell, rc::Rc};

use ahash::AHashMap;

use crate::error::{CompileError, CompileResult};

/// Field offsets of a structured type plus its total size and alignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructLayout {
    pub offsets: Vec<usize>,
    pub size: usize,
    pub align: usize,
}

/// Handle to a built external function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FnHandle(u32);

/// A host thunk following the wrapper convention: `args` holds one pointer
/// per argument slot, `ret` points at the output slot (dangling for void).
pub type HostFn = Rc<dyn Fn(&[*mut u8], *mut u8)>;

pub struct Backend {
    thunks: RefCell<AHashMap<String, HostFn>>,
    built: RefCell<Vec<HostFn>>,
}

impl Backend {
    pub fn new() -> Self {
        let backend = Self {
            thunks: RefCell::new(AHashMap::new()),
            built: RefCell::new(Vec::new()),
        };
        backend.install_host_defaults();
        backend
    }

    /// Computes a C struct layout from `(size, align)` pairs.
    pub fn struct_layout(fields: &[(usize, usize)]) -> StructLayout {
        let mut offsets = Vec::with_capacity(fields.len());
        let mut offset = 0;
        let mut align = 1;
        for &(field_size, field_align) in fields {
            offset = round_up(offset, field_align);
            offsets.push(offset);
            offset += field_size;
            align = align.max(field_align);
        }
        StructLayout {
            offsets,
            size: round_up(offset, align),
            align,
        }
    }

    /// Registers a host thunk under an external name. Test harnesses use
    /// this to expose extra functions to programs under test.
    pub fn register(&self, name: impl Into<String>, thunk: HostFn) {
        self.thunks.borrow_mut().insert(name.into(), thunk);
    }

    /// Resolves an external name to an invocable function. Called lazily on
    /// the first use of each external procedure.
    pub fn build_function(&self, name: &str) -> CompileResult<FnHandle> {
        let Some(thunk) = self.thunks.borrow().get(name).cloned() else {
            return Err(CompileError::new(
                format!("unknown external procedure: {name}"),
                None,
            ));
        };
        let mut built = self.built.borrow_mut();
        let handle = FnHandle(u32::try_from(built.len()).expect("backend function table overflow"));
        built.push(thunk);
        Ok(handle)
    }

    /// Invokes a built function, marshalling value buffers as pointers.
    pub fn invoke(&self, handle: FnHandle, args: &[*mut u8], ret: *mut u8) {
        let thunk = Rc::clone(&self.built.borrow()[handle.0 as usize]);
        thunk(args, ret);
    }

    fn install_host_defaults(&self) {
        self.register(
            "putchar",
            Rc::new(|args: &[*mut u8], ret: *mut u8| {
                // SAFETY: the engine passes one pointer per declared
                // argument slot; putchar is declared (Int32) Int32.
                let c = unsafe { args[0].cast::<i32>().read_unaligned() };
                if let Some(c) = char::from_u32(c as u32) {
                    print!("{c}");
                }
                // SAFETY: ret points at an Int32 output slot.
                unsafe { ret.cast::<i32>().write_unaligned(c) };
            }),
        );
        self.register(
            "puts",
            Rc::new(|args: &[*mut u8], ret: *mut u8| {
                // SAFETY: puts is declared (Pointer[Int8]) Int32; the slot
                // holds a pointer to a NUL-terminated byte string.
                let ptr = unsafe { args[0].cast::<*const u8>().read_unaligned() };
                let mut text = String::new();
                let mut cursor = ptr;
                // SAFETY: reads byte-by-byte until the terminating NUL, as
                // C's puts does; the program must pass a valid C string.
                unsafe {
                    while *cursor != 0 {
                        text.push(char::from(*cursor));
                        cursor = cursor.add(1);
                    }
                }
                println!("{text}");
                // SAFETY: ret points at an Int32 output slot.
                unsafe { ret.cast::<i32>().write_unaligned(0) };
            }),
        );
        self.register(
            "abort",
            Rc::new(|_args: &[*mut u8], _ret: *mut u8| {
                std::process::abort();
            }),
        );
    }
}

impl Default for Backend {
    fn default() -> Self {
        Self::new()
    }
}

fn round_up(value: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (value + align - 1) & !(align - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn struct_layout_pads_to_alignment() {
        // (Int8, Int32, Int8) lays out as 0, 4, 8 with size 12
        let layout = Backend::struct_layout(&[(1, 1), (4, 4), (1, 1)]);
        assert_eq!(layout.offsets, vec![0, 4, 8]);
        assert_eq!(layout.size, 12);
        assert_eq!(layout.align, 4);
    }

    #[test]
    fn empty_struct_is_zero_sized() {
        let layout = Backend::struct_layout(&[]);
        assert_eq!(layout.size, 0);
        assert_eq!(layout.align, 1);
    }

    #[test]
    fn unknown_external_is_fatal() {
        let backend = Backend::new();
        assert!(backend.build_function("no_such_symbol").is_err());
    }

    #[test]
    fn registered_thunk_round_trips() {
        let backend = Backend::new();
        backend.register(
            "add_ints",
            Rc::new(|args: &[*mut u8], ret: *mut u8| {
                // SAFETY: test passes two i32 slots and an i32 output slot.
                unsafe {
                    let a = args[0].cast::<i32>().read_unaligned();
                    let b = args[1].cast::<i32>().read_unaligned();
                    ret.cast::<i32>().write_unaligned(a + b);
                }
            }),
        );
        let handle = backend.build_function("add_ints").expect("registered");
        let mut a = 2i32;
        let mut b = 3i32;
        let mut out = 0i32;
        backend.invoke(
            handle,
            &[(&raw mut a).cast(), (&raw mut b).cast()],
            (&raw mut out).cast(),
        );
        assert_eq!(out, 5);
    }
}
