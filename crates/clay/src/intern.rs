//! Identifier interning.
//!
//! Identifiers are interned into a push-only table and referenced by
//! [`NameId`], so name equality is a `u32` compare and environments key
//! their maps on ids rather than strings. The interner is populated during
//! lexing/parsing; string lookups are needed only for diagnostics and
//! printed output.
//!
//! Names beginning with `%` are reserved for compiler-introduced bindings
//! (the `for` statement rewrite); the lexer can never produce them, the
//! interner accepts them.

use ahash::AHashMap;

/// Index into the identifier interner.
///
/// `u32` keeps ids small; environments, patterns, and invocation keys all
/// store these by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NameId(u32);

impl NameId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Push-only identifier table with a reverse map for interning.
#[derive(Default)]
pub struct Interns {
    names: Vec<String>,
    by_text: AHashMap<String, NameId>,
}

impl Interns {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, text: &str) -> NameId {
        if let Some(&id) = self.by_text.get(text) {
            return id;
        }
        let id = NameId(u32::try_from(self.names.len()).expect("identifier table overflow"));
        self.names.push(text.to_owned());
        self.by_text.insert(text.to_owned(), id);
        id
    }

    pub fn text(&self, id: NameId) -> &str {
        &self.names[id.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_idempotent() {
        let mut interns = Interns::new();
        let a = interns.intern("main");
        let b = interns.intern("main");
        let c = interns.intern("other");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(interns.text(a), "main");
        assert_eq!(interns.text(c), "other");
    }

    #[test]
    fn reserved_prefix_is_accepted() {
        let mut interns = Interns::new();
        let id = interns.intern("%iter");
        assert_eq!(interns.text(id), "%iter");
    }
}
