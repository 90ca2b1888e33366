// Lox String Interner
// Content-addressed set of string handles, bucketed by cached hash

use super::object::{Obj, ObjRef};
use rustc_hash::FxHashMap;
use slotmap::SlotMap;
use smallvec::SmallVec;

/// String intern set
/// Deduplicates strings so equal content always means the same handle
#[derive(Debug, Default)]
pub struct Interner {
    buckets: FxHashMap<u32, SmallVec<[ObjRef; 1]>>,
}

impl Interner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find an interned string with the given content.
    /// Only the bucket for `hash` is searched.
    pub fn find_interned(
        &self,
        objects: &SlotMap<ObjRef, Obj>,
        chars: &str,
        hash: u32,
    ) -> Option<ObjRef> {
        let bucket = self.buckets.get(&hash)?;
        bucket.iter().copied().find(|r| match objects.get(*r) {
            Some(Obj::String(s)) => s.hash == hash && &*s.chars == chars,
            _ => false,
        })
    }

    /// Record a freshly allocated string. Callers check `find_interned` first.
    pub fn insert(&mut self, hash: u32, string: ObjRef) {
        self.buckets.entry(hash).or_default().push(string);
    }

    pub fn len(&self) -> usize {
        self.buckets.values().map(|b| b.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::object::ObjString;

    #[test]
    fn lookup_compares_content_within_bucket() {
        let mut objects = SlotMap::with_key();
        let mut interner = Interner::new();

        let a = objects.insert(Obj::String(ObjString::new("a".into())));
        // Same bucket, different content
        let b = objects.insert(Obj::String(ObjString {
            chars: "b".into(),
            hash: 7,
        }));
        interner.insert(7, b);
        let hash_a = crate::vm::object::hash_string("a");
        interner.insert(hash_a, a);

        assert_eq!(interner.find_interned(&objects, "a", hash_a), Some(a));
        assert_eq!(interner.find_interned(&objects, "b", 7), Some(b));
        assert_eq!(interner.find_interned(&objects, "c", 7), None);
        assert_eq!(interner.len(), 2);
    }
}
