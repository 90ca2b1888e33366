// Lox Associative Table
// Maps interned string handles to values (globals)

use super::object::ObjRef;
use super::value::Value;
use rustc_hash::FxHashMap;

/// Keys are interned, so handle identity is content identity
#[derive(Debug, Default)]
pub struct Table {
    entries: FxHashMap<ObjRef, Value>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `key` to `value`. Returns true when the key was not present.
    pub fn set(&mut self, key: ObjRef, value: Value) -> bool {
        self.entries.insert(key, value).is_none()
    }

    pub fn get(&self, key: ObjRef) -> Option<Value> {
        self.entries.get(&key).copied()
    }

    /// Overwrite an existing binding only. Returns false when the key is absent.
    pub fn assign(&mut self, key: ObjRef, value: Value) -> bool {
        match self.entries.get_mut(&key) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn delete(&mut self, key: ObjRef) -> bool {
        self.entries.remove(&key).is_some()
    }

    pub fn contains(&self, key: ObjRef) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn keys(n: usize) -> Vec<ObjRef> {
        let mut map: SlotMap<ObjRef, ()> = SlotMap::with_key();
        (0..n).map(|_| map.insert(())).collect()
    }

    #[test]
    fn set_reports_new_keys() {
        let k = keys(1)[0];
        let mut table = Table::new();
        assert!(table.set(k, Value::Number(1.0)));
        assert!(!table.set(k, Value::Number(2.0)));
        assert_eq!(table.get(k), Some(Value::Number(2.0)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn assign_requires_existing_binding() {
        let ks = keys(2);
        let mut table = Table::new();
        table.set(ks[0], Value::Nil);
        assert!(table.assign(ks[0], Value::Bool(true)));
        assert!(!table.assign(ks[1], Value::Bool(true)));
        assert!(!table.contains(ks[1]));
    }

    #[test]
    fn delete_removes_binding() {
        let k = keys(1)[0];
        let mut table = Table::new();
        table.set(k, Value::Nil);
        assert!(table.delete(k));
        assert!(!table.delete(k));
        assert!(table.get(k).is_none());
    }
}
