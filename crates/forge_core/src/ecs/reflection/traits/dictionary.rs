// dictionary.rs - reflection trait for key/value map types (HashMap<K, V>
// and similar). Grounded on examples/original_source's DictionaryTrait; the
// iterator is a boxed closure rather than a virtual `DictionaryTrait::Iterator`
// subclass, since Rust has no vtable-free equivalent of that pattern.

use super::super::type_::Type;

pub type DictLength = unsafe fn(container: *const u8) -> usize;
/// Runs `visit` once per key/value pair, passing raw pointers to each.
pub type DictIterate = unsafe fn(container: *const u8, visit: &mut dyn FnMut(*const u8, *const u8));
pub type DictInsertDefault = unsafe fn(container: *mut u8, key: *const u8);
pub type DictErase = unsafe fn(container: *mut u8, key: *const u8) -> bool;

pub struct DictionaryTrait {
    key_type: &'static Type,
    value_type: &'static Type,
    length: DictLength,
    iterate: DictIterate,
    insert_default: Option<DictInsertDefault>,
    erase: Option<DictErase>,
}

impl DictionaryTrait {
    pub fn new(
        key_type: &'static Type,
        value_type: &'static Type,
        length: DictLength,
        iterate: DictIterate,
    ) -> Self {
        Self {
            key_type,
            value_type,
            length,
            iterate,
            insert_default: None,
            erase: None,
        }
    }

    pub fn with_insert_default(mut self, f: DictInsertDefault) -> Self {
        self.insert_default = Some(f);
        self
    }

    pub fn with_erase(mut self, f: DictErase) -> Self {
        self.erase = Some(f);
        self
    }

    pub fn key_type(&self) -> &'static Type {
        self.key_type
    }

    pub fn value_type(&self) -> &'static Type {
        self.value_type
    }

    /// # Safety
    /// `container` must point to a live value of the reflected type.
    pub unsafe fn length(&self, container: *const u8) -> usize {
        (self.length)(container)
    }

    /// # Safety
    /// Same as `length`. `visit` is called once per entry; pointers passed to
    /// it are only valid for the duration of that call.
    pub unsafe fn iterate(&self, container: *const u8, visit: &mut dyn FnMut(*const u8, *const u8)) {
        (self.iterate)(container, visit)
    }

    /// # Safety
    /// `container` live, `key` points to an initialized value of `key_type`.
    /// Panics if the dictionary type does not support insertion.
    pub unsafe fn insert_default(&self, container: *mut u8, key: *const u8) {
        (self
            .insert_default
            .expect("dictionary type does not support insertion"))(container, key);
    }

    /// # Safety
    /// Same as `insert_default`. Panics if erase is unsupported.
    pub unsafe fn erase(&self, container: *mut u8, key: *const u8) -> bool {
        (self.erase.expect("dictionary type does not support erase"))(container, key)
    }
}
