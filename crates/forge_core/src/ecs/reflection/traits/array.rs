// array.rs - reflection trait for homogeneous, resizable sequence types
// (Vec<T> and similar). Grounded on examples/original_source's ArrayTrait,
// translated from its virtual-interface-per-container design to a single
// function-pointer bundle closing over the concrete container type.

use super::super::type_::Type;

pub type ArrayLength = unsafe fn(container: *const u8) -> usize;
pub type ArrayGet = unsafe fn(container: *const u8, index: usize) -> *const u8;
pub type ArrayGetMut = unsafe fn(container: *mut u8, index: usize) -> *mut u8;
pub type ArrayInsertDefault = unsafe fn(container: *mut u8, index: usize);
pub type ArrayErase = unsafe fn(container: *mut u8, index: usize);

pub struct ArrayTrait {
    element_type: &'static Type,
    length: ArrayLength,
    get: ArrayGet,
    get_mut: ArrayGetMut,
    insert_default: Option<ArrayInsertDefault>,
    erase: Option<ArrayErase>,
}

impl ArrayTrait {
    pub fn new(
        element_type: &'static Type,
        length: ArrayLength,
        get: ArrayGet,
        get_mut: ArrayGetMut,
    ) -> Self {
        Self {
            element_type,
            length,
            get,
            get_mut,
            insert_default: None,
            erase: None,
        }
    }

    pub fn with_insert_default(mut self, f: ArrayInsertDefault) -> Self {
        self.insert_default = Some(f);
        self
    }

    pub fn with_erase(mut self, f: ArrayErase) -> Self {
        self.erase = Some(f);
        self
    }

    pub fn element_type(&self) -> &'static Type {
        self.element_type
    }

    pub fn can_resize(&self) -> bool {
        self.insert_default.is_some() && self.erase.is_some()
    }

    /// # Safety
    /// `container` must point to a live value of the reflected container type.
    pub unsafe fn length(&self, container: *const u8) -> usize {
        (self.length)(container)
    }

    /// # Safety
    /// `container` must be live and `index < length(container)`.
    pub unsafe fn get(&self, container: *const u8, index: usize) -> *const u8 {
        (self.get)(container, index)
    }

    /// # Safety
    /// Same as `get`, with a mutable container.
    pub unsafe fn get_mut(&self, container: *mut u8, index: usize) -> *mut u8 {
        (self.get_mut)(container, index)
    }

    /// # Safety
    /// `container` live, `index <= length(container)`. Panics if the
    /// container type does not support resizing.
    pub unsafe fn insert_default(&self, container: *mut u8, index: usize) {
        (self
            .insert_default
            .expect("array type does not support insertion"))(container, index);
    }

    /// # Safety
    /// `container` live, `index < length(container)`. Panics if the
    /// container type does not support resizing.
    pub unsafe fn erase(&self, container: *mut u8, index: usize) {
        (self.erase.expect("array type does not support erase"))(container, index);
    }
}

/// Builds an `ArrayTrait` for `Vec<T>` where `T: Reflect`.
pub fn array_of_vec<T: super::super::Reflect + Default + 'static>() -> ArrayTrait {
    unsafe fn length<T>(container: *const u8) -> usize {
        (*(container as *const Vec<T>)).len()
    }
    unsafe fn get<T>(container: *const u8, index: usize) -> *const u8 {
        &(*(container as *const Vec<T>))[index] as *const T as *const u8
    }
    unsafe fn get_mut<T>(container: *mut u8, index: usize) -> *mut u8 {
        (&mut (*(container as *mut Vec<T>))[index]) as *mut T as *mut u8
    }
    unsafe fn insert_default<T: Default>(container: *mut u8, index: usize) {
        (*(container as *mut Vec<T>)).insert(index, T::default());
    }
    unsafe fn erase<T>(container: *mut u8, index: usize) {
        (*(container as *mut Vec<T>)).remove(index);
    }

    ArrayTrait::new(T::reflect(), length::<T>, get::<T>, get_mut::<T>)
        .with_insert_default(insert_default::<T>)
        .with_erase(erase::<T>)
}
