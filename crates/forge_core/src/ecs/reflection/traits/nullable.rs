// nullable.rs - reflection trait for types with a distinguished "null" state
// (Option<T>-like, but also e.g. a sentinel Entity). Grounded on
// examples/original_source's NullableTrait.

pub type IsNull = unsafe fn(instance: *const u8) -> bool;
pub type SetToNull = unsafe fn(instance: *mut u8);

pub struct NullableTrait {
    is_null: IsNull,
    set_to_null: SetToNull,
}

impl NullableTrait {
    pub fn new(is_null: IsNull, set_to_null: SetToNull) -> Self {
        Self { is_null, set_to_null }
    }

    /// # Safety
    /// `instance` must point to a live value of the reflected type.
    pub unsafe fn is_null(&self, instance: *const u8) -> bool {
        (self.is_null)(instance)
    }

    /// # Safety
    /// `instance` must point to a live value of the reflected type.
    pub unsafe fn set_to_null(&self, instance: *mut u8) {
        (self.set_to_null)(instance)
    }
}

/// Builds a `NullableTrait` for `Option<T>`.
pub fn nullable_of_option<T: 'static>() -> NullableTrait {
    unsafe fn is_null<T>(instance: *const u8) -> bool {
        (*(instance as *const Option<T>)).is_none()
    }
    unsafe fn set_to_null<T>(instance: *mut u8) {
        *(instance as *mut Option<T>) = None;
    }

    NullableTrait::new(is_null::<T>, set_to_null::<T>)
}
