// string_conversion.rs - reflection trait for types with a textual
// representation (used by the blueprint/debug-inspector boundary to show and
// edit values without knowing their concrete Rust type).

pub type ToString = unsafe fn(instance: *const u8) -> String;
/// Parses `text` into `dst` (uninitialized memory of the right size/align).
/// Returns `false` on a parse failure, leaving `dst` uninitialized.
pub type FromString = unsafe fn(dst: *mut u8, text: &str) -> bool;

pub struct StringConversionTrait {
    to: ToString,
    from: FromString,
}

impl StringConversionTrait {
    pub fn new(to: ToString, from: FromString) -> Self {
        Self { to, from }
    }

    /// # Safety
    /// `instance` must point to a live value of the reflected type.
    pub unsafe fn to(&self, instance: *const u8) -> String {
        (self.to)(instance)
    }

    /// # Safety
    /// `dst` must be uninitialized memory of the reflected type's size/align.
    /// On success (`true`), `dst` now holds an initialized value; on failure
    /// it is left uninitialized and must not be read or dropped.
    pub unsafe fn from(&self, dst: *mut u8, text: &str) -> bool {
        (self.from)(dst, text)
    }
}

/// Builds a `StringConversionTrait` for any `T: ToString + FromStr`.
pub fn string_conversion_of<T>() -> StringConversionTrait
where
    T: std::string::ToString + std::str::FromStr + 'static,
{
    unsafe fn to<T: std::string::ToString>(instance: *const u8) -> String {
        (*(instance as *const T)).to_string()
    }
    unsafe fn from<T: std::str::FromStr>(dst: *mut u8, text: &str) -> bool {
        match text.parse::<T>() {
            Ok(value) => {
                std::ptr::write(dst as *mut T, value);
                true
            }
            Err(_) => false,
        }
    }

    StringConversionTrait::new(to::<T>, from::<T>)
}
