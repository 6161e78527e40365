//! Non-destructive merge of user attributes into a session
//!
//! An attribute missing from an upstream response must never erase a value
//! the session already holds, so every assignment goes through
//! [`merge_non_blank`].

/// Values that can be "empty" in an upstream payload
pub trait Blank {
    fn is_blank(&self) -> bool;
}

impl Blank for String {
    fn is_blank(&self) -> bool {
        self.is_empty()
    }
}

impl Blank for &str {
    fn is_blank(&self) -> bool {
        self.is_empty()
    }
}

impl<T> Blank for Vec<T> {
    fn is_blank(&self) -> bool {
        self.is_empty()
    }
}

impl<T: Blank> Blank for Option<T> {
    fn is_blank(&self) -> bool {
        self.as_ref().map(Blank::is_blank).unwrap_or(true)
    }
}

/// Replace `target` with `value` unless `value` is blank
///
/// Returns true if the target was overwritten.
pub fn merge_non_blank<T: Blank>(target: &mut T, value: T) -> bool {
    if value.is_blank() {
        return false;
    }
    *target = value;
    true
}
