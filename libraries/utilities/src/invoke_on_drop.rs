use core::{
    mem::ManuallyDrop,
    ops::{Deref, DerefMut},
};

/// Holds a value together with a closure that consumes it on drop.
///
/// Call [`InvokeOnDrop::disarm`] to take the value back without running the
/// closure, or [`InvokeOnDrop::cancel`] to throw both away.
#[must_use = "the rollback runs as soon as the guard is dropped"]
pub struct InvokeOnDrop<T, F: FnOnce(T)> {
    func: ManuallyDrop<F>,
    val: ManuallyDrop<T>,
}

impl<F: FnOnce(())> InvokeOnDrop<(), F> {
    #[inline]
    pub fn new(func: F) -> Self {
        Self::transform((), func)
    }
}

impl<T, F: FnOnce(T)> InvokeOnDrop<T, F> {
    #[inline]
    pub fn transform(val: T, func: F) -> Self {
        InvokeOnDrop {
            func: ManuallyDrop::new(func),
            val: ManuallyDrop::new(val),
        }
    }

    /// Splits the guard apart without invoking the closure.
    pub fn deconstruct(mut self) -> (T, F) {
        // SAFETY: both fields are taken exactly once and `self` is forgotten
        // right after, so `Drop` never sees the emptied slots.
        let (val, func) = unsafe {
            (
                ManuallyDrop::take(&mut self.val),
                ManuallyDrop::take(&mut self.func),
            )
        };

        core::mem::forget(self);

        (val, func)
    }

    /// Commits the guarded step, handing the value back to the caller.
    #[inline]
    pub fn disarm(self) -> T {
        self.deconstruct().0
    }

    /// Drops the value, then the closure, without running the closure.
    pub fn cancel(self) {
        let (val, func) = self.deconstruct();

        drop(val);
        drop(func);
    }
}

impl<T, F: FnOnce(T)> Drop for InvokeOnDrop<T, F> {
    fn drop(&mut self) {
        // SAFETY: `drop` runs at most once and the fields are still populated
        // because `deconstruct` forgets `self` before returning.
        let func = unsafe { ManuallyDrop::take(&mut self.func) };
        let val = unsafe { ManuallyDrop::take(&mut self.val) };

        func(val);
    }
}

impl<T: Copy, F: FnOnce(T)> InvokeOnDrop<T, F> {
    #[inline]
    pub fn as_val(&self) -> T {
        *self.val
    }
}

impl<T, F: FnOnce(T)> Deref for InvokeOnDrop<T, F> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.val
    }
}

impl<T, F: FnOnce(T)> DerefMut for InvokeOnDrop<T, F> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.val
    }
}
