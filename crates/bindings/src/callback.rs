use std::fmt;
use std::rc::Rc;

/// Author-supplied callback carried in node props.
///
/// Cloning shares the closure; props can be rebuilt on every update without
/// rewrapping.
pub struct Callback<T: ?Sized>(Rc<dyn Fn(&T)>);

impl<T: ?Sized> Callback<T> {
    pub fn new(f: impl Fn(&T) + 'static) -> Self {
        Callback(Rc::new(f))
    }

    pub fn call(&self, value: &T) {
        (self.0)(value)
    }
}

impl<T: ?Sized> Clone for Callback<T> {
    fn clone(&self) -> Self {
        Callback(Rc::clone(&self.0))
    }
}

impl<T: ?Sized> fmt::Debug for Callback<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callback({:p})", Rc::as_ptr(&self.0))
    }
}
