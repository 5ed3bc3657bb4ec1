pub mod messaging;

#[cfg(any(test, feature = "testing"))]
pub mod testing;
