pub mod flip;
pub mod panic_handler;
pub mod paths;
pub mod settings;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use flip::{Session, SessionConfig};
