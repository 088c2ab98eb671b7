//! Request handlers.

pub mod convert;
pub mod health;
pub mod progress;
pub mod status;

pub use convert::*;
pub use health::*;
pub use progress::*;
pub use status::*;
