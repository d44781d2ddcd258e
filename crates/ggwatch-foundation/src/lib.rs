pub mod backoff;
pub mod clock;
pub mod error;

pub use backoff::*;
pub use clock::*;
pub use error::*;
