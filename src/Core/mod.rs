
pub mod alloc;
pub mod error;
pub mod shutdown;
pub mod socket;

pub use alloc::{Message, ScatterBufferSet, SerializedMessage, NUM_FIELDS};
pub use error::{Error, Result};
pub use shutdown::Shutdown;
