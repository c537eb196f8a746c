//! # courier-shared
//!
//! Types shared between the Courier server and its clients: the wire
//! protocol event enums, the domain models they carry, and protocol-wide
//! constants.  No I/O lives here.

pub mod constants;
pub mod protocol;
pub mod types;

pub use protocol::{ClientEvent, ServerEvent};
pub use types::*;
