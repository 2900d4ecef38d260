//! Binary driver contract for asio-host
//!
//! Everything here is layout- and convention-exact: the activation
//! identifier, the raw structures exchanged with drivers, the dispatch table,
//! and the Win32 bindings for the component runtime and registry. Nothing in
//! this crate interprets driver results; that is the dispatch layer's job.

pub mod abi;
pub mod com;
pub mod guid;
#[cfg(windows)]
pub mod hkey;
pub mod types;
pub mod vtable;

pub use abi::{rate_arg, read_rate_arg, RateArg};
pub use guid::Guid;
pub use types::SampleType;
pub use vtable::{AsioObject, AsioVtbl};
