//! Driver discovery, activation and streaming sessions for asio-host

pub mod activation;
pub mod dispatch;
pub mod null;
pub mod realtime;
pub mod registry;
pub mod session;

pub use activation::{Activator, DriverInstance};
pub use dispatch::{AsioDriver, BufferDescriptor, BufferSizeRange, ChannelInfo, Direction};
pub use realtime::{BufferSwitchHandler, DriverEvent, SwitchBuffers, SwitchInfo};
pub use registry::{list_drivers, DriverDescriptor, KeyStore, MemoryRegistry};
pub use session::{Session, SessionOptions, SessionState};

#[cfg(windows)]
pub use activation::ComActivator;
#[cfg(windows)]
pub use registry::SystemRegistry;
