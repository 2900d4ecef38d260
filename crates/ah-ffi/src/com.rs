//! Component runtime bindings
//!
//! Drivers are created through the platform's generic component-creation
//! call, with the driver's own identifier doubling as the interface id.

use ah_core::error::ActivationError;

/// Class is not registered
pub const REGDB_E_CLASSNOTREG: u32 = 0x8004_0154;
/// Class is registered but not available
pub const CLASS_E_CLASSNOTAVAILABLE: u32 = 0x8004_0111;
/// Access denied
pub const E_ACCESSDENIED: u32 = 0x8007_0005;
/// Interface not supported
pub const E_NOINTERFACE: u32 = 0x8000_4002;
/// Aggregation not supported
pub const CLASS_E_NOAGGREGATION: u32 = 0x8004_0110;
/// Runtime not initialized on this thread
pub const CO_E_NOTINITIALIZED: u32 = 0x8004_01F0;
/// Runtime already initialized in another threading mode
pub const RPC_E_CHANGED_MODE: u32 = 0x8001_0106;

/// Map a failed creation HRESULT onto the activation taxonomy
pub fn activation_error(hresult: i32) -> ActivationError {
    match hresult as u32 {
        REGDB_E_CLASSNOTREG | CLASS_E_CLASSNOTAVAILABLE => ActivationError::NotFound,
        E_ACCESSDENIED => ActivationError::AccessDenied,
        E_NOINTERFACE | CLASS_E_NOAGGREGATION => ActivationError::Incompatible,
        CO_E_NOTINITIALIZED => ActivationError::RuntimeInit(CO_E_NOTINITIALIZED),
        other => ActivationError::Runtime(other),
    }
}

#[cfg(windows)]
pub use self::windows::ComRuntime;

#[cfg(windows)]
mod windows {
    use std::ffi::c_void;
    use std::marker::PhantomData;
    use std::ptr::{self, NonNull};

    use ah_core::error::ActivationError;
    use windows_sys::core::GUID;
    use windows_sys::Win32::System::Com::{
        CoCreateInstance, CoInitializeEx, CoUninitialize, CLSCTX_INPROC_SERVER,
        COINIT_APARTMENTTHREADED,
    };

    use super::{activation_error, RPC_E_CHANGED_MODE};
    use crate::guid::Guid;
    use crate::vtable::AsioObject;

    /// Per-thread component runtime scope.
    ///
    /// Initializes the runtime on construction and tears it down on drop. The
    /// scope is tied to the creating thread, so it is neither `Send` nor `Sync`.
    pub struct ComRuntime {
        uninit_on_drop: bool,
        _thread_bound: PhantomData<*const ()>,
    }

    impl ComRuntime {
        /// Enter the runtime on the current thread
        pub fn initialize() -> Result<Self, ActivationError> {
            // SAFETY: reserved pointer must be null; paired with CoUninitialize in Drop
            let hr = unsafe { CoInitializeEx(ptr::null(), COINIT_APARTMENTTHREADED as _) };
            let uninit_on_drop = match hr {
                // S_OK and S_FALSE both take a reference on the runtime
                0 | 1 => true,
                hr if hr as u32 == RPC_E_CHANGED_MODE => {
                    tracing::warn!(target: "driver", "component runtime already in multithreaded mode");
                    false
                }
                hr => return Err(ActivationError::RuntimeInit(hr as u32)),
            };
            Ok(Self {
                uninit_on_drop,
                _thread_bound: PhantomData,
            })
        }

        /// Create an in-process driver instance
        pub fn create_instance(&self, clsid: &Guid) -> Result<NonNull<AsioObject>, ActivationError> {
            let mut instance: *mut c_void = ptr::null_mut();
            let id = (clsid as *const Guid).cast::<GUID>();
            // SAFETY: Guid is layout-compatible with GUID; out pointer is valid
            let hr = unsafe {
                CoCreateInstance(id, ptr::null_mut(), CLSCTX_INPROC_SERVER, id, &mut instance)
            };
            if hr < 0 {
                return Err(activation_error(hr));
            }
            NonNull::new(instance.cast::<AsioObject>()).ok_or(ActivationError::Incompatible)
        }
    }

    impl Drop for ComRuntime {
        fn drop(&mut self) {
            if self.uninit_on_drop {
                // SAFETY: balanced with the successful CoInitializeEx above
                unsafe { CoUninitialize() };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hresult_mapping() {
        assert_eq!(activation_error(REGDB_E_CLASSNOTREG as i32), ActivationError::NotFound);
        assert_eq!(activation_error(E_ACCESSDENIED as i32), ActivationError::AccessDenied);
        assert_eq!(activation_error(E_NOINTERFACE as i32), ActivationError::Incompatible);
        assert_eq!(
            activation_error(0x8000_4005_u32 as i32),
            ActivationError::Runtime(0x8000_4005)
        );
    }
}
