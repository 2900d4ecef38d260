//! Driver activation and instance lifetime
//!
//! A [`DriverInstance`] owns exactly one reference on a foreign driver object.
//! Cloning takes another reference; dropping gives one back.

use std::ffi::c_void;
use std::mem::ManuallyDrop;
use std::ptr::{self, NonNull};

use ah_core::driver_trace;
use ah_core::error::ActivationError;
use ah_ffi::{AsioObject, AsioVtbl, Guid};

use crate::dispatch::AsioDriver;

/// Turns an activation identifier into a live driver
pub trait Activator {
    type Driver: AsioDriver;

    /// Create a new driver instance holding one reference
    fn activate(&self, id: &Guid) -> Result<Self::Driver, ActivationError>;
}

/// Owned reference to a driver object
pub struct DriverInstance {
    ptr: NonNull<AsioObject>,
}

impl DriverInstance {
    /// Adopt a reference returned by the component runtime.
    ///
    /// # Safety
    /// `ptr` must point at a live driver object whose first word is a valid
    /// [`AsioVtbl`], and the caller must transfer one reference to the result.
    pub unsafe fn from_raw(ptr: NonNull<AsioObject>) -> Self {
        Self { ptr }
    }

    /// Raw object pointer, valid while `self` lives
    pub fn as_ptr(&self) -> *mut AsioObject {
        self.ptr.as_ptr()
    }

    pub(crate) fn vtbl(&self) -> &AsioVtbl {
        // SAFETY: from_raw guarantees a valid table for the object's lifetime
        unsafe { &*(*self.ptr.as_ptr()).vtbl }
    }

    /// Take an extra reference, returning the new count as the driver reports it.
    ///
    /// The extra reference is not tracked; balance it with [`Self::release_extra`].
    pub fn retain(&self) -> u32 {
        // SAFETY: the object is live while we hold our reference
        unsafe { (self.vtbl().add_ref)(self.as_ptr()) }
    }

    /// Give back a reference taken with [`Self::retain`].
    ///
    /// # Safety
    /// Must be paired with an earlier `retain` on this instance.
    pub unsafe fn release_extra(&self) -> u32 {
        (self.vtbl().release)(self.as_ptr())
    }

    /// Give back the owned reference, returning the remaining count
    pub fn release(self) -> u32 {
        let this = ManuallyDrop::new(self);
        // SAFETY: consumes the single reference this value owns
        unsafe { (this.vtbl().release)(this.as_ptr()) }
    }

    /// Ask the object whether it answers to `iid`.
    ///
    /// Only used for identity checks; any reference handed out is released
    /// before returning.
    pub fn supports(&self, iid: &Guid) -> bool {
        let mut out: *mut c_void = ptr::null_mut();
        // SAFETY: iid and out are valid for the duration of the call
        let hr = unsafe { (self.vtbl().query_interface)(self.as_ptr(), iid, &mut out) };
        if hr < 0 || out.is_null() {
            return false;
        }
        let other = out.cast::<AsioObject>();
        // SAFETY: a successful query hands us one reference on `other`
        unsafe { ((*(*other).vtbl).release)(other) };
        true
    }
}

impl Clone for DriverInstance {
    fn clone(&self) -> Self {
        self.retain();
        Self { ptr: self.ptr }
    }
}

impl Drop for DriverInstance {
    fn drop(&mut self) {
        // SAFETY: we own exactly one reference
        let remaining = unsafe { (self.vtbl().release)(self.as_ptr()) };
        driver_trace!("release -> {}", remaining);
    }
}

impl std::fmt::Debug for DriverInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverInstance").field("ptr", &self.ptr).finish()
    }
}

#[cfg(windows)]
pub use self::windows::ComActivator;

#[cfg(windows)]
mod windows {
    use ah_core::driver_debug;
    use ah_core::error::ActivationError;
    use ah_ffi::com::ComRuntime;
    use ah_ffi::Guid;

    use super::{Activator, DriverInstance};

    /// Activates installed drivers through the component runtime.
    ///
    /// Holds the runtime scope, so it must stay on the thread that created it
    /// and outlive every instance it produced.
    pub struct ComActivator {
        runtime: ComRuntime,
    }

    impl ComActivator {
        /// Enter the component runtime on the current thread
        pub fn new() -> Result<Self, ActivationError> {
            Ok(Self {
                runtime: ComRuntime::initialize()?,
            })
        }
    }

    impl Activator for ComActivator {
        type Driver = DriverInstance;

        fn activate(&self, id: &Guid) -> Result<DriverInstance, ActivationError> {
            driver_debug!("activating {}", id);
            let ptr = self.runtime.create_instance(id)?;
            // SAFETY: creation hands back one reference on a driver object
            Ok(unsafe { DriverInstance::from_raw(ptr) })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::null::{NullActivator, NullDriverConfig, NULL_DRIVER_ID};

    #[test]
    fn test_clone_and_drop_balance_references() {
        let activator = NullActivator::new(NullDriverConfig::default());
        let handle = activator.handle();

        let instance = activator.activate(&NULL_DRIVER_ID).unwrap();
        assert_eq!(handle.live_refs(), 1);

        let second = instance.clone();
        assert_eq!(handle.live_refs(), 2);
        drop(second);
        assert_eq!(handle.live_refs(), 1);

        assert_eq!(instance.release(), 0);
        assert_eq!(handle.live_refs(), 0);
        assert_eq!(handle.instances(), 0);
    }

    #[test]
    fn test_retain_release_extra() {
        let activator = NullActivator::new(NullDriverConfig::default());
        let instance = activator.activate(&NULL_DRIVER_ID).unwrap();
        assert_eq!(instance.retain(), 2);
        assert_eq!(unsafe { instance.release_extra() }, 1);
        drop(instance);
        assert_eq!(activator.handle().live_refs(), 0);
    }

    #[test]
    fn test_identity_query() {
        let activator = NullActivator::new(NullDriverConfig::default());
        let instance = activator.activate(&NULL_DRIVER_ID).unwrap();
        assert!(instance.supports(&NULL_DRIVER_ID));
        assert!(!instance.supports(&Guid::from_fields(1, 2, 3, [4; 8])));
        assert_eq!(activator.handle().live_refs(), 1);
    }

    #[test]
    fn test_unknown_id_not_found() {
        let activator = NullActivator::new(NullDriverConfig::default());
        let err = activator.activate(&Guid::default()).unwrap_err();
        assert_eq!(err, ActivationError::NotFound);
    }
}
