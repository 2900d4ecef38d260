//! Calling conventions of the driver contract
//!
//! On 32-bit Windows the generic triad uses `stdcall` and the driver entry
//! points use `thiscall` (MSVC member functions). Everywhere else a single
//! convention applies. Realtime callbacks are always `cdecl`.

/// Type of a generic triad slot (`query_interface`, `add_ref`, `release`)
#[cfg(all(windows, target_arch = "x86"))]
#[macro_export]
macro_rules! com_fn {
    (fn($($arg:ty),* $(,)?) $(-> $ret:ty)?) => {
        unsafe extern "stdcall" fn($($arg),*) $(-> $ret)?
    };
}

/// Type of a generic triad slot (`query_interface`, `add_ref`, `release`)
#[cfg(not(all(windows, target_arch = "x86")))]
#[macro_export]
macro_rules! com_fn {
    (fn($($arg:ty),* $(,)?) $(-> $ret:ty)?) => {
        unsafe extern "C" fn($($arg),*) $(-> $ret)?
    };
}

/// Type of a driver entry point slot
#[cfg(all(windows, target_arch = "x86"))]
#[macro_export]
macro_rules! vtbl_fn {
    (fn($($arg:ty),* $(,)?) $(-> $ret:ty)?) => {
        unsafe extern "thiscall" fn($($arg),*) $(-> $ret)?
    };
}

/// Type of a driver entry point slot
#[cfg(not(all(windows, target_arch = "x86")))]
#[macro_export]
macro_rules! vtbl_fn {
    (fn($($arg:ty),* $(,)?) $(-> $ret:ty)?) => {
        unsafe extern "C" fn($($arg),*) $(-> $ret)?
    };
}

/// Define a function with the generic triad's calling convention
#[cfg(all(windows, target_arch = "x86"))]
#[macro_export]
macro_rules! com_entry {
    ($(#[$meta:meta])* $vis:vis unsafe fn $name:ident($($arg:ident: $ty:ty),* $(,)?) $(-> $ret:ty)? $body:block) => {
        $(#[$meta])* $vis unsafe extern "stdcall" fn $name($($arg: $ty),*) $(-> $ret)? $body
    };
}

/// Define a function with the generic triad's calling convention
#[cfg(not(all(windows, target_arch = "x86")))]
#[macro_export]
macro_rules! com_entry {
    ($(#[$meta:meta])* $vis:vis unsafe fn $name:ident($($arg:ident: $ty:ty),* $(,)?) $(-> $ret:ty)? $body:block) => {
        $(#[$meta])* $vis unsafe extern "C" fn $name($($arg: $ty),*) $(-> $ret)? $body
    };
}

/// Define a function with the driver entry point calling convention
#[cfg(all(windows, target_arch = "x86"))]
#[macro_export]
macro_rules! vtbl_entry {
    ($(#[$meta:meta])* $vis:vis unsafe fn $name:ident($($arg:ident: $ty:ty),* $(,)?) $(-> $ret:ty)? $body:block) => {
        $(#[$meta])* $vis unsafe extern "thiscall" fn $name($($arg: $ty),*) $(-> $ret)? $body
    };
}

/// Define a function with the driver entry point calling convention
#[cfg(not(all(windows, target_arch = "x86")))]
#[macro_export]
macro_rules! vtbl_entry {
    ($(#[$meta:meta])* $vis:vis unsafe fn $name:ident($($arg:ident: $ty:ty),* $(,)?) $(-> $ret:ty)? $body:block) => {
        $(#[$meta])* $vis unsafe extern "C" fn $name($($arg: $ty),*) $(-> $ret)? $body
    };
}

/// Sample-rate argument of `can_sample_rate` / `set_sample_rate`.
///
/// Passed by reference unless the `rate-by-value` feature selects the C++
/// SDK's by-value declaration.
#[cfg(not(feature = "rate-by-value"))]
pub type RateArg = *const f64;

/// Sample-rate argument of `can_sample_rate` / `set_sample_rate`.
#[cfg(feature = "rate-by-value")]
pub type RateArg = f64;

/// Marshal a rate for a call. The reference must outlive the call.
#[cfg(not(feature = "rate-by-value"))]
#[inline]
pub fn rate_arg(rate: &f64) -> RateArg {
    rate as *const f64
}

/// Marshal a rate for a call.
#[cfg(feature = "rate-by-value")]
#[inline]
pub fn rate_arg(rate: &f64) -> RateArg {
    *rate
}

/// Read a rate on the driver side of a call.
///
/// # Safety
/// `arg` must come from [`rate_arg`] for a call that is still in progress.
#[cfg(not(feature = "rate-by-value"))]
#[inline]
pub unsafe fn read_rate_arg(arg: RateArg) -> f64 {
    if arg.is_null() {
        0.0
    } else {
        *arg
    }
}

/// Read a rate on the driver side of a call.
///
/// # Safety
/// Always safe for by-value passing; kept `unsafe` for signature parity.
#[cfg(feature = "rate-by-value")]
#[inline]
pub unsafe fn read_rate_arg(arg: RateArg) -> f64 {
    arg
}
