//! Driver dispatch table
//!
//! A driver instance is a pointer to an object whose first word points at this
//! table. The generic triad comes first, then the driver entry points in their
//! fixed order. Slot order is the binary contract: never reorder.

use std::ffi::{c_char, c_void};

use crate::abi::RateArg;
use crate::guid::Guid;
use crate::types::{AsioBool, BufferInfoRaw, Callbacks, ChannelInfoRaw, ClockSourceRaw, Samples, TimeStamp};

/// A driver instance as seen through its first word
#[repr(C)]
pub struct AsioObject {
    pub vtbl: *const AsioVtbl,
}

/// Full dispatch table of a driver instance
#[repr(C)]
pub struct AsioVtbl {
    pub query_interface:
        crate::com_fn!(fn(*mut AsioObject, *const Guid, *mut *mut c_void) -> i32),
    pub add_ref: crate::com_fn!(fn(*mut AsioObject) -> u32),
    pub release: crate::com_fn!(fn(*mut AsioObject) -> u32),

    pub init: crate::vtbl_fn!(fn(*mut AsioObject, *mut c_void) -> AsioBool),
    pub get_driver_name: crate::vtbl_fn!(fn(*mut AsioObject, *mut c_char)),
    pub get_driver_version: crate::vtbl_fn!(fn(*mut AsioObject) -> i32),
    pub get_error_message: crate::vtbl_fn!(fn(*mut AsioObject, *mut c_char)),
    pub start: crate::vtbl_fn!(fn(*mut AsioObject) -> i32),
    pub stop: crate::vtbl_fn!(fn(*mut AsioObject) -> i32),
    pub get_channels: crate::vtbl_fn!(fn(*mut AsioObject, *mut i32, *mut i32) -> i32),
    pub get_latencies: crate::vtbl_fn!(fn(*mut AsioObject, *mut i32, *mut i32) -> i32),
    pub get_buffer_size:
        crate::vtbl_fn!(fn(*mut AsioObject, *mut i32, *mut i32, *mut i32, *mut i32) -> i32),
    pub can_sample_rate: crate::vtbl_fn!(fn(*mut AsioObject, RateArg) -> i32),
    pub get_sample_rate: crate::vtbl_fn!(fn(*mut AsioObject, *mut f64) -> i32),
    pub set_sample_rate: crate::vtbl_fn!(fn(*mut AsioObject, RateArg) -> i32),
    pub get_clock_sources:
        crate::vtbl_fn!(fn(*mut AsioObject, *mut ClockSourceRaw, *mut i32) -> i32),
    pub set_clock_source: crate::vtbl_fn!(fn(*mut AsioObject, i32) -> i32),
    pub get_sample_position:
        crate::vtbl_fn!(fn(*mut AsioObject, *mut Samples, *mut TimeStamp) -> i32),
    pub get_channel_info: crate::vtbl_fn!(fn(*mut AsioObject, *mut ChannelInfoRaw) -> i32),
    pub create_buffers: crate::vtbl_fn!(fn(
        *mut AsioObject,
        *mut BufferInfoRaw,
        i32,
        i32,
        *const Callbacks,
    ) -> i32),
    pub dispose_buffers: crate::vtbl_fn!(fn(*mut AsioObject) -> i32),
    pub control_panel: crate::vtbl_fn!(fn(*mut AsioObject) -> i32),
    pub future: crate::vtbl_fn!(fn(*mut AsioObject, i32, *mut c_void) -> i32),
    pub output_ready: crate::vtbl_fn!(fn(*mut AsioObject) -> i32),
}

/// Number of slots in [`AsioVtbl`]
pub const ASIO_VTBL_SLOTS: usize = 3 + 21;

const _: () =
    assert!(std::mem::size_of::<AsioVtbl>() == ASIO_VTBL_SLOTS * std::mem::size_of::<usize>());

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::offset_of;

    fn slot(offset: usize) -> usize {
        offset / std::mem::size_of::<usize>()
    }

    #[test]
    fn test_slot_order() {
        assert_eq!(slot(offset_of!(AsioVtbl, release)), 2);
        assert_eq!(slot(offset_of!(AsioVtbl, init)), 3);
        assert_eq!(slot(offset_of!(AsioVtbl, start)), 7);
        assert_eq!(slot(offset_of!(AsioVtbl, get_buffer_size)), 11);
        assert_eq!(slot(offset_of!(AsioVtbl, get_channel_info)), 18);
        assert_eq!(slot(offset_of!(AsioVtbl, create_buffers)), 19);
        assert_eq!(slot(offset_of!(AsioVtbl, output_ready)), 23);
    }
}
