//! Raw structures exchanged with drivers
//!
//! Field order and sizes are fixed by the driver contract. `long` is 32 bits on
//! every supported target, pointers are native width, and the time structures
//! are packed to 4-byte alignment.

use std::ffi::c_void;

use bitflags::bitflags;
use bytemuck::Zeroable;

/// Driver boolean (`long`)
pub type AsioBool = i32;
/// False
pub const ASIO_FALSE: AsioBool = 0;
/// True
pub const ASIO_TRUE: AsioBool = 1;

/// Size of the name and error-message buffers handed to the driver
pub const DRIVER_TEXT_LEN: usize = 128;
/// Size of the fixed name field in channel and clock records
pub const NAME_FIELD_LEN: usize = 32;

/// Convert a NUL-padded fixed field into text, truncating at the first zero
pub fn fixed_str(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Copy text into a NUL-padded fixed field, truncating so a terminator fits
pub fn write_fixed_str(field: &mut [u8], text: &str) {
    field.fill(0);
    let len = text.len().min(field.len().saturating_sub(1));
    field[..len].copy_from_slice(&text.as_bytes()[..len]);
}

/// 64-bit sample count split into two 32-bit halves
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Zeroable)]
pub struct Samples {
    pub hi: u32,
    pub lo: u32,
}

impl Samples {
    pub fn from_u64(value: u64) -> Self {
        Self {
            hi: (value >> 32) as u32,
            lo: value as u32,
        }
    }

    pub fn to_u64(self) -> u64 {
        (u64::from(self.hi) << 32) | u64::from(self.lo)
    }
}

/// 64-bit system time in nanoseconds, same split as [`Samples`]
pub type TimeStamp = Samples;

/// `ASIOChannelInfo`
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Zeroable)]
pub struct ChannelInfoRaw {
    /// In: channel index
    pub channel: i32,
    /// In: direction
    pub is_input: AsioBool,
    pub is_active: AsioBool,
    pub channel_group: i32,
    pub sample_type: i32,
    pub name: [u8; NAME_FIELD_LEN],
}

/// `ASIOBufferInfo`
#[repr(C)]
#[derive(Debug, Clone, Copy, Zeroable)]
pub struct BufferInfoRaw {
    /// In: direction
    pub is_input: AsioBool,
    /// In: channel index
    pub channel_num: i32,
    /// Out: double buffer addresses
    pub buffers: [*mut c_void; 2],
}

/// `ASIOClockSource`
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Zeroable)]
pub struct ClockSourceRaw {
    pub index: i32,
    pub associated_channel: i32,
    pub associated_group: i32,
    pub is_current_source: AsioBool,
    pub name: [u8; NAME_FIELD_LEN],
}

bitflags! {
    /// Validity flags of [`AsioTimeInfo`]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TimeInfoFlags: u32 {
        const SYSTEM_TIME_VALID     = 1;
        const SAMPLE_POSITION_VALID = 1 << 1;
        const SAMPLE_RATE_VALID     = 1 << 2;
        const SPEED_VALID           = 1 << 3;
        const SAMPLE_RATE_CHANGED   = 1 << 4;
        const CLOCK_SOURCE_CHANGED  = 1 << 5;
    }
}

bitflags! {
    /// Flags of [`AsioTimeCode`]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TimeCodeFlags: u32 {
        const VALID       = 1;
        const RUNNING     = 1 << 1;
        const REVERSE     = 1 << 2;
        const ONSPEED     = 1 << 3;
        const STILL       = 1 << 4;
        const SPEED_VALID = 1 << 8;
    }
}

/// `AsioTimeInfo`
#[repr(C, packed(4))]
#[derive(Debug, Clone, Copy, Zeroable)]
pub struct AsioTimeInfo {
    /// Absolute speed (1.0 = nominal)
    pub speed: f64,
    /// System time of the buffer switch, nanoseconds
    pub system_time: TimeStamp,
    /// Sample position at the start of the current half
    pub sample_position: Samples,
    pub sample_rate: f64,
    /// [`TimeInfoFlags`] bits
    pub flags: u32,
    pub reserved: [u8; 12],
}

/// `ASIOTimeCode`
#[repr(C, packed(4))]
#[derive(Debug, Clone, Copy, Zeroable)]
pub struct AsioTimeCode {
    pub speed: f64,
    pub time_code_samples: Samples,
    /// [`TimeCodeFlags`] bits
    pub flags: u32,
    pub future: [u8; 64],
}

/// `ASIOTime`, passed to and returned from the time-info buffer switch
#[repr(C, packed(4))]
#[derive(Debug, Clone, Copy, Zeroable)]
pub struct AsioTime {
    pub reserved: [i32; 4],
    pub time_info: AsioTimeInfo,
    pub time_code: AsioTimeCode,
}

const _: () = assert!(std::mem::size_of::<ChannelInfoRaw>() == 52);
const _: () = assert!(std::mem::size_of::<ClockSourceRaw>() == 48);
const _: () =
    assert!(std::mem::size_of::<BufferInfoRaw>() == 8 + 2 * std::mem::size_of::<usize>());
const _: () = assert!(std::mem::size_of::<AsioTimeInfo>() == 48);
const _: () = assert!(std::mem::size_of::<AsioTimeCode>() == 84);
const _: () = assert!(std::mem::size_of::<AsioTime>() == 148);

/// `ASIOCallbacks`: host functions the driver calls while buffers exist
#[repr(C)]
#[derive(Clone, Copy)]
pub struct Callbacks {
    pub buffer_switch: unsafe extern "C" fn(double_buffer_index: i32, direct_process: AsioBool),
    pub sample_rate_did_change: unsafe extern "C" fn(rate: f64),
    pub asio_message:
        unsafe extern "C" fn(selector: i32, value: i32, message: *mut c_void, opt: *mut f64) -> i32,
    pub buffer_switch_time_info: unsafe extern "C" fn(
        params: *mut AsioTime,
        double_buffer_index: i32,
        direct_process: AsioBool,
    ) -> *mut AsioTime,
}

const _: () = assert!(std::mem::size_of::<Callbacks>() == 4 * std::mem::size_of::<usize>());

/// Selectors of the host `asio_message` callback
pub mod message {
    pub const SELECTOR_SUPPORTED: i32 = 1;
    pub const ENGINE_VERSION: i32 = 2;
    pub const RESET_REQUEST: i32 = 3;
    pub const BUFFER_SIZE_CHANGE: i32 = 4;
    pub const RESYNC_REQUEST: i32 = 5;
    pub const LATENCIES_CHANGED: i32 = 6;
    pub const SUPPORTS_TIME_INFO: i32 = 7;
    pub const SUPPORTS_TIME_CODE: i32 = 8;
    pub const MMC_COMMAND: i32 = 9;
    pub const SUPPORTS_INPUT_MONITOR: i32 = 10;
    pub const SUPPORTS_INPUT_GAIN: i32 = 11;
    pub const SUPPORTS_INPUT_METER: i32 = 12;
    pub const SUPPORTS_OUTPUT_GAIN: i32 = 13;
    pub const SUPPORTS_OUTPUT_METER: i32 = 14;
    pub const OVERLOAD: i32 = 15;
}

/// Selectors of the driver `future` entry point
pub mod future {
    pub const ENABLE_TIME_CODE_READ: i32 = 1;
    pub const DISABLE_TIME_CODE_READ: i32 = 2;
    pub const SET_INPUT_MONITOR: i32 = 3;
    pub const TRANSPORT: i32 = 4;
    pub const SET_INPUT_GAIN: i32 = 5;
    pub const GET_INPUT_METER: i32 = 6;
    pub const SET_OUTPUT_GAIN: i32 = 7;
    pub const GET_OUTPUT_METER: i32 = 8;
    pub const CAN_INPUT_MONITOR: i32 = 9;
    pub const CAN_TIME_INFO: i32 = 10;
    pub const CAN_TIME_CODE: i32 = 11;
    pub const CAN_TRANSPORT: i32 = 12;
    pub const CAN_INPUT_GAIN: i32 = 13;
    pub const CAN_INPUT_METER: i32 = 14;
    pub const CAN_OUTPUT_GAIN: i32 = 15;
    pub const CAN_OUTPUT_METER: i32 = 16;
    pub const OPTIONAL_ONE: i32 = 17;
    pub const SET_IO_FORMAT: i32 = 0x2311_1961;
    pub const GET_IO_FORMAT: i32 = 0x2311_1983;
    pub const CAN_DO_IO_FORMAT: i32 = 0x2311_2004;
}

/// Sample encoding of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleType {
    Int16Msb,
    /// Packed 24-bit, also used for 20 bits
    Int24Msb,
    Int32Msb,
    Float32Msb,
    Float64Msb,
    /// 32-bit containers with the data aligned to 16/18/20/24 bits
    Int32Msb16,
    Int32Msb18,
    Int32Msb20,
    Int32Msb24,
    Int16Lsb,
    /// Packed 24-bit, also used for 20 bits
    Int24Lsb,
    Int32Lsb,
    Float32Lsb,
    Float64Lsb,
    Int32Lsb16,
    Int32Lsb18,
    Int32Lsb20,
    Int32Lsb24,
    /// DSD, 8 one-bit samples per byte, first sample in the least significant bit
    DsdInt8Lsb1,
    /// DSD, 8 one-bit samples per byte, first sample in the most significant bit
    DsdInt8Msb1,
    /// DSD, one 8-bit sample per byte
    DsdInt8Ner8,
    /// A value outside the catalog, preserved as reported
    Unknown(i32),
}

impl SampleType {
    /// Decode the driver's `ASIOSampleType` value
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            0 => Self::Int16Msb,
            1 => Self::Int24Msb,
            2 => Self::Int32Msb,
            3 => Self::Float32Msb,
            4 => Self::Float64Msb,
            8 => Self::Int32Msb16,
            9 => Self::Int32Msb18,
            10 => Self::Int32Msb20,
            11 => Self::Int32Msb24,
            16 => Self::Int16Lsb,
            17 => Self::Int24Lsb,
            18 => Self::Int32Lsb,
            19 => Self::Float32Lsb,
            20 => Self::Float64Lsb,
            24 => Self::Int32Lsb16,
            25 => Self::Int32Lsb18,
            26 => Self::Int32Lsb20,
            27 => Self::Int32Lsb24,
            32 => Self::DsdInt8Lsb1,
            33 => Self::DsdInt8Msb1,
            40 => Self::DsdInt8Ner8,
            other => Self::Unknown(other),
        }
    }

    /// Encode as the driver's `ASIOSampleType` value
    pub fn to_raw(self) -> i32 {
        match self {
            Self::Int16Msb => 0,
            Self::Int24Msb => 1,
            Self::Int32Msb => 2,
            Self::Float32Msb => 3,
            Self::Float64Msb => 4,
            Self::Int32Msb16 => 8,
            Self::Int32Msb18 => 9,
            Self::Int32Msb20 => 10,
            Self::Int32Msb24 => 11,
            Self::Int16Lsb => 16,
            Self::Int24Lsb => 17,
            Self::Int32Lsb => 18,
            Self::Float32Lsb => 19,
            Self::Float64Lsb => 20,
            Self::Int32Lsb16 => 24,
            Self::Int32Lsb18 => 25,
            Self::Int32Lsb20 => 26,
            Self::Int32Lsb24 => 27,
            Self::DsdInt8Lsb1 => 32,
            Self::DsdInt8Msb1 => 33,
            Self::DsdInt8Ner8 => 40,
            Self::Unknown(raw) => raw,
        }
    }

    /// Bytes occupied by one frame of one channel, if known
    pub fn bytes_per_sample(self) -> Option<usize> {
        match self {
            Self::Int16Msb | Self::Int16Lsb => Some(2),
            Self::Int24Msb | Self::Int24Lsb => Some(3),
            Self::Float64Msb | Self::Float64Lsb => Some(8),
            Self::DsdInt8Lsb1 | Self::DsdInt8Msb1 | Self::DsdInt8Ner8 => Some(1),
            Self::Unknown(_) => None,
            _ => Some(4),
        }
    }

    /// Whether samples are stored big-endian
    pub fn is_big_endian(self) -> bool {
        matches!(
            self,
            Self::Int16Msb
                | Self::Int24Msb
                | Self::Int32Msb
                | Self::Float32Msb
                | Self::Float64Msb
                | Self::Int32Msb16
                | Self::Int32Msb18
                | Self::Int32Msb20
                | Self::Int32Msb24
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_str_truncates_at_nul() {
        let mut field = [0u8; NAME_FIELD_LEN];
        field[..6].copy_from_slice(b"Mic In");
        assert_eq!(fixed_str(&field), "Mic In");

        let full = [b'A'; NAME_FIELD_LEN];
        assert_eq!(fixed_str(&full).len(), NAME_FIELD_LEN);

        let mut early = [b'x'; 8];
        early[2] = 0;
        assert_eq!(fixed_str(&early), "xx");
    }

    #[test]
    fn test_write_fixed_str_keeps_terminator() {
        let mut field = [0xFFu8; 8];
        write_fixed_str(&mut field, "Speakers Out");
        assert_eq!(&field[..7], b"Speaker");
        assert_eq!(field[7], 0);
        assert_eq!(fixed_str(&field), "Speaker");
    }

    #[test]
    fn test_samples_split() {
        let value = 0x0000_0012_3456_789A_u64;
        let split = Samples::from_u64(value);
        assert_eq!(split.hi, 0x12);
        assert_eq!(split.lo, 0x3456_789A);
        assert_eq!(split.to_u64(), value);
    }

    #[test]
    fn test_sample_type_catalog() {
        assert_eq!(SampleType::from_raw(18), SampleType::Int32Lsb);
        assert_eq!(SampleType::Int32Lsb.bytes_per_sample(), Some(4));
        assert_eq!(SampleType::from_raw(17).bytes_per_sample(), Some(3));
        assert_eq!(SampleType::Float64Lsb.bytes_per_sample(), Some(8));
        assert!(SampleType::Float32Msb.is_big_endian());
        assert!(!SampleType::Float32Lsb.is_big_endian());

        let odd = SampleType::from_raw(99);
        assert_eq!(odd, SampleType::Unknown(99));
        assert_eq!(odd.to_raw(), 99);
        assert_eq!(odd.bytes_per_sample(), None);
        for raw in [5, 6, 7, 12, 15] {
            assert!(!SampleType::from_raw(raw).is_big_endian(), "raw {raw}");
        }
        assert!(SampleType::from_raw(11).is_big_endian());

        for raw in (0..=4).chain(8..=11).chain(16..=20).chain(24..=27).chain([32, 33, 40]) {
            assert_eq!(SampleType::from_raw(raw).to_raw(), raw);
        }
    }

    #[test]
    fn test_time_field_offsets() {
        let time = AsioTime::zeroed();
        let base = std::ptr::addr_of!(time) as usize;
        assert_eq!(std::ptr::addr_of!(time.time_info) as usize - base, 16);
        assert_eq!(std::ptr::addr_of!(time.time_info.sample_rate) as usize - base, 40);
        assert_eq!(std::ptr::addr_of!(time.time_code) as usize - base, 64);
    }
}
