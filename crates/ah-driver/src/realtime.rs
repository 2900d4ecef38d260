//! Realtime buffer exchange
//!
//! Drivers call back on their own high-priority thread with no user-data
//! argument, so the active session's state lives behind a process-wide slot.
//! The trampolines here never lock, allocate, or log. Anything that needs the
//! control thread goes through a bounded lock-free queue instead.

use std::cell::UnsafeCell;
use std::ffi::c_void;
use std::hint;
use std::ptr::{self, NonNull};
use std::slice;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;

use ah_core::error::SessionError;
use ah_core::realtime_debug;
use ah_ffi::types::{message, AsioBool, AsioTime, Callbacks, TimeInfoFlags, ASIO_FALSE};
use ah_ffi::SampleType;
use bytemuck::Pod;
use crossbeam::queue::ArrayQueue;

use crate::dispatch::Direction;

/// Version reported for the engine-version message
pub const ENGINE_VERSION: i32 = 2;

/// Callback table handed to drivers; every entry forwards to the active slot
pub static CALLBACKS: Callbacks = Callbacks {
    buffer_switch: on_buffer_switch,
    sample_rate_did_change: on_sample_rate_did_change,
    asio_message: on_asio_message,
    buffer_switch_time_info: on_buffer_switch_time_info,
};

static ACTIVE: AtomicPtr<RealtimeContext> = AtomicPtr::new(ptr::null_mut());
static IN_FLIGHT: AtomicUsize = AtomicUsize::new(0);

#[cfg(test)]
pub(crate) static SLOT_LOCK: parking_lot::Mutex<()> = parking_lot::const_mutex(());

/// Whether a session currently owns the callback slot
pub fn slot_in_use() -> bool {
    !ACTIVE.load(Ordering::SeqCst).is_null()
}

/// Host-side work done on every buffer switch.
///
/// Runs on the driver's realtime thread. Implementations must not block,
/// allocate, or take locks.
pub trait BufferSwitchHandler: Send {
    fn buffer_switch(&mut self, buffers: &mut SwitchBuffers<'_>, info: &SwitchInfo);
}

impl<F> BufferSwitchHandler for F
where
    F: FnMut(&mut SwitchBuffers<'_>, &SwitchInfo) + Send,
{
    fn buffer_switch(&mut self, buffers: &mut SwitchBuffers<'_>, info: &SwitchInfo) {
        self(buffers, info)
    }
}

/// Timing that accompanied a time-info buffer switch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeInfo {
    pub sample_position: Option<u64>,
    pub system_time_ns: Option<u64>,
    pub sample_rate: Option<f64>,
    pub speed: Option<f64>,
    pub flags: TimeInfoFlags,
}

impl TimeInfo {
    fn from_raw(time: &AsioTime) -> Self {
        let info = time.time_info;
        let flags = TimeInfoFlags::from_bits_truncate(info.flags);
        let valid = |flag| flags.contains(flag);
        let position = { info.sample_position };
        let stamp = { info.system_time };
        Self {
            sample_position: valid(TimeInfoFlags::SAMPLE_POSITION_VALID).then(|| position.to_u64()),
            system_time_ns: valid(TimeInfoFlags::SYSTEM_TIME_VALID).then(|| stamp.to_u64()),
            sample_rate: valid(TimeInfoFlags::SAMPLE_RATE_VALID).then_some(info.sample_rate),
            speed: valid(TimeInfoFlags::SPEED_VALID).then_some(info.speed),
            flags,
        }
    }
}

/// Per-switch parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwitchInfo {
    /// Half of each double buffer the host owns during this call
    pub half: usize,
    /// The driver calls from its interrupt path rather than a deferred thread
    pub direct_process: bool,
    /// Present when the driver uses the time-info switch
    pub time: Option<TimeInfo>,
}

/// Which switch callback the driver settled on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchMode {
    Plain,
    TimeInfo,
}

/// Notification raised by the driver outside the buffer switch
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DriverEvent {
    /// Rate changed under the host; `None` when the driver reports it as unknown
    SampleRateChanged(Option<f64>),
    /// Driver needs the host to tear down and rebuild the stream
    ResetRequest,
    /// Driver lost sync and wants the host to resynchronize
    ResyncRequest,
    LatenciesChanged,
    Overload,
}

/// One channel's double buffer as returned by the driver
#[derive(Debug, Clone, Copy)]
pub struct ChannelBuffer {
    pub direction: Direction,
    pub channel: i32,
    pub sample_type: SampleType,
    halves: [NonNull<u8>; 2],
    half_bytes: usize,
}

// SAFETY: the addresses are plain memory owned by the driver until dispose;
// access is confined to the switch callback
unsafe impl Send for ChannelBuffer {}
unsafe impl Sync for ChannelBuffer {}

impl ChannelBuffer {
    /// Describe a driver buffer pair; `None` if either address is null
    pub(crate) fn new(
        direction: Direction,
        channel: i32,
        sample_type: SampleType,
        buffers: [*mut c_void; 2],
        half_bytes: usize,
    ) -> Option<Self> {
        Some(Self {
            direction,
            channel,
            sample_type,
            halves: [
                NonNull::new(buffers[0].cast())?,
                NonNull::new(buffers[1].cast())?,
            ],
            half_bytes,
        })
    }
}

/// The host's half of every channel for one buffer switch
pub struct SwitchBuffers<'a> {
    channels: &'a [ChannelBuffer],
    half: usize,
    frames: usize,
}

impl SwitchBuffers<'_> {
    /// Frames per half
    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// View of the channel at `index`, in descriptor order
    pub fn channel(&mut self, index: usize) -> Option<ChannelHalf<'_>> {
        let buffer = self.channels.get(index)?;
        // SAFETY: exclusive borrow of self covers the returned view
        Some(unsafe { ChannelHalf::new(buffer, self.half) })
    }

    /// Views of every channel
    pub fn iter_mut(&mut self) -> impl Iterator<Item = ChannelHalf<'_>> + '_ {
        let half = self.half;
        // SAFETY: each channel's half is a distinct allocation
        self.channels
            .iter()
            .map(move |buffer| unsafe { ChannelHalf::new(buffer, half) })
    }

    /// Views of the output channels
    pub fn outputs(&mut self) -> impl Iterator<Item = ChannelHalf<'_>> + '_ {
        self.iter_mut().filter(|c| c.direction() == Direction::Output)
    }

    /// Views of the input channels
    pub fn inputs(&mut self) -> impl Iterator<Item = ChannelHalf<'_>> + '_ {
        self.iter_mut().filter(|c| c.direction() == Direction::Input)
    }
}

/// One channel's half for the current switch
pub struct ChannelHalf<'a> {
    buffer: &'a ChannelBuffer,
    data: &'a mut [u8],
}

impl<'a> ChannelHalf<'a> {
    /// # Safety
    /// The half must be owned by the host for `'a` and not otherwise aliased.
    unsafe fn new(buffer: &'a ChannelBuffer, half: usize) -> Self {
        let data = slice::from_raw_parts_mut(buffer.halves[half].as_ptr(), buffer.half_bytes);
        Self { buffer, data }
    }

    pub fn direction(&self) -> Direction {
        self.buffer.direction
    }

    pub fn channel(&self) -> i32 {
        self.buffer.channel
    }

    pub fn sample_type(&self) -> SampleType {
        self.buffer.sample_type
    }

    pub fn bytes(&self) -> &[u8] {
        self.data
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        self.data
    }

    /// Typed view of the samples; `None` if `T` does not tile the buffer
    pub fn samples<T: Pod>(&self) -> Option<&[T]> {
        bytemuck::try_cast_slice(self.data).ok()
    }

    /// Mutable typed view of the samples; `None` if `T` does not tile the buffer
    pub fn samples_mut<T: Pod>(&mut self) -> Option<&mut [T]> {
        bytemuck::try_cast_slice_mut(self.data).ok()
    }

    /// Zero the half
    pub fn silence(&mut self) {
        self.data.fill(0);
    }
}

#[derive(Debug, Default)]
struct Stats {
    switches: AtomicU64,
    overlapped: AtomicU64,
    dropped_events: AtomicU64,
    mode: AtomicU8,
}

const MODE_NONE: u8 = 0;
const MODE_PLAIN: u8 = 1;
const MODE_TIME_INFO: u8 = 2;

/// Counters kept by the realtime path
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RealtimeStats {
    /// Buffer switches delivered to the handler
    pub switches: u64,
    /// Switches skipped because the handler was still running
    pub overlapped: u64,
    /// Events lost to a full queue
    pub dropped_events: u64,
}

/// Everything the trampolines can reach for one session
pub(crate) struct RealtimeContext {
    handler: UnsafeCell<Box<dyn BufferSwitchHandler>>,
    busy: AtomicBool,
    channels: OnceLock<Box<[ChannelBuffer]>>,
    frames: usize,
    time_info: bool,
    events: ArrayQueue<DriverEvent>,
    stats: Stats,
}

// SAFETY: the handler cell is only touched by the switch path, which the busy
// flag keeps exclusive; everything else is atomic or set-once
unsafe impl Sync for RealtimeContext {}

impl RealtimeContext {
    pub(crate) fn new(
        handler: Box<dyn BufferSwitchHandler>,
        frames: usize,
        time_info: bool,
        event_capacity: usize,
    ) -> Self {
        Self {
            handler: UnsafeCell::new(handler),
            busy: AtomicBool::new(false),
            channels: OnceLock::new(),
            frames,
            time_info,
            events: ArrayQueue::new(event_capacity.max(1)),
            stats: Stats::default(),
        }
    }

    /// Publish the buffer addresses; switches before this are ignored
    pub(crate) fn set_channels(&self, channels: Vec<ChannelBuffer>) {
        let _ = self.channels.set(channels.into_boxed_slice());
    }

    pub(crate) fn channels(&self) -> &[ChannelBuffer] {
        self.channels.get().map_or(&[], |c| c)
    }

    pub(crate) fn pop_event(&self) -> Option<DriverEvent> {
        self.events.pop()
    }

    pub(crate) fn stats(&self) -> RealtimeStats {
        RealtimeStats {
            switches: self.stats.switches.load(Ordering::Relaxed),
            overlapped: self.stats.overlapped.load(Ordering::Relaxed),
            dropped_events: self.stats.dropped_events.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn switch_mode(&self) -> Option<SwitchMode> {
        match self.stats.mode.load(Ordering::Relaxed) {
            MODE_PLAIN => Some(SwitchMode::Plain),
            MODE_TIME_INFO => Some(SwitchMode::TimeInfo),
            _ => None,
        }
    }

    fn push_event(&self, event: DriverEvent) {
        if self.events.push(event).is_err() {
            self.stats.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn switch(&self, index: i32, direct: AsioBool, time: Option<TimeInfo>) {
        let half = match index {
            0 => 0,
            1 => 1,
            _ => return,
        };
        let mode = if time.is_some() { MODE_TIME_INFO } else { MODE_PLAIN };
        let _ = self.stats.mode.compare_exchange(
            MODE_NONE,
            mode,
            Ordering::Relaxed,
            Ordering::Relaxed,
        );

        let Some(channels) = self.channels.get() else {
            return;
        };
        if self.busy.swap(true, Ordering::Acquire) {
            self.stats.overlapped.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let mut buffers = SwitchBuffers {
            channels,
            half,
            frames: self.frames,
        };
        let info = SwitchInfo {
            half,
            direct_process: direct != ASIO_FALSE,
            time,
        };
        // SAFETY: the busy flag grants exclusive access to the handler
        unsafe { (*self.handler.get()).buffer_switch(&mut buffers, &info) };

        self.busy.store(false, Ordering::Release);
        self.stats.switches.fetch_add(1, Ordering::Relaxed);
    }
}

/// Answer a driver message.
///
/// Notifications are queued for the control thread; capability probes are
/// answered directly. Without an active session only the engine version is
/// answered.
pub(crate) fn handle_message(ctx: Option<&RealtimeContext>, selector: i32, value: i32) -> i32 {
    if selector == message::ENGINE_VERSION {
        return ENGINE_VERSION;
    }
    let Some(ctx) = ctx else {
        return 0;
    };

    let queue = |event| {
        ctx.push_event(event);
        1
    };
    match selector {
        message::SELECTOR_SUPPORTED => match value {
            message::ENGINE_VERSION
            | message::RESET_REQUEST
            | message::RESYNC_REQUEST
            | message::LATENCIES_CHANGED
            | message::OVERLOAD => 1,
            message::SUPPORTS_TIME_INFO => i32::from(ctx.time_info),
            _ => 0,
        },
        message::SUPPORTS_TIME_INFO => i32::from(ctx.time_info),
        message::RESET_REQUEST => queue(DriverEvent::ResetRequest),
        message::RESYNC_REQUEST => queue(DriverEvent::ResyncRequest),
        message::LATENCIES_CHANGED => queue(DriverEvent::LatenciesChanged),
        message::OVERLOAD => queue(DriverEvent::Overload),
        _ => 0,
    }
}

struct InFlight;

impl InFlight {
    fn enter() -> Self {
        IN_FLIGHT.fetch_add(1, Ordering::SeqCst);
        Self
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        IN_FLIGHT.fetch_sub(1, Ordering::SeqCst);
    }
}

fn with_active<R>(f: impl FnOnce(Option<&RealtimeContext>) -> R) -> R {
    let _guard = InFlight::enter();
    // SAFETY: Registration::drop clears the slot and then waits for IN_FLIGHT
    // to drain before freeing, so a pointer loaded after entering stays valid
    let ctx = unsafe { ACTIVE.load(Ordering::SeqCst).as_ref() };
    f(ctx)
}

unsafe extern "C" fn on_buffer_switch(double_buffer_index: i32, direct_process: AsioBool) {
    with_active(|ctx| {
        if let Some(ctx) = ctx {
            ctx.switch(double_buffer_index, direct_process, None);
        }
    });
}

unsafe extern "C" fn on_buffer_switch_time_info(
    params: *mut AsioTime,
    double_buffer_index: i32,
    direct_process: AsioBool,
) -> *mut AsioTime {
    let time = if params.is_null() {
        TimeInfo {
            sample_position: None,
            system_time_ns: None,
            sample_rate: None,
            speed: None,
            flags: TimeInfoFlags::empty(),
        }
    } else {
        TimeInfo::from_raw(&ptr::read_unaligned(params))
    };
    with_active(|ctx| {
        if let Some(ctx) = ctx {
            ctx.switch(double_buffer_index, direct_process, Some(time));
        }
    });
    params
}

unsafe extern "C" fn on_sample_rate_did_change(rate: f64) {
    with_active(|ctx| {
        if let Some(ctx) = ctx {
            let rate = (rate > 0.0).then_some(rate);
            ctx.push_event(DriverEvent::SampleRateChanged(rate));
        }
    });
}

unsafe extern "C" fn on_asio_message(
    selector: i32,
    value: i32,
    _message: *mut c_void,
    _opt: *mut f64,
) -> i32 {
    with_active(|ctx| handle_message(ctx, selector, value))
}

/// Ownership of the callback slot for one session
pub(crate) struct Registration {
    ctx: NonNull<RealtimeContext>,
}

impl Registration {
    /// Claim the slot for `ctx`
    pub(crate) fn install(ctx: RealtimeContext) -> Result<Self, SessionError> {
        let raw = Box::into_raw(Box::new(ctx));
        match ACTIVE.compare_exchange(ptr::null_mut(), raw, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => {
                realtime_debug!("callback slot claimed");
                // SAFETY: raw came from Box::into_raw
                Ok(Self {
                    ctx: unsafe { NonNull::new_unchecked(raw) },
                })
            }
            Err(_) => {
                // SAFETY: never published, so still exclusively ours
                drop(unsafe { Box::from_raw(raw) });
                Err(SessionError::CallbackSlotBusy)
            }
        }
    }

    pub(crate) fn context(&self) -> &RealtimeContext {
        // SAFETY: freed only in drop
        unsafe { self.ctx.as_ref() }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        let _ = ACTIVE.compare_exchange(
            self.ctx.as_ptr(),
            ptr::null_mut(),
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        let mut spins = 0u32;
        while IN_FLIGHT.load(Ordering::SeqCst) != 0 {
            if spins < 64 {
                hint::spin_loop();
            } else {
                thread::yield_now();
            }
            spins = spins.saturating_add(1);
        }
        // SAFETY: unpublished and no callback is inside the slot any more
        drop(unsafe { Box::from_raw(self.ctx.as_ptr()) });
        realtime_debug!("callback slot released");
    }
}

struct HandoffShared<T> {
    queue: ArrayQueue<T>,
    dropped: AtomicU64,
}

/// Producer half of a bounded lock-free channel, safe to use in a handler
pub struct HandoffSender<T> {
    shared: Arc<HandoffShared<T>>,
}

/// Consumer half of a bounded lock-free channel
pub struct HandoffReceiver<T> {
    shared: Arc<HandoffShared<T>>,
}

/// Create a bounded channel for moving data out of (or into) the switch path
pub fn handoff<T>(capacity: usize) -> (HandoffSender<T>, HandoffReceiver<T>) {
    let shared = Arc::new(HandoffShared {
        queue: ArrayQueue::new(capacity.max(1)),
        dropped: AtomicU64::new(0),
    });
    (
        HandoffSender {
            shared: Arc::clone(&shared),
        },
        HandoffReceiver { shared },
    )
}

impl<T> HandoffSender<T> {
    /// Queue `value` without blocking; counts and discards it when full
    pub fn push(&self, value: T) -> bool {
        if self.shared.queue.push(value).is_ok() {
            true
        } else {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            false
        }
    }
}

impl<T> HandoffReceiver<T> {
    pub fn pop(&self) -> Option<T> {
        self.shared.queue.pop()
    }

    /// Everything queued so far
    pub fn drain(&self) -> impl Iterator<Item = T> + '_ {
        std::iter::from_fn(|| self.shared.queue.pop())
    }

    pub fn len(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.queue.is_empty()
    }

    /// Values discarded because the queue was full
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ah_ffi::types::{Samples, ASIO_TRUE};
    use bytemuck::Zeroable;

    fn context(time_info: bool) -> RealtimeContext {
        RealtimeContext::new(Box::new(|_: &mut SwitchBuffers<'_>, _: &SwitchInfo| {}), 4, time_info, 2)
    }

    #[test]
    fn test_message_probes() {
        let ctx = context(true);
        assert_eq!(handle_message(Some(&ctx), message::ENGINE_VERSION, 0), 2);
        assert_eq!(
            handle_message(Some(&ctx), message::SELECTOR_SUPPORTED, message::RESET_REQUEST),
            1
        );
        assert_eq!(
            handle_message(Some(&ctx), message::SELECTOR_SUPPORTED, message::SUPPORTS_TIME_INFO),
            1
        );
        assert_eq!(
            handle_message(Some(&ctx), message::SELECTOR_SUPPORTED, message::MMC_COMMAND),
            0
        );
        assert_eq!(handle_message(Some(&ctx), message::SUPPORTS_TIME_CODE, 0), 0);

        let plain = context(false);
        assert_eq!(handle_message(Some(&plain), message::SUPPORTS_TIME_INFO, 0), 0);
        assert_eq!(handle_message(None, message::RESET_REQUEST, 0), 0);
    }

    #[test]
    fn test_notifications_queue_events() {
        let ctx = context(false);
        assert_eq!(handle_message(Some(&ctx), message::RESET_REQUEST, 0), 1);
        assert_eq!(handle_message(Some(&ctx), message::OVERLOAD, 0), 1);
        assert_eq!(handle_message(Some(&ctx), message::LATENCIES_CHANGED, 0), 1);

        assert_eq!(ctx.pop_event(), Some(DriverEvent::ResetRequest));
        assert_eq!(ctx.pop_event(), Some(DriverEvent::Overload));
        assert_eq!(ctx.pop_event(), None);
        assert_eq!(ctx.stats().dropped_events, 1);
    }

    #[test]
    fn test_switch_before_channels_is_ignored() {
        let ctx = context(false);
        ctx.switch(0, ASIO_TRUE, None);
        assert_eq!(ctx.stats().switches, 0);
        assert_eq!(ctx.switch_mode(), Some(SwitchMode::Plain));
    }

    #[test]
    fn test_switch_hands_over_one_half() {
        let mut memory = [[0i32; 4]; 2];
        let buffers = [
            memory[0].as_mut_ptr().cast::<c_void>(),
            memory[1].as_mut_ptr().cast::<c_void>(),
        ];
        let (tx, rx) = handoff(8);
        let handler = move |buffers: &mut SwitchBuffers<'_>, info: &SwitchInfo| {
            for mut channel in buffers.outputs() {
                if let Some(samples) = channel.samples_mut::<i32>() {
                    samples.fill(info.half as i32 + 10);
                }
            }
            tx.push(info.half);
        };
        let ctx = RealtimeContext::new(Box::new(handler), 4, false, 4);
        ctx.set_channels(vec![ChannelBuffer::new(
            Direction::Output,
            0,
            SampleType::Int32Lsb,
            buffers,
            16,
        )
        .unwrap()]);

        ctx.switch(1, ASIO_TRUE, None);
        ctx.switch(2, ASIO_TRUE, None);
        assert_eq!(rx.drain().collect::<Vec<_>>(), vec![1]);
        assert_eq!(memory[0], [0; 4]);
        assert_eq!(memory[1], [11; 4]);
        assert_eq!(ctx.stats().switches, 1);
    }

    #[test]
    fn test_time_info_respects_validity_flags() {
        let mut time = AsioTime::zeroed();
        time.time_info.sample_position = Samples::from_u64(4096);
        time.time_info.sample_rate = 48000.0;
        time.time_info.flags =
            (TimeInfoFlags::SAMPLE_POSITION_VALID | TimeInfoFlags::SAMPLE_RATE_VALID).bits();
        let info = TimeInfo::from_raw(&time);
        assert_eq!(info.sample_position, Some(4096));
        assert_eq!(info.sample_rate, Some(48000.0));
        assert_eq!(info.system_time_ns, None);
        assert_eq!(info.speed, None);
    }

    #[test]
    fn test_slot_is_exclusive() {
        let _lock = SLOT_LOCK.lock();
        let first = Registration::install(context(false)).unwrap();
        assert!(slot_in_use());
        assert!(matches!(
            Registration::install(context(false)),
            Err(SessionError::CallbackSlotBusy)
        ));
        drop(first);
        assert!(!slot_in_use());
    }

    #[test]
    fn test_callbacks_without_session_are_inert() {
        let _lock = SLOT_LOCK.lock();
        unsafe {
            (CALLBACKS.buffer_switch)(0, ASIO_TRUE);
            (CALLBACKS.sample_rate_did_change)(48000.0);
            assert_eq!(
                (CALLBACKS.asio_message)(message::RESET_REQUEST, 0, ptr::null_mut(), ptr::null_mut()),
                0
            );
            assert!((CALLBACKS.buffer_switch_time_info)(ptr::null_mut(), 0, ASIO_TRUE).is_null());
        }
        assert_eq!(IN_FLIGHT.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_handoff_counts_overflow() {
        let (tx, rx) = handoff(2);
        assert!(tx.push(1));
        assert!(tx.push(2));
        assert!(!tx.push(3));
        assert_eq!(rx.dropped(), 1);
        assert_eq!(rx.drain().collect::<Vec<_>>(), vec![1, 2]);
        assert!(rx.is_empty());
    }
}
