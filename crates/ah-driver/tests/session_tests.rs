//! End-to-end streaming through the software driver

use std::time::{Duration, Instant};

use ah_core::error::SessionError;
use ah_driver::null::{NullActivator, NullClock, NullDriverConfig};
use ah_driver::realtime::{handoff, slot_in_use, SwitchMode};
use ah_driver::{
    BufferDescriptor, Direction, DriverDescriptor, DriverEvent, Session, SessionOptions,
    SessionState, SwitchBuffers, SwitchInfo,
};
use ah_ffi::guid::Guid;
use ah_ffi::types::message;
use parking_lot::Mutex;

// Sessions in one process share the realtime callback slot
static SLOT: Mutex<()> = parking_lot::const_mutex(());

/// One buffer switch as seen by the handler
#[derive(Debug, Clone, Copy)]
struct Switch {
    half: usize,
    written: i32,
    heard: i32,
    position: Option<u64>,
}

/// Writes a running switch count to every output and reports input 0
fn counting_handler(
    tx: ah_driver::realtime::HandoffSender<Switch>,
) -> impl FnMut(&mut SwitchBuffers<'_>, &SwitchInfo) + Send {
    let mut count = 0;
    move |buffers: &mut SwitchBuffers<'_>, info: &SwitchInfo| {
        count += 1;
        let mut heard = -1;
        for mut channel in buffers.iter_mut() {
            match channel.direction() {
                Direction::Input if channel.channel() == 0 => {
                    heard = channel.samples::<i32>().map_or(-1, |s| s[0]);
                }
                Direction::Input => {}
                Direction::Output => {
                    if let Some(samples) = channel.samples_mut::<i32>() {
                        samples.fill(count);
                    }
                }
            }
        }
        tx.push(Switch {
            half: info.half,
            written: count,
            heard,
            position: info.time.and_then(|t| t.sample_position),
        });
    }
}

fn stereo_loopback() -> Vec<BufferDescriptor> {
    vec![
        BufferDescriptor::input(0),
        BufferDescriptor::input(1),
        BufferDescriptor::output(0),
        BufferDescriptor::output(1),
    ]
}

#[test]
fn test_full_lifecycle() {
    let _lock = SLOT.lock();
    let activator = NullActivator::new(NullDriverConfig::default());
    let handle = activator.handle();
    let mut session = Session::new(activator.descriptor());
    assert_eq!(session.state(), SessionState::Closed);

    session.open(&activator).unwrap();
    assert_eq!(session.state(), SessionState::Initialized);
    assert_eq!(session.driver_name().unwrap(), "Null Driver");

    session.configure(44100.0).unwrap();
    assert_eq!(session.state(), SessionState::Configured);
    assert_eq!(session.sample_rate().unwrap(), 44100.0);

    let (tx, rx) = handoff(32);
    session
        .create_buffers(stereo_loopback(), 512, counting_handler(tx))
        .unwrap();
    assert_eq!(session.state(), SessionState::BuffersCreated);
    assert_eq!(session.frames(), Some(512));
    assert!(session
        .buffers()
        .iter()
        .all(|d| d.buffers.iter().all(|p| !p.is_null())));
    assert!(slot_in_use());

    session.start().unwrap();
    assert_eq!(session.state(), SessionState::Streaming);
    assert_eq!(handle.tick_n(10), 10);

    let switches: Vec<Switch> = rx.drain().collect();
    assert_eq!(switches.len(), 10);
    for (i, switch) in switches.iter().enumerate() {
        assert_eq!(switch.half, i % 2);
        // What the host wrote last switch comes back on the same-numbered input
        assert_eq!(switch.heard, switch.written - 1);
    }
    let played = handle.played(1).unwrap();
    assert_eq!(played.len(), 512 * 4);
    assert_eq!(i32::from_le_bytes([played[0], played[1], played[2], played[3]]), 9);
    assert_eq!(session.stats().switches, 10);

    session.stop().unwrap();
    assert_eq!(session.state(), SessionState::BuffersCreated);
    assert!(!handle.tick());

    session.dispose_buffers().unwrap();
    assert_eq!(session.state(), SessionState::Initialized);
    assert!(!handle.has_buffers());
    assert!(!slot_in_use());

    session.close().unwrap();
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(handle.live_refs(), 0);
    assert_eq!(handle.instances(), 0);
}

#[test]
fn test_time_info_switch_carries_position() {
    let _lock = SLOT.lock();
    let activator = NullActivator::new(NullDriverConfig::default());
    let handle = activator.handle();
    let mut session = Session::new(activator.descriptor());
    session.open(&activator).unwrap();
    session.configure(48000.0).unwrap();

    let (tx, rx) = handoff(8);
    session
        .create_buffers(vec![BufferDescriptor::output(0)], 256, counting_handler(tx))
        .unwrap();
    assert_eq!(handle.time_info_enabled(), Some(true));

    session.start().unwrap();
    handle.tick_n(3);
    let positions: Vec<_> = rx.drain().map(|s| s.position).collect();
    assert_eq!(positions, [Some(0), Some(256), Some(512)]);
    assert_eq!(session.switch_mode(), Some(SwitchMode::TimeInfo));

    session.close().unwrap();
}

#[test]
fn test_plain_switch_when_time_info_declined() {
    let _lock = SLOT.lock();
    let activator = NullActivator::new(NullDriverConfig::default());
    let handle = activator.handle();
    let options = SessionOptions {
        time_info: false,
        ..Default::default()
    };
    let mut session = Session::with_options(activator.descriptor(), options);
    session.open(&activator).unwrap();
    session.configure(44100.0).unwrap();

    let (tx, rx) = handoff(8);
    session
        .create_buffers(vec![BufferDescriptor::output(0)], 64, counting_handler(tx))
        .unwrap();
    assert_eq!(handle.time_info_enabled(), Some(false));

    session.start().unwrap();
    handle.tick_n(2);
    assert!(rx.drain().all(|s| s.position.is_none()));
    assert_eq!(session.switch_mode(), Some(SwitchMode::Plain));

    session.close().unwrap();
}

#[test]
fn test_driver_notifications_become_events() {
    let _lock = SLOT.lock();
    let activator = NullActivator::new(NullDriverConfig::default());
    let handle = activator.handle();
    let mut session = Session::new(activator.descriptor());
    session.open(&activator).unwrap();
    session.configure(44100.0).unwrap();

    let (tx, _rx) = handoff(4);
    session
        .create_buffers(vec![BufferDescriptor::output(0)], 512, counting_handler(tx))
        .unwrap();

    assert_eq!(handle.send_message(message::ENGINE_VERSION, 0), Some(2));
    assert_eq!(handle.send_message(message::RESET_REQUEST, 0), Some(1));
    assert_eq!(handle.send_message(message::BUFFER_SIZE_CHANGE, 256), Some(0));
    assert!(handle.change_sample_rate(48000.0));
    assert!(handle.change_sample_rate(0.0));

    assert_eq!(
        session.poll_events(),
        [
            DriverEvent::ResetRequest,
            DriverEvent::SampleRateChanged(Some(48000.0)),
            DriverEvent::SampleRateChanged(None),
        ]
    );
    assert!(session.poll_events().is_empty());

    // Events raised just before teardown are still delivered
    handle.send_message(message::LATENCIES_CHANGED, 0);
    session.dispose_buffers().unwrap();
    assert_eq!(session.poll_events(), [DriverEvent::LatenciesChanged]);

    session.close().unwrap();
}

#[test]
fn test_sequencing_defects_are_preconditions() {
    let _lock = SLOT.lock();
    let activator = NullActivator::new(NullDriverConfig::default());
    let handle = activator.handle();
    let mut session = Session::new(activator.descriptor());

    assert!(session.start().unwrap_err().is_precondition());
    session.open(&activator).unwrap();

    let (tx, _rx) = handoff(4);
    let err = session
        .create_buffers(vec![BufferDescriptor::output(0)], 512, counting_handler(tx))
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::Precondition {
            operation: "create_buffers",
            state: "Initialized",
        }
    ));
    assert!(!handle.has_buffers());

    session.configure(44100.0).unwrap();
    let (tx, _rx) = handoff(4);
    let err = session
        .create_buffers(vec![BufferDescriptor::output(0)], 500, counting_handler(tx))
        .unwrap_err();
    assert!(matches!(err, SessionError::InvalidBufferSize { requested: 500, .. }));

    let (tx, _rx) = handoff(4);
    session
        .create_buffers(vec![BufferDescriptor::output(0)], 512, counting_handler(tx))
        .unwrap();
    session.start().unwrap();
    assert!(session.configure(48000.0).unwrap_err().is_precondition());
    assert!(session.dispose_buffers().unwrap_err().is_precondition());
    assert_eq!(session.state(), SessionState::Streaming);

    session.close().unwrap();
    assert!(!handle.is_running());
    assert!(session.close().unwrap_err().is_precondition());
}

#[test]
fn test_unknown_driver_id_fails_activation() {
    let activator = NullActivator::new(NullDriverConfig::default());
    let descriptor = DriverDescriptor {
        name: "Missing".to_string(),
        activation_id: Guid::from_fields(1, 2, 3, [4; 8]),
    };
    let mut session = Session::new(descriptor);
    assert!(matches!(
        session.open(&activator),
        Err(SessionError::Activation(_))
    ));
    assert_eq!(session.state(), SessionState::Closed);
}

#[test]
fn test_thread_clock_streams_until_stopped() {
    let _lock = SLOT.lock();
    let activator = NullActivator::new(NullDriverConfig {
        clock: NullClock::Thread,
        ..Default::default()
    });
    let mut session = Session::new(activator.descriptor());
    session.open(&activator).unwrap();
    session.configure(96000.0).unwrap();

    let (tx, rx) = handoff(1024);
    session
        .create_buffers(stereo_loopback(), 64, counting_handler(tx))
        .unwrap();
    session.start().unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while session.stats().switches < 5 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    session.stop().unwrap();

    let after_stop = session.stats().switches;
    assert!(after_stop >= 5);
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(session.stats().switches, after_stop);
    assert!(rx.drain().all(|s| s.heard == s.written - 1));

    session.close().unwrap();
}
