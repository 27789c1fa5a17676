//! Lifecycle, callbacks and recording on scripted live cameras.

mod common;

use common::{evenly_spaced, wait_until, Item, LiveRig, ScriptedDiscovery};
use evcam_core::device::ConnectionType;
use evcam_core::{Camera, CameraError, CameraStatus, Feature, OnlineSourceType};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(5);

fn single_camera() -> ScriptedDiscovery {
    ScriptedDiscovery::default().with(LiveRig::new("CAM0"), ConnectionType::Usb)
}

fn record_statuses(camera: &Camera) -> Arc<Mutex<Vec<CameraStatus>>> {
    let statuses = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&statuses);
    camera
        .add_status_change_callback(move |status| sink.lock().push(status))
        .unwrap();
    statuses
}

#[test]
fn test_uninitialized_camera() {
    let camera = Camera::new();
    assert!(matches!(camera.start(), Err(CameraError::NotInitialized)));
    assert!(matches!(camera.stop(), Err(CameraError::NotInitialized)));
    assert!(matches!(
        camera.add_cd_callback(|_| {}),
        Err(CameraError::NotInitialized)
    ));
    assert!(matches!(camera.geometry(), Err(CameraError::NotInitialized)));
    assert!(matches!(
        camera.start_recording("out.raw"),
        Err(CameraError::NotInitialized)
    ));
    assert!(!camera.remove_status_change_callback(0));
    assert!(!camera.is_running());
}

#[test]
fn test_start_stop_idempotence() {
    let discovery = single_camera();
    let camera = Camera::from_serial(&discovery, "CAM0").unwrap();

    assert!(!camera.stop().unwrap());
    assert!(camera.start().unwrap());
    assert!(camera.is_running());
    assert!(!camera.start().unwrap());
    assert!(camera.stop().unwrap());
    assert!(!camera.is_running());
    assert!(!camera.stop().unwrap());

    // restartable
    assert!(camera.start().unwrap());
    assert!(camera.stop().unwrap());
}

#[test]
fn test_status_callbacks_fire_on_transitions_only() {
    let discovery = single_camera();
    let camera = Camera::from_serial(&discovery, "CAM0").unwrap();
    let statuses = record_statuses(&camera);

    camera.start().unwrap();
    camera.start().unwrap();
    camera.stop().unwrap();
    camera.stop().unwrap();

    assert_eq!(
        *statuses.lock(),
        vec![CameraStatus::Started, CameraStatus::Stopped]
    );
}

#[test]
fn test_device_control_driven_by_session() {
    let discovery = single_camera();
    let rig = discovery.rig("CAM0").clone();
    let camera = Camera::from_serial(&discovery, "CAM0").unwrap();

    camera.start().unwrap();
    assert_eq!(rig.control.starts.load(Ordering::SeqCst), 1);
    assert_eq!(rig.control.resets.load(Ordering::SeqCst), 1);
    camera.stop().unwrap();
    assert_eq!(rig.control.stops.load(Ordering::SeqCst), 1);
}

#[test]
fn test_transfer_failure_reported_once() {
    let discovery = single_camera();
    let rig = discovery.rig("CAM0").clone();
    let camera = Camera::from_serial(&discovery, "CAM0").unwrap();
    let statuses = record_statuses(&camera);

    let errors = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&errors);
    camera
        .add_runtime_error_callback(move |error| {
            assert!(matches!(error, CameraError::DataTransferFailed));
            seen.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    camera.start().unwrap();
    rig.stream.push(Item::Fail);

    assert!(wait_until(TIMEOUT, || !camera.is_running()));
    assert_eq!(errors.load(Ordering::SeqCst), 1);

    // the finished thread is still reaped by stop
    assert!(camera.stop().unwrap());
    assert_eq!(errors.load(Ordering::SeqCst), 1);
    assert_eq!(
        *statuses.lock(),
        vec![CameraStatus::Started, CameraStatus::Stopped]
    );
}

#[test]
fn test_no_polling_after_transfer_failure() {
    let discovery = single_camera();
    let rig = discovery.rig("CAM0").clone();
    let camera = Camera::from_serial(&discovery, "CAM0").unwrap();

    camera.start().unwrap();
    rig.stream.push(Item::Fail);
    assert!(wait_until(TIMEOUT, || !camera.is_running()));
    assert_eq!(rig.stream.polls.load(Ordering::SeqCst), 1);

    rig.stream.push(Item::Data(evenly_spaced(0, 1, 4)));
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(rig.stream.polls.load(Ordering::SeqCst), 1);
    assert_eq!(rig.stream.pending(), 1);

    assert!(camera.stop().unwrap());
}

#[test]
fn test_stop_from_runtime_error_callback() {
    let discovery = single_camera();
    let rig = discovery.rig("CAM0").clone();
    let camera = Arc::new(Camera::from_serial(&discovery, "CAM0").unwrap());
    let statuses = record_statuses(&camera);

    let stopped = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&stopped);
    let handle: Weak<Camera> = Arc::downgrade(&camera);
    camera
        .add_runtime_error_callback(move |_| {
            if let Some(camera) = handle.upgrade() {
                *sink.lock() = Some(camera.stop().map_err(|e| e.to_string()));
            }
        })
        .unwrap();

    camera.start().unwrap();
    rig.stream.push(Item::Fail);
    assert!(wait_until(TIMEOUT, || stopped.lock().is_some()));
    assert_eq!(*stopped.lock(), Some(Ok(true)));
    assert!(wait_until(TIMEOUT, || !camera.is_running()));

    // the acquisition thread is reaped by the next stop from outside
    assert!(camera.stop().unwrap());
    assert!(!camera.stop().unwrap());
    assert_eq!(
        *statuses.lock(),
        vec![CameraStatus::Started, CameraStatus::Stopped]
    );

    assert!(camera.start().unwrap());
    assert!(camera.stop().unwrap());
}

#[test]
fn test_panicking_callback_stops_acquisition() {
    let discovery = single_camera();
    let rig = discovery.rig("CAM0").clone();
    let camera = Camera::from_serial(&discovery, "CAM0").unwrap();
    let statuses = record_statuses(&camera);
    camera
        .add_cd_callback(|_| panic!("callback failure"))
        .unwrap();

    camera.start().unwrap();
    rig.stream.push(Item::Data(evenly_spaced(0, 1, 4)));

    assert!(wait_until(TIMEOUT, || !camera.is_running()));
    assert_eq!(
        *statuses.lock(),
        vec![CameraStatus::Started, CameraStatus::Stopped]
    );
    assert!(camera.stop().unwrap());
    assert!(!camera.stop().unwrap());
}

#[test]
fn test_panicking_device_start_does_not_block_start() {
    let discovery = single_camera();
    let rig = discovery.rig("CAM0").clone();
    rig.control.panic_on_start.store(true, Ordering::SeqCst);
    let camera = Camera::from_serial(&discovery, "CAM0").unwrap();

    assert!(camera.start().unwrap());
    assert!(wait_until(TIMEOUT, || !camera.is_running()));
    assert!(camera.stop().unwrap());

    rig.control.panic_on_start.store(false, Ordering::SeqCst);
    assert!(camera.start().unwrap());
    assert!(camera.is_running());
    assert!(camera.stop().unwrap());
}

#[test]
fn test_cd_events_delivered() {
    let discovery = single_camera();
    let rig = discovery.rig("CAM0").clone();
    let camera = Camera::from_serial(&discovery, "CAM0").unwrap();

    let received = Arc::new(AtomicUsize::new(0));
    let sink = Arc::clone(&received);
    camera
        .add_cd_callback(move |events| {
            sink.fetch_add(events.len(), Ordering::SeqCst);
        })
        .unwrap();

    camera.start().unwrap();
    rig.stream.push(Item::Data(evenly_spaced(1_000, 10, 50)));
    rig.stream.push(Item::Data(evenly_spaced(1_500, 10, 50)));

    assert!(wait_until(TIMEOUT, || received.load(Ordering::SeqCst) == 100));
    assert_eq!(camera.last_decoded_timestamp().unwrap(), 1_990);
    camera.stop().unwrap();
}

#[test]
fn test_raw_callbacks_do_not_decode() {
    let discovery = single_camera();
    let rig = discovery.rig("CAM0").clone();
    let camera = Camera::from_serial(&discovery, "CAM0").unwrap();

    let bytes = Arc::new(AtomicUsize::new(0));
    let sink = Arc::clone(&bytes);
    camera
        .add_raw_data_callback(move |data| {
            sink.fetch_add(data.len(), Ordering::SeqCst);
        })
        .unwrap();

    let data = evenly_spaced(1_000, 10, 20);
    let len = data.len();
    camera.start().unwrap();
    rig.stream.push(Item::Data(data));

    assert!(wait_until(TIMEOUT, || bytes.load(Ordering::SeqCst) == len));
    assert_eq!(camera.last_decoded_timestamp().unwrap(), 0);
    camera.stop().unwrap();
}

#[test]
fn test_raw_callbacks_see_decoded_buffer() {
    let discovery = single_camera();
    let rig = discovery.rig("CAM0").clone();
    let camera = Arc::new(Camera::from_serial(&discovery, "CAM0").unwrap());
    camera.add_cd_callback(|_| {}).unwrap();

    let seen = Arc::new(AtomicU64::new(u64::MAX));
    let calls = Arc::new(AtomicUsize::new(0));
    let (seen_sink, calls_sink) = (Arc::clone(&seen), Arc::clone(&calls));
    let handle: Weak<Camera> = Arc::downgrade(&camera);
    camera
        .add_raw_data_callback(move |_| {
            if let Some(camera) = handle.upgrade() {
                seen_sink.store(camera.last_decoded_timestamp().unwrap(), Ordering::SeqCst);
            }
            calls_sink.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    camera.start().unwrap();
    rig.stream.push(Item::Data(evenly_spaced(3_000, 10, 40)));

    assert!(wait_until(TIMEOUT, || calls.load(Ordering::SeqCst) == 1));
    assert_eq!(seen.load(Ordering::SeqCst), 3_390);
    camera.stop().unwrap();
}

#[test]
fn test_removed_callback_not_invoked() {
    let discovery = single_camera();
    let rig = discovery.rig("CAM0").clone();
    let camera = Camera::from_serial(&discovery, "CAM0").unwrap();

    let removed_calls = Arc::new(AtomicUsize::new(0));
    let sink = Arc::clone(&removed_calls);
    let id = camera
        .add_raw_data_callback(move |_| {
            sink.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    let kept_calls = Arc::new(AtomicUsize::new(0));
    let sink = Arc::clone(&kept_calls);
    camera
        .add_raw_data_callback(move |_| {
            sink.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    assert!(camera.remove_raw_data_callback(id));
    assert!(!camera.remove_raw_data_callback(id));

    camera.start().unwrap();
    rig.stream.push(Item::Data(evenly_spaced(0, 1, 4)));
    assert!(wait_until(TIMEOUT, || kept_calls.load(Ordering::SeqCst) == 1));
    camera.stop().unwrap();
    assert_eq!(removed_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_callback_ids_unique_across_kinds() {
    let discovery = single_camera();
    let camera = Camera::from_serial(&discovery, "CAM0").unwrap();

    let ids = [
        camera.add_runtime_error_callback(|_| {}).unwrap(),
        camera.add_status_change_callback(|_| {}).unwrap(),
        camera.add_cd_callback(|_| {}).unwrap(),
        camera.add_ext_trigger_callback(|_| {}).unwrap(),
        camera.add_raw_data_callback(|_| {}).unwrap(),
    ];
    let mut sorted = ids.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(sorted.len(), ids.len());
    // a status id does not remove a runtime error callback
    assert!(!camera.remove_runtime_error_callback(ids[1]));
    assert!(camera.remove_status_change_callback(ids[1]));
}

#[test]
fn test_first_available_prefers_embedded() {
    let discovery = ScriptedDiscovery::default()
        .with(LiveRig::new("USB1"), ConnectionType::Usb)
        .with(LiveRig::new("MIPI1"), ConnectionType::Mipi);
    let camera = Camera::from_first_available(&discovery).unwrap();
    assert_eq!(camera.configuration().unwrap().serial_number, "MIPI1");

    let discovery = ScriptedDiscovery::default()
        .with(LiveRig::new("NET1"), ConnectionType::Network)
        .with(LiveRig::new("USB2"), ConnectionType::Usb)
        .with(LiveRig::new("USB1"), ConnectionType::Usb);
    let camera = Camera::from_first_available(&discovery).unwrap();
    assert_eq!(camera.configuration().unwrap().serial_number, "USB1");
}

#[test]
fn test_camera_not_found() {
    let discovery = ScriptedDiscovery::default().with(LiveRig::new("NET1"), ConnectionType::Network);
    assert!(matches!(
        Camera::from_first_available(&discovery),
        Err(CameraError::CameraNotFound(_))
    ));
    assert!(matches!(
        Camera::from_source(&discovery, OnlineSourceType::Remote, 1),
        Err(CameraError::CameraNotFound(_))
    ));
    assert!(matches!(
        Camera::from_serial(&discovery, "missing"),
        Err(CameraError::CameraNotFound(_))
    ));

    let camera = Camera::from_source(&discovery, OnlineSourceType::Remote, 0).unwrap();
    assert_eq!(camera.configuration().unwrap().serial_number, "NET1");
}

#[test]
fn test_optional_facilities() {
    let discovery = ScriptedDiscovery::default().with(
        LiveRig::new("CAM0").with_biases(&[("bias_diff", 299)]),
        ConnectionType::Usb,
    );
    let camera = Camera::from_serial(&discovery, "CAM0").unwrap();

    assert_eq!(camera.biases().unwrap().get("bias_diff"), Some(299));
    assert!(matches!(
        camera.roi(),
        Err(CameraError::Unsupported(Feature::Roi))
    ));
    assert!(matches!(
        camera.noise_filter_module(),
        Err(CameraError::Unsupported(Feature::NoiseFilter))
    ));
    assert_eq!(camera.generation().unwrap().map(|g| g.to_string()), Some("4.1".to_string()));
    assert_eq!(camera.geometry().unwrap().width, 640);
}

#[test]
fn test_recording_writes_raw_and_biases() {
    let dir = tempfile::tempdir().unwrap();
    let discovery = ScriptedDiscovery::default().with(
        LiveRig::new("CAM0").with_biases(&[("bias_diff", 299), ("bias_fo", -5)]),
        ConnectionType::Usb,
    );
    let rig = discovery.rig("CAM0").clone();
    let camera = Camera::from_serial(&discovery, "CAM0").unwrap();

    let buffers = Arc::new(AtomicUsize::new(0));
    let sink = Arc::clone(&buffers);
    camera
        .add_raw_data_callback(move |_| {
            sink.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    camera.start_recording(dir.path().join("session.dat")).unwrap();
    assert!(camera.is_recording());
    let bias_text = std::fs::read_to_string(dir.path().join("session.bias")).unwrap();
    assert!(bias_text.contains("299     % bias_diff"));
    assert!(bias_text.contains("-5      % bias_fo"));

    camera.start().unwrap();
    rig.stream.push(Item::Data(evenly_spaced(2_000, 5, 30)));
    assert!(wait_until(TIMEOUT, || buffers.load(Ordering::SeqCst) == 1));
    camera.stop().unwrap();
    assert!(!camera.is_recording());

    // the recording replays as a file with the same events
    let replay = Camera::from_file(dir.path().join("session.raw"), false).unwrap();
    let last = Arc::new(AtomicU64::new(0));
    let count = Arc::new(AtomicUsize::new(0));
    let (last_sink, count_sink) = (Arc::clone(&last), Arc::clone(&count));
    replay
        .add_cd_callback(move |events| {
            count_sink.fetch_add(events.len(), Ordering::SeqCst);
            if let Some(event) = events.last() {
                last_sink.store(event.timestamp, Ordering::SeqCst);
            }
        })
        .unwrap();
    replay.start().unwrap();
    assert!(wait_until(TIMEOUT, || !replay.is_running()));
    replay.stop().unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 30);
    assert_eq!(last.load(Ordering::SeqCst), 2_145);
}

#[test]
fn test_recording_to_unwritable_path() {
    let dir = tempfile::tempdir().unwrap();
    let discovery = single_camera();
    let camera = Camera::from_serial(&discovery, "CAM0").unwrap();

    let err = camera
        .start_recording(dir.path().join("missing").join("out.raw"))
        .unwrap_err();
    assert!(matches!(err, CameraError::CouldNotOpenFile(_)));
    assert!(!camera.is_recording());

    // the session is unaffected
    assert!(camera.start().unwrap());
    assert!(camera.stop().unwrap());
}

#[cfg(target_os = "linux")]
#[test]
fn test_recording_ends_on_write_failure() {
    let dir = tempfile::tempdir().unwrap();
    std::os::unix::fs::symlink("/dev/full", dir.path().join("rec.raw")).unwrap();
    let discovery = single_camera();
    let rig = discovery.rig("CAM0").clone();
    let camera = Camera::from_serial(&discovery, "CAM0").unwrap();

    let buffers = Arc::new(AtomicUsize::new(0));
    let sink = Arc::clone(&buffers);
    camera
        .add_raw_data_callback(move |_| {
            sink.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    camera.start_recording(dir.path().join("rec")).unwrap();
    assert!(camera.is_recording());

    camera.start().unwrap();
    // more than the log's write buffer, so the device reports it full
    rig.stream.push(Item::Data(evenly_spaced(0, 1, 2_100)));
    assert!(wait_until(TIMEOUT, || buffers.load(Ordering::SeqCst) == 1));

    assert!(!camera.is_recording());
    assert!(camera.is_running());
    camera.stop().unwrap();
}

#[test]
fn test_drop_stops_running_camera() {
    let discovery = single_camera();
    let rig = discovery.rig("CAM0").clone();
    {
        let camera = Camera::from_serial(&discovery, "CAM0").unwrap();
        camera.start().unwrap();
    }
    assert_eq!(rig.control.stops.load(Ordering::SeqCst), 1);
}
