use core::sync::atomic::Ordering;

use crate::layout::{FrameHeader, Layout, FRAME_HEADER_LEN};
use crate::{Backoff, Codec, CodecError, Error, Options, Pod, Region, ShmValue, Visibility};

fn fresh(max: usize) -> (tempfile::NamedTempFile, ShmValue<u32>) {
    let file = tempfile::NamedTempFile::new().unwrap();
    let value = ShmValue::open(file.path(), max, || 7).unwrap();
    (file, value)
}

#[test]
fn stored_frame_layout() {
    let (file, value) = fresh(4);
    value.put(&0x0a0b_0c0d).unwrap();

    let layout = Layout::for_value_size(4).unwrap();
    let region = Region::from_file(file.as_file(), &layout).unwrap();

    let mut header = [0; FRAME_HEADER_LEN];
    region.read_at(0, &mut header).unwrap();
    assert_eq!(FrameHeader::parse(header, &layout), Ok(FrameHeader { len: 4 }));

    let mut body = [0; 4];
    region.read_at(FRAME_HEADER_LEN, &mut body).unwrap();
    assert_eq!(body, 0x0a0b_0c0du32.to_le_bytes());
}

#[test]
fn lock_released_after_every_failure() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let value: ShmValue<Vec<u8>> = ShmValue::open(file.path(), 16, Vec::new).unwrap();

    assert!(matches!(
        value.put(&vec![0; 64]),
        Err(Error::CapacityExceeded { .. })
    ));
    assert!(!value.lock().is_locked());

    assert!(matches!(
        value.get_and_put(|mut bytes| {
            bytes.resize(64, 1);
            bytes
        }),
        Err(Error::CapacityExceeded { .. })
    ));
    assert!(!value.lock().is_locked());

    value.region.write_at(0, &[0xff; FRAME_HEADER_LEN]).unwrap();
    assert!(matches!(value.get_and_put(|bytes| bytes), Err(Error::Decode(_))));
    assert!(!value.lock().is_locked());
    assert!(matches!(value.get(), Err(Error::Decode(_))));
    assert!(!value.lock().is_locked());
}

#[test]
fn lock_released_when_transform_panics() {
    let (_file, value) = fresh(4);

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _ = value.get_and_put(|_| panic!("transform failed"));
    }));

    assert!(result.is_err());
    assert!(!value.lock().is_locked());
    assert_eq!(value.get().unwrap(), 7);
}

#[test]
fn default_not_called_for_stored_value() {
    let (file, value) = fresh(4);
    value.put(&11).unwrap();

    let reopened: ShmValue<u32> =
        ShmValue::open(file.path(), 4, || panic!("value was stored")).unwrap();
    assert_eq!(reopened.get().unwrap(), 11);
}

#[test]
fn oversized_default_leaves_file_unwritten() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let result = ShmValue::<String>::open(file.path(), 4, || "too long".into());
    // Encoding stops at the eight byte length prefix.
    assert!(matches!(result, Err(Error::CapacityExceeded { size: 8, limit: 4 })));

    let layout = Layout::for_value_size(4).unwrap();
    let region = Region::from_file(file.as_file(), &layout).unwrap();
    assert_eq!(region.lock_word().load(Ordering::Relaxed), 0);
    assert!(region.payload().iter().all(|b| b.load(Ordering::Relaxed) == 0));
}

#[test]
fn relaxed_single_owner() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let value = Options::new(4)
        .with_visibility(Visibility::Relaxed)
        .with_backoff(Backoff::Spin)
        .open_with(file.path(), Pod, || 0u32)
        .unwrap();

    for _ in 0..1000 {
        value.get_and_put(|n| n + 1).unwrap();
    }

    assert_eq!(value.get().unwrap(), 1000);
    assert_eq!(value.visibility(), Visibility::Relaxed);
    assert_eq!(value.options().backoff(), Backoff::Spin);
}

#[test]
fn oversized_values_do_not_grow_staging() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let value: ShmValue<Vec<u8>> = ShmValue::open(file.path(), 16, Vec::new).unwrap();

    let huge = vec![0u8; 64 << 20];
    assert!(matches!(
        value.put(&huge),
        Err(Error::CapacityExceeded { size: 17, limit: 16 })
    ));
    assert!(value.staging.lock().capacity() <= 64);

    assert!(matches!(
        value.get_and_put(|_| vec![0u8; 1 << 20]),
        Err(Error::CapacityExceeded { .. })
    ));
    assert!(value.staging.lock().capacity() <= 64);
    assert_eq!(value.get().unwrap(), Vec::<u8>::new());
}

/// Writes its whole input regardless of the limit.
struct Unbounded;

impl Codec<Vec<u8>> for Unbounded {
    fn encode(&self, value: &Vec<u8>, into: &mut Vec<u8>, _: usize) -> Result<(), CodecError> {
        into.extend_from_slice(value);
        Ok(())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
        Ok(bytes.to_vec())
    }
}

#[test]
fn codec_ignoring_the_limit_is_still_bounded() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let value = Options::new(16)
        .open_with(file.path(), Unbounded, || vec![1u8, 2, 3])
        .unwrap();

    assert!(matches!(
        value.put(&vec![0u8; 1 << 20]),
        Err(Error::CapacityExceeded { size, limit: 16 }) if size == 1 << 20
    ));
    assert!(value.staging.lock().capacity() <= 64);
    assert_eq!(value.get().unwrap(), vec![1, 2, 3]);
}
