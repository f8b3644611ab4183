//! SERIAL_CONTROL framing for the virtual shell port.
//!
//! Every outbound frame carries a fixed 70-byte payload; `count` says how many
//! of those bytes are real. Longer writes are split across several frames.

use mavlink::common::{MavMessage, SerialControlDev, SerialControlFlag, SERIAL_CONTROL_DATA};
use thiserror::Error;

/// Payload capacity of one SERIAL_CONTROL message.
pub const FRAME_CAPACITY: usize = 70;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("unknown SERIAL_CONTROL device number {0}")]
    UnknownDevice(u8),
}

/// Map a numeric device index onto the dialect's device enum.
pub fn device(devnum: u8) -> Result<SerialControlDev, FrameError> {
    use SerialControlDev::*;
    let dev = match devnum {
        0 => SERIAL_CONTROL_DEV_TELEM1,
        1 => SERIAL_CONTROL_DEV_TELEM2,
        2 => SERIAL_CONTROL_DEV_GPS1,
        3 => SERIAL_CONTROL_DEV_GPS2,
        10 => SERIAL_CONTROL_DEV_SHELL,
        100 => SERIAL_CONTROL_SERIAL0,
        101 => SERIAL_CONTROL_SERIAL1,
        102 => SERIAL_CONTROL_SERIAL2,
        103 => SERIAL_CONTROL_SERIAL3,
        104 => SERIAL_CONTROL_SERIAL4,
        105 => SERIAL_CONTROL_SERIAL5,
        106 => SERIAL_CONTROL_SERIAL6,
        107 => SERIAL_CONTROL_SERIAL7,
        108 => SERIAL_CONTROL_SERIAL8,
        109 => SERIAL_CONTROL_SERIAL9,
        other => return Err(FrameError::UnknownDevice(other)),
    };
    Ok(dev)
}

fn frame(
    port: SerialControlDev,
    flags: SerialControlFlag,
    chunk: &[u8],
) -> SERIAL_CONTROL_DATA {
    debug_assert!(chunk.len() <= FRAME_CAPACITY);
    let mut data = [0u8; FRAME_CAPACITY];
    data[..chunk.len()].copy_from_slice(chunk);
    SERIAL_CONTROL_DATA {
        baudrate: 0,
        timeout: 0,
        device: port,
        flags,
        count: chunk.len() as u8,
        data,
        ..Default::default()
    }
}

/// Split `bytes` into zero-padded data frames asking for exclusive access and
/// a response. An empty input yields no frames.
pub fn data_frames(
    port: SerialControlDev,
    bytes: &[u8],
) -> impl Iterator<Item = SERIAL_CONTROL_DATA> + '_ {
    let flags = SerialControlFlag::SERIAL_CONTROL_FLAG_EXCLUSIVE
        | SerialControlFlag::SERIAL_CONTROL_FLAG_RESPOND;
    bytes
        .chunks(FRAME_CAPACITY)
        .map(move |chunk| frame(port, flags, chunk))
}

/// The frame that gives up exclusive access to `port`.
pub fn release_frame(port: SerialControlDev) -> SERIAL_CONTROL_DATA {
    frame(port, SerialControlFlag::empty(), &[])
}

/// Valid payload bytes of an incoming frame.
pub fn payload(frame: &SERIAL_CONTROL_DATA) -> &[u8] {
    let n = (frame.count as usize).min(FRAME_CAPACITY);
    &frame.data[..n]
}

/// SERIAL_CONTROL messages that actually carry data.
pub fn as_data_frame(msg: &MavMessage) -> Option<&SERIAL_CONTROL_DATA> {
    match msg {
        MavMessage::SERIAL_CONTROL(sc) if sc.count != 0 => Some(sc),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHELL: SerialControlDev = SerialControlDev::SERIAL_CONTROL_DEV_SHELL;

    #[test]
    fn reassembles_any_length() {
        for len in [1usize, 69, 70, 71, 139, 140, 141, 500] {
            let input: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let frames: Vec<_> = data_frames(SHELL, &input).collect();

            assert_eq!(frames.len(), len.div_ceil(FRAME_CAPACITY), "len {len}");
            let mut joined = Vec::new();
            for f in &frames {
                assert!(f.count as usize <= FRAME_CAPACITY);
                assert_eq!(f.data.len(), FRAME_CAPACITY);
                joined.extend_from_slice(payload(f));
            }
            assert_eq!(joined, input);
        }
    }

    #[test]
    fn empty_input_has_no_frames() {
        assert_eq!(data_frames(SHELL, b"").count(), 0);
    }

    #[test]
    fn padding_is_zero() {
        let f = data_frames(SHELL, b"ls").next().unwrap();
        assert_eq!(f.count, 2);
        assert_eq!(&f.data[..2], b"ls");
        assert!(f.data[2..].iter().all(|&b| b == 0));
        assert!(f.flags.contains(SerialControlFlag::SERIAL_CONTROL_FLAG_EXCLUSIVE));
        assert!(f.flags.contains(SerialControlFlag::SERIAL_CONTROL_FLAG_RESPOND));
        assert_eq!(f.device, SHELL);
    }

    #[test]
    fn release_frame_is_blank() {
        let f = release_frame(SHELL);
        assert_eq!(f.count, 0);
        assert!(f.flags.is_empty());
        assert_eq!(f.timeout, 0);
        assert_eq!(f.baudrate, 0);
        assert_eq!(f.data, [0u8; FRAME_CAPACITY]);
    }

    #[test]
    fn payload_clamps_bogus_count() {
        let mut f = release_frame(SHELL);
        f.count = 200;
        assert_eq!(payload(&f).len(), FRAME_CAPACITY);
    }

    #[test]
    fn device_numbers() {
        assert_eq!(device(10), Ok(SerialControlDev::SERIAL_CONTROL_DEV_SHELL));
        assert_eq!(device(0), Ok(SerialControlDev::SERIAL_CONTROL_DEV_TELEM1));
        assert_eq!(device(105), Ok(SerialControlDev::SERIAL_CONTROL_SERIAL5));
        assert_eq!(device(42), Err(FrameError::UnknownDevice(42)));
    }
}
