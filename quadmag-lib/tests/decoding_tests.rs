//! Tests for inbound frame classification and decoding

mod common;

use common::*;
use quadmag_lib::frame::MAG_ONLY_PAYLOAD_LEN;
use quadmag_lib::measurement::csv_header;

#[test]
fn mag_only_frame_decodes() {
    let mags = quad_mags(0x010203);
    let frame = build_data_frame(PacketFlag::MagOnly, 42, 16384, &mags, None, None);
    assert_eq!(frame.len(), 1 + MAG_ONLY_PAYLOAD_LEN);

    let mut stream = frame.as_slice();
    match read_frame(&mut stream).unwrap() {
        Frame::Data(record) => {
            assert_eq!(record.flag, PacketFlag::MagOnly);
            assert_eq!(record.seconds, 42);
            assert_eq!(record.ticks, 16384);
            assert_eq!(record.mag, mags);
            assert!(record.imu.is_none());
            assert!(record.temperature.is_none());
        }
        other => panic!("expected data frame, got {other:?}"),
    }
}

#[test]
fn all_sensors_frame_decodes() {
    let mags = quad_mags(0x7FFF00);
    let imu = ImuSample {
        acc: [0x0102, 0x8000, 0xFFFF],
        gyr: [0x0001, 0x0203, 0x7FFF],
    };
    let frame = build_data_frame(PacketFlag::AllSensors, 7, 100, &mags, Some(imu), Some(0x0666));

    let mut stream = frame.as_slice();
    match read_frame(&mut stream).unwrap() {
        Frame::Data(record) => {
            assert_eq!(record.mag.len(), 4);
            assert_eq!(record.imu, Some(imu));
            assert_eq!(record.temperature, Some(0x0666));
        }
        other => panic!("expected data frame, got {other:?}"),
    }
}

#[test]
fn mag_and_temp_frame_has_no_imu() {
    let frame = build_data_frame(
        PacketFlag::MagAndTemp,
        1,
        0,
        &quad_mags(10),
        None,
        Some(1234),
    );
    let mut stream = frame.as_slice();
    match read_frame(&mut stream).unwrap() {
        Frame::Data(record) => {
            assert!(record.imu.is_none());
            assert_eq!(record.temperature, Some(1234));
        }
        other => panic!("expected data frame, got {other:?}"),
    }
}

#[test]
fn mag_and_imu_frame_has_no_temperature() {
    let imu = ImuSample {
        acc: [1, 2, 3],
        gyr: [4, 5, 6],
    };
    let frame = build_data_frame(PacketFlag::MagAndImu, 1, 0, &quad_mags(10), Some(imu), None);
    let mut stream = frame.as_slice();
    match read_frame(&mut stream).unwrap() {
        Frame::Data(record) => {
            assert_eq!(record.imu, Some(imu));
            assert!(record.temperature.is_none());
        }
        other => panic!("expected data frame, got {other:?}"),
    }
}

#[test]
fn debug_frame_carries_single_sensor() {
    let mags = vec![[0x000102u32, 0x030405, 0x060708]];
    let frame = build_data_frame(PacketFlag::Debug, 3, 9, &mags, None, None);
    let mut stream = frame.as_slice();
    match read_frame(&mut stream).unwrap() {
        Frame::Data(record) => {
            assert_eq!(record.flag, PacketFlag::Debug);
            assert_eq!(record.mag, mags);
        }
        other => panic!("expected data frame, got {other:?}"),
    }
}

#[test]
fn checksum_bit_flip_is_rejected() {
    let mut frame = mag_only_frame(1, 2);
    frame[10] ^= 0x01;

    let mut stream = frame.as_slice();
    match read_frame(&mut stream).unwrap() {
        Frame::Invalid(InvalidFrame::ChecksumMismatch { .. }) => {}
        other => panic!("expected checksum mismatch, got {other:?}"),
    }
}

#[test]
fn truncated_frame_is_a_short_read() {
    let frame = mag_only_frame(1, 2);
    let mut stream = &frame[..20];
    match read_frame(&mut stream).unwrap() {
        Frame::Invalid(InvalidFrame::ShortRead { expected, actual }) => {
            assert_eq!(expected, MAG_ONLY_PAYLOAD_LEN);
            assert_eq!(actual, 19);
        }
        other => panic!("expected short read, got {other:?}"),
    }
}

#[test]
fn empty_stream_is_a_short_read() {
    let mut stream: &[u8] = &[];
    match read_frame(&mut stream).unwrap() {
        Frame::Invalid(InvalidFrame::ShortRead { expected: 1, actual: 0 }) => {}
        other => panic!("expected short read, got {other:?}"),
    }
}

#[test]
fn unrecognized_flag_is_invalid() {
    let mut stream: &[u8] = &[0xAB, 0x01, 0x02];
    match read_frame(&mut stream).unwrap() {
        Frame::Invalid(InvalidFrame::UnknownFlag(0xAB)) => {}
        other => panic!("expected unknown flag, got {other:?}"),
    }
}

#[test]
fn complete_marker_consumes_only_the_flag() {
    let bytes = [0x0Au8, 0x04, 0x05];
    let mut stream = bytes.as_slice();
    assert_eq!(read_frame(&mut stream).unwrap(), Frame::Complete);
    // the bytes after the marker are untouched
    assert_eq!(stream, &[0x04, 0x05]);
}

#[test]
fn config_echoes_have_no_checksum() {
    let mut stream: &[u8] = &[0x02, 0x00, 0xC8, 0x04];
    assert_eq!(
        read_frame(&mut stream).unwrap(),
        Frame::MagConfigEcho([0x00, 0xC8, 0x04])
    );

    let mut stream: &[u8] = &[0x03, 0x0C, 0x02, 0x01, 0x01, 0x0C, 0x02, 0x01, 0x01, 0x00];
    assert_eq!(
        read_frame(&mut stream).unwrap(),
        Frame::ImuConfigEcho([0x0C, 0x02, 0x01, 0x01, 0x0C, 0x02, 0x01, 0x01, 0x00])
    );
}

#[test]
fn csv_row_layout_tracks_the_flag() {
    let imu = ImuSample {
        acc: [10, 20, 30],
        gyr: [40, 50, 60],
    };
    let frame = build_data_frame(
        PacketFlag::AllSensors,
        5,
        16384,
        &quad_mags(100),
        Some(imu),
        Some(700),
    );
    let mut stream = frame.as_slice();
    let record = match read_frame(&mut stream).unwrap() {
        Frame::Data(record) => record,
        other => panic!("expected data frame, got {other:?}"),
    };

    assert_eq!(
        csv_header(PacketFlag::AllSensors),
        "meas_num,timestamp_s,mag1_x,mag1_y,mag1_z,mag2_x,mag2_y,mag2_z,\
         mag3_x,mag3_y,mag3_z,mag4_x,mag4_y,mag4_z,\
         acc_x,acc_y,acc_z,gyr_x,gyr_y,gyr_z,temp"
    );
    assert_eq!(
        record.csv_row(3),
        "3,5.500000,100,101,102,103,104,105,106,107,108,109,110,111,10,20,30,40,50,60,700"
    );

    // no optional columns on a mag-only record
    let frame = mag_only_frame(1, 0);
    let mut stream = frame.as_slice();
    let record = match read_frame(&mut stream).unwrap() {
        Frame::Data(record) => record,
        other => panic!("expected data frame, got {other:?}"),
    };
    assert_eq!(csv_header(record.flag).matches(',').count(), 13);
    assert_eq!(record.csv_row(1).matches(',').count(), 13);
}
