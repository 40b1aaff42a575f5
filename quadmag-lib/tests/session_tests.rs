//! Tests for the acquisition state machine (no IO involved)

mod common;

use common::*;
use quadmag_lib::session::INVALID_FRAME_LIMIT;

fn mag_record(seconds: u32) -> MeasurementRecord {
    MeasurementRecord {
        flag: PacketFlag::MagOnly,
        seconds,
        ticks: 0,
        mag: quad_mags(1000),
        imu: None,
        temperature: None,
    }
}

fn short_read() -> Frame {
    Frame::Invalid(InvalidFrame::ShortRead {
        expected: 44,
        actual: 0,
    })
}

#[test]
fn nine_invalid_frames_abort_the_session() {
    let mut session = AcquisitionSession::continuous(MagMask::all_enabled(), 100);
    session.command_sent();

    for n in 1..INVALID_FRAME_LIMIT {
        assert_eq!(session.offer(short_read()), SessionState::Collecting, "frame {n}");
    }
    assert_eq!(session.offer(short_read()), SessionState::Aborted);

    let summary = session.finish();
    assert_eq!(summary.status, SessionStatus::TooManyInvalidFrames);
    assert_eq!(summary.invalid_frames, INVALID_FRAME_LIMIT);
    assert!(summary.records.is_empty());
}

#[test]
fn successes_do_not_reset_the_invalid_count() {
    let mut session = AcquisitionSession::continuous(MagMask::all_enabled(), 10);
    session.command_sent();

    for _ in 0..INVALID_FRAME_LIMIT - 1 {
        session.offer(short_read());
    }
    session.offer(Frame::Data(mag_record(1)));
    session.offer(Frame::Complete);

    let summary = session.finish();
    assert_eq!(summary.status, SessionStatus::Complete);
    assert_eq!(summary.records.len(), 1);
    assert_eq!(summary.invalid_frames, INVALID_FRAME_LIMIT - 1);
}

#[test]
fn single_session_ends_on_first_data_frame() {
    let mut session = AcquisitionSession::single(MagMask::all_enabled());
    session.command_sent();
    assert_eq!(session.offer(Frame::Data(mag_record(1))), SessionState::Complete);
    assert!(!session.is_open());

    let summary = session.finish();
    assert_eq!(summary.status, SessionStatus::Complete);
    assert_eq!(summary.records.len(), 1);
    assert_eq!(summary.expected, None);
}

#[test]
fn complete_before_data_is_a_success_with_zero_records() {
    let mut session = AcquisitionSession::single(MagMask::all_enabled());
    session.command_sent();
    assert_eq!(session.offer(Frame::Complete), SessionState::Complete);

    let summary = session.finish();
    assert_eq!(summary.status, SessionStatus::Complete);
    assert!(summary.records.is_empty());
}

#[test]
fn continuous_session_accumulates_until_complete() {
    let mut session = AcquisitionSession::continuous(MagMask::all_enabled(), 5);
    session.command_sent();

    for seconds in 0..3 {
        assert_eq!(session.offer(Frame::Data(mag_record(seconds))), SessionState::Collecting);
    }
    session.offer(Frame::Complete);

    let summary = session.finish();
    assert_eq!(summary.status, SessionStatus::Complete);
    assert_eq!(summary.records.len(), 3);
    assert_eq!(summary.expected, Some(5));
    assert_eq!(summary.missing(), Some(2));
}

#[test]
fn partial_records_are_retained_on_abort() {
    let mut session = AcquisitionSession::continuous(MagMask::all_enabled(), 10);
    session.command_sent();
    session.offer(Frame::Data(mag_record(1)));
    session.offer(Frame::Data(mag_record(2)));
    for _ in 0..INVALID_FRAME_LIMIT {
        session.offer(short_read());
    }

    let summary = session.finish();
    assert_eq!(summary.status, SessionStatus::TooManyInvalidFrames);
    assert_eq!(summary.records.len(), 2);
    assert_eq!(summary.invalid_frames, INVALID_FRAME_LIMIT);
}

#[test]
fn stray_config_echo_counts_against_the_budget() {
    let mut session = AcquisitionSession::continuous(MagMask::all_enabled(), 10);
    session.command_sent();
    session.offer(Frame::MagConfigEcho([0x00, 0xC8, 0x00]));
    assert_eq!(session.invalid_frames(), 1);
    assert!(session.is_open());
}

#[test]
fn config_phase_state_transitions() {
    let mut session = AcquisitionSession::single(MagMask::all_enabled());
    assert_eq!(session.state(), SessionState::Idle);

    session.config_sent();
    assert_eq!(session.state(), SessionState::ConfigSent);
    session.config_verified(None);
    assert_eq!(session.state(), SessionState::Configured);

    session.config_sent();
    session.config_verified(Some(ConfigMismatch {
        sent: vec![0x00, 0xC8, 0x00],
        echoed: vec![0x00, 0x64, 0x00],
    }));
    assert_eq!(session.state(), SessionState::ConfigFailed);

    // the caller may still proceed to measurement
    session.command_sent();
    assert_eq!(session.state(), SessionState::MeasurementCommandSent);
    assert_eq!(session.offer(Frame::Complete), SessionState::Complete);

    let summary = session.finish();
    assert_eq!(summary.config_mismatches.len(), 1);
    assert_eq!(summary.status, SessionStatus::Complete);
}

#[test]
fn config_failed_session_reports_as_such() {
    let mut session = AcquisitionSession::single(MagMask::all_enabled());
    session.config_sent();
    session.config_verified(Some(ConfigMismatch {
        sent: vec![0x01],
        echoed: vec![0x02],
    }));

    let summary = session.finish();
    assert_eq!(summary.status, SessionStatus::ConfigFailed);
}
