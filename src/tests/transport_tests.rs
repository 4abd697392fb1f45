use std::thread;
use std::time::{Duration, Instant};

use dsim_core::packet::{
    decode_header, header_word, long_header_len, pack_payload, DCS_LONG_WRITE, DCS_READ,
    DCS_SET_COLUMN_ADDRESS, DCS_SHORT_WRITE, DCS_SHORT_WRITE_PARAM, GENERIC_READ_REQUEST_2_PARAM,
    SET_MAXIMUM_RETURN_PACKET_SIZE,
};
use proptest::prelude::*;

use super::{fhd_mode, test_options, Harness, Recorder};
use crate::config::DsimOptions;
use crate::dsim::regs::{INTSRC_SFR_PH_FIFO_EMPTY, PKTHDR_BTA};
use crate::dsim::sim::DrainMode;
use crate::dsim::{DsiMessage, DsimEvent, TransportError, TransportState};

const DISPLAY_ON: u8 = 0x29;
const GET_POWER_MODE: u8 = 0x0a;

/// Column window 0..=0x437
const SET_COLUMN: [u8; 5] = [DCS_SET_COLUMN_ADDRESS, 0x00, 0x00, 0x04, 0x37];

/// Spin until `cond` holds or two seconds pass
fn wait_until(cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    cond()
}

#[test]
fn test_write_while_suspended_then_after_enable() {
    let h = Harness::new(test_options());
    let before = h.bus.write_count();

    let err = h.dsim.write_command(None, &[DISPLAY_ON]).unwrap_err();
    assert_eq!(err, TransportError::NotReady(TransportState::Suspended));
    assert_eq!(h.bus.write_count(), before);

    h.dsim.configure_mode(&fhd_mode("1080x2400@60")).unwrap();
    h.dsim.enable().unwrap();
    h.dsim.write_command(None, &[DISPLAY_ON]).unwrap();

    let sent = h.bus.sent_packets();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].header, header_word(DCS_SHORT_WRITE, DISPLAY_ON, 0));
    assert_eq!(h.dsim.metrics().snapshot().commands_written, 1);
}

#[test]
fn test_default_types_by_length() {
    let h = Harness::ready();
    h.dsim.write_command(None, &[0x51, 0xff]).unwrap();
    h.dsim.write_command(None, &[1, 2, 3, 4, 5]).unwrap();

    let sent = h.bus.sent_packets();
    assert_eq!(decode_header(sent[0].header), (DCS_SHORT_WRITE_PARAM, 0x51, 0xff));

    assert_eq!(decode_header(sent[1].header).0, DCS_LONG_WRITE);
    assert_eq!(long_header_len(sent[1].header), 5);
    assert_eq!(sent[1].payload, vec![0x0403_0201, 0x0000_0005]);
}

#[test]
fn test_invalid_writes_rejected() {
    let h = Harness::ready();
    assert!(matches!(h.dsim.write_command(None, &[]), Err(TransportError::InvalidArgument(_))));
    assert!(matches!(
        h.dsim.write_command(Some(DCS_SHORT_WRITE), &[1, 2, 3]),
        Err(TransportError::InvalidArgument(_))
    ));
    assert_eq!(h.dsim.write_command(Some(0x0e), &[1]), Err(TransportError::UnsupportedType(0x0e)));
    assert!(h.bus.sent_packets().is_empty());
    assert_eq!(h.dsim.diagnostics().recent_errors(Duration::from_secs(60)).len(), 3);
}

#[test]
fn test_fifo_drained_within_1ms() {
    let h = Harness::ready_with(DsimOptions::default());
    h.bus.set_drain_mode(DrainMode::Delayed(Duration::from_micros(500)));

    h.dsim.write_command(None, &SET_COLUMN).unwrap();

    let m = h.dsim.metrics().snapshot();
    assert_eq!(m.timeouts, 0);
    assert_eq!(m.late_fifo_drains, 0);
    assert!(h.dsim.diagnostics().recent_errors(Duration::from_secs(60)).is_empty());
}

#[test]
fn test_stuck_fifo_times_out() {
    let h = Harness::ready();
    h.bus.set_drain_mode(DrainMode::Stuck);

    let err = h.dsim.write_command(None, &SET_COLUMN).unwrap_err();
    assert_eq!(err, TransportError::CommandTimeout);
    assert!(err.is_retryable());
    assert_eq!(h.dsim.metrics().snapshot().timeouts, 1);
    assert_eq!(h.dsim.state(), TransportState::HsClkEn);
}

#[test]
fn test_drain_without_irq_is_tolerated() {
    let h = Harness::ready();
    h.bus.set_drain_mode(DrainMode::DrainWithoutIrq);

    h.dsim.write_command(None, &SET_COLUMN).unwrap();

    let m = h.dsim.metrics().snapshot();
    assert_eq!(m.timeouts, 0);
    assert_eq!(m.late_fifo_drains, 1);
}

#[test]
fn test_plain_write_does_not_wait() {
    let h = Harness::ready();
    h.bus.set_drain_mode(DrainMode::Stuck);

    h.dsim.write_command(None, &[DISPLAY_ON]).unwrap();
    assert_eq!(h.bus.header_fifo_level(), 1);
    assert_eq!(h.dsim.metrics().snapshot().timeouts, 0);
}

#[test]
fn test_short_read() {
    let h = Harness::ready();
    // DCS short read response, one byte
    h.bus.push_response(vec![0x0000_9c21]);

    let rx = h.dsim.read_command(DCS_READ, u16::from(GET_POWER_MODE), 1).unwrap();
    assert_eq!(rx, vec![0x9c]);

    let sent = h.bus.sent_packets();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].header, header_word(SET_MAXIMUM_RETURN_PACKET_SIZE, 1, 0));
    assert_eq!(sent[1].header, header_word(DCS_READ, GET_POWER_MODE, 0) | PKTHDR_BTA);
    assert_eq!(h.dsim.metrics().snapshot().bytes_read, 1);
}

#[test]
fn test_two_byte_response_bounded_by_length() {
    let h = Harness::ready();
    h.bus.push_response(vec![0x0000_3422]);
    assert_eq!(h.dsim.read_command(DCS_READ, 0xda, 1).unwrap(), vec![0x34]);

    h.bus.push_response(vec![0x0012_3422]);
    assert_eq!(h.dsim.read_command(DCS_READ, 0xda, 2).unwrap(), vec![0x34, 0x12]);
}

#[test]
fn test_long_read_truncated_and_drained() {
    let h = Harness::ready();
    // DCS long read response carrying 6 bytes
    h.bus.push_response(vec![0x0000_061c, 0x0403_0201, 0x0000_0605]);

    let rx = h.dsim.read_command(DCS_READ, 0xa1, 4).unwrap();
    assert_eq!(rx, vec![1, 2, 3, 4]);
}

#[test]
fn test_generic_two_param_read_address() {
    let h = Harness::ready();
    h.bus.push_response(vec![0x0000_5511]);

    let msg = DsiMessage::read(GENERIC_READ_REQUEST_2_PARAM, &[0x34, 0x12], 1);
    assert_eq!(h.dsim.transfer(&msg).unwrap(), vec![0x55]);

    let sent = h.bus.sent_packets();
    assert_eq!(decode_header(sent[1].header), (GENERIC_READ_REQUEST_2_PARAM, 0x34, 0x12));
}

#[test]
fn test_error_report_dumps_once() {
    let h = Harness::ready();
    // ack and error report with the SoT error bit
    h.bus.push_response(vec![0x0000_0102]);

    let err = h.dsim.read_command(DCS_READ, u16::from(GET_POWER_MODE), 1).unwrap_err();
    assert!(matches!(err, TransportError::ProtocolError(_)));
    assert_eq!(Recorder::count(&h.recorder.dumps), 1);
    assert_eq!(h.dsim.diagnostics().dump_count(), 1);
    assert_eq!(h.dsim.metrics().snapshot().protocol_errors, 1);
}

#[test]
fn test_plain_ack_and_eot_return_nothing() {
    let h = Harness::ready();
    h.bus.push_response(vec![0x0000_0002]);
    assert!(h.dsim.read_command(DCS_READ, 0x0a, 1).unwrap().is_empty());

    h.bus.push_response(vec![0x0000_0008]);
    assert!(h.dsim.read_command(DCS_READ, 0x0a, 1).unwrap().is_empty());
    assert_eq!(Recorder::count(&h.recorder.dumps), 0);
}

#[test]
fn test_unknown_response_type() {
    let h = Harness::ready();
    h.bus.push_response(vec![0x0000_0033]);

    let err = h.dsim.read_command(DCS_READ, 0x0a, 1).unwrap_err();
    assert!(matches!(err, TransportError::ProtocolError(_)));
    assert_eq!(Recorder::count(&h.recorder.dumps), 1);
}

#[test]
fn test_residual_rx_data() {
    let h = Harness::ready();
    h.bus.push_response(vec![0x0000_9c21, 0xdead_beef]);

    let err = h.dsim.read_command(DCS_READ, 0x0a, 1).unwrap_err();
    assert_eq!(err, TransportError::ResidualData);
    assert_eq!(h.dsim.metrics().snapshot().residual_data, 1);
    assert_eq!(Recorder::count(&h.recorder.dumps), 1);
}

#[test]
fn test_read_without_response_times_out() {
    let h = Harness::ready();
    let err = h.dsim.read_command(DCS_READ, 0x0a, 1).unwrap_err();
    assert_eq!(err, TransportError::CommandTimeout);
    assert_eq!(h.dsim.metrics().snapshot().timeouts, 1);
}

#[test]
fn test_read_argument_checks() {
    let h = Harness::ready();
    assert!(matches!(h.dsim.read_command(DCS_READ, 0x0a, 253), Err(TransportError::InvalidArgument(_))));
    assert_eq!(h.dsim.read_command(DCS_SHORT_WRITE, 0x0a, 1), Err(TransportError::UnsupportedType(DCS_SHORT_WRITE)));
    assert!(h.bus.sent_packets().is_empty());
}

#[test]
fn test_short_read_address_is_logged() {
    let h = Harness::ready();
    let msg = DsiMessage::read(GENERIC_READ_REQUEST_2_PARAM, &[0x34], 1);

    assert!(matches!(h.dsim.transfer(&msg), Err(TransportError::InvalidArgument(_))));
    assert!(h.bus.sent_packets().is_empty());

    let errors = h.dsim.diagnostics().recent_errors(Duration::from_secs(60));
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, "INVALID_ARGUMENT");
    assert_eq!(errors[0].operation, "read");
}

#[test]
fn test_transfer_holds_hibernation() {
    let h = Harness::new(test_options());

    let msg = DsiMessage::write(DCS_SHORT_WRITE, &[DISPLAY_ON]);
    assert!(h.dsim.transfer(&msg).is_err());
    assert_eq!(Recorder::count(&h.recorder.hib_block), 1);
    assert_eq!(Recorder::count(&h.recorder.hib_unblock), 1);

    h.dsim.configure_mode(&fhd_mode("1080x2400@60")).unwrap();
    h.dsim.enable().unwrap();
    assert!(h.dsim.transfer(&msg).unwrap().is_empty());
    assert_eq!(Recorder::count(&h.recorder.hib_block), 2);
    assert_eq!(Recorder::count(&h.recorder.hib_unblock), 2);
}

#[test]
fn test_commands_logged_as_events() {
    let h = Harness::ready();
    h.dsim.write_command(None, &[DISPLAY_ON]).unwrap();
    assert!(h
        .recorder
        .events()
        .contains(&DsimEvent::Command { data_id: DCS_SHORT_WRITE, d0: DISPLAY_ON }));
}

#[test]
fn test_disable_waits_for_inflight_write() {
    let h = Harness::ready_with(DsimOptions { write_timeout_ms: 200, ..test_options() });
    h.bus.set_drain_mode(DrainMode::Stuck);

    let writer = {
        let dsim = h.dsim.clone();
        thread::spawn(move || dsim.write_command(None, &SET_COLUMN))
    };
    assert!(wait_until(|| h.bus.header_fifo_level() == 1));

    h.dsim.disable().unwrap();
    // the writer gave up under the command lock before the link went down
    assert_eq!(h.dsim.metrics().snapshot().timeouts, 1);
    assert_eq!(h.dsim.state(), TransportState::Suspended);
    assert_eq!(writer.join().unwrap(), Err(TransportError::CommandTimeout));

    assert_eq!(
        h.dsim.write_command(None, &[DISPLAY_ON]),
        Err(TransportError::NotReady(TransportState::Suspended))
    );
}

#[test]
fn test_enter_ulps_waits_for_inflight_write() {
    let h = Harness::ready_with(DsimOptions { write_timeout_ms: 200, ..test_options() });
    h.bus.set_drain_mode(DrainMode::Stuck);

    let writer = {
        let dsim = h.dsim.clone();
        thread::spawn(move || dsim.write_command(None, &SET_COLUMN))
    };
    assert!(wait_until(|| h.bus.header_fifo_level() == 1));

    h.dsim.enter_ulps().unwrap();
    assert_eq!(h.dsim.metrics().snapshot().timeouts, 1);
    assert_eq!(h.dsim.state(), TransportState::Ulps);
    assert_eq!(writer.join().unwrap(), Err(TransportError::CommandTimeout));
}

#[test]
fn test_concurrent_writers_are_serialized() {
    const WRITERS: u8 = 4;
    const WRITES: u8 = 8;

    let h = Harness::ready_with(DsimOptions::default());
    h.bus.set_drain_mode(DrainMode::Delayed(Duration::from_micros(200)));

    let handles: Vec<_> = (0..WRITERS)
        .map(|w| {
            let dsim = h.dsim.clone();
            thread::spawn(move || {
                for i in 0..WRITES {
                    dsim.write_command(None, &[DCS_SET_COLUMN_ADDRESS, w, i, 0x04, 0x37])?;
                }
                Ok::<(), TransportError>(())
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    let total = usize::from(WRITERS) * usize::from(WRITES);
    let sent = h.bus.sent_packets();
    assert_eq!(sent.len(), total);

    let mut seen: Vec<(u8, u8)> = sent
        .iter()
        .map(|p| {
            assert_eq!(long_header_len(p.header), 5);
            let [cmd, w, i, hi] = p.payload[0].to_le_bytes();
            let expected: Vec<u32> = pack_payload(&[cmd, w, i, hi, 0x37]).collect();
            assert_eq!(p.payload, expected);
            (w, i)
        })
        .collect();
    seen.sort_unstable();
    seen.dedup();
    assert_eq!(seen.len(), total);

    let m = h.dsim.metrics().snapshot();
    assert_eq!(m.commands_written as usize, total);
    assert_eq!(m.timeouts, 0);
}

#[test]
fn test_watchdog_clears_unreported_fifo_empty() {
    let h = Harness::ready_with(DsimOptions { write_timeout_ms: 200, ..test_options() });
    h.bus.set_drain_mode(DrainMode::Stuck);

    // no wait for a plain write, so the watchdog stays armed
    h.dsim.write_command(None, &[DISPLAY_ON]).unwrap();
    h.bus.drain_fifo();
    assert_ne!(h.bus.interrupt_sources() & INTSRC_SFR_PH_FIFO_EMPTY, 0);

    assert!(wait_until(|| h.dsim.metrics().snapshot().watchdog_recoveries == 1));
    assert_eq!(h.bus.interrupt_sources() & INTSRC_SFR_PH_FIFO_EMPTY, 0);
    assert_eq!(h.dsim.state(), TransportState::HsClkEn);

    h.bus.set_drain_mode(DrainMode::Inline);
    h.dsim.write_command(None, &SET_COLUMN).unwrap();
    let m = h.dsim.metrics().snapshot();
    assert_eq!((m.timeouts, m.late_fifo_drains), (0, 0));
}

#[test]
fn test_watchdog_leaves_pending_fifo_alone() {
    let h = Harness::ready();
    h.bus.set_drain_mode(DrainMode::Stuck);

    h.dsim.write_command(None, &[DISPLAY_ON]).unwrap();
    thread::sleep(Duration::from_millis(80));

    assert_eq!(h.bus.header_fifo_level(), 1);
    assert_eq!(h.dsim.metrics().snapshot().watchdog_recoveries, 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_long_write_reaches_fifo_intact(payload in proptest::collection::vec(any::<u8>(), 3..=64)) {
        let h = Harness::ready();
        h.dsim.write_command(None, &payload).unwrap();

        let sent = h.bus.sent_packets();
        prop_assert_eq!(sent.len(), 1);
        prop_assert_eq!(decode_header(sent[0].header).0, DCS_LONG_WRITE);
        prop_assert_eq!(usize::from(long_header_len(sent[0].header)), payload.len());

        let bytes: Vec<u8> = sent[0].payload.iter().flat_map(|w| w.to_le_bytes()).take(payload.len()).collect();
        prop_assert_eq!(bytes, payload);
    }
}
