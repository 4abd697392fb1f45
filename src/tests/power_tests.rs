use std::sync::atomic::Ordering;

use dsim_core::{ClockError, OpMode};

use super::{fhd_mode, test_options, Harness, Recorder};
use crate::config::DsimOptions;
use crate::dsim::regs::*;
use crate::dsim::{BistMode, DsimEvent, IrqReturn, TransportError, TransportState};
use crate::registry::DsimRegistry;

#[test]
fn test_enable_disable_idempotent() {
    let h = Harness::ready();
    assert_eq!(h.dsim.state(), TransportState::HsClkEn);

    h.dsim.enable().unwrap();
    assert_eq!(Recorder::count(&h.recorder.phy_on), 1);

    h.dsim.disable().unwrap();
    assert_eq!(h.dsim.state(), TransportState::Suspended);
    h.dsim.disable().unwrap();
    assert_eq!(Recorder::count(&h.recorder.phy_off), 1);

    assert_eq!(h.recorder.events(), vec![DsimEvent::Enabled, DsimEvent::Disabled]);
}

#[test]
fn test_enable_programs_link() {
    let h = Harness::ready();
    let link = h.bus.peek(RegBlock::Dsim, DSIM_LINK_CTRL);
    assert_eq!(link & (LINK_CTRL_EN | LINK_CTRL_HS_CLK_EN), LINK_CTRL_EN | LINK_CTRL_HS_CLK_EN);
    assert_eq!(h.bus.peek(RegBlock::Dsim, DSIM_UNDERRUN_CTRL), 1886);
    assert_eq!(h.bus.peek(RegBlock::Dsim, DSIM_RESOL), 1080 | 2400 << 16);
    assert_eq!(h.bus.peek(RegBlock::Dsim, DSIM_INTMSK), !INT_HANDLED);

    h.dsim.disable().unwrap();
    assert_eq!(h.bus.peek(RegBlock::Dsim, DSIM_LINK_CTRL) & LINK_CTRL_STOP_MASK, 0);
    assert_eq!(h.bus.peek(RegBlock::Dsim, DSIM_INTMSK), u32::MAX);
}

#[test]
fn test_phy_failure_keeps_suspended() {
    let h = Harness::new(test_options());
    h.dsim.configure_mode(&fhd_mode("1080x2400@60")).unwrap();
    h.recorder.phy_fail.store(true, Ordering::SeqCst);

    assert!(matches!(h.dsim.enable(), Err(TransportError::Power(_))));
    assert_eq!(h.dsim.state(), TransportState::Suspended);
}

#[test]
fn test_enable_without_mode_fails() {
    let h = Harness::new(test_options());
    let before = h.bus.write_count();

    assert_eq!(h.dsim.enable(), Err(TransportError::Clock(ClockError::NotConfigured)));
    assert_eq!(h.dsim.state(), TransportState::Suspended);
    assert_eq!(h.bus.write_count(), before);
    assert_eq!(Recorder::count(&h.recorder.phy_on), 0);
    assert!(h.recorder.events().is_empty());

    // bist start goes through enable
    assert!(h.dsim.set_bist_mode(1).is_err());

    h.dsim.configure_mode(&fhd_mode("1080x2400@60")).unwrap();
    h.dsim.enable().unwrap();
    assert_eq!(h.dsim.state(), TransportState::HsClkEn);
}

#[test]
fn test_ulps_round_trip() {
    let h = Harness::new(test_options());
    h.dsim.enter_ulps().unwrap();
    assert_eq!(h.dsim.state(), TransportState::Suspended);

    h.dsim.configure_mode(&fhd_mode("1080x2400@60")).unwrap();
    h.dsim.enable().unwrap();
    h.dsim.enter_ulps().unwrap();
    assert_eq!(h.dsim.state(), TransportState::Ulps);
    let ulps = LINK_STATUS_ULPS_CLK | LINK_STATUS_ULPS_DAT;
    assert_eq!(h.bus.peek(RegBlock::Dsim, DSIM_LINK_STATUS) & ulps, ulps);

    assert_eq!(
        h.dsim.write_command(None, &[0x29]),
        Err(TransportError::NotReady(TransportState::Ulps))
    );

    h.dsim.exit_ulps().unwrap();
    assert_eq!(h.dsim.state(), TransportState::HsClkEn);
    assert_eq!(h.bus.peek(RegBlock::Dsim, DSIM_LINK_STATUS) & ulps, 0);
    h.dsim.write_command(None, &[0x29]).unwrap();

    assert_eq!(Recorder::count(&h.recorder.phy_on), 2);
    assert_eq!(Recorder::count(&h.recorder.phy_off), 1);
    let events = h.recorder.events();
    assert!(events.contains(&DsimEvent::EnterUlps));
    assert!(events.contains(&DsimEvent::ExitUlps));
}

#[test]
fn test_irq_dispatch() {
    let h = Harness::ready();
    h.bus.raise_irq(INTSRC_FRAME_DONE | INTSRC_UNDER_RUN | INTSRC_RX_CRC | INTSRC_ERR_RX_ECC);

    let m = h.dsim.metrics().snapshot();
    assert_eq!(m.frame_done, 1);
    assert_eq!(m.underruns, 1);
    assert_eq!(m.rx_crc_errors, 1);
    assert_eq!(m.rx_ecc_errors, 1);
    assert_eq!(h.bus.read(RegBlock::Dsim, DSIM_INTSRC), 0);

    let events = h.recorder.events();
    for e in [DsimEvent::FrameDone, DsimEvent::Underrun, DsimEvent::RxCrc, DsimEvent::RxEcc] {
        assert!(events.contains(&e), "missing {:?}", e);
    }
}

#[test]
fn test_vblank_only_in_video_mode() {
    let h = Harness::ready();
    h.bus.raise_irq(INTSRC_VT_STATUS);
    assert_eq!(Recorder::count(&h.recorder.vblanks), 0);

    let mut video = fhd_mode("1080x2400@60");
    video.op_mode = OpMode::Video;
    h.dsim.configure_mode(&video).unwrap();
    h.bus.raise_irq(INTSRC_VT_STATUS);
    assert_eq!(Recorder::count(&h.recorder.vblanks), 1);
}

#[test]
fn test_irq_ignored_while_suspended() {
    let h = Harness::new(test_options());
    let before = h.bus.write_count();

    assert_eq!(h.dsim.irq_handle().fire(), IrqReturn::None);
    assert_eq!(h.bus.write_count(), before);
    assert_eq!(h.dsim.metrics().snapshot().spurious_irqs, 1);
}

#[test]
fn test_irq_handle_outlived_instance() {
    let h = Harness::new(test_options());
    let handle = h.dsim.irq_handle();
    drop(h);
    assert_eq!(handle.fire(), IrqReturn::None);
}

#[test]
fn test_bist_mode() {
    let h = Harness::new(test_options());
    h.dsim.configure_mode(&fhd_mode("1080x2400@60")).unwrap();

    assert!(matches!(h.dsim.set_bist_mode(5), Err(TransportError::InvalidArgument(_))));

    h.dsim.set_bist_mode(1).unwrap();
    assert_eq!(h.dsim.state(), TransportState::HsClkEn);
    assert_eq!(h.bus.peek(RegBlock::Dsim, DSIM_BIST_CTRL), BIST_CTRL_EN);

    h.dsim.set_bist_mode(3).unwrap();
    assert_eq!(h.dsim.bist_mode(), BistMode::UserDefined);
    assert_eq!(h.bus.peek(RegBlock::Dsim, DSIM_BIST_CTRL), BIST_CTRL_EN | 2 << BIST_CTRL_MODE_SHIFT);

    h.dsim.set_bist_mode(0).unwrap();
    assert_eq!(h.dsim.bist_mode(), BistMode::Off);
    assert_eq!(h.dsim.state(), TransportState::Suspended);
    assert_eq!(h.bus.peek(RegBlock::Dsim, DSIM_BIST_CTRL), 0);
}

#[test]
fn test_diag_registers() {
    let h = Harness::new(test_options());
    assert_eq!(h.dsim.diag_names(), vec!["hs_trail".to_string(), "pll_lock".to_string()]);
    assert_eq!(h.dsim.diag_get_reg("hs_trail"), Err(ClockError::NoDevice));

    h.dsim.configure_mode(&fhd_mode("1080x2400@60")).unwrap();
    h.dsim.enable().unwrap();
    h.bus.poke(RegBlock::Dphy, 16, 0x0000_0a01);
    h.bus.poke(RegBlock::Dphy, 20, 0x0000_0500);
    assert_eq!(h.dsim.diag_get_reg("hs_trail").unwrap().as_slice(), &[0xa, 0x5]);

    h.dsim.diag_set_reg("hs_trail", 0x3).unwrap();
    assert_eq!(h.bus.peek(RegBlock::Dphy, 16), 0x0000_0301);
    assert_eq!(h.dsim.diag_get_reg("hs_trail").unwrap().as_slice(), &[0x3, 0x3]);
    assert_eq!(h.dsim.state(), TransportState::HsClkEn);

    assert!(matches!(
        h.dsim.diag_set_reg("pll_lock", 1),
        Err(ClockError::ReadOnly(name)) if name == "pll_lock"
    ));
    assert_eq!(h.dsim.diag_get_reg("nope"), Err(ClockError::NoDevice));
}

#[test]
fn test_diag_override_applied_on_enable() {
    let h = Harness::new(test_options());
    h.dsim.configure_mode(&fhd_mode("1080x2400@60")).unwrap();
    h.dsim.diag_set_reg("hs_trail", 0x7).unwrap();
    assert_eq!(h.bus.peek(RegBlock::Dphy, 16), 0);

    h.dsim.enable().unwrap();
    assert_eq!(h.bus.peek(RegBlock::Dphy, 16), 0x700);
    assert_eq!(h.bus.peek(RegBlock::Dphy, 20), 0x700);
}

#[test]
fn test_registry_owns_instances() {
    let registry = DsimRegistry::new();
    let first = Harness::ready();
    let second = Harness::new(DsimOptions { id: 1, ..test_options() });

    registry.register(first.dsim.clone()).unwrap();
    registry.register(second.dsim.clone()).unwrap();
    assert!(registry.register(first.dsim.clone()).is_err());
    assert_eq!(registry.ids(), vec![0, 1]);

    let dsim = registry.unregister(0).unwrap();
    assert_eq!(dsim.state(), TransportState::Suspended);
    assert!(registry.get(0).is_none());
    assert!(registry.get(1).is_some());

    registry.shutdown();
    assert!(registry.ids().is_empty());
}
