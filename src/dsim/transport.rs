/// Command mode packet transport over the header/payload FIFOs
use std::time::Instant;

use dsim_core::packet::{
    ack_error_names, default_write_type, header_word, long_header_word, needs_fifo_drain, pack_payload,
    PacketClass, RxPacket, DCS_READ, GENERIC_READ_REQUEST_1_PARAM, GENERIC_READ_REQUEST_2_PARAM,
    MAX_LONG_PAYLOAD, SET_MAXIMUM_RETURN_PACKET_SIZE,
};

use super::platform::DsimEvent;
use super::regs::{INTSRC_RX_DATA_DONE, INTSRC_SFR_PH_FIFO_EMPTY, RX_FIFO_MAX_DEPTH, RX_PHK_HEADER_SIZE};
use super::{Dsim, TransportError, TransportState};
use crate::{dsim_debug, dsim_err, dsim_info};

/// Largest response the RX FIFO can hold after the packet header
const MAX_READ_LEN: usize = RX_FIFO_MAX_DEPTH * 4 - RX_PHK_HEADER_SIZE;

/// One caller supplied transfer. Read requests take their parameters from
/// `tx` and return up to `rx_len` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DsiMessage<'a> {
    pub data_type: u8,
    pub tx: &'a [u8],
    pub rx_len: usize,
}

impl<'a> DsiMessage<'a> {
    pub fn write(data_type: u8, tx: &'a [u8]) -> Self {
        Self { data_type, tx, rx_len: 0 }
    }

    pub fn read(data_type: u8, tx: &'a [u8], rx_len: usize) -> Self {
        Self { data_type, tx, rx_len }
    }

    /// Register address of a read request, taken from the parameter bytes
    fn read_address(&self) -> Result<u16, TransportError> {
        let need = match self.data_type {
            GENERIC_READ_REQUEST_2_PARAM => 2,
            DCS_READ | GENERIC_READ_REQUEST_1_PARAM => 1,
            _ => 0,
        };
        if self.tx.len() < need {
            return Err(TransportError::InvalidArgument(format!(
                "read type 0x{:02x} needs {} parameter bytes, got {}",
                self.data_type,
                need,
                self.tx.len()
            )));
        }
        Ok(match need {
            2 => u16::from_le_bytes([self.tx[0], self.tx[1]]),
            1 => u16::from(self.tx[0]),
            _ => 0,
        })
    }
}

/// What goes into the FIFOs for one packet
#[derive(Debug, Clone, Copy)]
enum Packet<'a> {
    Header { d0: u8, d1: u8 },
    Long(&'a [u8]),
}

impl Dsim {
    /// Send `payload` as one packet. Without `data_type` the type follows
    /// the payload length: DCS short write, with parameter, or long write.
    pub fn write_command(&self, data_type: Option<u8>, payload: &[u8]) -> Result<(), TransportError> {
        let res = self.write_command_inner(data_type, payload);
        match &res {
            Ok(()) => self.inner.metrics.add_write(payload.len()),
            Err(e) => self.inner.diagnostics.log_transport_error("write", e),
        }
        res
    }

    fn write_command_inner(&self, data_type: Option<u8>, payload: &[u8]) -> Result<(), TransportError> {
        let data_id = match data_type {
            Some(data_id) => data_id,
            None => default_write_type(payload.len())
                .ok_or_else(|| TransportError::InvalidArgument("empty payload".to_string()))?,
        };

        let packet = match PacketClass::of(data_id) {
            Some(PacketClass::Long) => Packet::Long(payload),
            Some(_) => match payload {
                [] => Packet::Header { d0: 0, d1: 0 },
                [d0] => Packet::Header { d0: *d0, d1: 0 },
                [d0, d1] => Packet::Header { d0: *d0, d1: *d1 },
                _ => {
                    return Err(TransportError::InvalidArgument(format!(
                        "{} bytes do not fit a short packet (0x{:02x})",
                        payload.len(),
                        data_id
                    )))
                }
            },
            None => return Err(TransportError::UnsupportedType(data_id)),
        };

        let _cmd = self.lock_cmd();
        self.write_data(data_id, packet)
    }

    /// Read `length` bytes from `address` with a read request of
    /// `data_type`. Short responses return the bytes they carry, long ones
    /// are truncated to `length`.
    pub fn read_command(&self, data_type: u8, address: u16, length: usize) -> Result<Vec<u8>, TransportError> {
        let res = self.read_command_inner(data_type, address, length);
        match &res {
            Ok(rx) => self.inner.metrics.add_read(rx.len()),
            Err(e) => self.inner.diagnostics.log_transport_error("read", e),
        }
        res
    }

    fn read_command_inner(&self, data_type: u8, address: u16, length: usize) -> Result<Vec<u8>, TransportError> {
        let inner = &self.inner;

        let state = self.state();
        if state != TransportState::HsClkEn {
            dsim_err!(self.id(), "Not ready({:?})", state);
            return Err(TransportError::NotReady(state));
        }
        if length > MAX_READ_LEN {
            dsim_err!(self.id(), "requested rx size is wrong({})", length);
            return Err(TransportError::InvalidArgument(format!(
                "read length {} exceeds {}",
                length, MAX_READ_LEN
            )));
        }
        if PacketClass::of(data_type) != Some(PacketClass::ReadRequest) {
            return Err(TransportError::UnsupportedType(data_type));
        }

        dsim_debug!(self.id(), "type[0x{:02x}], cmd[0x{:04x}], rx cnt[{}]", data_type, address, length);

        let _cmd = self.lock_cmd();

        // Init RX FIFO before read and clear DSIM_INTSRC
        self.regs().clear_int(INTSRC_RX_DATA_DONE);
        inner.rd_comp.reinit();

        let [len_lo, len_hi] = (length as u16).to_le_bytes();
        self.write_data(SET_MAXIMUM_RETURN_PACKET_SIZE, Packet::Header { d0: len_lo, d1: len_hi })?;

        let [addr_lo, addr_hi] = address.to_le_bytes();
        let request = if data_type == GENERIC_READ_REQUEST_2_PARAM {
            Packet::Header { d0: addr_lo, d1: addr_hi }
        } else {
            Packet::Header { d0: addr_lo, d1: 0 }
        };
        self.write_data(data_type, request)?;

        let start = Instant::now();
        let done = inner.rd_comp.wait_timeout(inner.options.read_timeout());
        inner.metrics.add_wait(start.elapsed());
        if !done {
            dsim_err!(self.id(), "read timeout");
            inner.metrics.add_timeout();
            return Err(TransportError::CommandTimeout);
        }

        let rx = self.read_response(length)?;

        if !self.regs().rx_fifo_is_empty() {
            dsim_err!(self.id(), "RX FIFO is not empty");
            self.dump("residual rx data");
            inner.metrics.add_residual_data();
            return Err(TransportError::ResidualData);
        }

        Ok(rx)
    }

    /// Pop and decode one response from the RX FIFO
    fn read_response(&self, length: usize) -> Result<Vec<u8>, TransportError> {
        let regs = self.regs();
        let word = regs.get_rx_fifo();

        match RxPacket::parse(word) {
            Ok(RxPacket::AckError(0)) => {
                dsim_debug!(self.id(), "peripheral acknowledged");
                Ok(Vec::new())
            }
            Ok(RxPacket::AckError(errors)) => {
                for name in ack_error_names(errors) {
                    dsim_err!(self.id(), "{}", name);
                }
                self.dump("error report");
                self.inner.metrics.add_protocol_error();
                Err(TransportError::ProtocolError(format!("error report 0x{:04x}", errors)))
            }
            Ok(RxPacket::EndOfTransmission) => {
                dsim_debug!(self.id(), "EoTp Received");
                Ok(Vec::new())
            }
            Ok(RxPacket::Short { data, len }) => Ok(data[..len.min(length)].to_vec()),
            Ok(RxPacket::Long { len }) => {
                let len = usize::from(len);
                if len > MAX_READ_LEN {
                    dsim_err!(self.id(), "long response of {} bytes overflows the RX FIFO", len);
                    self.dump("oversized response");
                    self.inner.metrics.add_protocol_error();
                    return Err(TransportError::ProtocolError(format!("long response length {}", len)));
                }

                // drain every payload word so the FIFO ends empty
                let mut rx = Vec::with_capacity(len.min(length));
                for _ in 0..len.div_ceil(4) {
                    let bytes = regs.get_rx_fifo().to_le_bytes();
                    let room = len.min(length).saturating_sub(rx.len());
                    rx.extend(bytes.iter().take(room));
                }
                Ok(rx)
            }
            Err(ty) => {
                dsim_err!(self.id(), "packet format is invalid (0x{:02x})", ty);
                self.dump("invalid rx packet");
                self.inner.metrics.add_protocol_error();
                Err(TransportError::ProtocolError(format!("invalid response type 0x{:02x}", ty)))
            }
        }
    }

    pub(crate) fn transfer_locked(&self, msg: &DsiMessage<'_>) -> Result<Vec<u8>, TransportError> {
        match PacketClass::of(msg.data_type) {
            Some(PacketClass::ReadRequest) => {
                let address = msg.read_address().map_err(|e| {
                    self.inner.diagnostics.log_transport_error("read", &e);
                    e
                })?;
                self.read_command(msg.data_type, address, msg.rx_len)
            }
            _ => self.write_command(Some(msg.data_type), msg.tx).map(|()| Vec::new()),
        }
    }

    /// Queue one packet. Caller holds the command lock.
    fn write_data(&self, data_id: u8, packet: Packet<'_>) -> Result<(), TransportError> {
        let inner = &self.inner;

        let state = self.state();
        if state != TransportState::HsClkEn {
            dsim_err!(self.id(), "DSIM is not ready. state({:?})", state);
            return Err(TransportError::NotReady(state));
        }
        if let Packet::Long(payload) = packet {
            if payload.len() > MAX_LONG_PAYLOAD {
                return Err(TransportError::InvalidArgument(format!(
                    "long payload of {} bytes",
                    payload.len()
                )));
            }
        }

        let d0 = match packet {
            Packet::Header { d0, .. } => d0,
            Packet::Long(payload) => payload.first().copied().unwrap_or(0),
        };
        inner.collab.log_event(DsimEvent::Command { data_id, d0 });

        let regs = self.regs();
        inner.ph_wr_comp.reinit();
        regs.clear_int(INTSRC_SFR_PH_FIFO_EMPTY);
        inner.cmd_timer.start_once(inner.options.write_timeout());

        let must_wait = match (PacketClass::of(data_id), packet) {
            (Some(PacketClass::Short), Packet::Header { d0, d1 }) => {
                regs.wr_tx_header(header_word(data_id, d0, d1), false);
                self.fifo_empty_needed(data_id, d0)
            }
            (Some(PacketClass::ReadRequest), Packet::Header { d0, d1 }) => {
                regs.wr_tx_header(header_word(data_id, d0, d1), true);
                self.fifo_empty_needed(data_id, d0)
            }
            (Some(PacketClass::Long), Packet::Long(payload)) => {
                for word in pack_payload(payload) {
                    regs.wr_tx_payload(word);
                }
                regs.wr_tx_header(long_header_word(data_id, payload.len() as u16), false);
                self.fifo_empty_needed(data_id, d0)
            }
            _ => {
                inner.cmd_timer.stop();
                dsim_info!(self.id(), "data id {:x} is not supported", data_id);
                return Err(TransportError::UnsupportedType(data_id));
            }
        };

        self.wait_for_cmd_fifo_empty(must_wait)
    }

    fn fifo_empty_needed(&self, data_id: u8, d0: u8) -> bool {
        needs_fifo_drain(data_id, d0) || !self.regs().is_writable_fifo_state()
    }

    fn wait_for_cmd_fifo_empty(&self, must_wait: bool) -> Result<(), TransportError> {
        let inner = &self.inner;
        let regs = self.regs();

        if !must_wait {
            // timer is deleted if the FIFO is already drained
            if regs.header_fifo_is_empty() {
                inner.cmd_timer.stop();
            }
            dsim_debug!(self.id(), "Doesn't need to wait fifo_completion");
            return Ok(());
        }

        inner.cmd_timer.stop();
        let start = Instant::now();
        let done = inner.ph_wr_comp.wait_timeout(inner.options.write_timeout());
        inner.metrics.add_wait(start.elapsed());
        if done {
            return Ok(());
        }

        if regs.header_fifo_is_empty() {
            inner.ph_wr_comp.reinit();
            regs.clear_int(INTSRC_SFR_PH_FIFO_EMPTY);
            inner.metrics.add_late_drain();
            dsim_info!(self.id(), "header FIFO drained without completion");
            return Ok(());
        }

        if self.state() == TransportState::HsClkEn {
            dsim_err!(self.id(), "have timed out");
        }
        inner.metrics.add_timeout();
        Err(TransportError::CommandTimeout)
    }
}
