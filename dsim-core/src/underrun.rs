/// LP underrun budget for command mode panels
///
/// The host may idle in LP between frame transfers as long as the whole
/// frame still fits inside the TE period. The budget is programmed in units
/// of 100 word clocks.
use crate::error::ClockError;
use crate::timing::DsimConfig;

const NSEC_PER_SEC: u128 = 1_000_000_000;
const NSEC_PER_USEC: u128 = 1_000;
/// Bytes of packet overhead per transferred line
const PACKET_HEADER_BYTES: u128 = 7;
/// Word clocks per underrun count
pub const UNDERRUN_UNIT_WCLK: u128 = 100;

/// Compute the LP underrun count for `config` at `hs_clock_mhz`.
pub fn calc_underrun(config: &DsimConfig, hs_clock_mhz: u32) -> Result<u32, ClockError> {
    let t = &config.p_timing;
    let lanes = u128::from(config.data_lane_cnt);
    let wclk = u128::from(hs_clock_mhz) * 1_000_000 / 16;

    if lanes == 0 || wclk == 0 || t.vrefresh == 0 {
        log::error!(
            "cannot budget underrun: lanes {} wclk {} vrefresh {}",
            lanes,
            wclk,
            t.vrefresh
        );
        return Err(ClockError::InfeasibleTiming {
            max_frame_time_ns: 0,
            min_transfer_time_ns: u64::MAX,
        });
    }

    let number_of_transfer = u128::from(t.vactive);
    let mut w_threshold = u128::from(t.hactive);
    if config.dsc.enabled {
        w_threshold /= 3;
    }

    // one frame pixel data plus per-line packet headers (bytes)
    let frame_data = number_of_transfer * w_threshold * u128::from(config.bpp) / 8;
    let packet_header = number_of_transfer * PACKET_HEADER_BYTES;

    // minimum time to transfer one frame (ns)
    let min_frame_transfer_time = (frame_data + packet_header) * NSEC_PER_SEC / (2 * lanes * wclk);

    // max time to transfer one frame (ns)
    let frame_period =
        NSEC_PER_SEC * 100 / (u128::from(t.vrefresh) * (100 + u128::from(t.te_var)));
    let te_idle = NSEC_PER_USEC * u128::from(t.te_idle_us);

    let max_frame_time = match frame_period.checked_sub(te_idle) {
        Some(v) if v >= min_frame_transfer_time => v,
        other => {
            let max = other.unwrap_or(0);
            log::error!(
                "max frame time {} < min frame time {}",
                max,
                min_frame_transfer_time
            );
            return Err(ClockError::InfeasibleTiming {
                max_frame_time_ns: saturate_u64(max),
                min_transfer_time_ns: saturate_u64(min_frame_transfer_time),
            });
        }
    };

    let max_lp_time = max_frame_time - min_frame_transfer_time;
    let underrun = (max_lp_time * wclk / NSEC_PER_SEC).div_ceil(UNDERRUN_UNIT_WCLK);

    Ok(u32::try_from(underrun).unwrap_or(u32::MAX))
}

fn saturate_u64(v: u128) -> u64 {
    u64::try_from(v).unwrap_or(u64::MAX)
}
