/// PLL P/M/S/K solver
///
/// The D-PHY PLL produces `fout = (m + k / 2^k_bits) * 2 * (finput / p) / 2^s`.
/// `k` is a two's complement fraction, so a fraction with its sign bit set
/// is carried into `m`.
use crate::error::ClockError;
use crate::timing::{PllFeatures, Pms};

pub const HZ_PER_MHZ: u64 = 1_000_000;

/// Largest fractional width the solver accepts
const MAX_K_BITS: u32 = 31;

/// Compute the divider set that produces `hs_clock_mhz` on a PHY with the
/// given limits. Pure function: nothing is programmed here.
pub fn calc_pmsk(features: &PllFeatures, hs_clock_mhz: u32) -> Result<Pms, ClockError> {
    let f = features;

    if f.foptimum == 0 {
        return Err(ClockError::out_of_range("foptimum", 0, 1, u64::MAX));
    }

    // round to closest, never below one
    let p = ((f.finput + f.foptimum / 2) / f.foptimum).max(1);
    if p < u64::from(f.p_min) || p > u64::from(f.p_max) {
        log::error!("p {} is out of range ({}, {})", p, f.p_min, f.p_max);
        return Err(ClockError::out_of_range("p", p, f.p_min.into(), f.p_max.into()));
    }

    let fref = f.finput / p;
    if fref == 0 {
        return Err(ClockError::out_of_range("finput", f.finput, p, u64::MAX));
    }

    let hs_clock = u64::from(hs_clock_mhz) * HZ_PER_MHZ;
    if hs_clock == 0 || hs_clock < f.fout_min || hs_clock > f.fout_max {
        log::error!("hs clock {} out of range", hs_clock);
        return Err(ClockError::out_of_range("hs clock", hs_clock, f.fout_min, f.fout_max));
    }

    // find s: vco_min <= fout * 2^s <= vco_max
    let mut s = 0u32;
    let mut fvco = hs_clock;
    while fvco < f.fvco_min {
        s += 1;
        fvco = 1u64
            .checked_shl(s)
            .and_then(|scale| hs_clock.checked_mul(scale))
            .ok_or(ClockError::out_of_range("vco", u64::MAX, f.fvco_min, f.fvco_max))?;
    }

    if fvco > f.fvco_max {
        log::error!("no proper s found (vco {})", fvco);
        return Err(ClockError::out_of_range("vco", fvco, f.fvco_min, f.fvco_max));
    }
    if s < f.s_min || s > f.s_max {
        log::error!("s {} is out of range ({}, {})", s, f.s_min, f.s_max);
        return Err(ClockError::out_of_range("s", s.into(), f.s_min.into(), f.s_max.into()));
    }

    if f.k_bits == 0 || f.k_bits > MAX_K_BITS {
        return Err(ClockError::out_of_range("k_bits", f.k_bits.into(), 1, MAX_K_BITS.into()));
    }

    // (hs_clk * 2^s / 2) / (fin / p) = m + k / 2^k_bits, one extra bit for roundup
    let frac_bits = f.k_bits + 1;
    let q = (u128::from(fvco >> 1) << frac_bits) / u128::from(fref);

    let m = q >> frac_bits;
    if m < u128::from(f.m_min) || m > u128::from(f.m_max) {
        log::error!("m {} is out of range ({}, {})", m, f.m_min, f.m_max);
        return Err(ClockError::out_of_range("m", m as u64, f.m_min.into(), f.m_max.into()));
    }
    let mut m = m as u32;

    let frac = (q & ((1u128 << frac_bits) - 1)) as u64;
    let k = frac.div_ceil(2) as u32;

    if k & (1 << (f.k_bits - 1)) != 0 {
        m += 1;
    }

    Ok(Pms {
        p: p as u32,
        m,
        s,
        k,
        ..Pms::default()
    })
}

/// Output frequency (Hz) that a divider set produces, the inverse of
/// [`calc_pmsk`]. Used for logging and for checking solver results.
pub fn pms_to_hz(features: &PllFeatures, pms: &Pms) -> u64 {
    if pms.p == 0 || features.k_bits == 0 || features.k_bits > MAX_K_BITS {
        return 0;
    }

    let kb = features.k_bits;
    let fref = i128::from(features.finput / u64::from(pms.p));
    let k = i128::from(pms.k);
    let k_signed = if pms.k & (1 << (kb - 1)) != 0 { k - (1i128 << kb) } else { k };

    let ratio = (i128::from(pms.m) << kb) + k_signed;
    let fout = (ratio * fref * 2) >> (kb + pms.s);

    fout.max(0) as u64
}

/// Resolution (Hz) of the output frequency for a given `s`, one LSB of `k`
pub fn k_resolution_hz(features: &PllFeatures, p: u32, s: u32) -> u64 {
    if p == 0 {
        return 0;
    }
    let fref = features.finput / u64::from(p);
    (fref * 2) >> (features.k_bits + s)
}
