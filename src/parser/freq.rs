/// Converts hardware cycle counts to nanoseconds.
///
/// The factor is fixed once per session from the frequency table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencyConverter {
    cycles_per_ns: f64,
}

impl FrequencyConverter {
    /// `cycles_per_ns` must be positive; non-positive values fall back to 1.
    pub fn new(cycles_per_ns: f64) -> Self {
        let cycles_per_ns = if cycles_per_ns > 0.0 && cycles_per_ns.is_finite() {
            cycles_per_ns
        } else {
            tracing::warn!(cycles_per_ns, "invalid frequency factor, using 1 cycle/ns");
            1.0
        };
        Self { cycles_per_ns }
    }

    /// Build from a counter frequency in MHz.
    pub fn from_mhz(mhz: f64) -> Self {
        Self::new(mhz / 1000.0)
    }

    pub fn cycles_per_ns(&self) -> f64 {
        self.cycles_per_ns
    }

    pub fn to_ns(&self, cycles: u64) -> u64 {
        (cycles as f64 / self.cycles_per_ns).round() as u64
    }
}

impl Default for FrequencyConverter {
    fn default() -> Self {
        Self::new(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_factor() {
        let f = FrequencyConverter::new(1.0);
        assert_eq!(f.to_ns(1_000_000), 1_000_000);
    }

    #[test]
    fn test_from_mhz() {
        // 100 MHz: one cycle every 10 ns.
        let f = FrequencyConverter::from_mhz(100.0);
        assert_eq!(f.to_ns(5), 50);
        assert_eq!(f.to_ns(0), 0);
    }

    #[test]
    fn test_invalid_factor_falls_back() {
        assert_eq!(FrequencyConverter::new(0.0).cycles_per_ns(), 1.0);
        assert_eq!(FrequencyConverter::new(f64::NAN).cycles_per_ns(), 1.0);
    }
}
