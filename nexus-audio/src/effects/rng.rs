/// xorshift64 PRNG (no allocation, deterministic)
#[derive(Debug, Clone)]
pub(crate) struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    pub fn new(seed: u64) -> Self {
        Self {
            state: if seed == 0 { 0xDEADBEEF_CAFEBABE } else { seed },
        }
    }

    /// Uniform value in [0, 1]
    #[inline]
    pub fn next_unit(&mut self) -> f32 {
        self.state ^= self.state << 13;
        self.state ^= self.state >> 7;
        self.state ^= self.state << 17;
        (self.state as f32) / (u64::MAX as f32)
    }

    /// Uniform value in [-1, 1]
    #[inline]
    pub fn next_bipolar(&mut self) -> f32 {
        self.next_unit() * 2.0 - 1.0
    }
}

impl Default for XorShift64 {
    fn default() -> Self {
        Self::new(0xDEADBEEF_CAFEBABE)
    }
}
