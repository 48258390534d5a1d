#[derive(Debug)]
pub(crate) struct Rand {
    state: u64,
}

impl Rand {
    pub(crate) const fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    pub(crate) fn rand_u32(&mut self) -> u32 {
        // sPCG32 from https://www.pcg-random.org/paper.html
        // see also https://nullprogram.com/blog/2017/09/21/
        const M: u64 = 0xbb2efcec3c39611d;
        const A: u64 = 0x7590ef39;

        let s = self.state.wrapping_mul(M).wrapping_add(A);
        self.state = s;

        let shift = 29 - (s >> 61);
        (s >> shift) as u32
    }

    pub(crate) fn rand_u16(&mut self) -> u16 {
        let n = self.rand_u32();
        (n ^ (n >> 16)) as u16
    }

    /// A value in `0..bound`, or 0 when `bound` is 0.
    pub(crate) fn rand_below(&mut self, bound: u64) -> u64 {
        if bound == 0 {
            return 0;
        }
        let wide = ((self.rand_u32() as u64) << 32) | self.rand_u32() as u64;
        wide % bound
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_rand_below_bounds() {
        let mut rand = Rand::new(0x1234);
        for _ in 0..100 {
            assert!(rand.rand_below(7) < 7);
        }
        assert_eq!(rand.rand_below(0), 0);
    }
}
