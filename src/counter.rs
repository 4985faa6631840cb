/**
 * Boolish houses things that can be interpreted as a boolean but
 * internally take on more values.  The classic example is the two-bit
 * saturating counter, but the perceptron weights and the TAGE
 * prediction counters are the same idea with a signed range.  Key is
 * the conversion to boolean and an `update` that nudges the value in a
 * particular direction without ever wrapping.
 */

pub trait Boolish {
    fn update(&mut self, taken: bool) -> &mut Self;
    fn value(&self) -> bool;
}

/// An unsigned `bits`-wide counter in `[0, 2^bits - 1]`.
/// Predicts taken in the upper half of the range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SaturatingCounter {
    count: u8,
    max: u8,
}

impl SaturatingCounter {
    pub const MAX_BITS: u32 = 8;

    pub fn new(bits: u32, count: u8) -> SaturatingCounter {
        debug_assert!((1..=Self::MAX_BITS).contains(&bits));
        let max = (((1u16 << bits) - 1) & 0xff) as u8;
        SaturatingCounter {
            count: count.min(max),
            max,
        }
    }

    /// One step below the taken threshold, i.e. "weakly not taken".
    /// For a one-bit counter this is plain "not taken".
    pub fn weakly_not_taken(bits: u32) -> SaturatingCounter {
        let c = Self::new(bits, 0);
        Self::new(bits, c.threshold() - 1)
    }

    pub fn count(&self) -> u8 {
        self.count
    }

    pub fn max(&self) -> u8 {
        self.max
    }

    pub fn threshold(&self) -> u8 {
        (self.max >> 1) + 1
    }

    pub fn increment(&mut self) {
        if self.count < self.max {
            self.count += 1;
        }
    }

    pub fn decrement(&mut self) {
        self.count = self.count.saturating_sub(1);
    }

    pub fn is_zero(&self) -> bool {
        self.count == 0
    }
}

impl Boolish for SaturatingCounter {
    fn update(&mut self, taken: bool) -> &mut Self {
        if taken {
            self.increment()
        } else {
            self.decrement()
        }
        self
    }

    fn value(&self) -> bool {
        self.count >= self.threshold()
    }
}

/// A two's complement `bits`-wide counter in `[-2^(bits-1), 2^(bits-1) - 1]`.
/// Non-negative means taken.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SignedCounter {
    value: i16,
    min: i16,
    max: i16,
}

impl SignedCounter {
    pub const MAX_BITS: u32 = 16;

    pub fn new(bits: u32, value: i16) -> SignedCounter {
        debug_assert!((1..=Self::MAX_BITS).contains(&bits));
        let max = ((1i32 << (bits - 1)) - 1) as i16;
        let min = (-(1i32 << (bits - 1))) as i16;
        SignedCounter {
            value: value.clamp(min, max),
            min,
            max,
        }
    }

    pub fn get(&self) -> i16 {
        self.value
    }

    pub fn set(&mut self, value: i16) {
        self.value = value.clamp(self.min, self.max);
    }

    pub fn bounds(&self) -> (i16, i16) {
        (self.min, self.max)
    }
}

impl Boolish for SignedCounter {
    fn update(&mut self, taken: bool) -> &mut Self {
        if taken {
            if self.value < self.max {
                self.value += 1;
            }
        } else if self.value > self.min {
            self.value -= 1;
        }
        self
    }

    fn value(&self) -> bool {
        self.value >= 0
    }
}
