//! Perceptron direction predictor (Jiménez and Lin, 2001).

use crate::config::PerceptronConfig;
use crate::counter::*;
use crate::error::{allocate, check_width, ConfigError};
use crate::history::BipolarHistory;
use crate::predictor::Predictor;

/// A table of linear units over a shared bipolar global history.
///
/// Each row holds a bias weight followed by one weight per history
/// position, most recent outcome first. Weights saturate at `weight_bits`.
pub struct PerceptronBp {
    config: PerceptronConfig,
    threshold: i32,
    row_len: usize,
    weights: Vec<SignedCounter>,
    history: BipolarHistory,
    mask: u32,
}

impl PerceptronBp {
    pub fn new(config: &PerceptronConfig) -> Result<PerceptronBp, ConfigError> {
        let table_bits = check_width("perceptron table_bits", config.table_bits, 1..=20)?;
        let history_length =
            check_width("perceptron history_length", config.history_length, 1..=1024)?;
        let weight_bits = check_width(
            "perceptron weight_bits",
            config.weight_bits,
            2..=SignedCounter::MAX_BITS,
        )?;
        let threshold = config.effective_threshold();
        if threshold < 0 {
            return Err(ConfigError::InvalidParameter {
                field: "perceptron threshold",
                reason: format!("{threshold} is negative"),
            });
        }

        let row_len = history_length as usize + 1;
        let weights = allocate(
            "perceptron weights",
            (1usize << table_bits) * row_len,
            SignedCounter::new(weight_bits, 0),
        )?;
        let history = BipolarHistory::new(history_length as usize)?;
        log::debug!(
            "perceptron: {} rows of {row_len} weights, threshold {threshold}",
            1 << table_bits
        );
        Ok(PerceptronBp {
            config: config.clone(),
            threshold,
            row_len,
            weights,
            history,
            mask: (1 << table_bits) - 1,
        })
    }

    fn row(&self, pc: u32) -> std::ops::Range<usize> {
        let start = (pc & self.mask) as usize * self.row_len;
        start..start + self.row_len
    }

    /// Perceptron output `bias + sum(x_i * w_i)` for the current history.
    pub fn output(&self, pc: u32) -> i32 {
        let row = &self.weights[self.row(pc)];
        row[0].get() as i32
            + row[1..]
                .iter()
                .zip(self.history.iter())
                .map(|(w, x)| w.get() as i32 * x)
                .sum::<i32>()
    }

    /// The bias followed by the history weights of the row `pc` selects.
    pub fn weights(&self, pc: u32) -> Vec<i16> {
        self.weights[self.row(pc)].iter().map(|w| w.get()).collect()
    }

    pub fn threshold(&self) -> i32 {
        self.threshold
    }
}

impl Predictor for PerceptronBp {
    fn predict(&mut self, pc: u32) -> bool {
        self.output(pc) >= 0
    }

    fn train(&mut self, pc: u32, taken: bool) {
        let y = self.output(pc);
        let mispredicted = (y >= 0) != taken;
        if !mispredicted && y.abs() > self.threshold {
            return;
        }

        let row = self.row(pc);
        self.weights[row.start].update(taken);
        for (w, x) in self.weights[row.start + 1..row.end]
            .iter_mut()
            .zip(self.history.iter())
        {
            // target * x_i is +1 when the input agreed with the outcome
            w.update((x > 0) == taken);
        }
    }

    fn update_history(&mut self, taken: bool) {
        self.history.push(taken);
    }

    fn release(&mut self) {
        self.weights = Vec::new();
        self.history.release();
    }

    fn report(&self) -> (String, Vec<usize>, usize) {
        (
            "Perceptron".to_string(),
            vec![
                self.config.table_bits as usize,
                self.config.history_length as usize,
                self.config.weight_bits as usize,
                self.threshold as usize,
            ],
            (1 << self.config.table_bits) * self.row_len * self.config.weight_bits as usize
                + self.config.history_length as usize,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn small(threshold: i32) -> PerceptronBp {
        PerceptronBp::new(&PerceptronConfig {
            table_bits: 4,
            history_length: 8,
            weight_bits: 4,
            threshold: Some(threshold),
        })
        .unwrap()
    }

    fn resolve(bp: &mut PerceptronBp, pc: u32, taken: bool) -> bool {
        let p = bp.predict(pc);
        bp.train(pc, taken);
        bp.update_history(taken);
        p
    }

    #[test]
    fn zero_weights_predict_taken() {
        let mut bp = small(10);
        assert_eq!(bp.output(5), 0);
        assert!(bp.predict(5));
    }

    #[test]
    fn trains_on_low_confidence_correct_prediction() {
        let mut bp = small(10);
        // y = 0 predicts taken, correct, but |y| <= threshold
        bp.train(1, true);
        // bias +1, every history input was -1 so every weight -1
        assert_eq!(bp.output(1), 1 + 8);
    }

    #[test]
    fn skips_confident_correct_prediction() {
        let mut bp = small(0);
        bp.train(1, true);
        let y = bp.output(1);
        assert!(y > 0);
        bp.train(1, true);
        assert_eq!(bp.output(1), y);
        // a misprediction always trains
        bp.train(1, false);
        assert!(bp.output(1) < y);
    }

    #[test]
    fn weights_saturate() {
        let mut bp = small(1000);
        for _ in 0..100 {
            bp.train(2, true);
        }
        let row = &bp.weights[bp.row(2)];
        assert_eq!(row[0].get(), 7);
        assert!(row[1..].iter().all(|w| w.get() == -8));
    }

    #[test]
    fn history_update_is_separate_from_training() {
        let mut bp = small(10);
        bp.train(3, true);
        let before = bp.output(3);
        bp.update_history(true);
        // the most recent input flipped from -1 to +1
        assert_ne!(bp.output(3), before);
    }

    #[test]
    fn learns_correlated_branch() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut bp = PerceptronBp::new(&PerceptronConfig {
            table_bits: 4,
            history_length: 8,
            weight_bits: 8,
            threshold: Some(20),
        })
        .unwrap();
        let mut misses = 0;
        for i in 0..4000 {
            let a = rng.gen_bool(0.5);
            resolve(&mut bp, 0x100, a);
            // 0x101 repeats whatever 0x100 just did
            if resolve(&mut bp, 0x101, a) != a && i > 500 {
                misses += 1;
            }
        }
        assert!(misses < 100, "{misses} misses");
    }

    #[test]
    fn rejects_bad_config() {
        assert!(PerceptronBp::new(&PerceptronConfig {
            history_length: 0,
            ..PerceptronConfig::default()
        })
        .is_err());
        assert!(PerceptronBp::new(&PerceptronConfig {
            threshold: Some(-1),
            ..PerceptronConfig::default()
        })
        .is_err());
        assert!(PerceptronBp::new(&PerceptronConfig {
            weight_bits: 1,
            ..PerceptronConfig::default()
        })
        .is_err());
    }
}
