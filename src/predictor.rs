use crate::config::{CorrelatingConfig, GshareConfig, LocalConfig};
use crate::counter::*;
use crate::error::{allocate, check_width, ConfigError};
use crate::history::{GlobalHistory, LocalHistoryTable};

pub trait Predictor {
    /// Guess the direction of the conditional branch at `pc`. Must not
    /// change anything `train` learns from.
    fn predict(&mut self, pc: u32) -> bool;

    /// Learn the resolved direction of the branch just predicted.
    fn train(&mut self, pc: u32, taken: bool);

    /// Record the outcome in history kept apart from `train`. Called once
    /// per resolved branch, after `train`.
    fn update_history(&mut self, _taken: bool) {}

    /// Drop all tables. Idempotent; the predictor must be rebuilt before
    /// it is used again.
    fn release(&mut self);

    /// Name, parameters and storage in bits.
    fn report(&self) -> (String, Vec<usize>, usize);
}

/// Largest log2 table size any backend accepts.
pub const MAX_TABLE_BITS: u32 = 28;

fn counter_index(pc: u32, mask: u32) -> usize {
    (pc & mask) as usize
}

/// A single table of saturating counters indexed by the low PC bits.
/// One-bit counters remember the last outcome; wider ones need that
/// many mispredictions in a row to flip strongly held directions.
pub struct BimodalBp {
    table_bits: u32,
    counter_bits: u32,
    pht: Vec<SaturatingCounter>,
    mask: u32,
}

impl BimodalBp {
    pub fn new(table_bits: u32, counter_bits: u32) -> Result<BimodalBp, ConfigError> {
        check_width("table_bits", table_bits, 1..=MAX_TABLE_BITS)?;
        check_width("counter_bits", counter_bits, 1..=SaturatingCounter::MAX_BITS)?;
        let pht = allocate(
            "bimodal pht",
            1 << table_bits,
            SaturatingCounter::weakly_not_taken(counter_bits),
        )?;
        log::debug!("bimodal: {} x {}-bit counters", pht.len(), counter_bits);
        Ok(BimodalBp {
            table_bits,
            counter_bits,
            pht,
            mask: (1 << table_bits) - 1,
        })
    }

    pub(crate) fn counter(&self, pc: u32) -> SaturatingCounter {
        self.pht[counter_index(pc, self.mask)]
    }
}

impl Predictor for BimodalBp {
    fn predict(&mut self, pc: u32) -> bool {
        self.pht[counter_index(pc, self.mask)].value()
    }

    fn train(&mut self, pc: u32, taken: bool) {
        self.pht[counter_index(pc, self.mask)].update(taken);
    }

    fn release(&mut self) {
        self.pht = Vec::new();
    }

    fn report(&self) -> (String, Vec<usize>, usize) {
        let name = match self.counter_bits {
            1 => "OneBit",
            2 => "TwoBit",
            _ => "Bimodal",
        };
        (
            name.to_string(),
            vec![self.table_bits as usize, self.counter_bits as usize],
            (1 << self.table_bits) * self.counter_bits as usize,
        )
    }
}

/// Two-bit counters indexed by PC XOR global history.
pub struct GshareBp {
    table_bits: u32,
    history_bits: u32,
    history: GlobalHistory,
    pht: Vec<SaturatingCounter>,
    mask: u32,
}

impl GshareBp {
    pub fn new(config: &GshareConfig) -> Result<GshareBp, ConfigError> {
        let table_bits = check_width("gshare table_bits", config.table_bits, 1..=MAX_TABLE_BITS)?;
        let history_bits = check_width("gshare history_bits", config.history_bits, 1..=32)?;
        let pht = allocate(
            "gshare pht",
            1 << table_bits,
            SaturatingCounter::weakly_not_taken(2),
        )?;
        log::debug!("gshare: {} counters, {history_bits} history bits", pht.len());
        Ok(GshareBp {
            table_bits,
            history_bits,
            history: GlobalHistory::new(history_bits),
            pht,
            mask: (1 << table_bits) - 1,
        })
    }

    pub(crate) fn index(&self, pc: u32) -> usize {
        ((pc ^ self.history.get() as u32) & self.mask) as usize
    }
}

impl Predictor for GshareBp {
    fn predict(&mut self, pc: u32) -> bool {
        self.pht[self.index(pc)].value()
    }

    fn train(&mut self, pc: u32, taken: bool) {
        let index = self.index(pc);
        self.pht[index].update(taken);
        self.history.push(taken);
    }

    fn release(&mut self) {
        self.pht = Vec::new();
    }

    fn report(&self) -> (String, Vec<usize>, usize) {
        (
            "Gshare".to_string(),
            vec![self.table_bits as usize, self.history_bits as usize],
            (1 << self.table_bits) * 2 + self.history_bits as usize,
        )
    }
}

/// Two-level predictor with a global first level. The PC bits and the
/// history bits occupy disjoint fields of the counter index, so two
/// branches seeing the same history never share a counter.
pub struct CorrelatingBp {
    pc_bits: u32,
    history_bits: u32,
    counter_bits: u32,
    history: GlobalHistory,
    pht: Vec<SaturatingCounter>,
    pc_mask: u32,
}

impl CorrelatingBp {
    pub fn new(config: &CorrelatingConfig) -> Result<CorrelatingBp, ConfigError> {
        let pc_bits = check_width("correlating pc_bits", config.pc_bits, 1..=MAX_TABLE_BITS)?;
        let history_bits = check_width(
            "correlating history_bits",
            config.history_bits,
            1..=MAX_TABLE_BITS - pc_bits.min(MAX_TABLE_BITS - 1),
        )?;
        let counter_bits = check_width(
            "correlating counter_bits",
            config.counter_bits,
            1..=SaturatingCounter::MAX_BITS,
        )?;
        let pht = allocate(
            "correlating pht",
            1 << (pc_bits + history_bits),
            SaturatingCounter::new(counter_bits, 0),
        )?;
        log::debug!(
            "correlating: {} x {counter_bits}-bit counters ({pc_bits} pc bits, {history_bits} history bits)",
            pht.len()
        );
        Ok(CorrelatingBp {
            pc_bits,
            history_bits,
            counter_bits,
            history: GlobalHistory::new(history_bits),
            pht,
            pc_mask: (1 << pc_bits) - 1,
        })
    }

    pub(crate) fn index(&self, pc: u32) -> usize {
        (((pc & self.pc_mask) << self.history_bits) | self.history.get() as u32) as usize
    }
}

impl Predictor for CorrelatingBp {
    fn predict(&mut self, pc: u32) -> bool {
        self.pht[self.index(pc)].value()
    }

    fn train(&mut self, pc: u32, taken: bool) {
        let index = self.index(pc);
        self.pht[index].update(taken);
        self.history.push(taken);
    }

    fn release(&mut self) {
        self.pht = Vec::new();
    }

    fn report(&self) -> (String, Vec<usize>, usize) {
        (
            "Correlating".to_string(),
            vec![
                self.pc_bits as usize,
                self.history_bits as usize,
                self.counter_bits as usize,
            ],
            (1 << (self.pc_bits + self.history_bits)) * self.counter_bits as usize
                + self.history_bits as usize,
        )
    }
}

/// Two-level predictor with a per-branch first level: the local history
/// of the branch, concatenated below its PC bits, selects a two-bit counter.
pub struct LocalBp {
    lht_bits: u32,
    history_bits: u32,
    pht_bits: u32,
    lht: LocalHistoryTable,
    pht: Vec<SaturatingCounter>,
    pht_mask: u32,
}

impl LocalBp {
    pub fn new(config: &LocalConfig) -> Result<LocalBp, ConfigError> {
        let lht_bits = check_width("local lht_bits", config.lht_bits, 1..=MAX_TABLE_BITS)?;
        let history_bits = check_width("local history_bits", config.history_bits, 1..=31)?;
        let pht_bits = check_width("local pht_bits", config.pht_bits, 1..=MAX_TABLE_BITS)?;
        let lht = LocalHistoryTable::new(lht_bits, history_bits)?;
        let pht = allocate(
            "local pht",
            1 << pht_bits,
            SaturatingCounter::weakly_not_taken(2),
        )?;
        log::debug!(
            "local: {} histories of {history_bits} bits, {} counters",
            lht.len(),
            pht.len()
        );
        Ok(LocalBp {
            lht_bits,
            history_bits,
            pht_bits,
            lht,
            pht,
            pht_mask: (1 << pht_bits) - 1,
        })
    }

    pub(crate) fn index(&self, pc: u32) -> usize {
        let pc_part = pc.checked_shl(self.history_bits).unwrap_or(0);
        ((pc_part | self.lht.get(pc)) & self.pht_mask) as usize
    }
}

impl Predictor for LocalBp {
    fn predict(&mut self, pc: u32) -> bool {
        self.pht[self.index(pc)].value()
    }

    fn train(&mut self, pc: u32, taken: bool) {
        let index = self.index(pc);
        self.pht[index].update(taken);
        self.lht.push(pc, taken);
    }

    fn release(&mut self) {
        self.lht.release();
        self.pht = Vec::new();
    }

    fn report(&self) -> (String, Vec<usize>, usize) {
        (
            "Local".to_string(),
            vec![
                self.lht_bits as usize,
                self.history_bits as usize,
                self.pht_bits as usize,
            ],
            (1 << self.lht_bits) * self.history_bits as usize + (1 << self.pht_bits) * 2,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    #[test]
    fn onebit_aliasing() {
        let mut bp = BimodalBp::new(2, 1).unwrap();
        assert!(!bp.predict(0));
        bp.train(0, true);
        assert!(bp.predict(0));
        // 4 & 3 == 0: same counter
        assert!(bp.predict(4));
        bp.train(4, false);
        assert!(!bp.predict(0));
    }

    #[test]
    fn twobit_saturation() {
        let mut bp = BimodalBp::new(4, 2).unwrap();
        let pc = 9;
        let mut seen = vec![bp.counter(pc).count()];
        for _ in 0..3 {
            bp.train(pc, true);
            seen.push(bp.counter(pc).count());
        }
        assert_eq!(seen, vec![1, 2, 3, 3]);
    }

    #[test]
    fn zero_table_bits_rejected() {
        assert!(matches!(
            BimodalBp::new(0, 2),
            Err(ConfigError::InvalidWidth { value: 0, .. })
        ));
        assert!(GshareBp::new(&GshareConfig {
            table_bits: 29,
            history_bits: 4
        })
        .is_err());
        assert!(LocalBp::new(&LocalConfig {
            lht_bits: 4,
            history_bits: 0,
            pht_bits: 4
        })
        .is_err());
        assert!(CorrelatingBp::new(&CorrelatingConfig {
            pc_bits: 20,
            history_bits: 10,
            counter_bits: 2
        })
        .is_err());
    }

    #[test]
    fn gshare_reads_updated_history() {
        let mut bp = GshareBp::new(&GshareConfig {
            table_bits: 6,
            history_bits: 4,
        })
        .unwrap();
        assert_eq!(bp.index(0x10), 0x10);
        bp.train(0x10, true);
        assert_eq!(bp.index(0x10), 0x11);
        // counter 0x10 went to weakly taken, 0x11 is untouched
        assert!(!bp.predict(0x10));
    }

    #[test]
    fn correlating_concatenates() {
        let mut bp = CorrelatingBp::new(&CorrelatingConfig {
            pc_bits: 2,
            history_bits: 2,
            counter_bits: 2,
        })
        .unwrap();
        bp.train(0, true);
        bp.train(0, true);
        // history is now 0b11 for every pc, but pc fields differ
        assert_eq!(bp.index(1), 0b0111);
        assert_eq!(bp.index(2), 0b1011);
        assert_eq!(bp.index(6), 0b1011);
        bp.train(1, true);
        bp.train(1, true);
        assert_eq!(bp.pht[0b0111].count(), 2);
        assert_eq!(bp.pht[0b1011].count(), 0);
    }

    #[test]
    fn local_learns_alternation() {
        let mut bp = LocalBp::new(&LocalConfig {
            lht_bits: 4,
            history_bits: 4,
            pht_bits: 8,
        })
        .unwrap();
        let mut misses = 0;
        for i in 0..200 {
            let taken = i % 2 == 0;
            if bp.predict(3) != taken && i >= 20 {
                misses += 1;
            }
            bp.train(3, taken);
        }
        assert_eq!(misses, 0);
    }

    #[test]
    fn local_predict_uses_pre_update_history() {
        let mut bp = LocalBp::new(&LocalConfig {
            lht_bits: 2,
            history_bits: 2,
            pht_bits: 4,
        })
        .unwrap();
        let before = bp.index(1);
        assert_eq!(before, 0b0100);
        bp.predict(1);
        assert_eq!(bp.index(1), before);
        bp.train(1, true);
        assert_eq!(bp.index(1), 0b0101);
    }

    #[test]
    fn counters_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut bp = CorrelatingBp::new(&CorrelatingConfig {
            pc_bits: 3,
            history_bits: 2,
            counter_bits: 3,
        })
        .unwrap();
        for _ in 0..5000 {
            let pc = rng.gen_range(0..16);
            bp.train(pc, rng.gen_bool(0.8));
        }
        assert!(bp.pht.iter().all(|c| c.count() <= 7));
    }

    #[test]
    fn predict_is_idempotent() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut bp = GshareBp::new(&GshareConfig {
            table_bits: 8,
            history_bits: 6,
        })
        .unwrap();
        for _ in 0..1000 {
            let pc = rng.gen_range(0..1024);
            let first = bp.predict(pc);
            assert_eq!(first, bp.predict(pc));
            bp.train(pc, rng.gen_bool(0.5));
        }
    }

    #[test]
    fn release_is_idempotent() {
        let mut bp = LocalBp::new(&LocalConfig::default()).unwrap();
        bp.release();
        bp.release();
        assert!(bp.pht.is_empty());
    }
}
