//! TAgged GEometric history length predictor.
//!
//! See "A case for (partially) TAgged GEometric history length branch
//! prediction" (Seznec and Michaud, 2006).
//!
//! The tagged banks are split at a crossover bank into a short-history and
//! a long-history [`BankGroup`]. Every bank of a group indexes the same
//! physical table, offset by an interleave slot derived from the PC and the
//! group's shortest history, so banks of one group compete for entries.

use crate::config::TageConfig;
use crate::counter::*;
use crate::error::{allocate, check_width, ConfigError};
use crate::history::{FoldedHistory, HistoryBuffer};
use crate::predictor::Predictor;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TaggedEntry {
    pub ctr: SignedCounter,
    pub tag: u16,
    pub useful: SaturatingCounter,
}

/// One physical table shared by a run of adjacent banks.
#[derive(Clone, Debug)]
pub struct BankGroup {
    entries: Vec<TaggedEntry>,
    /// Number of `2^log_bank_entries` slots interleaved in `entries`.
    slots: u32,
    /// History length of the first bank in the group; picks the slot.
    anchor_history: usize,
}

#[derive(Clone, Debug)]
struct Bank {
    group: usize,
    tag_bits: u32,
    index_fold: FoldedHistory,
    tag_fold: FoldedHistory,
}

/// Where a lookup found its prediction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Provider {
    Bimodal(usize),
    /// Bank number and entry index within its group.
    Tagged(usize, usize),
}

/// `num_banks` history lengths spaced geometrically from `min` to `max`.
pub fn geometric_lengths(num_banks: usize, min: usize, max: usize) -> Vec<usize> {
    if num_banks == 1 {
        return vec![max];
    }
    let ratio = max as f64 / min as f64;
    (0..num_banks)
        .map(|i| {
            let exp = i as f64 / (num_banks - 1) as f64;
            (min as f64 * ratio.powf(exp) + 0.5) as usize
        })
        .collect()
}

pub struct TageBp {
    config: TageConfig,
    bimodal: Vec<SignedCounter>,
    bimodal_mask: u32,
    groups: Vec<BankGroup>,
    banks: Vec<Bank>,
    history: HistoryBuffer,
    row_mask: u32,
}

impl TageBp {
    pub fn new(config: &TageConfig) -> Result<TageBp, ConfigError> {
        let num_banks = check_width("tage num_banks", config.num_banks, 2..=32)?;
        let logg = check_width("tage log_bank_entries", config.log_bank_entries, 1..=20)?;
        let logb = check_width("tage log_bimodal_entries", config.log_bimodal_entries, 1..=24)?;
        let tag_bits = check_width("tage tag_bits", config.tag_bits, 1..=16)?;
        check_width("tage extra_tag_bits", config.extra_tag_bits, 0..=16 - tag_bits)?;
        let counter_bits = check_width(
            "tage counter_bits",
            config.counter_bits,
            2..=SaturatingCounter::MAX_BITS,
        )?;
        let useful_bits = check_width(
            "tage useful_bits",
            config.useful_bits,
            1..=SaturatingCounter::MAX_BITS,
        )?;
        let min_history = check_width("tage min_history", config.min_history, 1..=4096)?;
        let max_history = check_width("tage max_history", config.max_history, min_history..=4096)?;
        let crossover = check_width("tage crossover_bank", config.crossover_bank, 1..=num_banks)?;
        let low_slots = check_width("tage low_group_banks", config.low_group_banks, 1..=64)?;
        let high_slots = check_width("tage high_group_banks", config.high_group_banks, 1..=64)?;

        let lengths = geometric_lengths(
            num_banks as usize,
            min_history as usize,
            max_history as usize,
        );

        let empty = TaggedEntry {
            ctr: SignedCounter::new(counter_bits, 0),
            tag: 0,
            useful: SaturatingCounter::new(useful_bits, 0),
        };
        let mut groups = vec![BankGroup {
            entries: allocate("tage low bank group", (low_slots as usize) << logg, empty)?,
            slots: low_slots,
            anchor_history: lengths[0],
        }];
        if crossover < num_banks {
            groups.push(BankGroup {
                entries: allocate("tage high bank group", (high_slots as usize) << logg, empty)?,
                slots: high_slots,
                anchor_history: lengths[crossover as usize],
            });
        }

        let banks = lengths
            .iter()
            .enumerate()
            .map(|(i, &length)| {
                let high = i >= crossover as usize;
                let tb = if high {
                    tag_bits + config.extra_tag_bits
                } else {
                    tag_bits
                };
                Bank {
                    group: high as usize,
                    tag_bits: tb,
                    index_fold: FoldedHistory::new(length, logg),
                    tag_fold: FoldedHistory::new(length, tb),
                }
            })
            .collect();

        let bimodal = allocate(
            "tage bimodal",
            1 << logb,
            SignedCounter::new(counter_bits, 0),
        )?;

        log::debug!(
            "tage: history lengths {lengths:?}, {} + {} tagged entries",
            groups[0].entries.len(),
            groups.get(1).map_or(0, |g| g.entries.len())
        );

        Ok(TageBp {
            config: config.clone(),
            bimodal,
            bimodal_mask: (1 << logb) - 1,
            groups,
            banks,
            history: HistoryBuffer::new(max_history.max(64) as usize),
            row_mask: (1 << logg) - 1,
        })
    }

    pub fn history_lengths(&self) -> Vec<usize> {
        self.banks
            .iter()
            .map(|b| b.index_fold.original_length())
            .collect()
    }

    fn bimodal_index(&self, pc: u32) -> usize {
        ((pc ^ (pc >> 2)) & self.bimodal_mask) as usize
    }

    fn gindex(&self, pc: u32, bank: usize) -> usize {
        let b = &self.banks[bank];
        let group = &self.groups[b.group];
        let row = (pc ^ (pc >> self.config.log_bank_entries) ^ b.index_fold.get()) & self.row_mask;
        let slot = (pc as u64 ^ self.history.low_bits(group.anchor_history)) % group.slots as u64;
        (row as usize) ^ ((slot as usize) << self.config.log_bank_entries)
    }

    fn gtag(&self, pc: u32, bank: usize) -> u16 {
        let b = &self.banks[bank];
        (((pc ^ (pc >> 2)) ^ b.tag_fold.get()) & ((1 << b.tag_bits) - 1)) as u16
    }

    fn entry(&self, bank: usize, index: usize) -> &TaggedEntry {
        &self.groups[self.banks[bank].group].entries[index]
    }

    fn entry_mut(&mut self, bank: usize, index: usize) -> &mut TaggedEntry {
        let group = self.banks[bank].group;
        &mut self.groups[group].entries[index]
    }

    /// Longest-history tag match, falling back to the bimodal table.
    pub fn lookup(&self, pc: u32) -> (Provider, bool) {
        for bank in (0..self.banks.len()).rev() {
            let index = self.gindex(pc, bank);
            let entry = self.entry(bank, index);
            if entry.tag == self.gtag(pc, bank) {
                return (Provider::Tagged(bank, index), entry.ctr.value());
            }
        }
        let index = self.bimodal_index(pc);
        (Provider::Bimodal(index), self.bimodal[index].value())
    }

    fn allocate_above(&mut self, pc: u32, first_bank: usize, taken: bool) {
        for bank in first_bank..self.banks.len() {
            let index = self.gindex(pc, bank);
            let tag = self.gtag(pc, bank);
            let (counter_bits, useful_bits) = (self.config.counter_bits, self.config.useful_bits);
            let entry = self.entry_mut(bank, index);
            if entry.useful.is_zero() {
                entry.tag = tag;
                entry.ctr = SignedCounter::new(counter_bits, if taken { 0 } else { -1 });
                entry.useful = SaturatingCounter::new(useful_bits, 0);
                return;
            }
            entry.useful.decrement();
        }
    }

    /// Folded histories first: they read the bit leaving their window from
    /// the raw history before it shifts.
    fn push_history(&mut self, taken: bool) {
        for bank in self.banks.iter_mut() {
            bank.index_fold.update(&self.history, taken);
            bank.tag_fold.update(&self.history, taken);
        }
        self.history.push(taken);
    }
}

impl Predictor for TageBp {
    fn predict(&mut self, pc: u32) -> bool {
        self.lookup(pc).1
    }

    fn train(&mut self, pc: u32, taken: bool) {
        let (provider, predicted) = self.lookup(pc);

        match provider {
            Provider::Tagged(bank, index) => {
                self.entry_mut(bank, index).ctr.update(taken);
            }
            Provider::Bimodal(index) => {
                self.bimodal[index].update(taken);
            }
        }

        if predicted != taken {
            let first = match provider {
                Provider::Tagged(bank, _) => bank + 1,
                Provider::Bimodal(_) => 0,
            };
            self.allocate_above(pc, first, taken);
        } else if let Provider::Tagged(bank, index) = provider {
            self.entry_mut(bank, index).useful.increment();
        }

        self.push_history(taken);
    }

    fn release(&mut self) {
        self.bimodal = Vec::new();
        for group in self.groups.iter_mut() {
            group.entries = Vec::new();
        }
    }

    fn report(&self) -> (String, Vec<usize>, usize) {
        let c = &self.config;
        let entry_bits = (c.counter_bits + c.useful_bits + c.tag_bits) as usize;
        let tagged: usize = self
            .groups
            .iter()
            .enumerate()
            .map(|(g, group)| {
                let extra = if g == 1 { c.extra_tag_bits as usize } else { 0 };
                group.entries.len() * (entry_bits + extra)
            })
            .sum();
        (
            "TAGE".to_string(),
            vec![
                c.num_banks as usize,
                c.log_bank_entries as usize,
                c.log_bimodal_entries as usize,
                c.min_history as usize,
                c.max_history as usize,
            ],
            (1 << c.log_bimodal_entries) * c.counter_bits as usize
                + tagged
                + c.max_history as usize,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::BimodalBp;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    const PC: u32 = 0x1234;

    fn fill(bp: &mut TageBp, f: impl Fn(&mut TaggedEntry)) {
        for group in bp.groups.iter_mut() {
            group.entries.iter_mut().for_each(&f);
        }
    }

    fn install(bp: &mut TageBp, pc: u32, bank: usize, ctr: i16) -> usize {
        let index = bp.gindex(pc, bank);
        let tag = bp.gtag(pc, bank);
        let entry = bp.entry_mut(bank, index);
        entry.tag = tag;
        entry.ctr.set(ctr);
        index
    }

    /// Tags no lookup can produce, so nothing hits by accident.
    fn unmatchable(bp: &mut TageBp) {
        fill(bp, |e| e.tag = u16::MAX);
    }

    #[test]
    fn lengths_are_geometric() {
        let l = geometric_lengths(18, 5, 1000);
        assert_eq!(l.len(), 18);
        assert_eq!(l[0], 5);
        assert_eq!(l[17], 1000);
        assert!(l.windows(2).all(|w| w[0] < w[1]));
        let bp = TageBp::new(&TageConfig::default()).unwrap();
        assert_eq!(bp.history_lengths(), l);
    }

    #[test]
    fn banks_share_group_tables() {
        let bp = TageBp::new(&TageConfig::default()).unwrap();
        assert_eq!(bp.groups.len(), 2);
        assert_eq!(bp.groups[0].entries.len(), 5 * 1024);
        assert_eq!(bp.groups[1].entries.len(), 10 * 1024);
        assert!(bp.banks[..8].iter().all(|b| b.group == 0 && b.tag_bits == 8));
        assert!(bp.banks[8..].iter().all(|b| b.group == 1 && b.tag_bits == 12));
        // identical folds pick the very same physical entry
        assert_eq!(bp.gindex(PC, 0), bp.gindex(PC, 7));
    }

    #[test]
    fn gindex_stays_in_group() {
        let mut bp = TageBp::new(&TageConfig::default()).unwrap();
        for i in 0..2000u32 {
            bp.push_history(i % 3 == 0 || i % 7 == 0);
            for bank in 0..bp.banks.len() {
                let group = &bp.groups[bp.banks[bank].group];
                assert!(bp.gindex(i.wrapping_mul(2654435761), bank) < group.entries.len());
                assert!(bp.gtag(i, bank) < 1 << bp.banks[bank].tag_bits);
            }
        }
    }

    fn direct_fold(history: &HistoryBuffer, length: usize, width: u32) -> u32 {
        (0..length).fold(0, |acc, age| {
            acc ^ (history.bit(age) as u32) << (age % width as usize)
        })
    }

    #[test]
    fn folds_follow_the_raw_history() {
        let mut rng = StdRng::seed_from_u64(13);
        let mut bp = TageBp::new(&TageConfig::default()).unwrap();
        for _ in 0..1500 {
            bp.push_history(rng.gen_bool(0.5));
            for (i, bank) in bp.banks.iter().enumerate() {
                let length = bank.index_fold.original_length();
                assert_eq!(
                    bank.index_fold.get(),
                    direct_fold(&bp.history, length, bp.config.log_bank_entries),
                    "bank {i} index"
                );
                assert_eq!(
                    bank.tag_fold.get(),
                    direct_fold(&bp.history, length, bank.tag_bits),
                    "bank {i} tag"
                );
            }
        }
    }

    #[test]
    fn longest_match_wins() {
        let mut bp = TageBp::new(&TageConfig::default()).unwrap();
        unmatchable(&mut bp);
        for _ in 0..20 {
            bp.push_history(true);
        }
        assert_ne!(bp.gindex(PC, 3), bp.gindex(PC, 7));

        install(&mut bp, PC, 3, -4);
        let i7 = install(&mut bp, PC, 7, 3);
        assert_eq!(bp.lookup(PC), (Provider::Tagged(7, i7), true));
        assert!(bp.predict(PC));

        install(&mut bp, PC, 3, 3);
        install(&mut bp, PC, 7, -4);
        assert!(!bp.predict(PC));
    }

    #[test]
    fn bimodal_when_nothing_matches() {
        let mut bp = TageBp::new(&TageConfig::default()).unwrap();
        unmatchable(&mut bp);
        let (provider, prediction) = bp.lookup(PC);
        assert_eq!(provider, Provider::Bimodal(bp.bimodal_index(PC)));
        // bimodal counters start at zero, which reads as taken
        assert!(prediction);
    }

    #[test]
    fn allocates_on_misprediction() {
        let mut bp = TageBp::new(&TageConfig::default()).unwrap();
        unmatchable(&mut bp);
        let index = bp.gindex(PC, 0);
        let tag = bp.gtag(PC, 0);
        bp.train(PC, false);

        let fresh: Vec<_> = bp
            .groups
            .iter()
            .flat_map(|g| g.entries.iter())
            .filter(|e| e.tag != u16::MAX)
            .collect();
        assert_eq!(fresh.len(), 1);
        let entry = bp.entry(0, index);
        assert_eq!(entry.tag, tag);
        assert_eq!(entry.ctr.get(), -1);
        assert!(entry.useful.is_zero());
        assert_eq!(bp.bimodal[bp.bimodal_index(PC)].get(), -1);
    }

    #[test]
    fn useful_entries_age_instead_of_being_replaced() {
        // wide enough that a physical entry shared by every bank of its
        // group never ages down to zero in a single pass
        let mut bp = TageBp::new(&TageConfig {
            useful_bits: 4,
            ..TageConfig::default()
        })
        .unwrap();
        fill(&mut bp, |e| {
            e.tag = u16::MAX;
            e.useful = SaturatingCounter::new(4, 15);
        });
        let total = |bp: &TageBp| -> usize {
            bp.groups
                .iter()
                .flat_map(|g| g.entries.iter())
                .map(|e| e.useful.count() as usize)
                .sum()
        };
        let before = total(&bp);
        // bimodal says taken, so this mispredicts with no tagged provider
        bp.train(PC, false);
        assert_eq!(before - total(&bp), bp.banks.len());
        assert!(bp
            .groups
            .iter()
            .flat_map(|g| g.entries.iter())
            .all(|e| e.tag == u16::MAX));
    }

    #[test]
    fn correct_provider_gains_usefulness() {
        let mut bp = TageBp::new(&TageConfig::default()).unwrap();
        unmatchable(&mut bp);
        let last = bp.banks.len() - 1;
        let index = install(&mut bp, PC, last, -2);
        bp.train(PC, false);
        let entry = bp.entry(last, index);
        assert_eq!(entry.ctr.get(), -3);
        assert_eq!(entry.useful.count(), 1);
    }

    #[test]
    fn learns_a_loop_bimodal_cannot() {
        let mut tage = TageBp::new(&TageConfig::default()).unwrap();
        let mut bimodal = BimodalBp::new(13, 2).unwrap();
        let (mut tage_misses, mut bimodal_misses) = (0, 0);
        for i in 0..8000 {
            let taken = i % 8 != 7;
            let measure = i >= 7000;
            if tage.predict(PC) != taken && measure {
                tage_misses += 1;
            }
            tage.train(PC, taken);
            if bimodal.predict(PC) != taken && measure {
                bimodal_misses += 1;
            }
            bimodal.train(PC, taken);
        }
        assert_eq!(bimodal_misses, 125);
        assert!(tage_misses < 20, "{tage_misses} misses");
    }

    #[test]
    fn rejects_bad_config() {
        for config in [
            TageConfig {
                num_banks: 1,
                ..TageConfig::default()
            },
            TageConfig {
                min_history: 50,
                max_history: 10,
                ..TageConfig::default()
            },
            TageConfig {
                tag_bits: 14,
                extra_tag_bits: 4,
                ..TageConfig::default()
            },
            TageConfig {
                crossover_bank: 0,
                ..TageConfig::default()
            },
        ] {
            assert!(TageBp::new(&config).is_err());
        }
    }

    #[test]
    fn single_group_without_crossover() {
        let bp = TageBp::new(&TageConfig {
            num_banks: 4,
            crossover_bank: 4,
            ..TageConfig::default()
        })
        .unwrap();
        assert_eq!(bp.groups.len(), 1);
    }
}
