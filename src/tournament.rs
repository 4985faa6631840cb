use crate::config::{GshareConfig, TournamentConfig};
use crate::counter::*;
use crate::error::{allocate, check_width, ConfigError};
use crate::predictor::{BimodalBp, GshareBp, Predictor, MAX_TABLE_BITS};
use std::collections::HashMap;

const _STRONG_BIMODAL: u8 = 0;
const WEAK_BIMODAL: u8 = 1;
const _WEAK_GSHARE: u8 = 2;
const _STRONG_GSHARE: u8 = 3;

/// Predictions awaiting their `train`. Only one branch is in flight at a
/// time, so reaching this many means the others were abandoned.
const MAX_PENDING: usize = 1024;

#[derive(Clone, Copy, Debug)]
struct ComponentPredictions {
    bimodal: bool,
    gshare: bool,
}

/// Meta-predictor choosing per selector slot between a two-bit bimodal
/// predictor (P1) and gshare (P2).
///
/// Both components always train. The selector only moves when exactly one
/// of them was right, using the predictions cached by the `predict` call
/// for the same PC.
pub struct TournamentBp {
    config: TournamentConfig,
    bimodal: BimodalBp,
    gshare: GshareBp,
    selector: Vec<SaturatingCounter>,
    mask: u32,
    pending: HashMap<u32, ComponentPredictions>,
    stale_trains: u64,
}

impl TournamentBp {
    pub fn new(config: &TournamentConfig) -> Result<TournamentBp, ConfigError> {
        let selector_bits = check_width(
            "tournament selector_bits",
            config.selector_bits,
            1..=MAX_TABLE_BITS,
        )?;
        let bimodal = BimodalBp::new(config.bimodal_bits, 2)?;
        let gshare = GshareBp::new(&GshareConfig {
            table_bits: config.gshare_table_bits,
            history_bits: config.gshare_history_bits,
        })?;
        let selector = allocate(
            "tournament selector",
            1 << selector_bits,
            SaturatingCounter::new(2, WEAK_BIMODAL),
        )?;
        log::debug!("tournament: {} selectors", selector.len());
        Ok(TournamentBp {
            config: config.clone(),
            bimodal,
            gshare,
            selector,
            mask: (1 << selector_bits) - 1,
            pending: HashMap::new(),
            stale_trains: 0,
        })
    }

    /// Number of `train` calls that found no prediction cached for their PC.
    pub fn stale_trains(&self) -> u64 {
        self.stale_trains
    }

    fn selector_index(&self, pc: u32) -> usize {
        (pc & self.mask) as usize
    }
}

impl Predictor for TournamentBp {
    fn predict(&mut self, pc: u32) -> bool {
        let p = ComponentPredictions {
            bimodal: self.bimodal.predict(pc),
            gshare: self.gshare.predict(pc),
        };
        if self.pending.len() >= MAX_PENDING && !self.pending.contains_key(&pc) {
            log::debug!(
                "tournament: dropping {} predictions never trained",
                self.pending.len()
            );
            self.pending.clear();
        }
        self.pending.insert(pc, p);

        if self.selector[self.selector_index(pc)].value() {
            p.gshare
        } else {
            p.bimodal
        }
    }

    fn train(&mut self, pc: u32, taken: bool) {
        self.bimodal.train(pc, taken);
        self.gshare.train(pc, taken);

        let Some(p) = self.pending.remove(&pc) else {
            self.stale_trains += 1;
            log::debug!("tournament: no prediction cached for pc {pc:#010x}, selector kept");
            return;
        };

        let index = self.selector_index(pc);
        match (p.bimodal == taken, p.gshare == taken) {
            (true, false) => {
                self.selector[index].decrement();
            }
            (false, true) => {
                self.selector[index].increment();
            }
            // Ties never move the selector
            _ => {}
        }
    }

    fn release(&mut self) {
        self.selector = Vec::new();
        self.pending = HashMap::new();
        self.bimodal.release();
        self.gshare.release();
    }

    fn report(&self) -> (String, Vec<usize>, usize) {
        let (_, _, bimodal_bits) = self.bimodal.report();
        let (_, _, gshare_bits) = self.gshare.report();
        (
            "Tournament".to_string(),
            vec![
                self.config.selector_bits as usize,
                self.config.bimodal_bits as usize,
                self.config.gshare_table_bits as usize,
                self.config.gshare_history_bits as usize,
            ],
            (1 << self.config.selector_bits) * 2 + bimodal_bits + gshare_bits,
        )
    }
}
