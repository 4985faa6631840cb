use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// The closed set of direction predictor backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
#[value(rename_all = "lower")]
pub enum PredictorKind {
    OneBit,
    TwoBit,
    Correlating,
    Local,
    Gshare,
    Tournament,
    Perceptron,
    Tage,
}

impl PredictorKind {
    pub const ALL: [PredictorKind; 8] = [
        PredictorKind::OneBit,
        PredictorKind::TwoBit,
        PredictorKind::Correlating,
        PredictorKind::Local,
        PredictorKind::Gshare,
        PredictorKind::Tournament,
        PredictorKind::Perceptron,
        PredictorKind::Tage,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PredictorKind::OneBit => "onebit",
            PredictorKind::TwoBit => "twobit",
            PredictorKind::Correlating => "correlating",
            PredictorKind::Local => "local",
            PredictorKind::Gshare => "gshare",
            PredictorKind::Tournament => "tournament",
            PredictorKind::Perceptron => "perceptron",
            PredictorKind::Tage => "tage",
        }
    }
}

impl fmt::Display for PredictorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OneBitConfig {
    pub table_bits: u32,
}

impl Default for OneBitConfig {
    fn default() -> Self {
        OneBitConfig { table_bits: 17 }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TwoBitConfig {
    pub table_bits: u32,
    /// Counter width; 2 for the classic two-bit scheme.
    pub counter_bits: u32,
}

impl Default for TwoBitConfig {
    fn default() -> Self {
        TwoBitConfig {
            table_bits: 17,
            counter_bits: 2,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GshareConfig {
    pub table_bits: u32,
    pub history_bits: u32,
}

impl Default for GshareConfig {
    fn default() -> Self {
        GshareConfig {
            table_bits: 17,
            history_bits: 4,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorrelatingConfig {
    pub pc_bits: u32,
    pub history_bits: u32,
    pub counter_bits: u32,
}

impl Default for CorrelatingConfig {
    fn default() -> Self {
        CorrelatingConfig {
            pc_bits: 14,
            history_bits: 4,
            counter_bits: 2,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LocalConfig {
    pub lht_bits: u32,
    pub history_bits: u32,
    pub pht_bits: u32,
}

impl Default for LocalConfig {
    fn default() -> Self {
        LocalConfig {
            lht_bits: 14,
            history_bits: 6,
            pht_bits: 12,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TournamentConfig {
    pub selector_bits: u32,
    pub bimodal_bits: u32,
    pub gshare_table_bits: u32,
    pub gshare_history_bits: u32,
}

impl Default for TournamentConfig {
    fn default() -> Self {
        TournamentConfig {
            selector_bits: 14,
            bimodal_bits: 14,
            gshare_table_bits: 14,
            gshare_history_bits: 6,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PerceptronConfig {
    pub table_bits: u32,
    pub history_length: u32,
    pub weight_bits: u32,
    /// Training threshold; `None` picks the usual `1.93 * h + 14`.
    pub threshold: Option<i32>,
}

impl PerceptronConfig {
    pub fn effective_threshold(&self) -> i32 {
        self.threshold
            .unwrap_or_else(|| (1.93 * self.history_length as f64 + 14.0) as i32)
    }
}

impl Default for PerceptronConfig {
    fn default() -> Self {
        PerceptronConfig {
            table_bits: 10,
            history_length: 32,
            weight_bits: 8,
            threshold: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TageConfig {
    /// Number of tagged banks.
    pub num_banks: u32,
    /// log2 of the rows each bank contributes to its bank group.
    pub log_bank_entries: u32,
    /// log2 of the bimodal base table size.
    pub log_bimodal_entries: u32,
    /// Tag width of the short-history banks.
    pub tag_bits: u32,
    /// Extra tag bits given to banks at or above the crossover.
    pub extra_tag_bits: u32,
    pub counter_bits: u32,
    pub useful_bits: u32,
    pub min_history: u32,
    pub max_history: u32,
    /// Index of the first bank in the long-history bank group.
    pub crossover_bank: u32,
    /// Interleaved bank slots in the short-history group.
    pub low_group_banks: u32,
    /// Interleaved bank slots in the long-history group.
    pub high_group_banks: u32,
}

impl Default for TageConfig {
    fn default() -> Self {
        TageConfig {
            num_banks: 18,
            log_bank_entries: 10,
            log_bimodal_entries: 13,
            tag_bits: 8,
            extra_tag_bits: 4,
            counter_bits: 3,
            useful_bits: 2,
            min_history: 5,
            max_history: 1000,
            crossover_bank: 8,
            low_group_banks: 5,
            high_group_banks: 10,
        }
    }
}

/// Parameters of every backend. Only the section matching the selected
/// [`PredictorKind`] is read.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PredictorConfig {
    pub onebit: OneBitConfig,
    pub twobit: TwoBitConfig,
    pub gshare: GshareConfig,
    pub correlating: CorrelatingConfig,
    pub local: LocalConfig,
    pub tournament: TournamentConfig,
    pub perceptron: PerceptronConfig,
    pub tage: TageConfig,
}

impl PredictorConfig {
    pub fn from_toml_str(s: &str) -> anyhow::Result<PredictorConfig> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> anyhow::Result<PredictorConfig> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    /// One line describing the parameters `kind` would be built with.
    pub fn summary(&self, kind: PredictorKind) -> String {
        match kind {
            PredictorKind::OneBit => format!("onebit: table_bits={}", self.onebit.table_bits),
            PredictorKind::TwoBit => format!(
                "twobit: table_bits={}, counter_bits={}",
                self.twobit.table_bits, self.twobit.counter_bits
            ),
            PredictorKind::Gshare => format!(
                "gshare: table_bits={}, history_bits={}",
                self.gshare.table_bits, self.gshare.history_bits
            ),
            PredictorKind::Correlating => format!(
                "correlating: pc_bits={}, history_bits={}, counter_bits={}",
                self.correlating.pc_bits,
                self.correlating.history_bits,
                self.correlating.counter_bits
            ),
            PredictorKind::Local => format!(
                "local: lht_bits={}, history_bits={}, pht_bits={}",
                self.local.lht_bits, self.local.history_bits, self.local.pht_bits
            ),
            PredictorKind::Tournament => format!(
                "tournament: selector_bits={}, bimodal_bits={}, gshare_table_bits={}, gshare_history_bits={}",
                self.tournament.selector_bits,
                self.tournament.bimodal_bits,
                self.tournament.gshare_table_bits,
                self.tournament.gshare_history_bits
            ),
            PredictorKind::Perceptron => format!(
                "perceptron: table_bits={}, history_length={}, weight_bits={}, threshold={}",
                self.perceptron.table_bits,
                self.perceptron.history_length,
                self.perceptron.weight_bits,
                self.perceptron.effective_threshold()
            ),
            PredictorKind::Tage => format!(
                "tage: banks={}, log_bank_entries={}, log_bimodal_entries={}, tag_bits={}+{}, history={}..={}",
                self.tage.num_banks,
                self.tage.log_bank_entries,
                self.tage.log_bimodal_entries,
                self.tage.tag_bits,
                self.tage.extra_tag_bits,
                self.tage.min_history,
                self.tage.max_history
            ),
        }
    }
}

impl fmt::Display for PredictorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Predictor Configuration ===")?;
        for kind in PredictorKind::ALL {
            writeln!(f, "{}", self.summary(kind))?;
        }
        write!(f, "===============================")
    }
}
