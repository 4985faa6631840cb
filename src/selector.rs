use crate::config::{PredictorConfig, PredictorKind};
use crate::error::ConfigError;
use crate::perceptron::PerceptronBp;
use crate::predictor::*;
use crate::tage::TageBp;
use crate::tournament::TournamentBp;

/// One constructed backend out of the closed set.
pub enum Backend {
    OneBit(BimodalBp),
    TwoBit(BimodalBp),
    Correlating(CorrelatingBp),
    Local(LocalBp),
    Gshare(GshareBp),
    Tournament(TournamentBp),
    Perceptron(PerceptronBp),
    Tage(TageBp),
}

impl Backend {
    pub fn new(kind: PredictorKind, config: &PredictorConfig) -> Result<Backend, ConfigError> {
        Ok(match kind {
            PredictorKind::OneBit => Backend::OneBit(BimodalBp::new(config.onebit.table_bits, 1)?),
            PredictorKind::TwoBit => Backend::TwoBit(BimodalBp::new(
                config.twobit.table_bits,
                config.twobit.counter_bits,
            )?),
            PredictorKind::Correlating => {
                Backend::Correlating(CorrelatingBp::new(&config.correlating)?)
            }
            PredictorKind::Local => Backend::Local(LocalBp::new(&config.local)?),
            PredictorKind::Gshare => Backend::Gshare(GshareBp::new(&config.gshare)?),
            PredictorKind::Tournament => {
                Backend::Tournament(TournamentBp::new(&config.tournament)?)
            }
            PredictorKind::Perceptron => {
                Backend::Perceptron(PerceptronBp::new(&config.perceptron)?)
            }
            PredictorKind::Tage => Backend::Tage(TageBp::new(&config.tage)?),
        })
    }

    pub fn as_predictor(&self) -> &dyn Predictor {
        match self {
            Backend::OneBit(p) | Backend::TwoBit(p) => p,
            Backend::Correlating(p) => p,
            Backend::Local(p) => p,
            Backend::Gshare(p) => p,
            Backend::Tournament(p) => p,
            Backend::Perceptron(p) => p,
            Backend::Tage(p) => p,
        }
    }

    pub fn as_predictor_mut(&mut self) -> &mut dyn Predictor {
        match self {
            Backend::OneBit(p) | Backend::TwoBit(p) => p,
            Backend::Correlating(p) => p,
            Backend::Local(p) => p,
            Backend::Gshare(p) => p,
            Backend::Tournament(p) => p,
            Backend::Perceptron(p) => p,
            Backend::Tage(p) => p,
        }
    }
}

/// The single active direction predictor, chosen once at configuration.
///
/// PCs are truncated to 32 bits before they reach the backend.
pub struct PredictorSelector {
    kind: PredictorKind,
    backend: Option<Backend>,
}

impl PredictorSelector {
    pub fn configure(
        kind: PredictorKind,
        config: &PredictorConfig,
    ) -> Result<PredictorSelector, ConfigError> {
        let backend = Backend::new(kind, config)?;
        log::info!("configured {}", config.summary(kind));
        Ok(PredictorSelector {
            kind,
            backend: Some(backend),
        })
    }

    pub fn kind(&self) -> PredictorKind {
        self.kind
    }

    pub fn backend(&self) -> Option<&Backend> {
        self.backend.as_ref()
    }

    pub fn is_released(&self) -> bool {
        self.backend.is_none()
    }

    fn active(&mut self) -> &mut dyn Predictor {
        match self.backend.as_mut() {
            Some(b) => b.as_predictor_mut(),
            None => panic!("{} predictor used after release", self.kind),
        }
    }

    pub fn predict(&mut self, pc: u64) -> bool {
        self.active().predict(pc as u32)
    }

    /// Train on the resolved outcome, then advance any history the backend
    /// keeps outside of training.
    pub fn train(&mut self, pc: u64, taken: bool) {
        let p = self.active();
        p.train(pc as u32, taken);
        p.update_history(taken);
    }

    pub fn release(&mut self) {
        if let Some(mut backend) = self.backend.take() {
            backend.as_predictor_mut().release();
            log::debug!("released {} predictor", self.kind);
        }
    }

    pub fn report(&self) -> Option<(String, Vec<usize>, usize)> {
        self.backend.as_ref().map(|b| b.as_predictor().report())
    }
}
