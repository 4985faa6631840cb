use anyhow::{anyhow, Context};
use bpred::{PredictorConfig, PredictorKind, PredictorSelector};
use clap::Parser;
use format_num::format_num;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::fs::File;
use std::io::prelude::*;
use std::io::{BufReader, BufWriter, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "bp", version, about = "Exercises branch predictor algorithms")]
struct Cli {
    /// Branch trace to replay
    #[arg(required_unless_present = "synthetic")]
    input: Option<PathBuf>,

    /// Predictor to evaluate; may be repeated. Defaults to all of them
    #[arg(short = 'p', long = "predictor", value_enum)]
    predictors: Vec<PredictorKind>,

    /// TOML file with predictor parameters
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Evaluate a grid of parameters per predictor instead of one configuration
    #[arg(long)]
    sweep: bool,

    /// Generate this many synthetic branch events instead of reading a trace
    #[arg(long, value_name = "EVENTS", conflicts_with = "input")]
    synthetic: Option<usize>,

    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Write `KiB<TAB>MPKI` lines here for plotting
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Predictors simulated at once
    #[arg(short, long)]
    jobs: Option<usize>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Event {
    pc: u64,
    taken: bool,
    delta: u64,
}

fn read_event<R: Read>(reader: &mut R) -> std::io::Result<Option<Event>> {
    let mut event_buf = [0u8; 8];
    match reader.read_exact(&mut event_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let event = i64::from_le_bytes(event_buf);
    Ok(Some(Event {
        pc: ((event << 16) >> 16) as u64,
        taken: event < 0,
        delta: (event as u64 >> 48) & 0x7FFF,
    }))
}

fn read_trace(path: &Path) -> anyhow::Result<Vec<Event>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut header = [0; 1024];
    reader
        .read_exact(&mut header)
        .with_context(|| format!("{}: short trace header", path.display()))?;
    log::debug!(
        "trace header: {}",
        String::from_utf8_lossy(&header).trim_end_matches('\0')
    );

    let mut events = Vec::new();
    while let Some(event) = read_event(&mut reader)? {
        events.push(event);
    }
    Ok(events)
}

enum Behaviour {
    Biased(f64),
    Loop(u32),
    Pattern(u32, u32),
    Follows(usize),
    Random,
}

/// A deterministic stream over a fixed population of static branches with
/// mixed behaviour: biased, loop exits, short repeating patterns, branches
/// that repeat the outcome of another, and noise.
fn synthetic_trace(n: usize, seed: u64) -> Vec<Event> {
    const BRANCHES: usize = 512;
    let mut rng = StdRng::seed_from_u64(seed);
    let pcs: Vec<u64> = (0..BRANCHES)
        .map(|_| 0x40_0000 + (rng.gen_range(0u64..1 << 20) << 2))
        .collect();
    let behaviours: Vec<Behaviour> = (0..BRANCHES)
        .map(|_| match rng.gen_range(0..10) {
            0..=3 => Behaviour::Biased(if rng.gen_bool(0.5) { 0.97 } else { 0.03 }),
            4 | 5 => Behaviour::Loop(rng.gen_range(2..40)),
            6 => Behaviour::Pattern(rng.gen(), rng.gen_range(2..12)),
            7 | 8 => Behaviour::Follows(rng.gen_range(0..BRANCHES)),
            _ => Behaviour::Random,
        })
        .collect();
    let mut counts = vec![0u32; BRANCHES];
    let mut last = vec![false; BRANCHES];

    let mut events = Vec::with_capacity(n);
    let mut i = 0;
    while events.len() < n {
        let count = counts[i];
        let taken = match behaviours[i] {
            Behaviour::Biased(p) => rng.gen_bool(p),
            Behaviour::Loop(trip) => count % trip != trip - 1,
            Behaviour::Pattern(bits, len) => (bits >> (count % len)) & 1 != 0,
            Behaviour::Follows(other) => last[other],
            Behaviour::Random => rng.gen_bool(0.5),
        };
        counts[i] = count.wrapping_add(1);
        last[i] = taken;
        events.push(Event {
            pc: pcs[i],
            taken,
            delta: rng.gen_range(0..12),
        });

        // Loops stay put until they exit, everything else walks a small window
        i = match behaviours[i] {
            Behaviour::Loop(_) if taken => i,
            _ if rng.gen_bool(0.9) => (i + 1) % BRANCHES,
            _ => rng.gen_range(0..BRANCHES),
        };
    }
    events
}

/// The configurations `--sweep` evaluates for `kind`, each derived from `base`.
fn sweep(kind: PredictorKind, base: &PredictorConfig) -> Vec<PredictorConfig> {
    let mut configs = Vec::new();
    match kind {
        PredictorKind::OneBit => {
            for table_bits in [12, 14, 16, 18, 20] {
                let mut c = base.clone();
                c.onebit.table_bits = table_bits;
                configs.push(c);
            }
        }
        PredictorKind::TwoBit => {
            for table_bits in [12, 14, 16, 18, 19] {
                let mut c = base.clone();
                c.twobit.table_bits = table_bits;
                configs.push(c);
            }
        }
        PredictorKind::Gshare => {
            for table_bits in [14, 16, 17, 18] {
                for history_bits in [2, 4, 6, 8, 10, 12] {
                    let mut c = base.clone();
                    c.gshare.table_bits = table_bits;
                    c.gshare.history_bits = history_bits;
                    configs.push(c);
                }
            }
        }
        PredictorKind::Correlating => {
            for pc_bits in [10, 12, 14, 16] {
                for history_bits in [4, 6, 8, 10] {
                    let mut c = base.clone();
                    c.correlating.pc_bits = pc_bits;
                    c.correlating.history_bits = history_bits;
                    configs.push(c);
                }
            }
        }
        PredictorKind::Local => {
            for lht_bits in [10, 12, 14] {
                for history_bits in [6, 8, 10] {
                    for pht_bits in [10, 12, 14] {
                        let mut c = base.clone();
                        c.local.lht_bits = lht_bits;
                        c.local.history_bits = history_bits;
                        c.local.pht_bits = pht_bits;
                        configs.push(c);
                    }
                }
            }
        }
        PredictorKind::Tournament => {
            for selector_bits in [12, 14, 16] {
                for bimodal_bits in [12, 14, 16] {
                    for gshare_table_bits in [12, 14, 16] {
                        for gshare_history_bits in [4, 6, 8] {
                            let mut c = base.clone();
                            c.tournament.selector_bits = selector_bits;
                            c.tournament.bimodal_bits = bimodal_bits;
                            c.tournament.gshare_table_bits = gshare_table_bits;
                            c.tournament.gshare_history_bits = gshare_history_bits;
                            configs.push(c);
                        }
                    }
                }
            }
        }
        PredictorKind::Perceptron => {
            for table_bits in [8, 10, 12] {
                for history_length in [12, 24, 32, 48] {
                    let mut c = base.clone();
                    c.perceptron.table_bits = table_bits;
                    c.perceptron.history_length = history_length;
                    c.perceptron.threshold = None;
                    configs.push(c);
                }
            }
        }
        PredictorKind::Tage => {
            for log_bank_entries in [9, 10, 11] {
                for max_history in [300, 640, 1000] {
                    let mut c = base.clone();
                    c.tage.log_bank_entries = log_bank_entries;
                    c.tage.max_history = max_history;
                    configs.push(c);
                }
            }
        }
    }
    configs
}

fn simulate(selector: &mut PredictorSelector, events: &[Event]) -> usize {
    let mut misses = 0;
    for e in events {
        if selector.predict(e.pc) != e.taken {
            misses += 1;
        }
        selector.train(e.pc, e.taken);
    }
    misses
}

/// Name, parameters, storage bits and mispredictions.
type Outcome = (String, Vec<usize>, usize, usize);

fn run(
    runs: &[(PredictorKind, PredictorConfig)],
    events: &[Event],
    jobs: usize,
) -> anyhow::Result<Vec<Outcome>> {
    let mut outcomes = Vec::with_capacity(runs.len());
    for batch in runs.chunks(jobs.max(1)) {
        let mut selectors = batch
            .iter()
            .map(|(kind, config)| PredictorSelector::configure(*kind, config))
            .collect::<Result<Vec<_>, _>>()?;

        let misses = crossbeam::scope(|s| {
            let handles: Vec<_> = selectors
                .iter_mut()
                .map(|selector| s.spawn(move |_| simulate(selector, events)))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join())
                .collect::<Result<Vec<_>, _>>()
        })
        .map_err(|_| anyhow!("simulation thread panicked"))?
        .map_err(|_| anyhow!("simulation thread panicked"))?;

        for (selector, misses) in selectors.iter_mut().zip(misses) {
            let (name, params, size) = selector
                .report()
                .ok_or_else(|| anyhow!("{} predictor released early", selector.kind()))?;
            outcomes.push((name, params, size, misses));
            selector.release();
        }
    }
    Ok(outcomes)
}

fn report(
    mut results: Vec<Outcome>,
    elapsed: std::time::Duration,
    count: usize,
    instret: u64,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    println!(
        "Processed {} branch events ({} predictions) in {:.2} s = {:.3} Mpredictions/s",
        format_num!(",.0", count as f64),
        format_num!(",.0", (count * results.len()) as f64),
        elapsed.as_secs_f64(),
        count as f64 * results.len() as f64 / (1000000.0 * elapsed.as_secs_f64())
    );

    results.sort_by(|a, b| b.3.cmp(&a.3));

    let mut data = match output {
        Some(path) => Some(BufWriter::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        )),
        None => None,
    };

    for (alg, config, size, misses) in results {
        let miss_rate = misses as f64 / count.max(1) as f64;
        let mpki = 1000.0 * misses as f64 / instret.max(1) as f64;
        let hit_rate = 100.0 - 100.0 * miss_rate;
        let kb = size as f64 / 8192.0;

        println!(
            "{:5.1} mpki ({:4.1}%) {:6.1} KiB {} {:?}",
            mpki, hit_rate, kb, alg, config
        );

        if let Some(data) = data.as_mut() {
            writeln!(data, "{}\t{}", kb, mpki)?;
        }
    }

    if let Some(mut data) = data {
        data.flush()?;
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let base = match &cli.config {
        Some(path) => PredictorConfig::from_toml_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => PredictorConfig::default(),
    };

    let events = match (cli.synthetic, &cli.input) {
        (Some(n), _) => synthetic_trace(n, cli.seed),
        (None, Some(path)) => read_trace(path)?,
        (None, None) => return Err(anyhow!("no trace given")),
    };
    let instret: u64 = events.iter().map(|e| e.delta + 1).sum();
    log::info!(
        "{} branch events, {} instructions",
        events.len(),
        format_num!(",.0", instret as f64)
    );

    let kinds = if cli.predictors.is_empty() {
        PredictorKind::ALL.to_vec()
    } else {
        cli.predictors.clone()
    };
    let runs: Vec<(PredictorKind, PredictorConfig)> = kinds
        .iter()
        .flat_map(|&kind| {
            let configs = if cli.sweep {
                sweep(kind, &base)
            } else {
                vec![base.clone()]
            };
            configs.into_iter().map(move |c| (kind, c))
        })
        .collect();
    let jobs = cli.jobs.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    });
    log::info!("{} configurations, {} at a time", runs.len(), jobs);

    let start = Instant::now();
    let results = run(&runs, &events, jobs)?;
    report(
        results,
        start.elapsed(),
        events.len(),
        instret,
        cli.output.as_deref(),
    )
}
