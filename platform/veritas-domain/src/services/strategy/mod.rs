use crate::errors::StrategyEvaluationError;
use crate::value_objects::bar::Bar;
use crate::value_objects::signal::{PriceLevel, Signal, SignalAction};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Opaque decision procedure replayed by the engine.
///
/// `generate_signals` receives the bars up to and including the current one
/// and nothing later. `reset` must purge any memorized state so a reused
/// instance behaves like a fresh one.
pub trait Strategy: Send {
    fn name(&self) -> &str;

    fn generate_signals(&mut self, window: &[Bar]) -> Result<Vec<Signal>, StrategyEvaluationError>;

    fn reset(&mut self) {}
}

/// Builds a fresh strategy instance per run so concurrent runs never share
/// mutable pattern state.
pub trait StrategyFactory: Sync {
    /// Human-readable identity, including parameters. Two factories with the
    /// same label are expected to build equivalent strategies.
    fn label(&self) -> String;

    fn create(&self) -> Box<dyn Strategy>;
}

pub struct FlatStrategy;

impl Strategy for FlatStrategy {
    fn name(&self) -> &str {
        "flat"
    }

    fn generate_signals(&mut self, _window: &[Bar]) -> Result<Vec<Signal>, StrategyEvaluationError> {
        Ok(Vec::new())
    }
}

pub struct BuyAndHold {
    has_bought: bool,
}

impl BuyAndHold {
    pub fn new() -> Self {
        Self { has_bought: false }
    }
}

impl Default for BuyAndHold {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for BuyAndHold {
    fn name(&self) -> &str {
        "buy_and_hold"
    }

    fn generate_signals(&mut self, _window: &[Bar]) -> Result<Vec<Signal>, StrategyEvaluationError> {
        if self.has_bought {
            return Ok(Vec::new());
        }
        self.has_bought = true;
        Ok(vec![Signal::buy().with_metadata("benchmark", serde_json::json!(true))])
    }

    fn reset(&mut self) {
        self.has_bought = false;
    }
}

pub struct SmaCrossover {
    fast: usize,
    slow: usize,
    stop_loss_pips: Option<f64>,
    take_profit_pips: Option<f64>,
    last_cross: Option<SignalAction>,
}

impl SmaCrossover {
    pub fn new(
        fast: usize,
        slow: usize,
        stop_loss_pips: Option<f64>,
        take_profit_pips: Option<f64>,
    ) -> Self {
        let fast = fast.max(1);
        Self {
            fast,
            slow: slow.max(fast + 1),
            stop_loss_pips,
            take_profit_pips,
            last_cross: None,
        }
    }

    fn sma(closes: &[f64], window: usize) -> Option<f64> {
        if closes.len() < window || window == 0 {
            return None;
        }
        let slice = &closes[closes.len() - window..];
        Some(slice.iter().sum::<f64>() / window as f64)
    }

    fn decorate(&self, signal: Signal) -> Signal {
        let signal = match self.stop_loss_pips {
            Some(pips) => signal.with_stop_loss(PriceLevel::Pips(pips)),
            None => signal,
        };
        match self.take_profit_pips {
            Some(pips) => signal.with_take_profit(PriceLevel::Pips(pips)),
            None => signal,
        }
    }
}

impl Strategy for SmaCrossover {
    fn name(&self) -> &str {
        "sma_crossover"
    }

    fn generate_signals(&mut self, window: &[Bar]) -> Result<Vec<Signal>, StrategyEvaluationError> {
        if window.len() < self.slow + 1 {
            return Ok(Vec::new());
        }
        let closes: Vec<f64> = window[window.len() - self.slow - 1..]
            .iter()
            .map(|bar| bar.close)
            .collect();
        if closes.iter().any(|c| !c.is_finite()) {
            return Err(StrategyEvaluationError::new("non-finite close in window"));
        }
        let previous = &closes[..closes.len() - 1];

        let (Some(fast), Some(slow), Some(prev_fast), Some(prev_slow)) = (
            Self::sma(&closes, self.fast),
            Self::sma(&closes, self.slow),
            Self::sma(previous, self.fast),
            Self::sma(previous, self.slow),
        ) else {
            return Ok(Vec::new());
        };

        let cross = if prev_fast <= prev_slow && fast > slow {
            Some(SignalAction::Buy)
        } else if prev_fast >= prev_slow && fast < slow {
            Some(SignalAction::Sell)
        } else {
            None
        };

        match cross {
            Some(action) if self.last_cross != Some(action) => {
                self.last_cross = Some(action);
                Ok(vec![self.decorate(Signal::new(action))])
            }
            _ => Ok(Vec::new()),
        }
    }

    fn reset(&mut self) {
        self.last_cross = None;
    }
}

/// Benchmark that enters long or short at random with a fixed probability.
pub struct RandomEntry {
    probability: f64,
    seed: u64,
    stop_loss_pips: f64,
    take_profit_pips: f64,
    rng: StdRng,
}

impl RandomEntry {
    pub fn new(probability: f64, seed: u64, stop_loss_pips: f64, take_profit_pips: f64) -> Self {
        Self {
            probability: probability.clamp(0.0, 1.0),
            seed,
            stop_loss_pips,
            take_profit_pips,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Strategy for RandomEntry {
    fn name(&self) -> &str {
        "random_entry"
    }

    fn generate_signals(&mut self, _window: &[Bar]) -> Result<Vec<Signal>, StrategyEvaluationError> {
        if self.rng.gen::<f64>() >= self.probability {
            return Ok(Vec::new());
        }
        let signal = if self.rng.gen_bool(0.5) {
            Signal::buy()
        } else {
            Signal::sell()
        };
        Ok(vec![signal
            .with_stop_loss(PriceLevel::Pips(self.stop_loss_pips))
            .with_take_profit(PriceLevel::Pips(self.take_profit_pips))
            .with_metadata("benchmark", serde_json::json!(true))])
    }

    fn reset(&mut self) {
        self.rng = StdRng::seed_from_u64(self.seed);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledSignal {
    pub timestamp: i64,
    #[serde(flatten)]
    pub signal: Signal,
}

/// Replays a fixed list of signals keyed by bar timestamp.
pub struct ScriptedSignals {
    by_timestamp: BTreeMap<i64, Vec<Signal>>,
}

impl ScriptedSignals {
    pub fn new(signals: Vec<ScheduledSignal>) -> Self {
        let mut by_timestamp: BTreeMap<i64, Vec<Signal>> = BTreeMap::new();
        for scheduled in signals {
            by_timestamp
                .entry(scheduled.timestamp)
                .or_default()
                .push(scheduled.signal);
        }
        Self { by_timestamp }
    }
}

impl Strategy for ScriptedSignals {
    fn name(&self) -> &str {
        "scripted"
    }

    fn generate_signals(&mut self, window: &[Bar]) -> Result<Vec<Signal>, StrategyEvaluationError> {
        let Some(current) = window.last() else {
            return Ok(Vec::new());
        };
        Ok(self
            .by_timestamp
            .get(&current.timestamp)
            .cloned()
            .unwrap_or_default())
    }
}

/// Serializable description of every known strategy variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategySpec {
    Flat,
    SmaCrossover {
        fast: usize,
        slow: usize,
        #[serde(default)]
        stop_loss_pips: Option<f64>,
        #[serde(default)]
        take_profit_pips: Option<f64>,
    },
    BuyAndHold,
    RandomEntry {
        probability: f64,
        seed: u64,
        stop_loss_pips: f64,
        take_profit_pips: f64,
    },
    Scripted {
        signals: Vec<ScheduledSignal>,
    },
}

impl StrategySpec {
    pub fn name(&self) -> &'static str {
        match self {
            StrategySpec::Flat => "flat",
            StrategySpec::SmaCrossover { .. } => "sma_crossover",
            StrategySpec::BuyAndHold => "buy_and_hold",
            StrategySpec::RandomEntry { .. } => "random_entry",
            StrategySpec::Scripted { .. } => "scripted",
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            StrategySpec::SmaCrossover { fast, slow, .. } => {
                if *fast == 0 || fast >= slow {
                    return Err(format!(
                        "sma_crossover requires 0 < fast < slow (fast={fast}, slow={slow})"
                    ));
                }
            }
            StrategySpec::RandomEntry {
                probability,
                stop_loss_pips,
                take_profit_pips,
                ..
            } => {
                if !(0.0..=1.0).contains(probability) {
                    return Err("random_entry.probability must be within [0, 1]".to_string());
                }
                if *stop_loss_pips <= 0.0 || *take_profit_pips <= 0.0 {
                    return Err("random_entry stop/take-profit pips must be > 0".to_string());
                }
            }
            StrategySpec::Flat | StrategySpec::BuyAndHold | StrategySpec::Scripted { .. } => {}
        }
        Ok(())
    }

    /// The single construction point for built-in strategies.
    pub fn build(&self) -> StrategyKind {
        match self {
            StrategySpec::Flat => StrategyKind::Flat(FlatStrategy),
            StrategySpec::SmaCrossover {
                fast,
                slow,
                stop_loss_pips,
                take_profit_pips,
            } => StrategyKind::SmaCrossover(SmaCrossover::new(
                *fast,
                *slow,
                *stop_loss_pips,
                *take_profit_pips,
            )),
            StrategySpec::BuyAndHold => StrategyKind::BuyAndHold(BuyAndHold::new()),
            StrategySpec::RandomEntry {
                probability,
                seed,
                stop_loss_pips,
                take_profit_pips,
            } => StrategyKind::RandomEntry(RandomEntry::new(
                *probability,
                *seed,
                *stop_loss_pips,
                *take_profit_pips,
            )),
            StrategySpec::Scripted { signals } => {
                StrategyKind::Scripted(ScriptedSignals::new(signals.clone()))
            }
        }
    }
}

impl StrategyFactory for StrategySpec {
    fn label(&self) -> String {
        match self {
            StrategySpec::Flat | StrategySpec::BuyAndHold => self.name().to_string(),
            StrategySpec::SmaCrossover {
                fast,
                slow,
                stop_loss_pips,
                take_profit_pips,
            } => {
                let mut label = format!("sma_crossover({fast},{slow}");
                if let Some(pips) = stop_loss_pips {
                    label.push_str(&format!(",sl={pips}"));
                }
                if let Some(pips) = take_profit_pips {
                    label.push_str(&format!(",tp={pips}"));
                }
                label.push(')');
                label
            }
            StrategySpec::RandomEntry {
                probability,
                seed,
                stop_loss_pips,
                take_profit_pips,
            } => format!(
                "random_entry(p={probability},seed={seed},sl={stop_loss_pips},tp={take_profit_pips})"
            ),
            StrategySpec::Scripted { signals } => format!("scripted(n={})", signals.len()),
        }
    }

    fn create(&self) -> Box<dyn Strategy> {
        Box::new(self.build())
    }
}

pub enum StrategyKind {
    Flat(FlatStrategy),
    SmaCrossover(SmaCrossover),
    BuyAndHold(BuyAndHold),
    RandomEntry(RandomEntry),
    Scripted(ScriptedSignals),
}

impl Strategy for StrategyKind {
    fn name(&self) -> &str {
        match self {
            StrategyKind::Flat(strategy) => strategy.name(),
            StrategyKind::SmaCrossover(strategy) => strategy.name(),
            StrategyKind::BuyAndHold(strategy) => strategy.name(),
            StrategyKind::RandomEntry(strategy) => strategy.name(),
            StrategyKind::Scripted(strategy) => strategy.name(),
        }
    }

    fn generate_signals(&mut self, window: &[Bar]) -> Result<Vec<Signal>, StrategyEvaluationError> {
        match self {
            StrategyKind::Flat(strategy) => strategy.generate_signals(window),
            StrategyKind::SmaCrossover(strategy) => strategy.generate_signals(window),
            StrategyKind::BuyAndHold(strategy) => strategy.generate_signals(window),
            StrategyKind::RandomEntry(strategy) => strategy.generate_signals(window),
            StrategyKind::Scripted(strategy) => strategy.generate_signals(window),
        }
    }

    fn reset(&mut self) {
        match self {
            StrategyKind::Flat(strategy) => strategy.reset(),
            StrategyKind::SmaCrossover(strategy) => strategy.reset(),
            StrategyKind::BuyAndHold(strategy) => strategy.reset(),
            StrategyKind::RandomEntry(strategy) => strategy.reset(),
            StrategyKind::Scripted(strategy) => strategy.reset(),
        }
    }
}
