// src/orchestrator.rs
use crate::analysis::MarketAnalyzer;
use crate::config::{Config, MonitorConfig};
use crate::domain::errors::{AppError, AppResult};
use crate::domain::models::{
    AccumulationZone, BreakoutGrade, BreakoutInfo, BreakoutType, ImbalanceSignal, SignalStrength,
    SignalType, TickBar,
};
use crate::exchange::{subscribe, ExchangeClient, ExchangeEvent, SubscriptionChannel};
use crate::market_data::{MarketDataAggregator, TickBarAggregator};
use crate::notification::NotificationService;
use crate::persistence::{BarRecord, BarStore, JsonLinesBarStore};
use crate::signals::ImbalanceDetector;
use chrono::Utc;
use futures_util::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

const EVENT_CHANNEL_CAPACITY: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Idle,
    Connecting,
    Running,
    Stopped,
}

/// Everything an analysis pass reads, shared with the timer task
pub struct AnalysisPipeline {
    market_data: Arc<MarketDataAggregator>,
    analyzer: Arc<MarketAnalyzer>,
    detector: ImbalanceDetector,
    notifier: Arc<dyn NotificationService>,
    resolutions: Vec<u32>,
    bars_per_pass: usize,
    // single-flight slot for analysis passes
    pass_slot: Arc<Semaphore>,
}

impl AnalysisPipeline {
    pub fn market_data(&self) -> &Arc<MarketDataAggregator> {
        &self.market_data
    }

    pub fn analyzer(&self) -> &Arc<MarketAnalyzer> {
        &self.analyzer
    }

    /// Start a pass unless one is already running.
    ///
    /// The slot is released when the spawned pass ends, whether it finishes
    /// or panics.
    pub fn try_run_pass(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let permit = self.pass_slot.clone().try_acquire_owned().ok()?;
        let pipeline = self.clone();

        Some(tokio::spawn(async move {
            let _permit = permit;
            pipeline.run_pass().await;
        }))
    }

    pub fn is_pass_running(&self) -> bool {
        self.pass_slot.available_permits() == 0
    }

    pub async fn run_pass(&self) {
        let signals = self.collect_signals();
        if !signals.is_empty() {
            log::debug!("Analysis pass produced {} signals", signals.len());
        }
        self.route_signals(signals).await;
    }

    /// Imbalance and breakout signals across every resolution
    pub fn collect_signals(&self) -> Vec<ImbalanceSignal> {
        let baselines = self.analyzer.baselines();
        let mut signals = Vec::new();

        for &resolution in &self.resolutions {
            let bars = self.market_data.get_tick_bars(resolution, self.bars_per_pass);
            let Some(latest) = bars.last() else {
                continue;
            };

            signals.extend(self.detector.detect_imbalances(&bars, &baselines));

            for zone in self.analyzer.detect_accumulation_zones(&bars) {
                if self.analyzer.is_breakout(latest, &zone) {
                    let breakout = self.analyzer.analyze_breakout(&bars, &zone);
                    signals.push(breakout_signal(&zone, &breakout));
                }
            }
        }

        signals
    }

    pub async fn route_signals(&self, signals: Vec<ImbalanceSignal>) {
        for signal in signals {
            match signal.strength {
                SignalStrength::Critical => {
                    if let Err(e) = self.notifier.send_alert(&signal).await {
                        log::error!("Failed to send {} alert: {}", signal.signal_type, e);
                    }
                }
                SignalStrength::Strong => {
                    let signal_type = signal.signal_type;
                    if let Err(e) = self.notifier.queue_for_validation(signal).await {
                        log::error!("Failed to queue {} for validation: {}", signal_type, e);
                    }
                }
                SignalStrength::Moderate => {
                    log::info!(
                        "[{}] {}: {}",
                        signal.strength,
                        signal.signal_type,
                        signal.description
                    );
                }
                SignalStrength::Weak => {}
            }
        }
    }
}

pub fn breakout_signal(zone: &AccumulationZone, breakout: &BreakoutInfo) -> ImbalanceSignal {
    let signal_type = match breakout.breakout_type {
        BreakoutType::Bullish => SignalType::BullishBreakthrough,
        BreakoutType::Bearish => SignalType::BearishBreakthrough,
        BreakoutType::False => SignalType::FalseBreakout,
    };
    let strength = match breakout.grade {
        BreakoutGrade::Explosive => SignalStrength::Critical,
        BreakoutGrade::Strong => SignalStrength::Strong,
        BreakoutGrade::Moderate => SignalStrength::Moderate,
    };

    ImbalanceSignal {
        signal_type,
        strength,
        description: format!("Breakout from {} at {:.2}", zone.zone_type, zone.price_level),
        metrics: BTreeMap::from([
            ("ZoneStrength".to_string(), zone.strength_score),
            ("VolumeExpansion".to_string(), breakout.volume_expansion),
            ("PriceExtension".to_string(), breakout.price_extension),
        ]),
        timestamp: Utc::now(),
        confidence_level: breakout.strength,
    }
}

/// Owns the components and drives the pipeline:
/// adapters feed the aggregator, sealed bars feed the analyzer, and a
/// periodic timer runs analysis passes.
pub struct Orchestrator {
    monitor: MonitorConfig,
    pipeline: Arc<AnalysisPipeline>,
    bar_store: Option<Arc<dyn BarStore>>,
    adapters: Vec<Box<dyn ExchangeClient>>,
    connected: Vec<String>,
    state: OrchestratorState,
    timer_task: Option<JoinHandle<()>>,
    background_tasks: Vec<JoinHandle<()>>,
}

impl Orchestrator {
    pub fn new(config: &Config, notifier: Arc<dyn NotificationService>) -> Self {
        let monitor = config.monitor.clone();

        let bar_builder = TickBarAggregator::new(&monitor.resolutions, monitor.bar_retention);
        let resolutions = bar_builder.resolutions();
        let market_data = MarketDataAggregator::new(bar_builder, monitor.market_data_settings());

        let pipeline = AnalysisPipeline {
            market_data: Arc::new(market_data),
            analyzer: Arc::new(MarketAnalyzer::new(config.analyzer.clone())),
            detector: ImbalanceDetector::new(Arc::new(config.imbalance.clone())),
            notifier,
            resolutions,
            bars_per_pass: monitor.bars_per_pass,
            pass_slot: Arc::new(Semaphore::new(1)),
        };

        let bar_store = config
            .persistence
            .bar_log_path
            .as_ref()
            .map(|path| Arc::new(JsonLinesBarStore::new(path)) as Arc<dyn BarStore>);

        Self {
            monitor,
            pipeline: Arc::new(pipeline),
            bar_store,
            adapters: Vec::new(),
            connected: Vec::new(),
            state: OrchestratorState::Idle,
            timer_task: None,
            background_tasks: Vec::new(),
        }
    }

    pub fn with_bar_store(mut self, store: Arc<dyn BarStore>) -> Self {
        self.bar_store = Some(store);
        self
    }

    pub fn add_adapter(&mut self, adapter: Box<dyn ExchangeClient>) {
        self.adapters.push(adapter);
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    pub fn pipeline(&self) -> &Arc<AnalysisPipeline> {
        &self.pipeline
    }

    pub fn market_data(&self) -> &Arc<MarketDataAggregator> {
        &self.pipeline.market_data
    }

    pub fn analyzer(&self) -> &Arc<MarketAnalyzer> {
        &self.pipeline.analyzer
    }

    /// Names of the adapters that connected on start
    pub fn connected_adapters(&self) -> &[String] {
        &self.connected
    }

    pub async fn start(&mut self) -> AppResult<()> {
        if self.state != OrchestratorState::Idle {
            return Err(AppError::InvalidState(format!("cannot start from {:?}", self.state)));
        }
        self.state = OrchestratorState::Connecting;
        log::info!(
            "Starting imbalance monitor for {} on {} adapters",
            self.monitor.symbol,
            self.adapters.len()
        );

        // Subscribe before any trade can seal a bar
        self.background_tasks.push(spawn_bar_subscriber(
            self.pipeline.market_data.subscribe_bars(),
            self.pipeline.analyzer.clone(),
            self.bar_store.clone(),
        ));

        let connects = self.adapters.iter_mut().map(|adapter| {
            let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
            async move {
                let result = adapter.connect(tx).await;
                (adapter, rx, result)
            }
        });
        let results = join_all(connects).await;

        let symbol = self.monitor.symbol.clone();
        let mut pumps = Vec::new();
        let mut connected = Vec::new();

        for (adapter, rx, result) in results {
            let name = adapter.name().to_string();
            if let Err(e) = result {
                log::error!("{}: connection failed, continuing without it: {}", name, e);
                continue;
            }

            pumps.push(spawn_event_pump(name.clone(), self.pipeline.market_data.clone(), rx));

            for channel in SubscriptionChannel::DEFAULT {
                if let Err(e) = subscribe(&mut **adapter, channel, &symbol).await {
                    log::error!("{}: {:?} subscription failed: {}", name, channel, e);
                }
            }
            connected.push(name);
        }

        if connected.is_empty() {
            log::warn!("No exchange adapter connected; analysis will see no data");
        } else {
            log::info!("Connected adapters: {}", connected.join(", "));
        }
        self.connected = connected;
        self.background_tasks.extend(pumps);

        self.timer_task = Some(spawn_analysis_timer(self.pipeline.clone(), &self.monitor));
        self.state = OrchestratorState::Running;
        Ok(())
    }

    pub async fn stop(&mut self) {
        if self.state == OrchestratorState::Stopped {
            return;
        }

        if let Some(timer) = self.timer_task.take() {
            timer.abort();
        }

        for adapter in self.adapters.iter_mut() {
            if let Err(e) = adapter.disconnect().await {
                log::warn!("{}: disconnect failed: {}", adapter.name(), e);
            }
        }

        for task in self.background_tasks.drain(..) {
            task.abort();
        }

        self.connected.clear();
        self.state = OrchestratorState::Stopped;
        log::info!("Imbalance monitor stopped");
    }
}

fn spawn_event_pump(
    exchange: String,
    market_data: Arc<MarketDataAggregator>,
    mut events: mpsc::Receiver<ExchangeEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                ExchangeEvent::Trade(trade) => market_data.process_trade(trade),
                ExchangeEvent::OrderBook(snapshot) => market_data.update_order_book(snapshot),
                ExchangeEvent::OpenInterest(open_interest) => {
                    market_data.update_open_interest(open_interest, &exchange)
                }
                ExchangeEvent::FundingRate(rate) => market_data.update_funding_rate(rate),
            }
        }
        log::debug!("{}: event stream ended", exchange);
    })
}

fn spawn_bar_subscriber(
    mut bars: broadcast::Receiver<TickBar>,
    analyzer: Arc<MarketAnalyzer>,
    store: Option<Arc<dyn BarStore>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match bars.recv().await {
                Ok(bar) => {
                    log::debug!(
                        "Bar sealed: res={} vol={:.2} delta={:.2}% formed in {:.1}s",
                        bar.resolution,
                        bar.volume,
                        bar.delta_percentage() * 100.0,
                        bar.formation_secs()
                    );

                    let record = BarRecord::from(&bar);
                    analyzer.update_historical_bars(bar);

                    if let Some(store) = &store {
                        if let Err(e) = store.store(&record).await {
                            log::warn!("Failed to persist {}-tick bar: {}", record.resolution, e);
                        }
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("Bar subscriber lagged, {} bars skipped", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn spawn_analysis_timer(
    pipeline: Arc<AnalysisPipeline>,
    monitor: &MonitorConfig,
) -> JoinHandle<()> {
    let period = monitor.analysis_interval();

    tokio::spawn(async move {
        let mut timer = tokio::time::interval(period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            timer.tick().await;
            if pipeline.try_run_pass().is_none() {
                log::trace!("Analysis pass still running, tick dropped");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::{NotificationError, NotificationResult};
    use crate::domain::models::{Trade, TradeSide, ZoneType};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;

    #[derive(Default)]
    struct RecordingNotifier {
        alerts: Mutex<Vec<ImbalanceSignal>>,
        queued: Mutex<Vec<ImbalanceSignal>>,
        fail_alerts: bool,
    }

    #[async_trait]
    impl NotificationService for RecordingNotifier {
        async fn send_alert(&self, signal: &ImbalanceSignal) -> NotificationResult<()> {
            if self.fail_alerts {
                return Err(NotificationError::Delivery("offline".to_string()));
            }
            self.alerts.lock().push(signal.clone());
            Ok(())
        }

        async fn queue_for_validation(&self, signal: ImbalanceSignal) -> NotificationResult<()> {
            self.queued.lock().push(signal);
            Ok(())
        }
    }

    struct PanickingNotifier;

    #[async_trait]
    impl NotificationService for PanickingNotifier {
        async fn send_alert(&self, _signal: &ImbalanceSignal) -> NotificationResult<()> {
            panic!("alert sink crashed");
        }

        async fn queue_for_validation(&self, _signal: ImbalanceSignal) -> NotificationResult<()> {
            panic!("validation sink crashed");
        }
    }

    fn sell_trades(market_data: &MarketDataAggregator, count: usize) {
        for i in 0..count {
            market_data.process_trade(Trade {
                id: i.to_string(),
                price: dec!(100),
                volume: dec!(1),
                side: TradeSide::Sell,
                timestamp: Utc::now(),
                exchange: "test".to_string(),
            });
        }
    }

    fn signal(strength: SignalStrength) -> ImbalanceSignal {
        ImbalanceSignal {
            signal_type: SignalType::ExtremeImbalance,
            strength,
            description: String::new(),
            metrics: BTreeMap::new(),
            timestamp: Utc::now(),
            confidence_level: 0.5,
        }
    }

    fn config(resolutions: Vec<u32>) -> Config {
        let mut config = Config::default();
        config.monitor.resolutions = resolutions;
        config
    }

    #[tokio::test]
    async fn routes_by_strength() {
        let notifier = Arc::new(RecordingNotifier::default());
        let orchestrator = Orchestrator::new(&config(vec![500]), notifier.clone());

        orchestrator
            .pipeline()
            .route_signals(vec![
                signal(SignalStrength::Critical),
                signal(SignalStrength::Strong),
                signal(SignalStrength::Moderate),
                signal(SignalStrength::Weak),
                signal(SignalStrength::Critical),
            ])
            .await;

        assert_eq!(notifier.alerts.lock().len(), 2);
        assert_eq!(notifier.queued.lock().len(), 1);
    }

    #[tokio::test]
    async fn failed_alert_does_not_stop_routing() {
        let notifier = Arc::new(RecordingNotifier {
            fail_alerts: true,
            ..Default::default()
        });
        let orchestrator = Orchestrator::new(&config(vec![500]), notifier.clone());

        orchestrator
            .pipeline()
            .route_signals(vec![signal(SignalStrength::Critical), signal(SignalStrength::Strong)])
            .await;

        assert!(notifier.alerts.lock().is_empty());
        assert_eq!(notifier.queued.lock().len(), 1);
    }

    #[tokio::test]
    async fn single_flight_pass_gate() {
        let orchestrator =
            Orchestrator::new(&config(vec![500]), Arc::new(RecordingNotifier::default()));
        let pipeline = orchestrator.pipeline().clone();

        let first = pipeline.try_run_pass().expect("first pass starts");
        assert!(pipeline.is_pass_running());
        assert!(pipeline.try_run_pass().is_none());

        first.await.unwrap();
        assert!(!pipeline.is_pass_running());

        let next = pipeline.try_run_pass().expect("slot released after completion");
        next.await.unwrap();
    }

    #[tokio::test]
    async fn panicking_pass_releases_slot() {
        let orchestrator = Orchestrator::new(&config(vec![5]), Arc::new(PanickingNotifier));
        let pipeline = orchestrator.pipeline().clone();

        // an all-sell bar with no history is a critical alert
        sell_trades(pipeline.market_data(), 5);

        let failed = pipeline.try_run_pass().expect("first pass starts");
        let err = failed.await.unwrap_err();
        assert!(err.is_panic());
        assert!(!pipeline.is_pass_running());

        let next = pipeline.try_run_pass().expect("slot released after panic");
        assert!(next.await.unwrap_err().is_panic());
        assert!(!pipeline.is_pass_running());
    }

    #[tokio::test]
    async fn pass_collects_detector_signals_per_resolution() {
        let orchestrator =
            Orchestrator::new(&config(vec![5, 10]), Arc::new(RecordingNotifier::default()));
        let market_data = orchestrator.market_data();

        // all-sell bars: delta percentage of -1 is an extreme imbalance
        sell_trades(market_data, 10);

        let signals = orchestrator.pipeline().collect_signals();
        let extreme = signals
            .iter()
            .filter(|s| s.signal_type == SignalType::ExtremeImbalance)
            .count();
        // two 5-tick bars and one 10-tick bar
        assert_eq!(extreme, 3);
    }

    #[test]
    fn breakout_signal_mapping() {
        let zone = AccumulationZone {
            price_level: 100.0,
            volume_accumulated: 1500.0,
            duration: chrono::Duration::minutes(30),
            open_pos_imbalance: 0.0,
            zone_type: ZoneType::Resistance,
            start_time: Utc::now(),
            end_time: None,
            touch_count: 4,
            strength_score: 80.0,
        };
        let info = BreakoutInfo {
            breakout_type: BreakoutType::Bullish,
            grade: BreakoutGrade::Explosive,
            strength: 0.9,
            volume_expansion: 6.0,
            price_extension: 3.5,
            is_confirmed: true,
        };

        let signal = breakout_signal(&zone, &info);
        assert_eq!(signal.signal_type, SignalType::BullishBreakthrough);
        assert_eq!(signal.strength, SignalStrength::Critical);
        assert_eq!(signal.confidence_level, 0.9);
        assert_eq!(signal.metrics["PriceExtension"], 3.5);
        assert_eq!(signal.description, "Breakout from Resistance at 100.00");

        let false_breakout = BreakoutInfo {
            breakout_type: BreakoutType::False,
            ..Default::default()
        };
        let signal = breakout_signal(&zone, &false_breakout);
        assert_eq!(signal.signal_type, SignalType::FalseBreakout);
        assert_eq!(signal.strength, SignalStrength::Moderate);
    }

    #[tokio::test]
    async fn start_twice_is_rejected_and_stop_is_final() {
        let mut orchestrator =
            Orchestrator::new(&config(vec![500]), Arc::new(RecordingNotifier::default()));
        assert_eq!(orchestrator.state(), OrchestratorState::Idle);

        orchestrator.start().await.unwrap();
        assert_eq!(orchestrator.state(), OrchestratorState::Running);
        assert!(matches!(orchestrator.start().await, Err(AppError::InvalidState(_))));

        orchestrator.stop().await;
        assert_eq!(orchestrator.state(), OrchestratorState::Stopped);
    }
}
