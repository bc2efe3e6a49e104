//! Stream loop integration tests.
//!
//! Drive `StreamLoop` end to end with scripted sources and a recording sink.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::float_cmp,
    clippy::cast_precision_loss
)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use candle_stream::{
    CandleSource, CandleSubscription, EventFlags, HeartbeatTask, PublishedSeries, RawEvent,
    SeriesSink, SourceError, Spinner, StreamError, StreamLoop,
};
use chrono::{TimeZone, Utc};
use serde_json::{Value, json};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const T0: i64 = 1_733_495_400_000;
const FIVE_MIN: i64 = 300_000;
const POLL_TIMEOUT: Duration = Duration::from_secs(2);

const BEGIN: u32 = EventFlags::SNAPSHOT_BEGIN.bits();
const END: u32 = EventFlags::SNAPSHOT_END.bits();
const REMOVE: u32 = EventFlags::REMOVE.bits();

// =============================================================================
// Fixtures
// =============================================================================

fn subscription() -> CandleSubscription {
    CandleSubscription {
        symbol: "SPY".to_string(),
        interval: "5m".to_string(),
        from_time: Utc.with_ymd_and_hms(2024, 12, 6, 0, 0, 0).unwrap(),
        extended_hours: false,
    }
}

fn candle(slot: i64, flags: u32, close: f64, volume: f64, vwap: f64) -> Value {
    json!({
        "eventType": "Candle",
        "eventSymbol": "SPY{=5m,tho=true}",
        "eventFlags": flags,
        "time": T0 + slot * FIVE_MIN,
        "open": close, "high": close, "low": close, "close": close,
        "volume": volume, "vwap": vwap,
    })
}

fn plain(slot: i64, flags: u32) -> Value {
    candle(slot, flags, 100.0, 1.0, 100.0)
}

/// Observable source state, shared with the test after the source moves.
#[derive(Default)]
struct SourceLog {
    polls: usize,
    closes: usize,
    polled_after_close: bool,
}

/// Replays a script, then stops the loop and idles.
struct ScriptedSource {
    script: VecDeque<Result<RawEvent, SourceError>>,
    stop: CancellationToken,
    log: Arc<Mutex<SourceLog>>,
}

impl ScriptedSource {
    fn new(events: Vec<Value>, stop: &CancellationToken) -> (Self, Arc<Mutex<SourceLog>>) {
        let log = Arc::new(Mutex::new(SourceLog::default()));
        let source = Self {
            script: events.into_iter().map(Ok).collect(),
            stop: stop.clone(),
            log: Arc::clone(&log),
        };
        (source, log)
    }
}

#[async_trait]
impl CandleSource for ScriptedSource {
    async fn subscribe(&mut self, _: &CandleSubscription) -> Result<(), SourceError> {
        Ok(())
    }

    async fn next_event(&mut self) -> Result<RawEvent, SourceError> {
        {
            let mut log = self.log.lock().unwrap();
            log.polls += 1;
            if log.closes > 0 {
                log.polled_after_close = true;
            }
        }
        if let Some(next) = self.script.pop_front() {
            return next;
        }
        self.stop.cancel();
        std::future::pending().await
    }

    async fn close(&mut self) -> Result<(), SourceError> {
        self.log.lock().unwrap().closes += 1;
        Ok(())
    }
}

/// Records every published series.
#[derive(Clone, Default)]
struct RecordingSink {
    published: Arc<Mutex<Vec<PublishedSeries>>>,
}

impl RecordingSink {
    fn published(&self) -> Vec<PublishedSeries> {
        self.published.lock().unwrap().clone()
    }
}

impl SeriesSink for RecordingSink {
    fn publish(&mut self, series: PublishedSeries) {
        self.published.lock().unwrap().push(series);
    }
}

fn heartbeat(period_ms: u64) -> HeartbeatTask {
    HeartbeatTask::new(Duration::from_millis(period_ms), Spinner::default())
}

async fn run_script(events: Vec<Value>) -> (RecordingSink, Arc<Mutex<SourceLog>>) {
    let stop = CancellationToken::new();
    let (source, log) = ScriptedSource::new(events, &stop);
    let sink = RecordingSink::default();

    StreamLoop::new(
        subscription(),
        POLL_TIMEOUT,
        source,
        sink.clone(),
        heartbeat(100),
        &stop,
    )
    .run()
    .await
    .unwrap();

    (sink, log)
}

// =============================================================================
// Gate
// =============================================================================

#[tokio::test(start_paused = true)]
async fn publishes_only_after_snapshot_end() {
    let (sink, _) = run_script(vec![plain(0, BEGIN), plain(1, 0), plain(2, END)]).await;

    let published = sink.published();
    assert_eq!(published.len(), 1);

    let series = &published[0];
    assert_eq!(series.symbol, "SPY");
    assert_eq!(series.len(), 3);
    assert!(series.records[2].flags.is_snapshot_end());
}

#[tokio::test(start_paused = true)]
async fn every_record_after_snapshot_publishes() {
    let (sink, _) = run_script(vec![
        plain(0, BEGIN),
        plain(1, END),
        plain(2, 0),
        plain(3, 0),
    ])
    .await;

    let lengths: Vec<usize> = sink.published().iter().map(PublishedSeries::len).collect();
    assert_eq!(lengths, vec![2, 3, 4]);
}

#[tokio::test(start_paused = true)]
async fn begin_without_end_stays_suppressed() {
    let mut events = vec![plain(0, BEGIN)];
    events.extend((1..=200).map(|slot| plain(slot, 0)));

    let stop = CancellationToken::new();
    let (source, _) = ScriptedSource::new(events, &stop);
    let sink = RecordingSink::default();

    let report = StreamLoop::new(
        subscription(),
        POLL_TIMEOUT,
        source,
        sink.clone(),
        heartbeat(100),
        &stop,
    )
    .run()
    .await
    .unwrap();

    assert!(sink.published().is_empty());
    assert_eq!(report.pipeline.events, 201);
    assert_eq!(report.pipeline.suppressed, 201);
    assert_eq!(report.pipeline.inserted, 201);
}

#[tokio::test(start_paused = true)]
async fn malformed_events_do_not_disturb_the_gate() {
    let (sink, _) = run_script(vec![
        plain(0, BEGIN),
        json!({"eventType": "Quote", "eventSymbol": "SPY"}),
        json!("garbage"),
        plain(1, END),
    ])
    .await;

    let published = sink.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].len(), 2);
}

// =============================================================================
// Merge
// =============================================================================

#[tokio::test(start_paused = true)]
async fn published_series_is_ordered_and_deduplicated() {
    let (sink, _) = run_script(vec![
        plain(0, BEGIN | END),
        candle(3, 0, 103.0, 1.0, 103.0),
        candle(1, 0, 101.0, 1.0, 101.0),
        candle(3, 0, 113.0, 1.0, 113.0),
        candle(2, 0, 102.0, 1.0, 102.0),
    ])
    .await;

    let last = sink.published().pop().unwrap();
    let closes: Vec<f64> = last.records.iter().map(|r| r.close).collect();
    assert_eq!(closes, vec![100.0, 101.0, 102.0, 113.0]);
    assert!(last.records.windows(2).all(|w| w[0].time < w[1].time));
}

#[tokio::test(start_paused = true)]
async fn removal_tombstones_the_slot() {
    let (sink, _) = run_script(vec![
        plain(0, BEGIN),
        plain(1, 0),
        plain(2, END),
        json!({
            "eventSymbol": "SPY{=5m,tho=true}",
            "eventFlags": REMOVE,
            "time": T0 + FIVE_MIN,
            "open": "NaN", "high": "NaN", "low": "NaN", "close": "NaN",
            "volume": "NaN", "vwap": "NaN",
        }),
        plain(7, REMOVE),
    ])
    .await;

    let published = sink.published();
    assert_eq!(published.len(), 3);

    let times: Vec<i64> = published[2]
        .records
        .iter()
        .map(|r| (r.time.timestamp_millis() - T0) / FIVE_MIN)
        .collect();
    assert_eq!(times, vec![0, 2]);
}

// =============================================================================
// Indicator
// =============================================================================

#[tokio::test(start_paused = true)]
async fn published_indicator_is_cumulative_vwap() {
    let (sink, _) = run_script(vec![
        candle(0, BEGIN, 10.0, 1.0, 10.0),
        candle(1, 0, 20.0, 2.0, 20.0),
        candle(2, END, 30.0, 3.0, 30.0),
    ])
    .await;

    let series = sink.published().pop().unwrap();
    assert_eq!(series.indicator.len(), series.records.len());

    let last = series.last_indicator().unwrap();
    assert!((last - 140.0 / 6.0).abs() < 1e-9);
    assert_eq!(series.indicator[0], Some(10.0));
    assert_eq!(series.last_close(), Some(30.0));
}

// =============================================================================
// Scheduling
// =============================================================================

#[tokio::test(start_paused = true)]
async fn timeouts_mutate_nothing_and_stop_promptly() {
    struct SilentSource;

    #[async_trait]
    impl CandleSource for SilentSource {
        async fn subscribe(&mut self, _: &CandleSubscription) -> Result<(), SourceError> {
            Ok(())
        }
        async fn next_event(&mut self) -> Result<RawEvent, SourceError> {
            std::future::pending().await
        }
        async fn close(&mut self) -> Result<(), SourceError> {
            Ok(())
        }
    }

    let stop = CancellationToken::new();
    let sink = RecordingSink::default();
    let stop_at = Instant::now() + Duration::from_secs(21);
    {
        let stop = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep_until(stop_at).await;
            stop.cancel();
        });
    }

    let report = StreamLoop::new(
        subscription(),
        POLL_TIMEOUT,
        SilentSource,
        sink.clone(),
        heartbeat(100),
        &stop,
    )
    .run()
    .await
    .unwrap();

    assert_eq!(report.timeouts, 11);
    assert_eq!(report.pipeline.events, 0);
    assert_eq!(report.pipeline.merges(), 0);
    assert!(sink.published().is_empty());
    assert!(Instant::now().duration_since(stop_at) <= POLL_TIMEOUT);
}

#[tokio::test]
async fn heartbeat_keeps_pace_under_continuous_events() {
    struct FloodSource {
        n: i64,
    }

    #[async_trait]
    impl CandleSource for FloodSource {
        async fn subscribe(&mut self, _: &CandleSubscription) -> Result<(), SourceError> {
            Ok(())
        }
        async fn next_event(&mut self) -> Result<RawEvent, SourceError> {
            self.n += 1;
            // One rolling slot keeps the series small.
            Ok(candle(0, 0, 100.0 + (self.n % 7) as f64, 1.0, 100.0))
        }
        async fn close(&mut self) -> Result<(), SourceError> {
            Ok(())
        }
    }

    let stop = CancellationToken::new();
    {
        let stop = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            stop.cancel();
        });
    }

    let report = StreamLoop::new(
        subscription(),
        POLL_TIMEOUT,
        FloodSource { n: 0 },
        RecordingSink::default(),
        heartbeat(10),
        &stop,
    )
    .run()
    .await
    .unwrap();

    assert!(report.pipeline.events > 100, "poller made progress");
    assert!(
        report.heartbeat_ticks >= 10,
        "heartbeat starved: {} ticks in 300ms",
        report.heartbeat_ticks
    );
}

#[tokio::test(start_paused = true)]
async fn close_happens_once_after_both_tasks_stop() {
    let (_, log) = run_script(vec![plain(0, BEGIN | END), plain(1, 0)]).await;

    let log = log.lock().unwrap();
    assert_eq!(log.closes, 1);
    assert!(!log.polled_after_close);
    assert_eq!(log.polls, 3);
}

#[tokio::test(start_paused = true)]
async fn upstream_loss_is_fatal_and_closes() {
    let stop = CancellationToken::new();
    let (mut source, log) = ScriptedSource::new(vec![plain(0, BEGIN | END)], &stop);
    source
        .script
        .push_back(Err(SourceError::Unavailable("socket reset".to_string())));
    let sink = RecordingSink::default();

    let result = StreamLoop::new(
        subscription(),
        POLL_TIMEOUT,
        source,
        sink.clone(),
        heartbeat(100),
        &stop,
    )
    .run()
    .await;

    assert!(matches!(
        result,
        Err(StreamError::UpstreamUnavailable(SourceError::Unavailable(ref msg))) if msg == "socket reset"
    ));
    assert_eq!(sink.published().len(), 1);
    assert_eq!(log.lock().unwrap().closes, 1);
}
