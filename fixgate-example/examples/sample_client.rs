/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Mass quote initiator.
//!
//! Logs on to `sample_server`, then sends a new MassQuote (i) each time the
//! previous one is acknowledged and reports the round-trip rate every
//! `FIX_QUOTES` quotes. The socket is driven by the readiness poller unless
//! `FIX_DIRECT` is set.

use std::env;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use fixgate_core::{MsgType, RawMessage};
use fixgate_engine::{Application, EngineBuilder, Session, SessionHandler};
use fixgate_session::messages::build_logon;
use fixgate_tagvalue::Encoder;
use fixgate_transport::Poller;
use parking_lot::Mutex;
use tracing::{info, warn};

mod common;
use common::{ExampleConfig, MASS_QUOTE, MASS_QUOTE_ACK, init_logging};

const DEFAULT_QUOTES: u64 = 100_000;

/// Round-trip counter reported every `batch` acknowledgments.
struct QuoteStats {
    batch: u64,
    state: Mutex<StatsState>,
}

struct StatsState {
    acked: u64,
    batch_start: Instant,
    bid: f64,
}

impl QuoteStats {
    fn new(batch: u64) -> Self {
        Self {
            batch: batch.max(1),
            state: Mutex::new(StatsState {
                acked: 0,
                batch_start: Instant::now(),
                bid: 100.0,
            }),
        }
    }

    fn restart(&self) {
        self.state.lock().batch_start = Instant::now();
    }

    /// Records one acknowledgment. Returns the next bid and, when a batch
    /// completes, its duration.
    fn record(&self) -> (f64, Option<Duration>) {
        let mut state = self.state.lock();
        state.acked += 1;
        state.bid += if state.acked % 2 == 0 { 0.01 } else { -0.01 };
        if state.acked % self.batch != 0 {
            return (state.bid, None);
        }
        let elapsed = state.batch_start.elapsed();
        state.batch_start = Instant::now();
        (state.bid, Some(elapsed))
    }
}

struct QuoteClient {
    heartbeat_interval: u64,
    symbol: String,
    stats: QuoteStats,
}

impl QuoteClient {
    async fn send_quote(&self, session: &Arc<Session>, bid: f64) {
        let mut quote = Encoder::default();
        quote
            .put_str(117, "MyQuoteID")
            .put_uint(301, 2)
            .put_uint(296, 1)
            .put_str(302, "Set1")
            .put_uint(304, 1)
            .put_uint(295, 1)
            .put_str(299, "EntryID1")
            .put_str(55, &self.symbol)
            .put_str(132, &format!("{bid:.2}"))
            .put_str(133, &format!("{:.2}", bid + 1.0))
            .put_uint(134, 10)
            .put_uint(135, 10);
        if let Err(e) = session
            .send_message(&MsgType::other(MASS_QUOTE), &mut quote)
            .await
        {
            warn!(session = %session.id(), error = %e, "failed to send quote");
        }
    }
}

#[async_trait]
impl SessionHandler for QuoteClient {
    async fn on_message(&self, session: &Arc<Session>, message: &RawMessage<'_>) {
        if message.msg_type().as_str() != MASS_QUOTE_ACK {
            return;
        }
        let (bid, batch) = self.stats.record();
        if let Some(elapsed) = batch {
            let count = self.stats.batch;
            let micros = elapsed.as_secs_f64() * 1_000_000.0;
            info!(
                quotes = count,
                usec_per_quote = micros / count as f64,
                quotes_per_sec = (count as f64 / elapsed.as_secs_f64()) as u64,
                "round-trip"
            );
        }
        self.send_quote(session, bid).await;
    }

    async fn on_logged_on(&self, session: &Arc<Session>) {
        info!(session = %session.id(), "logged on, quoting");
        self.stats.restart();
        self.send_quote(session, 100.0).await;
    }

    async fn on_logged_out(&self, session: &Arc<Session>, text: &str) {
        info!(session = %session.id(), text, "logged out");
    }

    fn on_disconnected(&self, session: &Arc<Session>) {
        info!(session = %session.id(), sent = session.next_seq_num() - 1, "disconnected");
    }
}

#[async_trait]
impl Application for QuoteClient {
    async fn on_connected(&self, session: &Arc<Session>) {
        info!(session = %session.id(), "connected, sending logon");
        let mut logon = build_logon(self.heartbeat_interval);
        if let Err(e) = session.send_message(&MsgType::Logon, &mut logon).await {
            warn!(session = %session.id(), error = %e, "failed to send logon");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cfg = ExampleConfig::client();
    let quotes = env::var("FIX_QUOTES")
        .ok()
        .and_then(|q| q.parse().ok())
        .unwrap_or(DEFAULT_QUOTES);

    let app = QuoteClient {
        heartbeat_interval: cfg.heartbeat_interval,
        symbol: "IBM".to_string(),
        stats: QuoteStats::new(quotes),
    };
    let mut builder = EngineBuilder::new()
        .with_application(app)
        .with_session(cfg.session()?)
        .with_remote_addr(cfg.addr());

    let poller = if env::var_os("FIX_DIRECT").is_none() {
        let poller = Arc::new(Poller::new()?);
        builder = builder.with_poller(Arc::clone(&poller));
        let runner = Arc::clone(&poller);
        Some((poller, tokio::task::spawn_blocking(move || runner.run())))
    } else {
        None
    };

    let initiator = builder.build_initiator()?;
    info!(remote = %cfg.addr(), "connecting");
    let started = Instant::now();
    initiator.connect().await?;
    initiator.handle().await?;
    initiator.join().await;

    if let Some((poller, task)) = poller {
        poller.close();
        task.await??;
    }
    info!(elapsed = ?started.elapsed(), "client finished");
    Ok(())
}
