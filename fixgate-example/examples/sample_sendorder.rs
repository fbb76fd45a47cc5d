/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Single limit order initiator.
//!
//! Usage: `sample_sendorder <host> <symbol> <price> <quantity> <timeout_secs>`
//!
//! Logs on, sends one buy NewOrderSingle (D) and prints every
//! ExecutionReport (8) until the order is filled or canceled, or until the
//! timeout expires. The SenderCompID defaults to `SENDORDER_<symbol>`.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use async_trait::async_trait;
use fixgate_core::{MsgType, RawMessage};
use fixgate_engine::{Application, EngineBuilder, Session, SessionHandler};
use fixgate_session::messages::build_logon;
use fixgate_tagvalue::Encoder;
use fixgate_transport::Poller;
use tracing::{info, warn};

mod common;
use common::{ExampleConfig, init_logging};

const NEW_ORDER_SINGLE: &str = "D";
const EXECUTION_REPORT: &str = "8";
const ORDER_ID: &str = "order-1";

/// Side (54) buy.
const SIDE_BUY: u64 = 1;
/// OrdType (40) limit.
const ORD_TYPE_LIMIT: u64 = 2;
/// ExecTransType (20) or ExecType (150) filled, also OrdStatus (39) filled.
const FILLED: &str = "2";
/// OrdStatus (39) canceled.
const CANCELED: &str = "4";

struct Order {
    symbol: String,
    price: f64,
    quantity: u64,
}

struct OrderClient {
    heartbeat_interval: u64,
    order: Order,
}

#[async_trait]
impl SessionHandler for OrderClient {
    async fn on_message(&self, session: &Arc<Session>, message: &RawMessage<'_>) {
        if message.msg_type().as_str() != EXECUTION_REPORT {
            return;
        }
        let status = message.get_field_str(39);
        info!(
            order = message.get_field_str(11).unwrap_or_default(),
            status = status.unwrap_or_default(),
            last_qty = message.get_field_str(32).unwrap_or_default(),
            last_px = message.get_field_str(31).unwrap_or_default(),
            cum_qty = message.get_field_str(14).unwrap_or_default(),
            "execution report"
        );

        let trade_filled = [20, 150]
            .into_iter()
            .any(|tag| message.get_field_str(tag) == Some(FILLED));
        if status == Some(FILLED) {
            info!("order filled");
        }
        if trade_filled || status == Some(CANCELED) {
            info!(canceled = status == Some(CANCELED), "order done, disconnecting");
            session.disconnect();
        }
    }

    async fn on_logged_on(&self, session: &Arc<Session>) {
        let order = &self.order;
        info!(
            symbol = %order.symbol,
            price = order.price,
            quantity = order.quantity,
            "logged on, sending buy order"
        );
        let mut body = Encoder::default();
        body.put_str(55, &order.symbol)
            .put_str(11, ORDER_ID)
            .put_uint(38, order.quantity)
            .put_str(44, &order.price.to_string())
            .put_uint(54, SIDE_BUY)
            .put_uint(40, ORD_TYPE_LIMIT);
        if let Err(e) = session
            .send_message(&MsgType::other(NEW_ORDER_SINGLE), &mut body)
            .await
        {
            warn!(session = %session.id(), error = %e, "failed to send order");
        }
    }

    async fn on_logged_out(&self, session: &Arc<Session>, text: &str) {
        info!(session = %session.id(), text, "logged out");
    }
}

#[async_trait]
impl Application for OrderClient {
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
    let args: Vec<String> = env::args().collect();
    let [_, host, symbol, price, quantity, timeout_secs] = args.as_slice() else {
        bail!("usage: sample_sendorder <host> <symbol> <price> <quantity> <timeout_secs>");
    };
    let order = Order {
        symbol: symbol.clone(),
        price: price.parse().context("price")?,
        quantity: quantity.parse().context("quantity")?,
    };
    let timeout = Duration::from_secs(timeout_secs.parse().context("timeout_secs")?);

    let mut cfg = ExampleConfig::client();
    cfg.host.clone_from(host);
    if env::var_os("FIX_SENDER").is_none() {
        cfg.sender_comp_id = format!("SENDORDER_{symbol}");
    }

    let poller = Arc::new(Poller::new()?);
    let runner = Arc::clone(&poller);
    let poller_task = tokio::task::spawn_blocking(move || runner.run());

    let initiator = EngineBuilder::new()
        .with_application(OrderClient {
            heartbeat_interval: cfg.heartbeat_interval,
            order,
        })
        .with_session(cfg.session()?)
        .with_remote_addr(cfg.addr())
        .with_poller(Arc::clone(&poller))
        .build_initiator()?;

    info!(remote = %cfg.addr(), "connecting");
    initiator.connect().await?;
    initiator.handle().await?;
    if tokio::time::timeout(timeout, initiator.join()).await.is_err() {
        info!(?timeout, "timeout reached, disconnecting");
        initiator.disconnect();
    }

    poller.close();
    poller_task.await??;
    Ok(())
}
