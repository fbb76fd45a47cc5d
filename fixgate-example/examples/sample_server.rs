/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Mass quote acceptor.
//!
//! Accepts any counterparty and acknowledges every MassQuote (i) with a
//! MassQuoteAcknowledgement (b). Stops on Ctrl-C.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use fixgate_core::{MsgType, RawMessage};
use fixgate_engine::{Application, EngineBuilder, Session, SessionHandler};
use fixgate_tagvalue::Encoder;
use tracing::{info, warn};

mod common;
use common::{ExampleConfig, MASS_QUOTE, MASS_QUOTE_ACK, init_logging};

/// QuoteStatus (297) value for "accepted".
const QUOTE_ACCEPTED: u64 = 0;

#[derive(Default)]
struct QuoteServer {
    acked: AtomicU64,
}

#[async_trait]
impl SessionHandler for QuoteServer {
    async fn on_message(&self, session: &Arc<Session>, message: &RawMessage<'_>) {
        if message.msg_type().as_str() != MASS_QUOTE {
            return;
        }

        let mut ack = Encoder::default();
        ack.put_str(117, message.get_field_str(117).unwrap_or(""))
            .put_uint(297, QUOTE_ACCEPTED);
        if let Err(e) = session
            .send_message(&MsgType::other(MASS_QUOTE_ACK), &mut ack)
            .await
        {
            warn!(session = %session.id(), error = %e, "failed to acknowledge quote");
            return;
        }
        self.acked.fetch_add(1, Ordering::Relaxed);
    }

    async fn on_logged_on(&self, session: &Arc<Session>) {
        info!(session = %session.id(), remote = ?session.remote_addr(), "client logged on");
    }

    async fn on_logged_out(&self, session: &Arc<Session>, text: &str) {
        info!(session = %session.id(), text, "client logged out");
    }
}

impl Application for QuoteServer {}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cfg = ExampleConfig::server();

    let acceptor = EngineBuilder::new()
        .with_application(QuoteServer::default())
        .with_session(cfg.session()?)
        .with_port(cfg.port)
        .build_acceptor()?;

    let shutdown = acceptor.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            shutdown.shutdown();
        }
    });

    info!(port = cfg.port, sender = %cfg.sender_comp_id, "starting server");
    acceptor.listen().await?;

    let acked = acceptor.application().acked.load(Ordering::Relaxed);
    info!(acked, "server stopped");
    Ok(())
}
