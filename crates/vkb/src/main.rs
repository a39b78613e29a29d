use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use vkb_core::{config::Config, domain::NewMessage, VkBot};
use vkb_http::ReqwestTransport;

mod commands;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    vkb_core::logging::init("vkb")?;

    let cfg = Config::load().context("failed to load configuration")?;
    let transport = Arc::new(ReqwestTransport::new()?);
    let mut bot = VkBot::new(&cfg, transport);

    // The consumer runs inside tick(); replies are sent after it returns.
    let (inbox_tx, mut inbox) = mpsc::unbounded_channel::<NewMessage>();
    bot.attach(move |msg: &NewMessage| {
        inbox_tx
            .send(msg.clone())
            .map_err(|e| vkb_core::Error::External(format!("inbox closed: {e}")))
    });

    bot.setup().await.context("bot setup failed")?;
    if let Err(e) = bot.sync_time().await {
        warn!(error = %e, "server time unavailable, time replies will say so");
    }

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("ctrl-c received, stopping after the current poll");
                shutdown.cancel();
            }
        }
    });

    info!("polling");
    while !shutdown.is_cancelled() {
        if let Err(e) = bot.tick().await {
            warn!(error = %e, "consumer failed, rest of batch skipped");
        }

        while let Ok(msg) = inbox.try_recv() {
            let reply = commands::respond(&msg.text, bot.clock());
            if let Err(e) = bot.reply(&msg, &reply).await {
                warn!(peer_id = msg.peer_id.0, error = %e, "reply failed");
            }
        }

        tokio::select! {
            _ = shutdown.cancelled() => {}
            _ = tokio::time::sleep(cfg.tick_interval) => {}
        }
    }

    info!("stopped");
    Ok(())
}
