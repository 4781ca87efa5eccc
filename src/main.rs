use anyhow::Result;
use price_display::{
    client::PriceDisplayClient,
    config::ClientConfig,
    display::{Page, WatchSink},
    utils,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    utils::init_logging();

    let config = ClientConfig::load()?;
    tracing::info!(
        endpoint = %config.endpoint,
        display = %config.target_id,
        "[INIT] price-display starting"
    );

    // Display target -> stdout printer ------------------------------------
    let (sink, mut price_rx) = WatchSink::channel();
    let mut page = Page::new();
    page.register(config.target_id.clone(), sink);

    let printer = tokio::spawn(async move {
        while price_rx.changed().await.is_ok() {
            let fragment = price_rx.borrow_and_update().clone();
            println!("{fragment}");
        }
    });

    // Price stream session ------------------------------------------------
    if !page.contains(&config.target_id) {
        tracing::warn!(display = %config.target_id, "[INIT] display target not registered");
    }
    let client = PriceDisplayClient::new(&config, &mut page)?;
    // the page only held the claimed sink
    drop(page);

    let outcome = client.run_until(tokio::signal::ctrl_c()).await;

    // Sender is gone once the client is dropped, so the printer drains and exits.
    let _ = printer.await;

    match outcome {
        Some(Ok(summary)) => {
            tracing::info!(
                rendered = summary.frames_rendered,
                discarded = summary.frames_discarded,
                last = ?summary.last_rendered,
                "[EXIT] session ended"
            );
        }
        Some(Err(e)) => {
            tracing::error!(error = %e, "[EXIT] price stream failed");
            return Err(e.into());
        }
        None => tracing::info!("[EXIT] interrupted, shutting down"),
    }
    Ok(())
}
