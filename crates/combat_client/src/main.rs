//! Demo peer: joins the authority and strikes with its character once the
//! character has been replicated.

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use combat_client::{ClientConfig, PeerRunner, content};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("combat_client=info".parse()?))
        .init();

    let log = content::EventLog::default();
    let mut runner = PeerRunner::new(ClientConfig::new())?;
    for def in content::skills(&log) {
        runner.register(def);
    }

    let mut struck = false;
    runner
        .run(move |runner| {
            if !struck && runner.request_start(0) {
                struck = true;
                info!(character = ?runner.character(), "strike requested");
            }
            for event in log.borrow_mut().drain(..) {
                info!(?event, "peer event");
            }
        })
        .await
}
