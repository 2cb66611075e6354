//! Error-log watch: print reports until the user stops it.

use log::{debug, info};
use tokio::sync::watch;

use crate::commands::{Console, Verdict, next_value};
use crate::error::NgcsError;
use crate::ipc::client::Client;
use crate::ipc::messages::{self, ErrorReport};

/// Resolves once `stop` is set. Never resolves if the sender is gone.
pub async fn stopped(mut stop: watch::Receiver<bool>) {
    if stop.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

pub async fn run(client: &Client, console: &Console, stop: watch::Receiver<bool>) -> Verdict {
    let mut stream = match client.open_stream(messages::error_watch()).await {
        Ok(stream) => stream,
        Err(e) => return Verdict::from(e),
    };
    info!("Watching error log on channel {}", stream.channel());

    let stop = stopped(stop);
    tokio::pin!(stop);

    let verdict = loop {
        tokio::select! {
            next = next_value(&mut stream) => {
                let report = next.and_then(|value| ErrorReport::try_from(&value));
                match report {
                    Ok(report) => console.line(report.to_string()),
                    Err(NgcsError::ChannelClosed { code, .. }) => {
                        break Verdict::failed(format!("error log closed by daemon (code {})", code));
                    }
                    Err(e) => break Verdict::from(e),
                }
            }
            _ = &mut stop => {
                debug!("Error watch stopped by user");
                break Verdict::Success;
            }
        }
    };
    stream.close();
    verdict
}
