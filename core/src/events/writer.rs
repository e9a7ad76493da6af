use tokio::io::AsyncWriteExt;

use crate::config::EventsOutConfig;

use super::EventCollector;

/// Spawn a JSONL writer fed by a fresh collector. Returns `None` when the sink is disabled.
pub async fn start_events_out(cfg: &EventsOutConfig) -> std::io::Result<Option<EventCollector>> {
    if !cfg.enabled || cfg.path.trim().is_empty() {
        return Ok(None);
    }

    let mut writer: Box<dyn tokio::io::AsyncWrite + Unpin + Send> = if cfg.path == "stdout:" {
        Box::new(tokio::io::stdout())
    } else {
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&cfg.path)
            .await?;
        Box::new(file)
    };

    let (collector, mut rx) = EventCollector::channel(cfg.channel_capacity);

    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let mut line = match serde_json::to_string(&event) {
                Ok(line) => line,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to encode dag event");
                    continue;
                }
            };
            line.push('\n');
            if writer.write_all(line.as_bytes()).await.is_err() {
                return;
            }
        }
        let _ = writer.flush().await;
    });

    Ok(Some(collector))
}
