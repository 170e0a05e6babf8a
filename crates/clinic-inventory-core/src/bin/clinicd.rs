//! Line-oriented request loop.
//!
//! Reads one JSON [`Request`] per line on stdin and writes one JSON
//! [`Response`] per line on stdout. Logs go to stderr.

use std::io::{self, BufRead, Write};

use anyhow::Context;
use clinic_inventory_core::{telemetry, Database, EngineConfig, Handler, Request, Response};

fn main() -> anyhow::Result<()> {
    let config = EngineConfig::from_env().context("invalid configuration")?;
    telemetry::init(&config.log_filter, config.json_logs);

    let mut db = Database::open_with_config(&config).with_context(|| {
        format!("failed to open database at {}", config.database_path.display())
    })?;
    tracing::info!(path = %config.database_path.display(), "clinicd ready");

    let mut handler = Handler::new(&mut db, config.default_actor.clone());
    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();

    for line in stdin.lock().lines() {
        let line = line.context("failed to read request")?;
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => handler.handle(request),
            Err(e) => {
                tracing::warn!(error = %e, "malformed request line");
                Response::failure(400, "validation_error", format!("malformed request: {}", e))
            }
        };

        serde_json::to_writer(&mut stdout, &response).context("failed to write response")?;
        stdout.write_all(b"\n")?;
        stdout.flush()?;
    }

    tracing::info!("stdin closed, shutting down");
    Ok(())
}
