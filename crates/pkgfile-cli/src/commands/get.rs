use miette::{IntoDiagnostic, Result};
use pkgfile_core::{Client, Config};
use serde::Serialize;
use std::time::Instant;
use tracing::debug;

/// Get result for JSON output.
#[derive(Serialize)]
struct GetResult {
    ok: bool,
    address: String,
    path: String,
    duration_ms: u64,
}

/// Run the get command.
///
/// Prints the local path of the requested file, downloading it if needed.
pub fn run(config: Config, address: &str, json: bool) -> Result<()> {
    let start = Instant::now();
    let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;

    let client = match Client::new(config) {
        Ok(client) => client,
        Err(e) => super::fail(&e, json),
    };
    let outcome = runtime.block_on(client.download_file(address));

    let path = match outcome {
        Ok(path) => path,
        Err(e) => super::fail(&e, json),
    };

    let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
    debug!(path = %path.display(), duration_ms, "file ready");

    if json {
        super::print_json(&GetResult {
            ok: true,
            address: address.to_string(),
            path: path.display().to_string(),
            duration_ms,
        })
    } else {
        println!("{}", path.display());
        Ok(())
    }
}
