pub mod cache;
pub mod get;
pub mod resolve;
pub mod version;

use pkgfile_core::PkgError;
use serde::Serialize;

/// Error payload shared by every command's JSON output.
#[derive(Serialize)]
struct ErrorResult<'a> {
    ok: bool,
    code: &'a str,
    error: String,
}

/// Report a failed command and exit non-zero.
pub(crate) fn fail(err: &PkgError, json: bool) -> ! {
    if json {
        let result = ErrorResult {
            ok: false,
            code: err.code(),
            error: err.to_string(),
        };
        match serde_json::to_string_pretty(&result) {
            Ok(out) => println!("{out}"),
            Err(_) => println!("{{\"ok\":false,\"code\":\"{}\"}}", err.code()),
        }
    } else {
        eprintln!("error: {}: {err}", err.code());
    }
    std::process::exit(1);
}

/// Print a successful JSON result.
pub(crate) fn print_json<T: Serialize>(result: &T) -> miette::Result<()> {
    let out = serde_json::to_string_pretty(result)
        .map_err(|e| miette::miette!("failed to serialize output: {e}"))?;
    println!("{out}");
    Ok(())
}
