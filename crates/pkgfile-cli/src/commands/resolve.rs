use miette::{IntoDiagnostic, Result};
use pkgfile_core::{Client, Config};
use serde::Serialize;

#[derive(Serialize)]
struct ResolveResult {
    ok: bool,
    name: String,
    spec: String,
    version: String,
    dist_tag: bool,
    tarball: String,
    path: String,
}

/// Run the resolve command.
///
/// Resolves the address to an exact version and prints where the file would live.
pub fn run(config: Config, address: &str, json: bool) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;

    let client = match Client::new(config) {
        Ok(client) => client,
        Err(e) => super::fail(&e, json),
    };
    let outcome = runtime.block_on(client.resolve(address));

    let resolved = match outcome {
        Ok(resolved) => resolved,
        Err(e) => super::fail(&e, json),
    };

    let result = ResolveResult {
        ok: true,
        name: resolved.address.name.clone(),
        spec: resolved.address.version_spec.clone(),
        version: resolved.version.exact_version.clone(),
        dist_tag: resolved.version.was_dist_tag,
        tarball: resolved.version.record.dist.tarball.clone(),
        path: resolved.file_path.display().to_string(),
    };

    if json {
        super::print_json(&result)
    } else {
        println!("{}@{}", result.name, result.version);
        if result.dist_tag {
            println!("  tag:     {}", result.spec);
        }
        println!("  tarball: {}", result.tarball);
        println!("  path:    {}", result.path);
        Ok(())
    }
}
