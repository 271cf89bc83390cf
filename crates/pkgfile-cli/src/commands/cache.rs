use miette::Result;
use pkgfile_core::{CacheLayout, CachedPackage};
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct ListResult {
    ok: bool,
    root: String,
    packages: Vec<CachedPackage>,
    total_bytes: u64,
}

#[derive(Serialize)]
struct CleanResult {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    removed_bytes: u64,
}

/// List extracted package versions under `cache_dir`.
pub fn list(cache_dir: &Path, json: bool) -> Result<()> {
    let layout = CacheLayout::new(cache_dir);
    let packages = match layout.list_cached() {
        Ok(packages) => packages,
        Err(e) => super::fail(&e, json),
    };
    let total_bytes = packages.iter().map(|p| p.size_bytes).sum();

    if json {
        return super::print_json(&ListResult {
            ok: true,
            root: layout.root().display().to_string(),
            packages,
            total_bytes,
        });
    }

    if packages.is_empty() {
        println!("cache is empty ({})", layout.root().display());
        return Ok(());
    }
    for pkg in &packages {
        println!("{}@{}  {}", pkg.name, pkg.version, format_bytes(pkg.size_bytes));
    }
    println!(
        "{} package version(s), {}",
        packages.len(),
        format_bytes(total_bytes)
    );
    Ok(())
}

/// Remove cached data for `name`, or the whole cache.
pub fn clean(cache_dir: &Path, name: Option<&str>, json: bool) -> Result<()> {
    let layout = CacheLayout::new(cache_dir);
    let removed_bytes = match layout.clean(name) {
        Ok(bytes) => bytes,
        Err(e) => super::fail(&e, json),
    };

    if json {
        super::print_json(&CleanResult {
            ok: true,
            name: name.map(str::to_string),
            removed_bytes,
        })
    } else {
        println!("removed {}", format_bytes(removed_bytes));
        Ok(())
    }
}

#[allow(clippy::cast_precision_loss)]
fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}
