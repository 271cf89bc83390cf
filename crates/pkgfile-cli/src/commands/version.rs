use miette::Result;
use pkgfile_core::VERSION;

pub fn run() -> Result<()> {
    println!("pkgfile {VERSION}");
    Ok(())
}
