//! Version command

use crate::cli::VersionArgs;
use crate::version::VersionInfo;
use anyhow::Result;

pub fn run(args: VersionArgs) -> Result<()> {
    let info = VersionInfo::current();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("{}", info);
    if let Some(target) = &info.target {
        println!("Target: {}", target);
    }
    if info.is_dirty() {
        println!("Built from a tree with uncommitted changes");
    }
    Ok(())
}
