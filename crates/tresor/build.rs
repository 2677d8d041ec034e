//! Embeds the source revision and target triple into the binary

use std::process::Command;

fn main() {
    let revision = Command::new("git")
        .args(["describe", "--always", "--dirty", "--abbrev=10"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| String::from_utf8_lossy(&output.stdout).trim().to_string());

    if let Some(revision) = revision.filter(|r| !r.is_empty()) {
        println!("cargo:rustc-env=TRESOR_REVISION={}", revision);
    }
    if let Ok(target) = std::env::var("TARGET") {
        println!("cargo:rustc-env=TRESOR_TARGET={}", target);
    }

    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");
}
