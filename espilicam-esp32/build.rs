use std::path::Path;

fn main() {
    // Necessary because of this issue: https://github.com/rust-lang/cargo/issues/9641
    embuild::espidf::sysenv::output();

    if !Path::new("cfg.toml").exists() {
        println!(
            "cargo:warning=cfg.toml not found, building with empty Wi-Fi credentials. \
             Copy cfg.toml.example to cfg.toml and set your network."
        );
    }
    println!("cargo:rerun-if-changed=cfg.toml");
}
