pub mod args;
pub mod shutdown;

/// Call once at the top of every binary's `main`. Applies the `DISABLE_COLORS` environment
/// override and installs the default `rustls` crypto provider, which the Kubernetes client pulls
/// in transitively through its TLS stack.
pub fn init() {
    let disable_colors = ["1", "true"].contains(
        &std::env::var("DISABLE_COLORS")
            .unwrap_or_else(|_| String::new())
            .to_lowercase()
            .as_str(),
    );
    owo_colors::set_override(!disable_colors);

    install_rustls_provider();
}

fn install_rustls_provider() {
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .expect("install aws-lc-rs provider");
}

/// Marks the process ready for liveness/readiness probes once the reflector caches have synced.
pub fn signal_ready() {
    std::fs::write("/etc/ready", b"ready").expect("could not write /etc/ready");
}
