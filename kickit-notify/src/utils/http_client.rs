use std::{sync::OnceLock, time::Duration};

use tracing::debug;

/// Install the aws-lc-rs rustls provider once per process. reqwest is built
/// without a default provider, so this must run before any client is built.
pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Build a `reqwest::Client` with a request timeout.
pub fn build_http_client(request_timeout: Duration) -> reqwest::Result<reqwest::Client> {
    install_rustls_provider();

    let mut builder = reqwest::Client::builder().user_agent(concat!(
        env!("CARGO_PKG_NAME"),
        "/",
        env!("CARGO_PKG_VERSION")
    ));
    if request_timeout > Duration::ZERO {
        builder = builder.timeout(request_timeout);
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_http_client_installs_provider() {
        assert!(build_http_client(Duration::from_secs(5)).is_ok());
        // Second install is a no-op.
        install_rustls_provider();
        assert!(build_http_client(Duration::ZERO).is_ok());
    }
}
