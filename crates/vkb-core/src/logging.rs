use tracing_subscriber::{fmt, EnvFilter};

use crate::{Error, Result};

/// Install the global fmt subscriber.
///
/// Defaults to info for the bot crates; `RUST_LOG` overrides.
pub fn init(service_name: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "info,vkb=info,vkb_core=info,vkb_http=info,{service_name}=info"
        ))
    });

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| Error::External(format!("logging init failed: {e}")))
}
