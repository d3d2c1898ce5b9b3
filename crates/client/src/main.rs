//! alerta-listen - follow the notification feed from a terminal.
//!
//! Connects as the identity given in the environment and prints every
//! notification as it arrives, until Ctrl-C.
//!
//! Environment variables:
//! - `ALERTA_USER_ID`, `ALERTA_ROLE` (default: "Estudiante"), `ALERTA_TOKEN`
//! - everything [`ClientConfig::from_env`] reads

#[cfg(not(target_arch = "wasm32"))]
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    use alerta_client::{ClientChange, ClientConfig, Identity, PlatformClient, Role};
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("alerta_client=debug")),
        )
        .init();

    let config = ClientConfig::from_env()?;
    let identity = Identity {
        user_id: std::env::var("ALERTA_USER_ID").ok(),
        role: std::env::var("ALERTA_ROLE")
            .map(|label| Role::parse(&label))
            .unwrap_or_default(),
        credential: std::env::var("ALERTA_TOKEN").ok(),
    };
    if !identity.is_complete() {
        anyhow::bail!("ALERTA_USER_ID and ALERTA_TOKEN must be set");
    }

    tracing::info!(
        "Listening on {} as {} ({})",
        config.endpoint,
        identity.user_id.as_deref().unwrap_or_default(),
        identity.role
    );

    let client = PlatformClient::new(config);
    client.subscribe(|change| {
        if let ClientChange::Status(state) = change {
            tracing::info!("Connection {}", state);
        }
    });
    client.on_notification(|n| {
        println!(
            "{} [{}] {}: {}",
            n.kind.icon(),
            n.created_at.format("%H:%M:%S"),
            n.title,
            n.message
        );
        if n.kind.affects_incident_list() {
            tracing::info!(
                "Incident list is stale ({})",
                n.incident_id().unwrap_or("unknown incident")
            );
        }
    });
    client.set_identity(identity);

    tokio::select! {
        _ = client.run() => {}
        result = tokio::signal::ctrl_c() => {
            result?;
            tracing::info!("Shutting down");
        }
    }

    client.disconnect();
    Ok(())
}

#[cfg(target_arch = "wasm32")]
fn main() {}
