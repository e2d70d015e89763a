use anyhow::Context;
use std::net::IpAddr;
use std::time::Duration;
use tello_link::shared::{commands, net};
use tello_link::{Session, SessionConfig};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let ip: IpAddr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| net::DEFAULT_DEVICE_IP.to_string())
        .parse()
        .context("invalid drone IP address")?;

    let config = SessionConfig::for_device(ip);
    info!("tello-link starting");
    info!("  Drone: {}", config.device_addr());

    let session = Session::connect(config)
        .await
        .with_context(|| format!("could not connect to {}", ip))?;

    let result = report(&session).await;
    session.disconnect().await;
    result
}

async fn report(session: &Session) -> anyhow::Result<()> {
    let battery = session.execute(&commands::get_battery()).await?;
    match battery.as_integer() {
        Some(percent) => println!("battery: {}%", percent),
        None => println!("battery: {}", battery),
    }

    let sdk = session.execute(&commands::get_sdk()).await?;
    println!("sdk: {}", sdk);

    match session.next_telemetry(Duration::from_secs(1)).await {
        Ok(record) => println!("telemetry: {:?}", record),
        Err(e) => match session.latest_telemetry() {
            Some(record) => println!("telemetry: {:?}", record),
            None => warn!("No telemetry received: {}", e),
        },
    }

    Ok(())
}
