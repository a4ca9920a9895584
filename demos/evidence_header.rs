//! Fetch a shape attaching fingerprint evidence directly, without the
//! attestation token exchange

use shapeguard::{Config, Protection, ShapesClient};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;
    let client = ShapesClient::with_protection(config, Protection::EvidenceHeader)?;

    println!("Fetching a shape with the evidence header...");
    let response = client.shape().await?;
    match response.shape {
        Some(shape) => println!("  Shape: {shape}"),
        None => println!(
            "  Rejected by the backend (status {})",
            response.status.unwrap_or_default()
        ),
    }

    Ok(())
}
