//! Fetch a shape from the protected API using attestation tokens

use shapeguard::{Config, ShapesClient};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;
    let client = ShapesClient::new(config)?;

    println!("Bootstrapping fingerprint agent...");
    client.initialize().await?;

    println!("Checking connectivity...");
    let hello = client.hello().await?;
    println!("  {}", hello.text);

    println!("Fetching a shape...");
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
