//! LAN discovery example.
//!
//! Listens for discovery broadcasts for a few seconds, prints every radio
//! heard with its connected clients, then connects to the first one and
//! prints the slices it reports.
//!
//! # Requirements
//!
//! - A radio on the same LAN
//! - UDP port 4992 accessible (not blocked by firewall)
//!
//! # Usage
//!
//! ```sh
//! RUST_LOG=flexkit=debug cargo run -p flexkit --example discover
//! ```

use std::time::Duration;

use flexkit::SessionBuilder;
use flexkit::codec::hz_to_mhz;
use flexkit::roster::decode_sessions;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("Searching for radios on the LAN (3 seconds)...\n");

    let radios = flexkit::discovery::discover(Duration::from_secs(3)).await?;

    if radios.is_empty() {
        println!("No radios found on the network.");
        println!("\nTroubleshooting:");
        println!("  - Verify the radio is powered on and connected to the LAN");
        println!("  - Check that UDP port 4992 is not blocked by a firewall");
        return Ok(());
    }

    println!("Found {} radio(s):\n", radios.len());

    for (i, radio) in radios.iter().enumerate() {
        println!("  [{}] {} (S/N: {})", i + 1, radio.model, radio.serial);
        println!("      IP: {}:{}", radio.public_ip, radio.port);
        println!("      Nickname: {}", radio.nickname);
        println!("      Status: {}", radio.status);
        println!("      Firmware: {}", radio.version);
        for session in decode_sessions(&radio.session_columns(), None) {
            println!(
                "      Client 0x{:08X}: {} on {} ({})",
                session.handle, session.program, session.station, session.ip
            );
        }
        println!();
    }

    let radio = &radios[0];
    println!("Connecting to {} at {}:{}...", radio.model, radio.public_ip, radio.port);

    let session = SessionBuilder::new()
        .client_program("flexkit-example")
        .subscriptions(["slice all"])
        .build();
    if !session.connect_to(radio).await {
        anyhow::bail!("could not connect to {}", radio.public_ip);
    }

    // Give the radio a moment to report its slices.
    tokio::time::sleep(Duration::from_secs(1)).await;

    let slices = session.model().slices.snapshot();
    println!("\nSlices: {}", slices.len());
    for slice in slices.values() {
        println!(
            "  {} ({}): {:.3} MHz {}",
            slice.index,
            slice.index_letter,
            hz_to_mhz(slice.frequency_hz),
            slice.mode
        );
    }

    println!("\nDisconnecting...");
    session.disconnect();
    println!("Done.");

    Ok(())
}
