//! Monitor slice and meter definitions in real time.
//!
//! Connects to a radio by address and prints every slice and meter event
//! and every reply or message for 60 seconds. Useful for watching what a
//! radio reports while another client changes its state.
//!
//! # Usage
//!
//! ```sh
//! cargo run -p flexkit --example monitor_objects -- 192.168.1.100
//! ```

use std::time::Duration;

use flexkit::status::ObjectEvent;
use flexkit::{SessionBuilder, SessionEvent, Target};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let host = std::env::args()
        .nth(1)
        .ok_or_else(|| anyhow::anyhow!("usage: monitor_objects <radio address>"))?;

    let session = SessionBuilder::new()
        .client_program("flexkit-monitor")
        .build();
    let mut events = session.subscribe();
    let mut slices = session.model().slices.subscribe();
    let mut meters = session.model().meters.subscribe();

    println!("Connecting to {host}...");
    if !session.connect(&Target::local(host.as_str(), 4992)).await {
        anyhow::bail!("could not connect to {host}");
    }
    println!("Monitoring for 60 seconds...\n");

    let deadline = tokio::time::sleep(Duration::from_secs(60));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            Ok(event) = events.recv() => match event {
                SessionEvent::Reply(reply) if reply.code != 0 => {
                    println!(
                        "  reply {} failed: 0x{:08X} {}",
                        reply.sequence, reply.code, reply.text
                    );
                }
                SessionEvent::Channel(status) => println!("  channel: {status:?}"),
                SessionEvent::Message(text) => println!("  message: {text}"),
                _ => {}
            },
            Ok(event) = slices.recv() => match event {
                ObjectEvent::Added(s) => {
                    println!("  slice {} added: {} Hz {}", s.index, s.frequency_hz, s.mode)
                }
                ObjectEvent::Updated(s) => {
                    println!("  slice {}: {} Hz {}", s.index, s.frequency_hz, s.mode)
                }
                ObjectEvent::Removed(index) => println!("  slice {index} removed"),
            },
            Ok(event) = meters.recv() => {
                if let ObjectEvent::Added(m) = event {
                    println!(
                        "  meter {} {}.{} {} ({:?})",
                        m.id, m.source, m.source_index, m.name, m.unit
                    );
                }
            }
        }
    }

    session.disconnect();
    Ok(())
}
