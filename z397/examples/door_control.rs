//! Sync a controller clock, open its door, and optionally reset the converter
//!
//! Environment: `CONVERTER_IP`, `CONVERTER_PORT`, `CONVERTER_KEY`, `CONTROLLER_ADDR`.
//! The converter is only reset when `CONVERTER_KEY` is set.

use z397::{CommandKind, Converter, Event, Request};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,z397=debug".into()),
        )
        .init();

    let ip = std::env::var("CONVERTER_IP").unwrap_or_else(|_| "192.168.1.50".to_string());
    let port = match std::env::var("CONVERTER_PORT") {
        Ok(port) => port.parse()?,
        Err(_) => z397::DEFAULT_PORT,
    };
    let addr: u32 = match std::env::var("CONTROLLER_ADDR") {
        Ok(addr) => addr.parse()?,
        Err(_) => 2,
    };
    let key = std::env::var("CONVERTER_KEY").ok();

    let converter = Converter::new(ip, port).with_key(key.clone().unwrap_or_default());

    let mut events = converter.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let Event::Fault(fault) = event {
                eprintln!("Converter fault: {}", fault);
            }
        }
    });

    converter.request(Request::new(0, CommandKind::Connect)).await?;

    let response = converter
        .request(Request::addressed(1, addr, CommandKind::SetTime))
        .await?;
    println!("{}", response);

    let response = converter
        .request(Request::parse(2, Some(addr), "open")?)
        .await?;
    println!("{}", response);

    if key.is_some() {
        let response = converter.request(Request::new(3, CommandKind::Reset)).await?;
        println!("{}", response);
    } else {
        converter.disconnect().await?;
    }

    Ok(())
}
