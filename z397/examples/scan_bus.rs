//! Scan the bus and print every controller's serial number and clock

use z397::Converter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let ip = std::env::var("CONVERTER_IP").unwrap_or_else(|_| "192.168.1.50".to_string());
    let port = match std::env::var("CONVERTER_PORT") {
        Ok(port) => port.parse()?,
        Err(_) => z397::DEFAULT_PORT,
    };

    let converter = Converter::new(ip, port);
    converter.connect().await?;

    let addrs = converter.scan().await?;
    println!("Found {} controller(s)", addrs.len());

    for addr in addrs {
        let serial = converter.serial_number(addr).await?;
        let time = converter.get_time(addr).await?;
        println!("  addr {:3}  sn {:5}  clock {}", addr, serial, time);
    }

    converter.disconnect().await?;

    Ok(())
}
