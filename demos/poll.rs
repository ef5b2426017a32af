//! One-shot telemetry poll.
//!
//! Opens the configured serial port, runs a single composite poll, and
//! prints the decoded snapshot.
//!
//! Usage:
//!   cargo run --example poll                  # default port
//!   cargo run --example poll -- /dev/ttyUSB0  # specify port

use pivesc::config::Config;
use pivesc::transport::SerialLink;
use pivesc::{Dispatcher, Result, VescClient};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut config = Config::default();
    if let Some(port) = std::env::args().nth(1) {
        config.port = port;
    }

    let link = SerialLink::open(&config.link())?;
    let client = VescClient::new(Dispatcher::spawn(Some(Box::new(link))));

    let snapshot = client.poll_snapshot().await?;
    println!("firmware:        {}", snapshot.firmware);
    println!("input voltage:   {:.1} V", snapshot.v_in);
    println!("motor current:   {:.2} A", snapshot.current_motor);
    println!("battery current: {:.2} A", snapshot.current_battery);
    println!("duty cycle:      {:.2}", snapshot.duty_cycle);
    println!("rpm:             {}", snapshot.rpm);
    println!(
        "speed:           {:.1} km/h",
        snapshot.speed_kmh(config.wheel_circumference_m, config.gear_ratio)
    );
    println!(
        "throttle:        {:.0} %",
        snapshot.throttle_percentage(config.max_current)
    );
    println!(
        "parked:          {}",
        snapshot
            .is_parked
            .map_or_else(|| "unknown".to_string(), |p| p.to_string())
    );

    Ok(())
}
