use std::collections::HashMap;
use std::env;

use acurite_poller::{Channel, Config, Metadata, Poller, Registry};

/// Prints every registry write instead of driving real accessories.
#[derive(Default)]
struct ConsoleRegistry {
    next: u32,
    names: HashMap<u32, String>,
}

impl ConsoleRegistry {
    fn label(&self, handle: &u32) -> &str {
        self.names.get(handle).map(String::as_str).unwrap_or("?")
    }
}

impl Registry for ConsoleRegistry {
    type Handle = u32;

    fn upsert(&mut self, key: &str) -> u32 {
        self.next += 1;
        println!("+ entry #{} ({key})", self.next);
        self.next
    }

    fn remove(&mut self, handle: u32) {
        println!("- entry #{handle} {}", self.label(&handle));
        self.names.remove(&handle);
    }

    fn set_channel_value(&mut self, handle: &u32, channel: Channel, value: f64) {
        let unit = match channel {
            Channel::Temperature => "\u{00b0}C",
            Channel::Humidity => "%",
        };
        println!("[{}] {channel:?}: {value:.1}{unit}", self.label(handle));
    }

    fn set_metadata(&mut self, handle: &u32, metadata: &Metadata) {
        self.names.insert(*handle, metadata.display_name.clone());
    }

    fn set_battery(&mut self, handle: &u32, level: f64, is_low: bool) {
        if is_low {
            println!("[{}] battery low: {level}%", self.label(handle));
        }
    }
}

#[tokio::main]
async fn main() -> acurite_poller::Result<()> {
    tracing_subscriber::fmt::init();

    let path = env::args().nth(1).expect("usage: monitor <config.json>");
    let raw = std::fs::read_to_string(&path).expect("failed to read config file");
    let config = Config::from_json_str(&raw)?;

    let mut poller = Poller::builder(config, ConsoleRegistry::default()).build()?;
    let mut scheduler = poller.scheduler();

    println!(
        "Polling every {}s. Ctrl-C to stop.",
        scheduler.interval().as_secs()
    );
    scheduler
        .run(&mut poller, async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;
    Ok(())
}
