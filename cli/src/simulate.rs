//! Headless navigation runs

use crate::config::SimulationConfig;
use crate::headless::{HeadlessOutlet, Operations};
use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use waypost::router::Router;

/// Navigate to each of `urls` in turn, printing events and mount operations.
pub async fn run_simulate_command(path: &Path, urls: &[String]) -> Result<()> {
    let config = SimulationConfig::load(path)?;
    let ops = Operations::default();
    let templates = Arc::new(config.components.clone());

    let router = Router::from_config(&config.router)?
        .lookup(config.registry()?)
        .build();
    let slots = router.slots();
    for slot in &config.root_slots {
        slots.register_outlet(
            slots.root(),
            slot.clone(),
            Arc::new(HeadlessOutlet::new(slot.clone(), templates.clone(), ops.clone())),
        )?;
    }

    let mut events = router.events();
    for url in urls {
        println!("navigate {}", url);
        let result = router.navigate_to(url).await;
        for event in events.drain() {
            println!("  event   {}", event);
        }
        for op in ops.take() {
            println!("  {}", op);
        }
        match result {
            Ok(true) => println!("  => at {}", router.url()),
            Ok(false) => println!("  => cancelled, still at {}", router.url()),
            Err(e) => {
                tracing::warn!(%url, error = %e, "simulated navigation failed");
                println!("  => failed: {}", e);
            }
        }
    }
    Ok(())
}
