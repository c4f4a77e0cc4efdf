use ailink_bus::AgentBus;
use ailink_core::{Config, Paths};

pub async fn run() -> anyhow::Result<()> {
    let paths = Paths::new();

    println!("ailink status");
    println!("=============");
    println!();

    let config_path = paths.config_file();
    let config_exists = config_path.exists();
    println!(
        "Config: {} {}",
        config_path.display(),
        if config_exists { "✓" } else { "✗ (not found)" }
    );

    if !config_exists {
        println!();
        println!("Run `ailink onboard` to initialize.");
        return Ok(());
    }

    let config = Config::load(&paths)?;
    let store_path = config.store_path(&paths);
    println!(
        "Store:  {} {}",
        store_path.display(),
        if store_path.exists() { "✓" } else { "✗ (empty bus)" }
    );
    println!();

    let bus = AgentBus::open(&store_path)?;
    let stats = bus.stats()?;
    println!("{}", serde_json::to_string_pretty(&stats)?);

    Ok(())
}
