use ailink_core::{Config, Paths};

pub async fn run(force: bool) -> anyhow::Result<()> {
    let paths = Paths::new();
    let config_path = paths.config_file();

    if config_path.exists() && !force {
        println!("Config already exists at {}", config_path.display());
        println!("Use --force to overwrite.");
        return Ok(());
    }

    paths.ensure_dirs()?;
    let config = Config::default();
    config.save(&paths)?;

    println!("Initialized ailink at {}", paths.base.display());
    println!("  config: {}", config_path.display());
    println!("  store:  {}", config.store_path(&paths).display());
    println!();
    println!("Next: `ailink serve` to start the scheduler, or `ailink call register_ai '{{...}}'`.");
    Ok(())
}
