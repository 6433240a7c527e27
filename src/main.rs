use anyhow::Context;
use clap::Parser;

use wgpu_julia::{config::Config, pipeline};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = Config::parse();

    if config.list_devices {
        for line in pipeline::list_devices() {
            println!("{}", line);
        }
        return Ok(());
    }

    pipeline::run(&config).with_context(|| {
        format!(
            "rendering a {}x{} Julia set from {}",
            config.width,
            config.height,
            config.kernel.display()
        )
    })?;

    Ok(())
}
