//! List the component types the built-in registry provides.

use simpleobs_common::config::AppConfig;
use simpleobs_engine::{ComponentKind, ComponentRegistry};

pub fn run(config: &AppConfig) -> anyhow::Result<()> {
    let registry = ComponentRegistry::new();
    simpleobs_plugins::register_builtins(&registry, config);

    println!("Registered components:");
    for kind in ComponentKind::ALL {
        let ids = registry.type_ids(kind);
        if ids.is_empty() {
            println!("  {kind}: (none)");
        } else {
            println!("  {kind}: {}", ids.join(", "));
        }
    }

    Ok(())
}
