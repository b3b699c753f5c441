//! `list` command.

use std::fmt::Write;

use crate::config::{BrokerConfig, ServiceCatalog};
use crate::service::BackendSpec;

/// Render the catalog, one service per block.
pub fn format_catalog(catalog: &ServiceCatalog) -> String {
    let mut out = String::new();
    for (name, entry) in catalog.services() {
        if entry.default.is_empty() {
            let _ = writeln!(out, "{name}");
        } else {
            let _ = writeln!(out, "{name} (default: {})", entry.default);
        }

        for (version, descriptor) in &entry.versions {
            let backend = match &descriptor.image {
                BackendSpec::ContainerImage(image) => format!("container {image}"),
                BackendSpec::DriverCommand(command) => format!("driver {}", command.join(" ")),
            };
            let _ = writeln!(out, "  {version:<12} {backend}");
        }
    }
    out
}

/// Print the configured catalog.
pub fn run_list_command(config: &BrokerConfig) -> anyhow::Result<()> {
    let catalog = config.load_catalog()?;
    if catalog.is_empty() {
        println!("No services in {}", config.catalog_path.display());
        return Ok(());
    }
    print!("{}", format_catalog(&catalog));
    Ok(())
}
