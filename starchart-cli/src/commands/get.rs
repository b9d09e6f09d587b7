//! `starchart get`: cache-first lookup of one system.

use starchart::entity::Entity;

use super::common::{runtime, start_app, GlobalOptions};
use crate::error::CliError;

pub fn run(id: &str, options: GlobalOptions) -> Result<(), CliError> {
    let runtime = runtime()?;
    let entity = runtime.block_on(async {
        let app = start_app(options).await?;
        let was_cached = app.store().contains(id);
        let entity = app.sync().get_or_fetch(id).await?;
        if !was_cached {
            println!("(fetched from remote)");
        }
        Ok::<Entity, CliError>(entity)
    })?;

    print_entity(&entity);
    Ok(())
}

pub fn print_entity(entity: &Entity) {
    println!("{}", entity.id);
    println!("  Name:      {}", entity.label());
    println!("  Type:      {}", entity.kind);
    println!("  Position:  {}", entity.position());
    if !entity.children.is_empty() {
        println!("  Waypoints: {}", entity.children.len());
        for child in &entity.children {
            println!("    - {}", child.id);
        }
    }
}
