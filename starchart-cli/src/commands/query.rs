//! `starchart query`: list cached systems inside a rectangle.

use starchart::geometry::Rect;
use starchart::query::range_query;

use super::common::{runtime, start_app, GlobalOptions};
use crate::error::CliError;

pub fn run(rect: Rect, options: GlobalOptions) -> Result<(), CliError> {
    if rect.is_empty() {
        return Err(CliError::InvalidArgument(format!(
            "empty rectangle {}; MIN values must be below MAX values",
            rect
        )));
    }

    let runtime = runtime()?;
    let results = runtime.block_on(async {
        let app = start_app(options).await?;
        Ok::<_, CliError>(range_query(app.store(), &rect))
    })?;

    for entity in &results {
        println!(
            "{:<16} {:<14} {:>10} {:>10}",
            entity.id, entity.kind, entity.x, entity.y
        );
    }
    println!("{} systems in {}", results.len(), rect);
    Ok(())
}
