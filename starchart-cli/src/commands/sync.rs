//! `starchart sync`: page the remote catalogue into the local store.

use std::time::Duration;

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use starchart::app::StarchartApp;
use starchart::remote::RemoteSource;
use starchart::sync::{SyncOutcome, SyncReport};

use super::common::{runtime, start_app, GlobalOptions};
use crate::error::CliError;

#[derive(Debug, Args)]
pub struct SyncArgs {
    /// Stop after this many pages
    #[arg(long)]
    pub pages: Option<u64>,

    /// Drop every cached system before syncing from the first page
    #[arg(long)]
    pub reset: bool,
}

pub fn run(args: SyncArgs, options: GlobalOptions) -> Result<(), CliError> {
    if args.pages == Some(0) {
        return Err(CliError::InvalidArgument("--pages must be at least 1".to_string()));
    }

    let runtime = runtime()?;
    let report = runtime.block_on(async {
        let app = start_app(options).await?;
        let sync = app.sync();
        if args.reset {
            let removed = reset_store(&*app).await?;
            println!("Cleared {} cached systems", removed);
        }

        let handle = sync.stop_handle();
        ctrlc::set_handler(move || {
            eprintln!();
            eprintln!("Stopping after the current page...");
            handle.stop();
        })
        .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;

        let progress = progress_bar();
        let page_size = sync.config().page_size;
        let mut updates = sync.subscribe_progress();
        let bar = progress.clone();
        let watcher = tokio::spawn(async move {
            while updates.changed().await.is_ok() {
                let snapshot = *updates.borrow();
                if let Some(total) = snapshot.total_count {
                    bar.set_length(total.div_ceil(u64::from(page_size)).max(1));
                }
                bar.set_position(snapshot.page_index);
            }
        });

        let result = match args.pages {
            Some(pages) => sync.sync_pages(pages).await,
            None => sync.background_sync().await,
        };
        progress.finish_and_clear();
        watcher.abort();

        println!("Store now holds {} systems", app.store().len());
        Ok::<SyncReport, CliError>(result?)
    })?;

    print_report(&report);
    Ok(())
}

/// Empty the store and rewind the cursor so the next run starts from scratch.
async fn reset_store<R: RemoteSource>(app: &StarchartApp<R>) -> Result<usize, CliError> {
    let removed = app.store().clear().await?;
    app.sync().reset()?;
    Ok(removed)
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(1);
    // The template is a literal; fall back to the default style if it is ever rejected
    let style = ProgressStyle::with_template("{spinner} [{elapsed_precise}] {bar:40.cyan/blue} page {pos}/{len}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

fn print_report(report: &SyncReport) {
    let outcome = match report.outcome {
        SyncOutcome::Completed => style("complete").green(),
        SyncOutcome::Stopped => style("stopped").yellow(),
        SyncOutcome::PageLimit => style("page limit reached").yellow(),
    };
    println!("Sync {}", outcome);
    println!("  Pages fetched: {}", report.pages_fetched);
    println!("  Added:         {}", report.added);
    println!("  Updated:       {}", report.updated);
    println!("  Next page:     {}", report.next_page);
    if let Some(total) = report.total_count {
        println!("  Remote total:  {}", total);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use starchart::app::AppConfig;
    use starchart::entity::{Entity, EntityKind};
    use starchart::remote::{Page, RemoteError};

    struct OnePage;

    impl RemoteSource for OnePage {
        async fn fetch_page(&self, page_index: u64, _page_size: u32) -> Result<Page, RemoteError> {
            if page_index == 0 {
                Ok(Page::new(
                    vec![
                        Entity::new("X1-A", 0.0, 0.0, EntityKind::RedStar),
                        Entity::new("X1-B", 5.0, 5.0, EntityKind::Nebula),
                    ],
                    2,
                ))
            } else {
                Ok(Page::new(Vec::new(), 2))
            }
        }

        async fn fetch_by_id(&self, _id: &str) -> Result<Entity, RemoteError> {
            Err(RemoteError::NotFound)
        }

        fn name(&self) -> &str {
            "one-page"
        }
    }

    #[tokio::test]
    async fn test_reset_clears_store_and_cursor() {
        let config = AppConfig::default().with_memory_store();
        let app = StarchartApp::start_with_remote(config, Arc::new(OnePage))
            .await
            .unwrap();
        app.sync().background_sync().await.unwrap();
        assert_eq!(app.store().len(), 2);
        assert_eq!(app.sync().page_index(), 1);

        assert_eq!(reset_store(&app).await.unwrap(), 2);
        assert!(app.store().is_empty());
        assert_eq!(app.sync().page_index(), 0);
    }
}
