use std::collections::BTreeMap;
use std::sync::Arc;

use mache::{Mache, MacheError};
use tokio::select;
use tracing::{debug, info, warn};

use crate::app_config;
use crate::template::{Template, TemplateBuilder};

type TemplateCache = Mache<Template, TemplateBuilder>;

fn open_cache(config: &app_config::Config) -> TemplateCache {
    Mache::new(config.templates.dir.clone(), TemplateBuilder)
}

/// Render `template` once and print it to stdout.
pub async fn render_once(
    config: app_config::Config,
    template: &str,
    vars: &BTreeMap<String, String>,
) -> Result<(), MacheError> {
    let templates = open_cache(&config);
    debug!(base_dir = ?templates.base_dir().await?, "Opened template cache.");

    println!("{}", render(&templates, template, vars).await?);
    Ok(())
}

async fn render(
    templates: &TemplateCache,
    template: &str,
    vars: &BTreeMap<String, String>,
) -> Result<String, MacheError> {
    Ok(templates.get(template).await?.render(vars))
}

/// One watch tick: the fresh render if the template was rebuilt since `last`.
async fn poll_changed(
    templates: &TemplateCache,
    template: &str,
    vars: &BTreeMap<String, String>,
    last: &mut Option<Arc<Template>>,
) -> Result<Option<String>, MacheError> {
    let page = templates.get(template).await?;
    if last.as_ref().is_some_and(|prev| Arc::ptr_eq(prev, &page)) {
        return Ok(None);
    }
    let rendered = page.render(vars);
    *last = Some(page);
    Ok(Some(rendered))
}

async fn wait_for_exit() -> Result<(), std::io::Error> {
    use tokio::signal;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    select! {
        _ = signal::ctrl_c() => {
            debug!("Received Ctrl+C signal, shutting down...");
        },
        _ = sigterm.recv() => {
            debug!("Received termination signal, shutting down...");
        },
    }
    Ok(())
}

/// Re-render `template` every time its file changes, until interrupted.
pub async fn watch(
    config: app_config::Config,
    template: &str,
    vars: &BTreeMap<String, String>,
) -> Result<(), MacheError> {
    let templates = open_cache(&config);
    let base_dir = templates.base_dir().await?;
    info!(base_dir = %base_dir.display(), "Watching {template}. Press Ctrl+C to stop.");

    let _sub = templates.on_invalidation(|event| {
        info!(key = %event.key, "Template changed, re-rendering.");
    });

    let mut last: Option<Arc<Template>> = None;
    let mut ticker = tokio::time::interval(config.watch.poll_interval());
    let exit = wait_for_exit();
    tokio::pin!(exit);

    loop {
        select! {
            res = &mut exit => {
                if let Err(e) = res {
                    warn!("Failed to listen for exit signals: {e}");
                }
                return Ok(());
            },
            _ = ticker.tick() => {
                match poll_changed(&templates, template, vars, &mut last).await {
                    Ok(Some(rendered)) => println!("{rendered}"),
                    Ok(None) => {}
                    // The file may be mid-save; keep the last render and try again.
                    Err(e) if e.is_not_found() => debug!("{e}"),
                    Err(e) => warn!("{e}"),
                }
            },
        }
    }
}

pub fn spawn<Fut>(work: Fut) -> Result<(), MacheError>
where
    Fut: Future<Output = Result<(), MacheError>>,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|e| panic!("Failed to create Tokio runtime: {e}"));
    runtime.block_on(work)
}
