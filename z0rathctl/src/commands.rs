use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Result, bail};
use tokio::task::JoinSet;
use tracing::{info, warn};
use z0rath_core::{ClientConfig, GuardProps, Provider, Render};
use z0rath_model::InvalidationKind;

pub async fn check(config: ClientConfig, slug: &str, timeout: Duration) -> Result<ExitCode> {
    let provider = Provider::new(config)?;
    let query = provider.permission(slug);
    let mut verdicts = query.subscribe();

    let resolved = tokio::time::timeout(timeout, verdicts.wait_for(|v| v.is_resolved()))
        .await
        .ok()
        .and_then(Result::ok)
        .map(|verdict| verdict.granted);

    let code = match resolved.flatten() {
        Some(true) => {
            println!("granted");
            ExitCode::SUCCESS
        }
        Some(false) => {
            println!("denied");
            ExitCode::from(1)
        }
        None => {
            println!("unresolved");
            ExitCode::from(2)
        }
    };

    drop(verdicts);
    drop(query);
    provider.shutdown().await;
    Ok(code)
}

pub async fn watch(config: ClientConfig, slugs: Vec<String>) -> Result<ExitCode> {
    let provider = Provider::new(config)?;
    let mut tasks = JoinSet::new();

    let mut status = provider.subscribe_channel_status();
    tasks.spawn(async move {
        while status.changed().await.is_ok() {
            let current = *status.borrow_and_update();
            if current.is_error() {
                warn!(status = %current, "unable to establish connection");
            } else {
                info!(status = %current, "push channel");
            }
        }
    });

    for slug in slugs {
        let lost_slug = slug.clone();
        let props = GuardProps::new(slug.clone()).on_lost_access(move |redirect| {
            warn!(slug = %lost_slug, redirect, "access lost");
        });
        let mut guard = provider.guard(props, slug);
        tasks.spawn(async move {
            while let Some(render) = guard.changed().await {
                let slug = guard.query().slug();
                match render {
                    Render::Children => info!(slug = %slug, "granted"),
                    Render::Nothing => info!(slug = %slug, verdict = ?guard.query().granted(), "not granted"),
                }
            }
        });
    }

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    tasks.shutdown().await;
    provider.shutdown().await;
    Ok(ExitCode::SUCCESS)
}

pub async fn listen(config: ClientConfig) -> Result<ExitCode> {
    if config.user.is_none() {
        bail!("listen needs a user (pass --user or set Z0RATH_USER)");
    }
    let provider = Provider::new(config)?;

    let _subscriptions: Vec<_> = InvalidationKind::ALL
        .into_iter()
        .map(|kind| {
            provider.bus().scoped(kind, move |event| {
                info!(kind = %kind, payload = %event.raw, "invalidation");
            })
        })
        .collect();

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    provider.shutdown().await;
    Ok(ExitCode::SUCCESS)
}
