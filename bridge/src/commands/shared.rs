use std::sync::Arc;

use anyhow::Result;
use rqbridge::connection::{ConnectionTarget, resolve_target};
use rqbridge::engine::Implementations;
use rqbridge_config::{ConnectionRegistry, RqSettings, load_toml_settings, resolve_config_source};

/// Settings with everything derived from them at startup.
pub(crate) struct LoadedSettings {
    pub settings: RqSettings,
    pub registry: Arc<ConnectionRegistry>,
    pub implementations: Implementations,
}

impl LoadedSettings {
    pub fn target_for_index(&self, index: usize) -> Result<ConnectionTarget> {
        let params = self.registry.connection_for_index(index)?;
        resolve_target(params, &self.settings)
    }

    pub fn target_for_queue(&self, queue: &str) -> Result<(usize, ConnectionTarget)> {
        let index = self.registry.index_of(queue)?;
        Ok((index, self.target_for_index(index)?))
    }
}

pub(crate) fn load_settings(config: Option<&str>) -> Result<LoadedSettings> {
    let (resolved, source) = resolve_config_source(config);
    match resolved.as_deref() {
        Some(path) => tracing::debug!(path, source = %source, "loading settings"),
        None => tracing::debug!(source = %source, "no settings file found"),
    }
    let settings = load_toml_settings(config)?;
    let implementations = Implementations::from_settings(&settings);
    implementations.validate(&settings)?;
    let registry = Arc::new(settings.registry()?);
    Ok(LoadedSettings {
        settings,
        registry,
        implementations,
    })
}

pub(crate) async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let sigint = signal(SignalKind::interrupt());
        let sigterm = signal(SignalKind::terminate());
        match (sigint, sigterm) {
            (Ok(mut sigint), Ok(mut sigterm)) => {
                tokio::select! {
                    _ = sigint.recv() => {}
                    _ = sigterm.recv() => {}
                }
            }
            _ => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
