use anyhow::Result;

use crate::cli_utils::join_names;

use super::shared::load_settings;

pub(crate) fn check_settings(config: Option<String>) -> Result<()> {
    let loaded = load_settings(config.as_deref())?;
    let registry = &loaded.registry;
    println!(
        "Settings OK: {} queue(s) on {} connection(s)",
        registry.queue_count(),
        registry.len()
    );
    for index in 0..registry.len() {
        let target = loaded.target_for_index(index)?;
        let queues = registry.queues_for_index(index)?;
        println!("  [{index}] {target}");
        println!("      queues: {}", join_names(&queues));
    }
    println!("Worker class: {}", loaded.settings.worker_class);
    println!("Worker command: {}", loaded.settings.worker_cmd.join(" "));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::TempConfig;

    #[test]
    fn check_accepts_valid_settings() -> Result<()> {
        let config = TempConfig::new(
            r#"
            [queues.default]
            URL = "redis://localhost:6379/0"
            [queues.high]
            URL = "redis://localhost:6379/0"
            DEFAULT_TIMEOUT = 360
            "#,
        )?;
        check_settings(config.config_arg())
    }

    #[test]
    fn check_reports_ambiguous_queue() -> Result<()> {
        let config = TempConfig::new(
            r#"
            [queues.default]
            URL = "redis://localhost:6379/0"
            HOST = "localhost"
            "#,
        )?;
        let err = check_settings(config.config_arg()).unwrap_err();
        assert!(format!("{err:#}").contains("default"), "{err:#}");
        Ok(())
    }
}
