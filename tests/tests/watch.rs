use modswap_kernel::{CodeLoader, ModuleDescriptor, ModuleHost};
use modswap_plugins::host::InMemoryHost;
use modswap_plugins::hot_reload::{TickOutcome, WatchTimer};
use modswap_testing::Harness;

fn ignoring_core() -> anyhow::Result<Harness> {
    Harness::with_host_builder(InMemoryHost::builder(), |config| {
        config.ignored_modules = vec!["Core".to_string()];
    })
}

#[tokio::test]
async fn test_deleted_archive_unloads_its_module() -> anyhow::Result<()> {
    let h = Harness::new()?;
    h.dir.add_simple("A", "1.0")?;
    h.dir.add_simple("B", "1.0")?;
    let a = h.manager.load("A").await?;
    h.manager.load("B").await?;
    let watch = h.watch();

    h.dir.remove("A.jar")?;
    let outcome = watch.run_tick(WatchTimer::AutoUnload).await;

    let summary = outcome.summary().expect("tick ran");
    assert_eq!(summary.acted_on, vec!["A".to_string()]);
    assert!(h.host.get_module("A").is_none());
    assert!(h.host.get_module("B").is_some());
    assert!(a.loader().is_closed());
    assert!(!h.manager.tracker().is_tracked("A.jar"));
    assert!(h.manager.tracker().is_tracked("B.jar"));
    Ok(())
}

#[tokio::test]
async fn test_deleted_archive_of_ignored_module_is_left_alone() -> anyhow::Result<()> {
    let h = ignoring_core()?;
    h.dir.add_simple("Core", "1.0")?;
    h.manager.load("Core").await?;
    let watch = h.watch();

    h.dir.remove("Core.jar")?;
    let outcome = watch.run_auto_unload_tick().await;

    assert_eq!(outcome.summary().map(|s| s.ignored.clone()), Some(vec!["Core".to_string()]));
    assert!(h.host.get_module("Core").is_some());
    assert!(h.manager.tracker().is_tracked("Core.jar"));
    Ok(())
}

#[tokio::test]
async fn test_record_without_module_is_forgotten() -> anyhow::Result<()> {
    let h = Harness::new()?;
    h.manager.tracker().record("Ghost.jar", "00", Some("Ghost"));
    let watch = h.watch();

    let outcome = watch.run_auto_unload_tick().await;

    assert_eq!(
        outcome.summary().map(|s| s.forgotten.clone()),
        Some(vec!["Ghost.jar".to_string()])
    );
    assert!(h.manager.tracker().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_changed_archive_is_reloaded_once() -> anyhow::Result<()> {
    let h = Harness::new()?;
    h.dir.add_simple("A", "1.0")?;
    let old = h.manager.load("A").await?;
    let watch = h.watch();

    h.dir.remove("A.jar")?;
    h.dir.add_simple("A", "1.1")?;
    let outcome = watch.run_auto_reload_tick().await;

    assert_eq!(outcome.summary().map(|s| s.acted_on.clone()), Some(vec!["A".to_string()]));
    let fresh = h.host.get_module("A").expect("reloaded");
    assert_eq!(fresh.version(), "1.1");
    assert!(old.loader().is_closed());

    let again = watch.run_auto_reload_tick().await;
    assert_eq!(again.summary().map(|s| s.acted_on.len()), Some(0));
    Ok(())
}

#[tokio::test]
async fn test_changed_archive_of_ignored_module_is_not_reloaded() -> anyhow::Result<()> {
    let h = ignoring_core()?;
    h.dir.add_simple("Core", "1.0")?;
    let core = h.manager.load("Core").await?;
    let watch = h.watch();

    h.dir.remove("Core.jar")?;
    h.dir.add_simple("Core", "2.0")?;
    let outcome = watch.run_auto_reload_tick().await;

    assert_eq!(outcome.summary().map(|s| s.ignored.clone()), Some(vec!["Core".to_string()]));
    let current = h.host.get_module("Core").expect("still loaded");
    assert_eq!(current.id(), core.id());
    assert_eq!(current.version(), "1.0");
    Ok(())
}

#[tokio::test]
async fn test_change_to_unloaded_module_keeps_stale_record() -> anyhow::Result<()> {
    let h = Harness::new()?;
    h.dir.add_simple("A", "1.0")?;
    let module = h.manager.load("A").await?;
    h.manager.unload(&module).await?;
    let recorded = h.manager.tracker().hash("A.jar");
    let watch = h.watch();

    h.dir.remove("A.jar")?;
    h.dir.add_simple("A", "1.1")?;
    let outcome = watch.run_auto_reload_tick().await;

    assert_eq!(outcome, TickOutcome::Completed(Default::default()));
    assert_eq!(h.manager.tracker().hash("A.jar"), recorded);
    assert!(h.host.get_module("A").is_none());
    Ok(())
}

#[tokio::test]
async fn test_new_archive_is_auto_loaded() -> anyhow::Result<()> {
    let h = Harness::new()?;
    let watch = h.watch();
    h.dir.add("Fresh.jar", &ModuleDescriptor::new("Fresh", "0.1"))?;

    let outcome = watch.run_tick(WatchTimer::AutoLoad).await;

    assert_eq!(outcome.summary().map(|s| s.acted_on.clone()), Some(vec!["Fresh".to_string()]));
    let module = h.host.get_module("Fresh").expect("loaded");
    assert!(module.is_enabled());
    assert!(h.manager.tracker().is_tracked("Fresh.jar"));
    Ok(())
}

#[tokio::test]
async fn test_prime_prevents_double_load() -> anyhow::Result<()> {
    let h = Harness::new()?;
    h.dir.add_simple("Boot", "1.0")?;
    // loaded by the host itself, not through the manager
    h.host.load_module_from_file(&h.dir.file("Boot.jar"))?;
    let watch = h.watch();

    assert_eq!(watch.prime(), 1);
    let outcome = watch.run_auto_load_tick().await;
    assert_eq!(outcome, TickOutcome::Completed(Default::default()));
    Ok(())
}
