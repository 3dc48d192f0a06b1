use modswap_kernel::{CodeLoader, CommandTable, HostError, ModuleDescriptor, ModuleHost, ModuleRegistry};
use modswap_plugins::host::InMemoryHost;
use modswap_plugins::hot_reload::{Inconsistency, RegistrySync};
use modswap_plugins::{LifecycleError, ModuleFilter};
use modswap_testing::{FixedAnswer, Harness, HookLog, RecordingModule};

fn recording_harness(log: &HookLog) -> anyhow::Result<Harness> {
    let builder = InMemoryHost::builder()
        .with_entry_point("recording", RecordingModule::factory(log.clone(), None));
    Harness::with_host_builder(builder, |_| {})
}

fn counter(version: &str) -> ModuleDescriptor {
    ModuleDescriptor::new("Counter", version)
        .with_main("recording")
        .with_command("count", Default::default())
}

#[tokio::test]
async fn test_reload_picks_up_new_archive() -> anyhow::Result<()> {
    let log = HookLog::default();
    let h = recording_harness(&log)?;
    h.dir.add("Counter.jar", &counter("1.0"))?;
    let old = h.manager.load("Counter").await?;

    h.dir.remove("Counter.jar")?;
    h.dir.add("Counter.jar", &counter("2.0"))?;
    let fresh = h.manager.reload(&old).await?;

    assert_eq!(fresh.version(), "2.0");
    assert_ne!(fresh.id(), old.id());
    assert!(fresh.is_enabled());
    assert!(old.loader().is_closed());
    assert!(!fresh.loader().is_closed());

    let entry = h.host.flat_commands().get("counter:count").expect("command registered");
    assert_eq!(entry.handler.owner(), Some(fresh.id()));
    assert_eq!(h.host.subscribers().owned_by(old.id()), 0);
    assert_eq!(h.host.subscribers().owned_by(fresh.id()), 2);
    assert_eq!(
        log.entries(),
        vec![
            "load:Counter",
            "enable:Counter",
            "disable:Counter",
            "load:Counter",
            "enable:Counter"
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_reload_unchanged_archive_round_trips() -> anyhow::Result<()> {
    let log = HookLog::default();
    let h = recording_harness(&log)?;
    h.dir.add("Counter.jar", &counter("1.0"))?;
    let old = h.manager.load("Counter").await?;

    let fresh = h.manager.reload(&old).await?;

    assert_eq!(fresh.name(), old.name());
    assert_eq!(fresh.version(), old.version());
    assert_eq!(fresh.path(), old.path());
    assert_ne!(fresh.id(), old.id());
    assert!(fresh.is_enabled());
    assert_eq!(h.manager.find("counter").map(|m| m.id()), Some(fresh.id()));
    Ok(())
}

#[tokio::test]
async fn test_reload_prefers_backing_file_over_name_match() -> anyhow::Result<()> {
    let h = Harness::new()?;
    h.dir.add("Bar.jar", &ModuleDescriptor::new("Foo", "1.0"))?;
    let foo = h.manager.load("Foo").await?;
    assert!(foo.path().ends_with("Bar.jar"));

    // an archive named after the module that holds something else
    h.dir.add("Foo.jar", &ModuleDescriptor::new("Baz", "9.9"))?;

    let fresh = h.manager.reload(&foo).await?;

    assert_eq!(fresh.name(), "Foo");
    assert_eq!(fresh.version(), "1.0");
    assert!(fresh.path().ends_with("Bar.jar"));
    assert!(h.host.get_module("Foo").is_some());
    assert!(h.host.get_module("Baz").is_none());
    Ok(())
}

#[tokio::test]
async fn test_reload_resolves_by_name_when_file_moved() -> anyhow::Result<()> {
    let h = Harness::new()?;
    h.dir.add("Foo-1.0.jar", &ModuleDescriptor::new("Foo", "1.0"))?;
    let foo = h.manager.load("Foo").await?;

    h.dir.remove("Foo-1.0.jar")?;
    h.dir.add("Foo-1.1.jar", &ModuleDescriptor::new("Foo", "1.1"))?;

    let fresh = h.manager.reload(&foo).await?;

    assert_eq!(fresh.version(), "1.1");
    assert!(fresh.path().ends_with("Foo-1.1.jar"));
    Ok(())
}

#[tokio::test]
async fn test_reload_vetoed_keeps_old_instance() -> anyhow::Result<()> {
    let log = HookLog::default();
    let h = recording_harness(&log)?;
    h.dir.add("Counter.jar", &counter("1.0"))?;
    let module = h.manager.load("Counter").await?;
    h.manager
        .extension_api()
        .register_gentle_unload(&module, FixedAnswer::veto());

    let err = h.manager.reload_by_name("counter").await.unwrap_err();
    assert!(matches!(err, LifecycleError::UnloadVetoed(_)));

    let current = h.manager.find("Counter").expect("still loaded");
    assert_eq!(current.id(), module.id());
    assert_eq!(log.count("load"), 1);
    Ok(())
}

#[tokio::test]
async fn test_load_scans_for_declared_name() -> anyhow::Result<()> {
    let h = Harness::new()?;
    h.dir.add("Bar.jar", &ModuleDescriptor::new("Foo", "1.0"))?;
    h.dir.add_garbage("Aaa.jar")?;

    let module = h.manager.load("foo").await?;

    assert_eq!(module.name(), "Foo");
    assert_eq!(module.file_name(), Some("Bar.jar"));
    assert!(h.manager.tracker().is_tracked("Bar.jar"));
    assert_eq!(h.manager.tracker().module_name("Bar.jar").as_deref(), Some("Foo"));
    Ok(())
}

#[tokio::test]
async fn test_exact_file_name_wins_over_scan() -> anyhow::Result<()> {
    let h = Harness::new()?;
    h.dir.add("Alpha.jar", &ModuleDescriptor::new("Foo", "1.0"))?;
    h.dir.add("Foo.jar", &ModuleDescriptor::new("Foo", "2.0"))?;

    let module = h.manager.load("Foo").await?;

    assert_eq!(module.file_name(), Some("Foo.jar"));
    assert_eq!(module.version(), "2.0");
    Ok(())
}

#[tokio::test]
async fn test_load_failures() -> anyhow::Result<()> {
    let h = Harness::new()?;
    h.dir.add_simple("Present", "1.0")?;
    h.dir.add_garbage("Broken.jar")?;

    let err = h.manager.load("Absent").await.unwrap_err();
    assert!(matches!(err, LifecycleError::NotFound(ref name) if name == "Absent"));

    let err = h.manager.load("Broken").await.unwrap_err();
    assert!(matches!(err, LifecycleError::DescriptorInvalid { .. }));

    h.manager.load("Present").await?;
    let err = h.manager.load("Present").await.unwrap_err();
    assert!(matches!(
        err,
        LifecycleError::LoadRejected {
            source: HostError::AlreadyLoaded(_),
            ..
        }
    ));
    assert_eq!(h.host.module_table().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_missing_module_directory() -> anyhow::Result<()> {
    let h = Harness::with_host_builder(InMemoryHost::builder(), |config| {
        config.module_dir = config.module_dir.join("does-not-exist");
    })?;

    let err = h.manager.load("Anything").await.unwrap_err();
    assert!(matches!(err, LifecycleError::DirectoryMissing(_)));
    assert!(h.manager.load_all().await.entries.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_bulk_operations_skip_ignored_modules() -> anyhow::Result<()> {
    let h = Harness::with_host_builder(InMemoryHost::builder(), |config| {
        config.ignored_modules = vec!["Core".to_string()];
    })?;
    h.dir.add_simple("Core", "1.0")?;
    h.dir.add_simple("Extra", "1.0")?;

    let report = h.manager.load_all().await;
    assert_eq!(report.ignored, vec!["Core".to_string()]);
    assert_eq!(report.succeeded(), 1);
    assert!(h.manager.find("Core").is_none());

    // explicit requests are not filtered
    h.manager.load("Core").await?;

    let report = h.manager.unload_all().await;
    assert_eq!(report.ignored, vec!["Core".to_string()]);
    assert_eq!(h.manager.module_names(ModuleFilter::All, false), vec!["Core".to_string()]);
    Ok(())
}

#[tokio::test]
async fn test_registry_repair() -> anyhow::Result<()> {
    let h = Harness::new()?;
    h.dir.add_simple("Solo", "1.0")?;
    let module = h.manager.load("Solo").await?;

    h.host.module_table().remove_from_lookup("solo", &module)?;
    assert!(h.host.get_module("Solo").is_none());

    let internals = h.host.internals()?;
    assert_eq!(
        RegistrySync::check_consistency(&internals),
        vec![Inconsistency::ListWithoutLookup("Solo".to_string())]
    );

    assert_eq!(h.manager.repair_registry()?, 1);
    assert!(h.host.get_module("Solo").is_some());
    assert!(RegistrySync::check_consistency(&internals).is_empty());
    Ok(())
}
