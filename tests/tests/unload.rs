use modswap_kernel::{
    CodeLoader, CommandDispatcher, CommandSpec, CommandTable, ModuleDescriptor, ModuleEntry,
    ModuleHost,
};
use modswap_plugins::host::InMemoryHost;
use modswap_plugins::hot_reload::RegistrySync;
use modswap_plugins::{LifecycleError, UnloadWarning};
use modswap_testing::{
    FaultyHost, FixedAnswer, FlakyLoaderFactory, Harness, HookLog, ModuleDir, PanickingDisable,
    RecordingModule,
};
use std::sync::Arc;

fn greeter(name: &str, main: &str) -> ModuleDescriptor {
    let spec = CommandSpec {
        aliases: vec!["hi".to_string()],
        ..CommandSpec::default()
    };
    ModuleDescriptor::new(name, "1.0")
        .with_main(main)
        .with_command("greet", spec)
}

fn recording_harness(log: &HookLog) -> anyhow::Result<Harness> {
    let builder = InMemoryHost::builder()
        .with_entry_point("recording", RecordingModule::factory(log.clone(), Some("wave")))
        .with_entry_point("plain", RecordingModule::factory(log.clone(), None));
    Harness::with_host_builder(builder, |_| {})
}

#[tokio::test]
async fn test_unload_removes_every_trace() -> anyhow::Result<()> {
    let log = HookLog::default();
    let h = recording_harness(&log)?;
    h.dir.add("Greeter.jar", &greeter("Greeter", "recording"))?;

    let module = h.manager.load("Greeter").await?;
    h.manager.wait_for_command_sync().await;

    let tree = h.host.tree().expect("tree dispatcher").clone();
    assert!(tree.contains("greeter:greet"));
    assert!(tree.contains("wave"));
    assert_eq!(h.host.subscribers().owned_by(module.id()), 2);
    let version_before = tree.version();

    let report = h.manager.unload(&module).await?;
    assert!(report.is_clean(), "unexpected warnings: {:?}", report.warnings);
    for alias in ["greeter:greet", "greet", "greeter:hi", "hi", "wave"] {
        assert!(
            report.commands_removed.iter().any(|a| a == alias),
            "{} was not removed",
            alias
        );
    }
    assert_eq!(report.subscriptions_purged, 2);

    assert!(h.host.get_module("Greeter").is_none());
    assert!(h.host.module_table().is_empty());
    assert!(h.host.flat_commands().is_empty());
    assert!(tree.aliases().is_empty());
    assert!(tree.version() > version_before);
    assert_eq!(h.host.subscribers().owned_by(module.id()), 0);
    assert!(module.loader().is_closed());
    assert!(module.loader().entry().is_none());
    assert_eq!(log.count("disable"), 1);
    assert_eq!(h.host.reclaim_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_unload_twice_is_harmless() -> anyhow::Result<()> {
    let log = HookLog::default();
    let h = recording_harness(&log)?;
    h.dir.add("Greeter.jar", &greeter("Greeter", "plain"))?;
    let module = h.manager.load("Greeter").await?;

    h.manager.unload(&module).await?;
    let second = h.manager.unload(&module).await?;

    assert!(second.is_clean());
    assert!(second.commands_removed.is_empty());
    assert_eq!(second.subscriptions_purged, 0);
    assert_eq!(log.count("disable"), 1);
    assert!(h.host.get_module("Greeter").is_none());
    Ok(())
}

#[tokio::test]
async fn test_veto_leaves_module_untouched() -> anyhow::Result<()> {
    let log = HookLog::default();
    let h = recording_harness(&log)?;
    h.dir.add("Greeter.jar", &greeter("Greeter", "plain"))?;
    let module = h.manager.load("Greeter").await?;

    let negotiator = FixedAnswer::veto();
    assert!(h
        .manager
        .extension_api()
        .register_gentle_unload(&module, negotiator.clone()));

    let err = h.manager.unload(&module).await.unwrap_err();
    assert!(matches!(err, LifecycleError::UnloadVetoed(ref name) if name == "Greeter"));
    assert_eq!(negotiator.calls(), 1);

    assert!(h.host.get_module("Greeter").is_some());
    assert!(module.is_enabled());
    assert!(!module.loader().is_closed());
    assert!(h.host.flat_commands().get("greeter:greet").is_some());
    assert_eq!(h.host.subscribers().owned_by(module.id()), 2);
    assert_eq!(log.count("disable"), 0);

    assert!(h.manager.extension_api().unregister_gentle_unload(&module));
    h.manager.unload(&module).await?;
    assert!(h.host.get_module("Greeter").is_none());
    Ok(())
}

#[tokio::test]
async fn test_consent_lets_unload_proceed() -> anyhow::Result<()> {
    let log = HookLog::default();
    let h = recording_harness(&log)?;
    h.dir.add("Greeter.jar", &greeter("Greeter", "plain"))?;
    let module = h.manager.load("Greeter").await?;

    let negotiator = FixedAnswer::consent();
    h.manager
        .extension_api()
        .register_gentle_unload(&module, negotiator.clone());
    h.manager.unload(&module).await?;

    assert_eq!(negotiator.calls(), 1);
    assert!(h.host.get_module("Greeter").is_none());
    // registrations are never expired by the manager
    assert!(h.manager.gentle_unload().is_registered(module.id()));
    Ok(())
}

#[tokio::test]
async fn test_panicking_disable_does_not_stop_unload() -> anyhow::Result<()> {
    let builder = InMemoryHost::builder()
        .with_entry_point("panicky", || Arc::new(PanickingDisable) as Arc<dyn ModuleEntry>);
    let h = Harness::with_host_builder(builder, |_| {})?;
    h.dir.add("Grumpy.jar", &greeter("Grumpy", "panicky"))?;
    let module = h.manager.load("Grumpy").await?;

    let report = h.manager.unload(&module).await?;

    assert_eq!(report.warnings.len(), 1);
    assert!(matches!(report.warnings[0], UnloadWarning::DisableFailed(_)));
    assert!(!module.is_enabled());
    assert!(h.host.get_module("Grumpy").is_none());
    assert!(h.host.flat_commands().is_empty());
    assert!(module.loader().is_closed());
    Ok(())
}

#[tokio::test]
async fn test_hidden_listener_table_is_reported() -> anyhow::Result<()> {
    let log = HookLog::default();
    let inner = InMemoryHost::builder()
        .with_entry_point("plain", RecordingModule::factory(log.clone(), None))
        .build();
    let host = Arc::new(FaultyHost::new(inner));
    host.hide_listeners(true);
    let h = Harness::from_host(ModuleDir::new()?, host.clone(), |_| {});
    h.dir.add("Greeter.jar", &greeter("Greeter", "plain"))?;
    let module = h.manager.load("Greeter").await?;

    let report = h.manager.unload(&module).await?;

    assert_eq!(report.warnings, vec![UnloadWarning::ListenersUnreachable]);
    assert_eq!(host.inner().subscribers().owned_by(module.id()), 2);
    assert!(host.get_module("Greeter").is_none());
    assert!(module.loader().is_closed());
    Ok(())
}

#[tokio::test]
async fn test_unreachable_registry_aborts_before_any_change() -> anyhow::Result<()> {
    let log = HookLog::default();
    let inner = InMemoryHost::builder()
        .with_entry_point("plain", RecordingModule::factory(log.clone(), None))
        .build();
    let host = Arc::new(FaultyHost::new(inner));
    let h = Harness::from_host(ModuleDir::new()?, host.clone(), |_| {});
    h.dir.add("Greeter.jar", &greeter("Greeter", "plain"))?;
    let module = h.manager.load("Greeter").await?;

    host.break_internals(true);
    let err = h.manager.unload(&module).await.unwrap_err();
    assert!(matches!(err, LifecycleError::RegistryAccess { .. }));

    assert!(host.get_module("Greeter").is_some());
    assert!(module.is_enabled());
    assert!(host.inner().flat_commands().get("greet").is_some());
    assert!(!module.loader().is_closed());
    assert_eq!(log.count("disable"), 0);

    host.break_internals(false);
    h.manager.unload(&module).await?;
    assert!(host.get_module("Greeter").is_none());
    Ok(())
}

#[tokio::test]
async fn test_failed_detach_still_closes_loader() -> anyhow::Result<()> {
    let builder = InMemoryHost::builder().with_loader_factory(Arc::new(FlakyLoaderFactory));
    let h = Harness::with_host_builder(builder, |_| {})?;
    h.dir.add_simple("Sticky", "1.0")?;
    let module = h.manager.load("Sticky").await?;

    let report = h.manager.unload(&module).await?;

    assert_eq!(report.warnings.len(), 1);
    assert!(matches!(report.warnings[0], UnloadWarning::PartialTeardown(_)));
    assert!(h.host.get_module("Sticky").is_none());
    assert!(module.loader().is_closed());
    Ok(())
}

#[tokio::test]
async fn test_stale_command_of_another_module_is_swept() -> anyhow::Result<()> {
    let log = HookLog::default();
    let h = recording_harness(&log)?;
    h.dir.add("Leaky.jar", &greeter("Leaky", "recording"))?;
    h.dir.add("Tidy.jar", &ModuleDescriptor::new("Tidy", "1.0").with_main("plain"))?;
    let leaky = h.manager.load("Leaky").await?;
    let tidy = h.manager.load("Tidy").await?;

    // the code behind Leaky's un-namespaced command goes away underneath it
    leaky.loader().close()?;

    let report = h.manager.unload(&tidy).await?;

    let mut stale: Vec<String> = report
        .warnings
        .iter()
        .map(|w| match w {
            UnloadWarning::StaleCommandEntry(alias) => alias.clone(),
            other => panic!("unexpected warning {:?}", other),
        })
        .collect();
    stale.sort();
    assert_eq!(stale, vec!["greet", "hi", "leaky:greet", "leaky:hi", "wave"]);
    assert!(h.host.flat_commands().get("wave").is_none());
    assert!(h.host.flat_commands().get("leaky:greet").is_none());
    assert!(h.host.get_module("Leaky").is_some());
    Ok(())
}

#[tokio::test]
async fn test_commands_of_half_unloaded_module_are_reclaimed() -> anyhow::Result<()> {
    let h = Harness::new()?;
    let ping = ModuleDescriptor::new("Foo", "1.0").with_command("ping", CommandSpec::default());
    h.dir.add("Foo.jar", &ping)?;
    h.dir.add_simple("Other", "1.0")?;
    let foo = h.manager.load("Foo").await?;
    let other = h.manager.load("Other").await?;

    // Foo leaves the registry but its commands stay behind
    RegistrySync::detach(&h.host.internals()?, &foo)?;
    foo.loader().close()?;
    assert!(h.host.flat_commands().get("foo:ping").is_some());

    let report = h.manager.unload(&other).await?;
    assert!(
        report
            .warnings
            .contains(&UnloadWarning::StaleCommandEntry("foo:ping".to_string()))
    );
    assert!(h.host.flat_commands().get("foo:ping").is_none());

    let fresh = h.manager.load("Foo").await?;
    let entry = h.host.flat_commands().get("foo:ping").expect("re-registered");
    assert_eq!(entry.handler.owner(), Some(fresh.id()));

    let report = h.manager.unload(&fresh).await?;
    assert!(report.commands_removed.contains(&"foo:ping".to_string()));
    assert!(h.host.flat_commands().get("foo:ping").is_none());
    Ok(())
}
