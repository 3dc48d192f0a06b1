//! `modswap console` command implementation
//!
//! Loads the module directory into an in-memory host, starts the watch
//! loop when a timer is enabled and reads lifecycle commands from stdin
//! until `quit` or Ctrl-C.

use crate::CliError;
use crate::context::CliContext;
use colored::Colorize;
use modswap_plugins::hot_reload::{OperationStatus, RegistrySync};
use modswap_plugins::{BulkReport, LifecycleManager, ModuleFilter, StatusMessage, WatchLoop};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

const HELP: &str = "\
Commands:
  load <name|all>       load a module from the module directory
  unload <name|all>     unload a loaded module
  reload <name|all>     unload and load a module again
  enable <name|all>     enable a loaded module
  disable <name|all>    disable a loaded module
  list [-v]             list loaded modules, -v adds versions
  info <name>           show a loaded module
  usage <name>          list the commands a module registered
  lookup <command>      find the modules providing a command
  ignore [name]         show the ignore list or add a module to it
  check                 check and repair the module registry
  help                  show this help
  quit                  stop the console";

/// What a command applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    All,
    Module(String),
}

/// One parsed console line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Load(Target),
    Unload(Target),
    Reload(Target),
    Enable(Target),
    Disable(Target),
    List { versions: bool },
    Info(String),
    Usage(String),
    Lookup(String),
    Ignore(Option<String>),
    Check,
    Help,
    Quit,
}

/// Parse a console line. Blank lines yield `Ok(None)`.
pub fn parse(line: &str) -> Result<Option<ConsoleCommand>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let rest: Vec<&str> = words.collect();
    // module names may contain spaces in some hosts
    let arg = (!rest.is_empty()).then(|| rest.join(" "));

    let target = |arg: Option<String>| match arg {
        Some(a) if a.eq_ignore_ascii_case("all") || a == "*" => Ok(Target::All),
        Some(a) => Ok(Target::Module(a)),
        None => Err(format!("usage: {} <name|all>", verb)),
    };
    let required = |arg: Option<String>, what: &str| {
        arg.ok_or_else(|| format!("usage: {} <{}>", verb, what))
    };

    let command = match verb.to_ascii_lowercase().as_str() {
        "load" => ConsoleCommand::Load(target(arg)?),
        "unload" => ConsoleCommand::Unload(target(arg)?),
        "reload" | "restart" => ConsoleCommand::Reload(target(arg)?),
        "enable" => ConsoleCommand::Enable(target(arg)?),
        "disable" => ConsoleCommand::Disable(target(arg)?),
        "list" => ConsoleCommand::List {
            versions: rest.iter().any(|w| *w == "-v" || *w == "--versions"),
        },
        "info" => ConsoleCommand::Info(required(arg, "name")?),
        "usage" => ConsoleCommand::Usage(required(arg, "name")?),
        "lookup" => ConsoleCommand::Lookup(required(arg, "command")?),
        "ignore" => ConsoleCommand::Ignore(arg),
        "check" => ConsoleCommand::Check,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" | "stop" => ConsoleCommand::Quit,
        other => return Err(format!("unknown command '{}', try 'help'", other)),
    };
    Ok(Some(command))
}

/// Run one command, returning the lines to show
pub async fn execute(manager: &LifecycleManager, command: ConsoleCommand) -> Vec<StatusMessage> {
    match command {
        ConsoleCommand::Load(Target::All) => bulk(manager.load_all().await, "Loaded"),
        ConsoleCommand::Load(Target::Module(name)) => vec![manager.load_status(&name).await],
        ConsoleCommand::Unload(Target::All) => bulk(manager.unload_all().await, "Unloaded"),
        ConsoleCommand::Unload(Target::Module(name)) => vec![manager.unload_status(&name).await],
        ConsoleCommand::Reload(Target::All) => bulk(manager.reload_all().await, "Reloaded"),
        ConsoleCommand::Reload(Target::Module(name)) => vec![manager.reload_status(&name).await],
        ConsoleCommand::Enable(Target::All) => bulk(manager.enable_all().await, "Enabled"),
        ConsoleCommand::Enable(Target::Module(name)) => vec![manager.enable_status(&name).await],
        ConsoleCommand::Disable(Target::All) => bulk(manager.disable_all().await, "Disabled"),
        ConsoleCommand::Disable(Target::Module(name)) => {
            vec![manager.disable_status(&name).await]
        }
        ConsoleCommand::List { versions } => list(manager, versions),
        ConsoleCommand::Info(name) => module_info(manager, &name),
        ConsoleCommand::Usage(name) => match manager.usages(&name) {
            Ok(commands) if commands.is_empty() => {
                vec![StatusMessage::success(format!("{} has no commands", name))]
            }
            Ok(commands) => vec![StatusMessage::success(format!(
                "Commands of {}: {}",
                name,
                commands.join(", ")
            ))],
            Err(e) => vec![StatusMessage::failure(e.to_string())],
        },
        ConsoleCommand::Lookup(command) => {
            let owners = manager.find_by_command(&command);
            if owners.is_empty() {
                vec![StatusMessage::failure(format!(
                    "No loaded module provides '{}'",
                    command
                ))]
            } else {
                vec![StatusMessage::success(format!(
                    "'{}' is provided by: {}",
                    command,
                    owners.join(", ")
                ))]
            }
        }
        ConsoleCommand::Ignore(None) => {
            let names = manager.ignore_list().names();
            vec![StatusMessage::success(format!(
                "Ignored modules ({}): {}",
                names.len(),
                names.join(", ")
            ))]
        }
        ConsoleCommand::Ignore(Some(name)) => {
            if manager.ignore_list().add(&name) {
                vec![StatusMessage::success(format!("{} is now ignored", name))]
            } else {
                vec![StatusMessage::failure(format!("{} is already ignored", name))]
            }
        }
        ConsoleCommand::Check => check(manager),
        ConsoleCommand::Help => vec![StatusMessage::success(HELP)],
        ConsoleCommand::Quit => Vec::new(),
    }
}

fn bulk(report: BulkReport, verb: &str) -> Vec<StatusMessage> {
    let mut lines: Vec<StatusMessage> = report
        .entries
        .iter()
        .map(|(_, status)| status.clone())
        .collect();
    lines.push(report.summary(verb));
    lines
}

fn list(manager: &LifecycleManager, versions: bool) -> Vec<StatusMessage> {
    let enabled = manager.module_names(ModuleFilter::Enabled, versions);
    let disabled = manager.module_names(ModuleFilter::Disabled, versions);
    let mut line = format!("Modules ({}): ", enabled.len() + disabled.len());
    line.push_str(&enabled.join(", "));
    if !disabled.is_empty() {
        if !enabled.is_empty() {
            line.push_str(", ");
        }
        let marked: Vec<String> = disabled.iter().map(|n| format!("{} (disabled)", n)).collect();
        line.push_str(&marked.join(", "));
    }
    vec![StatusMessage::success(line)]
}

fn module_info(manager: &LifecycleManager, name: &str) -> Vec<StatusMessage> {
    let Some(module) = manager.find(name) else {
        return vec![StatusMessage::failure(format!("Module {} is not loaded", name))];
    };
    let descriptor = module.descriptor();
    let mut lines = vec![
        StatusMessage::success(descriptor.full_name()),
        StatusMessage::success(format!("  enabled: {}", module.is_enabled())),
        StatusMessage::success(format!("  file: {}", module.path().display())),
    ];
    if let Some(description) = &descriptor.description {
        lines.push(StatusMessage::success(format!("  description: {}", description)));
    }
    if !descriptor.authors.is_empty() {
        lines.push(StatusMessage::success(format!(
            "  authors: {}",
            descriptor.authors.join(", ")
        )));
    }
    if manager.is_ignored(module.name()) {
        lines.push(StatusMessage::success("  ignored: true"));
    }
    lines
}

fn check(manager: &LifecycleManager) -> Vec<StatusMessage> {
    let internals = match manager.host().internals() {
        Ok(internals) => internals,
        Err(e) => return vec![StatusMessage::failure(e.to_string())],
    };
    let issues = RegistrySync::check_consistency(&internals);
    if issues.is_empty() {
        return vec![StatusMessage::success("Module registry is consistent")];
    }

    let mut lines: Vec<StatusMessage> = issues
        .iter()
        .map(|issue| StatusMessage::partial(format!("{:?}", issue)))
        .collect();
    match manager.repair_registry() {
        Ok(repaired) => lines.push(StatusMessage::success(format!(
            "Repaired {} of {} registry issue(s)",
            repaired,
            issues.len()
        ))),
        Err(e) => lines.push(StatusMessage::failure(e.to_string())),
    }
    lines
}

fn print_status(status: &StatusMessage) {
    match status.status {
        OperationStatus::Success => println!("{}", status.message),
        OperationStatus::Partial => println!("{} {}", "!".yellow(), status.message.yellow()),
        OperationStatus::Failure => println!("{} {}", "✗".red(), status.message.red()),
    }
}

/// Execute the `modswap console` command
pub async fn run(ctx: CliContext, load_at_start: bool) -> Result<(), CliError> {
    let manager = ctx.manager.clone();
    println!(
        "{} modswap console, module directory: {}",
        "→".green(),
        ctx.config.module_dir.display()
    );

    if load_at_start {
        if manager.locator().dir_exists() {
            for status in bulk(manager.load_all().await, "Loaded") {
                print_status(&status);
            }
        } else {
            print_status(&StatusMessage::partial(format!(
                "Module directory {} does not exist",
                ctx.config.module_dir.display()
            )));
        }
    }

    let watch = WatchLoop::new(manager.clone());
    let timers = watch.start();
    debug!("{} watch timer(s) running", timers);
    println!("Type 'help' for a list of commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match parse(&line) {
                    Ok(None) => {}
                    Ok(Some(ConsoleCommand::Quit)) => break,
                    Ok(Some(command)) => {
                        for status in execute(&manager, command).await {
                            print_status(&status);
                        }
                    }
                    Err(message) => print_status(&StatusMessage::failure(message)),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        }
    }

    info!("Shutting down console");
    watch.stop().await;
    manager.shutdown();
    println!("{} Bye", "✓".green());
    Ok(())
}
