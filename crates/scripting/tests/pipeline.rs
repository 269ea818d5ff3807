//! End-to-end loading tests against the in-memory host

use parking_lot::Mutex;
use skript_config::{SectionNode, SkriptConfig};
use skript_core::{EventPriority, Priority};
use skript_scripting::classes::Value;
use skript_scripting::context::OptionsData;
use skript_scripting::event::EventData;
use skript_scripting::variables::VariableStore;
use skript_scripting::{
    default_registry, ErrorKind, EventClass, HostEvent, InMemoryHost, ParseResult, ParserContext, ScriptError,
    ScriptLoader, ScriptSource, Structure, StructureRegistry,
};
use std::sync::Arc;

fn setup() -> (InMemoryHost, ScriptLoader) {
    let host = InMemoryHost::new(SkriptConfig::default());
    let registry = Arc::new(default_registry().unwrap());
    let loader = ScriptLoader::new(registry, host.host.clone());
    (host, loader)
}

fn source(name: &str, text: &str) -> ScriptSource {
    ScriptSource::from_text(name, text).unwrap()
}

fn kinds(ctx: &ParserContext) -> Vec<ErrorKind> {
    ctx.diagnostics().iter().map(|d| d.kind).collect()
}

#[test]
fn test_options_used_by_event() {
    let (host, loader) = setup();
    let mut ctx = loader.new_context();

    let loaded = loader.load_script(
        &mut ctx,
        &source("greet.sk", "options:\n  greeting: hi\non chat:\n  send {@greeting}\n"),
    );
    assert_eq!(loaded.errors, 0);
    let options = ctx.data_ref::<OptionsData>().unwrap();
    assert_eq!(options.get("greeting"), Some("hi"));

    ctx.set_current_script(None);
    let triggers = host.events.triggers_for(&EventClass::new("chat"));
    assert_eq!(triggers.len(), 1);
    assert_eq!(triggers[0].0, EventPriority::Normal);

    let mut event = HostEvent::new("chat").with_field("message", "anything");
    assert_eq!(host.fire(&mut event), 1);
    assert_eq!(host.effects.take(), vec!["send hi".to_string()]);
}

#[test]
fn test_priority_override() {
    let (host, loader) = setup();
    let mut ctx = loader.new_context();
    loader.load_scripts(&mut ctx, &[source("cancel.sk", "on chat with priority HIGHEST:\n  cancel event\n")]);

    let triggers = host.events.triggers_for(&EventClass::new("chat"));
    assert_eq!(triggers.len(), 1);
    assert_eq!(triggers[0].0, EventPriority::Highest);

    let mut event = HostEvent::new("chat");
    host.fire(&mut event);
    assert!(event.cancelled);
}

#[test]
fn test_forward_function_reference() {
    let (host, loader) = setup();
    let mut ctx = loader.new_context();
    let scripts = loader.load_scripts(&mut ctx, &[source("fn.sk", "function a():\n  b()\nfunction b():\n  return\n")]);

    assert_eq!(scripts[0].errors, 0);
    assert_eq!(scripts[0].info.functions, 2);
    assert_eq!(host.host.functions.call("a", Vec::new(), &host.environment(), 0).unwrap(), None);
}

#[test]
fn test_variables_seed_defaults() {
    let (host, loader) = setup();
    let mut ctx = loader.new_context();
    loader.load_scripts(&mut ctx, &[source("vars.sk", "variables:\n  {score::%player%} = 0\n")]);

    assert_eq!(host.variables.get_variable("score::3f1c"), None);
    assert_eq!(host.variables.names(), vec!["score::<player>".to_string()]);
    assert_eq!(host.variables.resolve("score::3f1c"), Some(Value::Integer(0)));
}

#[test]
fn test_existing_variable_is_kept() {
    let (host, loader) = setup();
    host.variables.set_variable("score::<player>", Some(Value::Integer(5)));

    let mut ctx = loader.new_context();
    let scripts = loader.load_scripts(&mut ctx, &[source("vars.sk", "variables:\n  {score::%player%} = 0\n")]);
    assert_eq!(scripts[0].errors, 0);
    assert_eq!(host.variables.resolve("score::someone"), Some(Value::Integer(5)));
}

#[tokio::test]
async fn test_command_registered_from_worker() {
    let (host, loader) = setup();
    let loader = Arc::new(loader);

    let sources = vec![source("ping.sk", "command /ping:\n  trigger:\n    send \"pong\"\n")];
    let (_ctx, scripts) = loader.load_scripts_async(sources).await.unwrap();

    assert_eq!(scripts[0].errors, 0);
    assert_eq!(host.host.main_thread.pending(), 1);
    assert!(!host.commands.contains("ping"));

    assert_eq!(host.host.main_thread.run_pending(), 1);
    assert!(host.commands.contains("ping"));
    assert_eq!(host.commands.off_main_mutations(), 0);

    assert!(host.commands.dispatch("ping", "", &host.environment()).unwrap());
    assert_eq!(host.effects.take(), vec!["send \"pong\"".to_string()]);
}

#[tokio::test]
async fn test_events_bound_from_worker_on_main_thread() {
    let (host, loader) = setup();
    let loader = Arc::new(loader);

    let sources = vec![
        source("a.sk", "on chat:\n  send \"a\"\n"),
        source("b.sk", "on join:\n  send \"b\"\n"),
    ];
    let (_ctx, _scripts) = loader.load_scripts_async(sources).await.unwrap();
    assert_eq!(host.events.subscription_count(), 0);

    host.host.main_thread.run_pending();
    assert_eq!(host.events.subscription_count(), 2);
    assert_eq!(host.events.off_main_mutations(), 0);
}

#[test]
fn test_unload_restores_subscriptions() {
    let (host, loader) = setup();
    let before = host.events.snapshot();

    let mut ctx = loader.new_context();
    let mut scripts = loader.load_scripts(&mut ctx, &[source("cancel.sk", "on chat with priority HIGHEST:\n  cancel event\n")]);
    assert_eq!(host.events.subscription_count(), 1);

    loader.unload_script(&mut ctx, &mut scripts[0]);
    assert_eq!(host.events.snapshot(), before);
    assert!(host.events.triggers_for(&EventClass::new("chat")).is_empty());
}

#[test]
fn test_unload_restores_commands_and_functions() {
    let (host, loader) = setup();
    let mut ctx = loader.new_context();
    let text = "command /heal:\n  aliases: h\n  trigger:\n    send \"healed\"\nfunction f():\n  send \"f\"\n";
    let mut scripts = loader.load_scripts(&mut ctx, &[source("heal.sk", text)]);
    assert!(host.commands.contains("h"));
    assert_eq!(host.host.functions.len(), 1);

    loader.unload_script(&mut ctx, &mut scripts[0]);
    assert!(host.commands.is_empty());
    assert!(host.host.functions.is_empty());
}

#[test]
fn test_reload_is_idempotent() {
    let (host, loader) = setup();
    let mut ctx = loader.new_context();
    let src = source(
        "mixed.sk",
        "on chat:\n  send \"a\"\non right click with priority LOW:\n  send \"b\"\ncommand /spawn:\n  trigger:\n    send \"c\"\n",
    );

    let mut scripts = loader.load_scripts(&mut ctx, std::slice::from_ref(&src));
    let events = host.events.snapshot();
    let commands = host.commands.names();
    assert_eq!(events.len(), 2);

    let first = scripts.remove(0);
    let generation = first.script.generation();
    let reloaded = loader.reload_script(&mut ctx, first, &src);
    assert!(reloaded.script.generation() > generation);
    assert_eq!(host.events.snapshot(), events);
    assert_eq!(host.commands.names(), commands);
}

#[test]
fn test_event_buffer_flushed_on_transition() {
    let (host, loader) = setup();
    let mut ctx = loader.new_context();

    loader.load_script(&mut ctx, &source("a.sk", "on chat:\n  send \"a\"\non join:\n  send \"b\"\n"));
    assert_eq!(ctx.data_ref::<EventData>().map(|d| d.len()), Some(2));
    assert_eq!(host.events.subscription_count(), 0);

    loader.load_script(&mut ctx, &source("b.sk", "on chat:\n  send \"c\"\n"));
    assert_eq!(host.events.subscription_count(), 2);
    assert_eq!(ctx.data_ref::<EventData>().map(|d| d.len()), Some(1));

    ctx.set_current_script(None);
    assert_eq!(host.events.subscription_count(), 3);
    assert_eq!(ctx.data_ref::<EventData>().map(|d| d.len()), Some(0));
}

#[test]
fn test_current_event_restored_after_failed_body() {
    let (host, loader) = setup();
    let mut ctx = loader.new_context();

    let loaded = loader.load_script(&mut ctx, &source("bad.sk", "on chat:\n  missing()\ncommand /x:\n  trigger:\n    missing()\n"));
    assert!(ctx.current_event().is_none());
    assert_eq!(loaded.info.triggers, 0);
    assert!(kinds(&ctx).contains(&ErrorKind::Bind));

    ctx.set_current_script(None);
    assert_eq!(host.events.subscription_count(), 0);
    assert!(host.commands.is_empty());
}

#[test]
fn test_split_priority_on_last_separator() {
    let (host, loader) = setup();
    let mut ctx = loader.new_context();
    let loaded = loader.load_script(
        &mut ctx,
        &source("odd.sk", "on click with priority NORMAL with priority HIGH:\n  send \"x\"\n"),
    );

    // The remaining expression is handed to the event as is
    assert_eq!(loaded.errors, 0);
    ctx.set_current_script(None);
    let triggers = host.events.triggers_for(&EventClass::new("interact"));
    assert_eq!(triggers.len(), 1);
    assert_eq!(triggers[0].0, EventPriority::High);
}

#[test]
fn test_invalid_priority_is_fatal() {
    let (_host, loader) = setup();
    let mut ctx = loader.new_context();
    loader.load_script(&mut ctx, &source("bad.sk", "on chat with priority URGENT:\n  send \"x\"\n"));
    assert_eq!(kinds(&ctx), vec![ErrorKind::Fatal]);
}

#[test]
fn test_self_registering_event() {
    let (host, loader) = setup();
    let mut ctx = loader.new_context();
    let scripts = loader.load_scripts(
        &mut ctx,
        &[source(
            "boot.sk",
            "on script load:\n  send \"loaded\"\non script load with priority HIGH:\n  send \"never\"\n",
        )],
    );

    assert_eq!(scripts[0].errors, 1);
    let diagnostic = &ctx.diagnostics()[0];
    assert_eq!(diagnostic.kind, ErrorKind::Parse);
    assert_eq!(diagnostic.line, Some(3));
    assert_eq!(host.events.self_registering_count(), 1);
    assert_eq!(host.effects.take(), vec!["send \"loaded\"".to_string()]);
}

#[test]
fn test_duplicate_command_across_scripts() {
    let (host, loader) = setup();
    let mut ctx = loader.new_context();
    let scripts = loader.load_scripts(
        &mut ctx,
        &[
            source("a.sk", "command /ping:\n  trigger:\n    send \"a\"\n"),
            source("b.sk", "command /ping:\n  trigger:\n    send \"b\"\n"),
        ],
    );

    assert_eq!(scripts[0].info.commands, 1);
    assert_eq!(scripts[1].info.commands, 0);
    assert_eq!(kinds(&ctx), vec![ErrorKind::Host]);
    assert_eq!(host.commands.len(), 1);
}

#[tokio::test]
async fn test_duplicate_command_from_worker_is_rolled_back() {
    let (host, loader) = setup();
    let loader = Arc::new(loader);

    let sources = vec![
        source("a.sk", "command /ping:\n  trigger:\n    send \"a\"\n"),
        source("b.sk", "command /ping:\n  trigger:\n    send \"b\"\n"),
    ];
    let (mut ctx, mut scripts) = loader.load_scripts_async(sources).await.unwrap();
    assert_eq!(scripts[1].errors, 0);
    assert_eq!(host.host.main_thread.pending(), 2);

    assert_eq!(loader.run_pending(&mut ctx, &mut scripts), 2);
    assert_eq!(host.commands.len(), 1);
    assert_eq!(scripts[0].errors, 0);
    assert_eq!(scripts[0].info.commands, 1);
    assert_eq!(scripts[1].errors, 1);
    assert_eq!(scripts[1].info.commands, 0);
    assert!(scripts[1].info.command_names.is_empty());
    assert_eq!(scripts[1].loaded_count(), 0);

    let diagnostics = ctx.diagnostics();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].kind, ErrorKind::Host);
    assert_eq!(diagnostics[0].script.as_deref(), Some("b.sk"));
    assert_eq!(diagnostics[0].line, Some(1));

    // The rejected copy must not take the surviving command down with it
    loader.unload_script(&mut ctx, &mut scripts[1]);
    assert!(host.commands.contains("ping"));
    assert!(host.commands.dispatch("ping", "", &host.environment()).unwrap());
    assert_eq!(host.effects.take(), vec!["send \"a\"".to_string()]);
}

#[test]
fn test_rejected_command_is_not_declared() {
    let (host, loader) = setup();
    let mut ctx = loader.new_context();
    let scripts = loader.load_scripts(
        &mut ctx,
        &[
            source("a.sk", "command /ping:\n  trigger:\n    send \"a\"\n"),
            source(
                "b.sk",
                "command /ping:\n  trigger:\n    send \"b\"\ncommand /ping:\n  trigger:\n    send \"c\"\n",
            ),
        ],
    );

    // Both copies reach the host, neither is a duplicate within b.sk
    assert_eq!(kinds(&ctx), vec![ErrorKind::Host, ErrorKind::Host]);
    assert_eq!(scripts[1].info.commands, 0);
    assert_eq!(host.commands.len(), 1);
}

#[test]
fn test_unload_before_boundary_unbinds_triggers() {
    let (host, loader) = setup();
    let before = host.events.snapshot();

    let mut ctx = loader.new_context();
    let mut loaded = loader.load_script(&mut ctx, &source("cancel.sk", "on chat with priority HIGHEST:\n  cancel event\n"));
    assert_eq!(host.events.subscription_count(), 0);

    loader.unload_script(&mut ctx, &mut loaded);
    assert_eq!(host.events.snapshot(), before);
    assert!(host.events.triggers_for(&EventClass::new("chat")).is_empty());
    assert_eq!(host.host.main_thread.pending(), 0);
}

#[test]
fn test_reload_before_boundary_keeps_one_subscription() {
    let (host, loader) = setup();
    let mut ctx = loader.new_context();
    let src = source("chat.sk", "on chat:\n  send \"a\"\n");

    let first = loader.load_script(&mut ctx, &src);
    let reloaded = loader.reload_script(&mut ctx, first, &src);
    assert_eq!(reloaded.errors, 0);
    assert_eq!(host.events.subscription_count(), 1);
    assert_eq!(host.events.triggers_for(&EventClass::new("chat")).len(), 1);
}

#[test]
fn test_options_flatten_round_trip() {
    let (_host, loader) = setup();
    let mut ctx = loader.new_context();
    let text = "options:\n  colors:\n    main: red\n    accent: blue\n  prefix: [x]\n";
    loader.load_script(&mut ctx, &source("opts.sk", text));

    let flat: Vec<(String, String)> = ctx
        .data_ref::<OptionsData>()
        .unwrap()
        .entries()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let rendered: String = flat.iter().map(|(k, v)| format!("{}: {}\n", k, v)).collect();
    let reparsed = SectionNode::parse("flat", &format!("options:\n{}", indent(&rendered))).unwrap();

    let mut again = loader.new_context();
    loader.load_script(&mut again, &ScriptSource { path: "flat.sk".into(), tree: reparsed });
    let mut second: Vec<(String, String)> = again
        .data_ref::<OptionsData>()
        .unwrap()
        .entries()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let mut first = flat;
    first.sort();
    second.sort();
    assert_eq!(first, second);
    assert!(first.contains(&("colors.main".to_string(), "red".to_string())));
}

fn indent(text: &str) -> String {
    text.lines().map(|l| format!("  {}\n", l)).collect()
}

type Log = Arc<Mutex<Vec<String>>>;

/// Records every phase it goes through as `phase name`
///
/// Headers are `trace <name> [priority]`. The names `fail`, `reject` and
/// `boom` make `init` error, `init` refuse and `load` panic.
struct Tracer {
    log: Log,
    name: String,
    priority: i32,
}

impl Tracer {
    fn record(&self, phase: &str) {
        self.log.lock().push(format!("{} {}", phase, self.name));
    }
}

impl Structure for Tracer {
    fn init(&mut self, _ctx: &mut ParserContext, result: &ParseResult, _node: &SectionNode) -> skript_scripting::Result<bool> {
        let header = result.regexes.first().cloned().unwrap_or_default();
        let mut parts = header.split_whitespace();
        self.name = parts.next().unwrap_or_default().to_string();
        self.priority = parts.next().and_then(|p| p.parse().ok()).unwrap_or(1000);
        self.record("init");
        match self.name.as_str() {
            "fail" => Err(ScriptError::parse(0, "trace refused")),
            "reject" => Ok(false),
            _ => Ok(true),
        }
    }

    fn preload(&mut self, _ctx: &mut ParserContext) -> skript_scripting::Result<()> {
        self.record("preload");
        Ok(())
    }

    fn load(&mut self, ctx: &mut ParserContext) -> skript_scripting::Result<()> {
        assert!(ctx.current_event().is_none());
        if self.name == "boom" {
            panic!("trace exploded");
        }
        self.record("load");
        Ok(())
    }

    fn after_load(&mut self, _ctx: &mut ParserContext) -> skript_scripting::Result<()> {
        self.record("after_load");
        Ok(())
    }

    fn unload(&mut self, _ctx: &mut ParserContext) -> skript_scripting::Result<()> {
        self.record("unload");
        Ok(())
    }

    fn priority(&self) -> Priority {
        Priority::new(self.priority)
    }

    fn describe(&self) -> String {
        format!("trace {}", self.name)
    }
}

fn tracer_registry(log: &Log) -> Arc<StructureRegistry> {
    let mut registry = StructureRegistry::new();
    let early = Arc::clone(log);
    registry
        .register_preloading_structure(
            "early",
            move || {
                Box::new(Tracer {
                    log: Arc::clone(&early),
                    name: String::new(),
                    priority: 1000,
                }) as Box<dyn Structure>
            },
            5,
            &["early <.+>"],
        )
        .unwrap();
    let normal = Arc::clone(log);
    registry
        .register_structure(
            "trace",
            move || {
                Box::new(Tracer {
                    log: Arc::clone(&normal),
                    name: String::new(),
                    priority: 1000,
                }) as Box<dyn Structure>
            },
            &["trace <.+>"],
        )
        .unwrap();
    Arc::new(registry)
}

fn tracer_script() -> ScriptSource {
    source(
        "tracers.sk",
        "trace b 20:\n  x\nearly e 30:\n  x\ntrace a 10:\n  x\ntrace c 20:\n  x\n",
    )
}

#[test]
fn test_phase_and_priority_order() {
    let log: Log = Arc::default();
    let host = InMemoryHost::new(SkriptConfig::default());
    let loader = ScriptLoader::new(tracer_registry(&log), host.host.clone());
    let mut ctx = loader.new_context();

    let mut loaded = loader.load_script(&mut ctx, &tracer_script());
    assert_eq!(loaded.errors, 0);
    let order: Vec<&str> = loaded.structures().iter().map(|s| s.key()).collect();
    assert_eq!(order, vec!["trace a 10", "trace b 20", "trace c 20", "early e 30"]);

    loader.unload_script(&mut ctx, &mut loaded);
    let expected = [
        "init e",
        "preload e",
        "init b",
        "init a",
        "init c",
        "preload a",
        "load a",
        "preload b",
        "load b",
        "preload c",
        "load c",
        "load e",
        "after_load a",
        "after_load b",
        "after_load c",
        "after_load e",
        "unload e",
        "unload c",
        "unload b",
        "unload a",
    ];
    assert_eq!(*log.lock(), expected.iter().map(|s| s.to_string()).collect::<Vec<_>>());
}

#[test]
fn test_failures_do_not_stop_other_structures() {
    let log: Log = Arc::default();
    let host = InMemoryHost::new(SkriptConfig::default());
    let loader = ScriptLoader::new(tracer_registry(&log), host.host.clone());
    let mut ctx = loader.new_context();

    let text = "trace fail:\n  x\ntrace reject:\n  x\ntrace boom 1:\n  x\ntrace ok 2:\n  x\nsomething else:\n  x\n";
    let mut loaded = loader.load_script(&mut ctx, &source("mixed.sk", text));

    assert_eq!(loaded.errors, 4);
    assert_eq!(
        kinds(&ctx),
        vec![ErrorKind::Parse, ErrorKind::Parse, ErrorKind::Parse, ErrorKind::Fatal]
    );
    let lines: Vec<_> = ctx.diagnostics().iter().map(|d| d.line).collect();
    assert_eq!(lines, vec![Some(1), Some(3), Some(9), Some(5)]);
    assert_eq!(loaded.loaded_count(), 1);

    loader.unload_script(&mut ctx, &mut loaded);
    let log = log.lock();
    assert!(log.contains(&"after_load ok".to_string()));
    assert!(!log.contains(&"after_load boom".to_string()));
    assert!(log.contains(&"unload ok".to_string()));
    assert!(!log.contains(&"unload boom".to_string()));
}

#[test]
fn test_load_folder() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.sk"), "function greet(name: text):\n  send \"hi {_name}\"\n").unwrap();
    std::fs::write(dir.path().join("b.sk"), "on join:\n  greet(\"Alex\")\n").unwrap();
    std::fs::write(dir.path().join("-c.sk"), "on join:\n  send \"disabled\"\n").unwrap();

    let (host, loader) = setup();
    let mut ctx = loader.new_context();
    let scripts = loader.load_folder(&mut ctx, dir.path()).unwrap();
    assert_eq!(scripts.len(), 2);
    assert!(scripts.iter().all(|s| s.errors == 0));

    let mut event = HostEvent::new("join");
    assert_eq!(host.fire(&mut event), 1);
    assert_eq!(host.effects.take(), vec!["send \"hi Alex\"".to_string()]);
}
