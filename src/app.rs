//! Plugin discovery and two-phase wiring: every `[plugin <name>]` section
//! in the configuration declares one plugin instance. All plugins are
//! constructed (and their history ties resolved) before any `bootstrap`
//! runs, since bootstrap-time signal subscriptions assume every component
//! already exists. A failing plugin aborts only itself; the others
//! continue.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::rc::Rc;

use crate::clipboard::{SelectionBridge, TextSource};
use crate::exchange::{ExchangeCoordinator, SuggestSink};
use crate::menu::provider::{CallableRegistry, ItemProvider, ProviderContext, ProviderLayout};
use crate::menu::{HistoryPicker, MultiPicker};
use crate::models::HistoryHandle;
use crate::platform::{HotkeyBinder, Notifier, Spawner};
use crate::storage::{
    expand_user, human_bool, ConfigError, ConfigSource, FileRecordStore, PersistentHistory,
    PluginOptions,
};

const PLUGIN_PREFIX: &str = "plugin ";
const DEFAULT_HISTFILE: &str = "~/.klemmbrett.history";

/// Platform collaborators handed in by the hosting process.
pub struct Platform {
    pub notifier: Rc<dyn Notifier>,
    pub spawner: Rc<dyn Spawner>,
    pub hotkeys: Rc<dyn HotkeyBinder>,
    pub sink: Rc<dyn SuggestSink>,
    pub callables: Rc<CallableRegistry>,
}

/// One constructed plugin, ready for bootstrap.
pub enum PluginInstance {
    History(Rc<HistoryPicker>),
    Multi(Rc<MultiPicker>),
    Persistent(Rc<PersistentHistory>),
    Exchange(Rc<ExchangeCoordinator>),
}

impl PluginInstance {
    pub fn kind(&self) -> &'static str {
        match self {
            PluginInstance::History(_) => "history",
            PluginInstance::Multi(_) => "multi",
            PluginInstance::Persistent(_) => "persistent",
            PluginInstance::Exchange(_) => "exchange",
        }
    }
}

/// The wired application: the selection bridge plus all plugins that made
/// it through construction and bootstrap.
pub struct App {
    bridge: Rc<SelectionBridge>,
    plugins: Vec<(String, PluginInstance)>,
    failures: Vec<(String, anyhow::Error)>,
}

impl App {
    /// Construct and bootstrap everything the configuration declares.
    pub fn build(
        config: &dyn ConfigSource,
        clipboard: Box<dyn TextSource>,
        primary: Box<dyn TextSource>,
        platform: Platform,
    ) -> Result<App> {
        let sync = config
            .get("klemmbrett", "sync")
            .as_deref()
            .and_then(human_bool)
            .unwrap_or(true);
        let bridge = Rc::new(SelectionBridge::new(clipboard, primary, sync));

        let declarations = plugin_declarations(config)?;

        let mut ties: HashMap<String, HistoryHandle> = HashMap::new();
        let mut plugins: Vec<(String, PluginInstance)> = Vec::new();
        let mut failures: Vec<(String, anyhow::Error)> = Vec::new();

        let mut kinds: Vec<Option<String>> = Vec::with_capacity(declarations.len());
        for (name, options) in &declarations {
            match plugin_kind(name, options) {
                Ok(kind) => kinds.push(Some(kind)),
                Err(e) => {
                    log::error!("Plugin {:?} has no kind: {:#}", name, e);
                    failures.push((name.clone(), e));
                    kinds.push(None);
                }
            }
        }

        // Phase 1a: history pickers first; they own the histories every
        // other plugin ties to.
        for ((name, options), kind) in declarations.iter().zip(&kinds) {
            if kind.as_deref() != Some("history") {
                continue;
            }
            let picker = Rc::new(HistoryPicker::new(name.clone(), options, bridge.clone()));
            ties.insert(name.clone(), picker.history());
            plugins.push((name.clone(), PluginInstance::History(picker)));
        }

        // Phase 1b: everything else, resolving history ties by plugin name.
        for ((name, options), kind) in declarations.iter().zip(&kinds) {
            let kind = match kind.as_deref() {
                Some("history") | None => continue,
                Some(kind) => kind,
            };

            match construct(name, kind, options, config, &ties, &bridge, &platform) {
                Ok(instance) => plugins.push((name.clone(), instance)),
                Err(e) => {
                    log::error!("Plugin {:?} failed to construct: {:#}", name, e);
                    failures.push((name.clone(), e));
                }
            }
        }

        // Phase 2: bootstrap, history pickers first, then the dependents
        // in declaration order. Nothing bootstraps before everything is
        // constructed.
        let mut bootstrapped = Vec::with_capacity(plugins.len());
        for (name, instance) in plugins {
            match bootstrap(&instance, &bridge, &platform) {
                Ok(()) => {
                    log::info!("Plugin {:?} ({}) ready", name, instance.kind());
                    bootstrapped.push((name, instance));
                }
                Err(e) => {
                    log::error!("Plugin {:?} failed to bootstrap: {:#}", name, e);
                    failures.push((name, e));
                }
            }
        }

        Ok(App {
            bridge,
            plugins: bootstrapped,
            failures,
        })
    }

    pub fn bridge(&self) -> Rc<SelectionBridge> {
        self.bridge.clone()
    }

    pub fn plugins(&self) -> &[(String, PluginInstance)] {
        &self.plugins
    }

    /// Plugins that were declared but aborted during construction or
    /// bootstrap.
    pub fn failures(&self) -> &[(String, anyhow::Error)] {
        &self.failures
    }

    pub fn plugin(&self, name: &str) -> Option<&PluginInstance> {
        self.plugins
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, instance)| instance)
    }
}

/// All `[plugin <name>]` sections with their options, in declaration order.
fn plugin_declarations(
    config: &dyn ConfigSource,
) -> Result<Vec<(String, PluginOptions)>> {
    let mut declarations = Vec::new();
    for section in config.sections() {
        if let Some(name) = section.strip_prefix(PLUGIN_PREFIX) {
            let options = PluginOptions::from_pairs(config.items(&section)?);
            declarations.push((name.trim().to_string(), options));
        }
    }
    Ok(declarations)
}

fn plugin_kind(name: &str, options: &PluginOptions) -> Result<String> {
    options
        .get("plugin")
        .map(str::to_string)
        .ok_or_else(|| {
            ConfigError::MissingKey {
                section: format!("{}{}", PLUGIN_PREFIX, name),
                key: "plugin".to_string(),
            }
            .into()
        })
}

fn resolve_tie(
    name: &str,
    options: &PluginOptions,
    ties: &HashMap<String, HistoryHandle>,
) -> Result<HistoryHandle> {
    let tie = options.get_or("history", "history");
    ties.get(&tie).cloned().ok_or_else(|| {
        ConfigError::UnknownTie {
            plugin: name.to_string(),
            tie,
        }
        .into()
    })
}

fn layout_with_overrides(options: &PluginOptions, defaults: ProviderLayout) -> ProviderLayout {
    ProviderLayout {
        simple_section: options.get_or("simple-section", &defaults.simple_section),
        simple_default_kind: options
            .get_or("simple-section-default", &defaults.simple_default_kind),
        complex_prefix: options.get_or("complex-section-prefix", &defaults.complex_prefix),
    }
}

/// The plugin registry: a string kind maps to a constructor. Unknown kinds
/// are a configuration error, never a runtime lookup.
fn construct(
    name: &str,
    kind: &str,
    options: &PluginOptions,
    config: &dyn ConfigSource,
    ties: &HashMap<String, HistoryHandle>,
    bridge: &Rc<SelectionBridge>,
    platform: &Platform,
) -> Result<PluginInstance> {
    match kind {
        "snippets" | "actions" => {
            let defaults = if kind == "snippets" {
                ProviderLayout::snippets()
            } else {
                ProviderLayout::actions()
            };
            let layout = layout_with_overrides(options, defaults);
            let provider = ItemProvider::from_config(config, &layout)
                .with_context(|| format!("Item source for plugin {:?}", name))?;
            let history = resolve_tie(name, options, ties)?;

            let picker = if kind == "snippets" {
                MultiPicker::snippets(name, options, provider, history, bridge.clone())
            } else {
                MultiPicker::actions(name, options, provider, history, bridge.clone())
            };
            Ok(PluginInstance::Multi(Rc::new(picker)))
        }
        "persistent" => {
            let history = resolve_tie(name, options, ties)?;
            let histfile = expand_user(&options.get_or("histfile", DEFAULT_HISTFILE));
            let store = Rc::new(std::cell::RefCell::new(FileRecordStore::new(histfile)));
            Ok(PluginInstance::Persistent(Rc::new(PersistentHistory::new(
                store, history,
            ))))
        }
        "exchange" => {
            let history = resolve_tie(name, options, ties)?;
            let coordinator = ExchangeCoordinator::new(
                options,
                history,
                bridge.clone(),
                platform.notifier.clone(),
            )?;
            Ok(PluginInstance::Exchange(Rc::new(coordinator)))
        }
        unknown => Err(ConfigError::UnknownPlugin(unknown.to_string()).into()),
    }
}

fn bootstrap(
    instance: &PluginInstance,
    bridge: &Rc<SelectionBridge>,
    platform: &Platform,
) -> Result<()> {
    match instance {
        PluginInstance::History(picker) => {
            picker.bootstrap(bridge, platform.hotkeys.as_ref());
            Ok(())
        }
        PluginInstance::Multi(picker) => {
            let ctx = ProviderContext {
                history: picker.history(),
                notifier: platform.notifier.clone(),
                spawner: platform.spawner.clone(),
                registry: platform.callables.clone(),
            };
            picker.bootstrap(&ctx, platform.hotkeys.as_ref())
        }
        PluginInstance::Persistent(persist) => persist.bootstrap(),
        PluginInstance::Exchange(coordinator) => {
            coordinator.bootstrap(platform.hotkeys.as_ref(), platform.sink.clone());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard::MemorySource;
    use crate::exchange::LogSuggestSink;
    use crate::platform::{LogNotifier, NullHotkeys, ProcessSpawner};
    use crate::storage::TomlConfig;

    fn test_platform() -> Platform {
        Platform {
            notifier: Rc::new(LogNotifier),
            spawner: Rc::new(ProcessSpawner),
            hotkeys: Rc::new(NullHotkeys),
            sink: Rc::new(LogSuggestSink),
            callables: Rc::new(CallableRegistry::new()),
        }
    }

    fn build(config: &str) -> App {
        let config = TomlConfig::parse(config).unwrap();
        App::build(
            &config,
            Box::new(MemorySource::new()),
            Box::new(MemorySource::new()),
            test_platform(),
        )
        .unwrap()
    }

    #[test]
    fn test_plugins_wire_in_declaration_order() {
        let app = build(
            r#"
[snippets]
mail = "me@example.com"

["plugin history"]
plugin = "history"
length = 5

["plugin snippets"]
plugin = "snippets"

["plugin persistent"]
plugin = "persistent"
histfile = "/tmp/klemmbrett-app-test-wire.history"
"#,
        );

        assert!(app.failures().is_empty());
        let names: Vec<&str> = app.plugins().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["history", "snippets", "persistent"]);

        let _ = std::fs::remove_file("/tmp/klemmbrett-app-test-wire.history");
    }

    #[test]
    fn test_selected_text_reaches_tied_plugins() {
        let app = build(
            r#"
["plugin history"]
plugin = "history"
"#,
        );

        app.bridge().text_selected().emit(&"copied".to_string()).unwrap();

        match app.plugin("history").unwrap() {
            PluginInstance::History(picker) => {
                assert_eq!(picker.history().borrow().top().unwrap(), "copied");
            }
            _ => panic!("expected history picker"),
        }
    }

    #[test]
    fn test_unknown_plugin_kind_fails_only_that_plugin() {
        let app = build(
            r#"
["plugin history"]
plugin = "history"

["plugin mystery"]
plugin = "teleporter"
"#,
        );

        assert_eq!(app.plugins().len(), 1);
        assert_eq!(app.failures().len(), 1);
        assert_eq!(app.failures()[0].0, "mystery");
    }

    #[test]
    fn test_missing_item_section_fails_only_that_plugin() {
        let app = build(
            r#"
["plugin history"]
plugin = "history"

["plugin snippets"]
plugin = "snippets"
"#,
        );

        // No [snippets] section declared anywhere.
        assert_eq!(app.plugins().len(), 1);
        assert_eq!(app.failures().len(), 1);
    }

    #[test]
    fn test_unresolved_tie_is_a_config_error() {
        let app = build(
            r#"
[snippets]
mail = "me@example.com"

["plugin snippets"]
plugin = "snippets"
history = "nonexistent"
"#,
        );

        assert!(app.plugins().is_empty());
        assert_eq!(app.failures().len(), 1);
    }

    #[test]
    fn test_exchange_plugin_ties_to_history() {
        let app = build(
            r#"
["plugin history"]
plugin = "history"

["plugin exchange"]
plugin = "exchange"
"user.alice" = "alice.example:7000"
"#,
        );

        assert!(app.failures().is_empty());
        match app.plugin("exchange").unwrap() {
            PluginInstance::Exchange(coordinator) => {
                assert_eq!(coordinator.peers().len(), 1);
            }
            _ => panic!("expected exchange coordinator"),
        }
    }
}
