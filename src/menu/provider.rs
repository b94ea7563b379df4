use anyhow::Result;
use std::collections::HashMap;
use std::rc::Rc;

use crate::models::item::ValueFn;
use crate::models::{HistoryHandle, Item, Producer};
use crate::platform::{Notifier, Spawner};
use crate::storage::{ConfigError, ConfigSource};

/// Where a provider finds its items in the configuration: one flat section
/// of `label[.kind] = value` pairs plus any section whose name carries the
/// declared prefix.
#[derive(Debug, Clone)]
pub struct ProviderLayout {
    pub simple_section: String,
    pub simple_default_kind: String,
    pub complex_prefix: String,
}

impl ProviderLayout {
    /// Layout of the actions picker: `[actions]` plus `[action <label>]`
    /// sections, bare keys defaulting to the `action` kind.
    pub fn actions() -> Self {
        ProviderLayout {
            simple_section: "actions".to_string(),
            simple_default_kind: "action".to_string(),
            complex_prefix: "action ".to_string(),
        }
    }

    /// Layout of the snippets picker: `[snippets]` plus `[snippet <label>]`
    /// sections, bare keys defaulting to the `value` kind.
    pub fn snippets() -> Self {
        ProviderLayout {
            simple_section: "snippets".to_string(),
            simple_default_kind: "value".to_string(),
            complex_prefix: "snippet ".to_string(),
        }
    }
}

const KIND_SEPARATOR: char = '.';

/// Resolves a `callable` option to a producer factory. Unknown keys are a
/// configuration error at bootstrap, never a runtime import attempt.
type CallableFactory = Rc<dyn Fn(&HashMap<String, String>, &ProviderContext) -> Result<ValueFn>>;

#[derive(Default)]
pub struct CallableRegistry {
    factories: HashMap<String, CallableFactory>,
}

impl CallableRegistry {
    pub fn new() -> Self {
        CallableRegistry::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&HashMap<String, String>, &ProviderContext) -> Result<ValueFn> + 'static,
    {
        self.factories.insert(name.into(), Rc::new(factory));
    }

    fn get(&self, name: &str) -> Option<&CallableFactory> {
        self.factories.get(name)
    }
}

/// Everything producer compilation needs access to: the tied history, the
/// notification and process-spawn sinks, and the callable registry.
pub struct ProviderContext {
    pub history: HistoryHandle,
    pub notifier: Rc<dyn Notifier>,
    pub spawner: Rc<dyn Spawner>,
    pub registry: Rc<CallableRegistry>,
}

/// A compiled menu entry plus the global shortcut the configuration
/// declared for it, if any.
#[derive(Clone, Debug)]
pub struct CompiledItem {
    pub item: Item,
    pub shortcut: Option<String>,
}

/// Ordered list of `(label, option-map)` pairs harvested from the
/// configuration: flat-section items first, then prefixed sections, each
/// group in declaration order. Built once at bootstrap and static
/// afterwards.
pub struct ItemProvider {
    raw: Vec<(String, HashMap<String, String>)>,
}

impl ItemProvider {
    pub fn from_config(
        config: &dyn ConfigSource,
        layout: &ProviderLayout,
    ) -> Result<Self, ConfigError> {
        let mut raw = Vec::new();

        // The flat section is the plugin's item source; without it the
        // plugin cannot bootstrap.
        for (key, value) in config.items(&layout.simple_section)? {
            let (label, kind) = match key.rsplit_once(KIND_SEPARATOR) {
                Some((label, kind)) => (label.to_string(), kind.to_string()),
                None => (key, layout.simple_default_kind.clone()),
            };
            raw.push((label, HashMap::from([(kind, value)])));
        }

        for section in config.sections() {
            if let Some(label) = section.strip_prefix(&layout.complex_prefix) {
                let options: HashMap<String, String> =
                    config.items(&section)?.into_iter().collect();
                raw.push((label.to_string(), options));
            }
        }

        Ok(ItemProvider { raw })
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Compile every option-map into a producer by folding over the
    /// recognized kinds in fixed order; each present kind wraps the
    /// producer built so far. The seed yields the history's current top
    /// entry, converting an empty history into a user notification rather
    /// than an error.
    pub fn compile(&self, ctx: &ProviderContext) -> Result<Vec<CompiledItem>> {
        let mut compiled = Vec::with_capacity(self.raw.len());

        for (label, options) in &self.raw {
            let mut producer = history_top(ctx);

            if let Some(value) = options.get("value") {
                let value = value.clone();
                producer = Rc::new(move || Some(value.clone()));
            }

            if let Some(name) = options.get("callable") {
                let factory = ctx
                    .registry
                    .get(name)
                    .ok_or_else(|| ConfigError::UnknownCallable(name.clone()))?;
                producer = (**factory)(options, ctx)?;
            }

            if let Some(template) = options.get("action") {
                producer = wrap_action(template.clone(), producer, ctx.spawner.clone());
            }

            if let Some(body) = options.get("notify") {
                let notifier = ctx.notifier.clone();
                let body = body.clone();
                producer = Rc::new(move || {
                    notifier.notify("Klemmbrett", &body);
                    None
                });
            }

            compiled.push(CompiledItem {
                item: Item::new(label.clone(), Producer::Value(producer)),
                shortcut: options.get("shortcut").cloned(),
            });
        }

        Ok(compiled)
    }
}

/// Fold seed: the current top entry. An empty history surfaces as a
/// notification, not a propagated error.
fn history_top(ctx: &ProviderContext) -> ValueFn {
    let history = ctx.history.clone();
    let notifier = ctx.notifier.clone();
    Rc::new(move || match history.borrow().top() {
        Ok(top) => Some(top.to_string()),
        Err(_) => {
            log::info!("History is empty");
            notifier.notify("Klemmbrett", "The history is empty");
            None
        }
    })
}

/// Shell action: substitute the wrapped producer's value into the command
/// template and hand the result to the spawn sink. Produces no value of
/// its own, so activating the entry never touches the clipboard.
fn wrap_action(template: String, inner: ValueFn, spawner: Rc<dyn Spawner>) -> ValueFn {
    Rc::new(move || {
        let value = (*inner)()?;
        spawner.spawn(&[
            "/bin/bash".to_string(),
            "-c".to_string(),
            template.replace("%s", &value),
        ]);
        None
    })
}
