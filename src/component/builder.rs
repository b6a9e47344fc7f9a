//! Component type construction.
//!
//! Everything is validated in `build()` before the type exists:
//!
//! 1. parameter names are unique and defaults are valid
//! 2. child configs name declared parameters and known slot kinds
//! 3. the template binds (nodes, attributes, slots)
//! 4. attribute references resolve to a parameter or a method
//! 5. renames and transforms name declared parameters; template-bound
//!    parameters stay exposed
//! 6. DOM-event subscriptions name template nodes
//!
//! Convention handlers (`_{node}_{event}`) and the client data model are
//! derived afterwards.

use std::collections::BTreeMap;
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use super::{ChildSlot, ChildSlotKind, ComponentType, InlineCallback, Method};
use crate::component::Component;
use crate::error::{CapabilityError, Result, SchemaError};
use crate::events::DomEvent;
use crate::schema::{ParamSpec, construct_data_model};
use crate::sync::Transforms;
use crate::template::{AttrBinding, bind_template, render_template};
use crate::utils::suggest::close_matches;
use crate::value::Value;

struct ChildConfig {
    param: String,
    kind: String,
    template: Option<String>,
}

pub struct ComponentTypeBuilder {
    name: String,
    template: String,
    params: Vec<ParamSpec>,
    child_config: Vec<ChildConfig>,
    dom_events: Vec<(String, Vec<String>)>,
    methods: Vec<(String, Method)>,
    transforms: Transforms,
    scripts: Vec<(String, String)>,
    data_param: Option<String>,
    selection_param: Option<String>,
}

impl ComponentTypeBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template: String::new(),
            params: Vec::new(),
            child_config: Vec::new(),
            dom_events: Vec::new(),
            methods: Vec::new(),
            transforms: Transforms::default(),
            scripts: Vec::new(),
            data_param: None,
            selection_param: None,
        }
    }

    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    pub fn params(mut self, specs: impl IntoIterator<Item = ParamSpec>) -> Self {
        self.params.extend(specs);
        self
    }

    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    /// Declare the slot kind (`model`, `template` or `literal`) for `param`.
    pub fn child_type(mut self, param: impl Into<String>, kind: impl Into<String>) -> Self {
        let param = param.into();
        let kind = kind.into();
        match self.child_config.iter_mut().find(|c| c.param == param) {
            Some(config) => config.kind = kind,
            None => self.child_config.push(ChildConfig {
                param,
                kind,
                template: None,
            }),
        }
        self
    }

    /// Wrap each child of `param` in `template` (implies kind `template`).
    pub fn child_template(mut self, param: impl Into<String>, template: impl Into<String>) -> Self {
        let param = param.into();
        let template = Some(template.into());
        match self.child_config.iter_mut().find(|c| c.param == param) {
            Some(config) => config.template = template,
            None => self.child_config.push(ChildConfig {
                param,
                kind: ChildSlotKind::Template.to_string(),
                template,
            }),
        }
        self
    }

    pub fn dom_events<I, S>(mut self, node: impl Into<String>, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dom_events
            .push((node.into(), events.into_iter().map(Into::into).collect()));
        self
    }

    pub fn method<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Component, &DomEvent) + Send + Sync + 'static,
    {
        self.methods.push((name.into(), Arc::new(f)));
        self
    }

    /// Rename `param` on the client, or hide it with `None`.
    pub fn rename(mut self, param: impl Into<String>, property: Option<&str>) -> Self {
        self.transforms.rename(param, property.map(str::to_string));
        self
    }

    pub fn transform_outbound<F>(mut self, param: impl Into<String>, f: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.transforms.outbound(param, Arc::new(f));
        self
    }

    pub fn transform_inbound<F>(mut self, param: impl Into<String>, f: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.transforms.inbound(param, Arc::new(f));
        self
    }

    /// Client script run when `trigger` changes (`render` runs on mount).
    pub fn script(mut self, trigger: impl Into<String>, source: impl Into<String>) -> Self {
        self.scripts.push((trigger.into(), source.into()));
        self
    }

    /// Column-oriented parameter targeted by stream / patch.
    pub fn data_param(mut self, param: impl Into<String>) -> Self {
        self.data_param = Some(param.into());
        self
    }

    /// Parameter holding selected row indices.
    pub fn selection_param(mut self, param: impl Into<String>) -> Self {
        self.selection_param = Some(param.into());
        self
    }

    pub fn build(self) -> Result<Arc<ComponentType>> {
        let names = self.check_params()?;
        let configs = self.check_child_config(&names)?;
        let unknown = |name: &str| SchemaError::UnknownParameter {
            name: name.to_string(),
            suggestions: close_matches(name, self.params.iter().map(|p| p.name.as_str())),
        };

        let mut binding = bind_template(&self.template, &self.params)?;
        let inline_callbacks = self.resolve_references(&mut binding, &names)?;

        for key in self.transforms.keys() {
            if !names.contains(key) {
                return Err(unknown(key).into());
            }
        }
        for key in [&self.data_param, &self.selection_param].into_iter().flatten() {
            if !names.contains(key.as_str()) {
                return Err(unknown(key).into());
            }
        }
        let bound = binding
            .attrs
            .values()
            .flatten()
            .flat_map(|b| b.refs.iter())
            .chain(binding.children.values());
        for key in bound {
            if !self.transforms.is_exposed(key) {
                return Err(CapabilityError {
                    owner: self.name.clone(),
                    name: key.clone(),
                }
                .into());
            }
        }

        let mut dom_events: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (node, events) in &self.dom_events {
            if !binding.has_node(node) {
                return Err(SchemaError::UnknownEventNode {
                    node: node.clone(),
                    nodes: binding.nodes.clone(),
                }
                .into());
            }
            let declared = dom_events.entry(node.clone()).or_default();
            for event in events {
                if !declared.contains(event) {
                    declared.push(event.clone());
                }
            }
        }

        let handlers = convention_handlers(&binding.nodes, self.methods.iter().map(|(n, _)| n.as_str()));

        let slots: BTreeMap<String, ChildSlot> = binding
            .children
            .iter()
            .map(|(node, param)| {
                let (kind, template) = configs.get(param.as_str()).cloned().unwrap_or_default();
                let slot = ChildSlot {
                    node: node.clone(),
                    param: param.clone(),
                    kind,
                    template,
                };
                (param.clone(), slot)
            })
            .collect();

        let projected = self.params.iter().filter(|p| !p.internal && !slots.contains_key(&p.name));
        let data_model = construct_data_model(
            &self.name,
            projected.filter_map(|p| self.transforms.property_name(&p.name).map(|name| (name, p))),
        )?;

        let html = render_template(&self.template, &binding);
        let mut scripts: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (trigger, source) in self.scripts {
            scripts.entry(trigger).or_default().push(source);
        }

        crate::debug!(
            "sync";
            "built {}: {} node(s), {} slot(s), {} propert(ies)",
            self.name,
            binding.nodes.len(),
            slots.len(),
            data_model.properties().len()
        );

        Ok(Arc::new(ComponentType {
            name: self.name,
            template: self.template,
            html,
            params: self.params,
            binding,
            slots,
            data_model: Arc::new(data_model),
            dom_events,
            inline_callbacks,
            methods: self.methods,
            handlers,
            transforms: self.transforms,
            scripts,
            data_param: self.data_param,
            selection_param: self.selection_param,
        }))
    }

    fn check_params(&self) -> Result<FxHashSet<&str>, SchemaError> {
        let mut names = FxHashSet::default();
        for spec in &self.params {
            if !names.insert(spec.name.as_str()) {
                return Err(SchemaError::DuplicateParameter(spec.name.clone()));
            }
            if !spec.kind.accepts(&spec.default) {
                return Err(SchemaError::InvalidDefault {
                    param: spec.name.clone(),
                    expected: spec.kind.to_string(),
                });
            }
        }
        Ok(names)
    }

    fn check_child_config(
        &self,
        names: &FxHashSet<&str>,
    ) -> Result<FxHashMap<&str, (ChildSlotKind, Option<String>)>, SchemaError> {
        let mut configs = FxHashMap::default();
        for config in &self.child_config {
            if !names.contains(config.param.as_str()) {
                return Err(SchemaError::UnknownChildConfig(config.param.clone()));
            }
            let kind = config
                .kind
                .parse::<ChildSlotKind>()
                .map_err(|kind| SchemaError::InvalidChildType {
                    param: config.param.clone(),
                    kind,
                })?;
            configs.insert(config.param.as_str(), (kind, config.template.clone()));
        }
        Ok(configs)
    }

    /// Split attribute references into state keys and inline callbacks.
    fn resolve_references(
        &self,
        binding: &mut crate::template::TemplateBinding,
        names: &FxHashSet<&str>,
    ) -> Result<Vec<InlineCallback>, SchemaError> {
        let mut callbacks = Vec::new();
        let mut resolved: BTreeMap<String, Vec<AttrBinding>> = BTreeMap::new();

        for (node, bindings) in std::mem::take(&mut binding.attrs) {
            for attr in bindings {
                let mut refs = Vec::with_capacity(attr.refs.len());
                for name in attr.refs {
                    if names.contains(name.as_str()) {
                        refs.push(name);
                    } else if self.methods.iter().any(|(m, _)| *m == name) {
                        callbacks.push(InlineCallback {
                            node: node.clone(),
                            attr: attr.attr.clone(),
                            method: name,
                        });
                    } else {
                        let candidates = self
                            .params
                            .iter()
                            .map(|p| p.name.as_str())
                            .chain(self.methods.iter().map(|(m, _)| m.as_str()));
                        return Err(SchemaError::UnknownReference {
                            suggestions: close_matches(&name, candidates),
                            name,
                        });
                    }
                }
                if !refs.is_empty() {
                    resolved.entry(node.clone()).or_default().push(AttrBinding {
                        attr: attr.attr,
                        refs,
                        template: attr.template,
                    });
                }
            }
        }

        binding.attrs = resolved;
        Ok(callbacks)
    }
}

/// Map `_{node}_{event}` method names to `(node, event)`, preferring the
/// longest matching node name.
fn convention_handlers<'a>(
    nodes: &[String],
    methods: impl Iterator<Item = &'a str>,
) -> FxHashMap<(String, String), String> {
    let mut handlers = FxHashMap::default();
    for method in methods {
        let Some(rest) = method.strip_prefix('_') else {
            continue;
        };
        let matched = nodes
            .iter()
            .filter_map(|node| {
                let event = rest.strip_prefix(node.as_str())?.strip_prefix('_')?;
                (!event.is_empty()).then_some((node, event))
            })
            .max_by_key(|(node, _)| node.len());
        if let Some((node, event)) = matched {
            handlers.insert((node.clone(), event.to_string()), method.to_string());
        }
    }
    handlers
}
