//! Template binding.
//!
//! Walks a component template once and records:
//! - named nodes (elements carrying an `id`), in document order
//! - per-node attribute bindings: attribute → referenced keys + normalized template
//! - child slots: text that is exactly `${key}` where `key` is a collection
//!
//! Text with any other placeholders binds to the synthetic `children`
//! attribute of its enclosing named node.
//!
//! Attribute references are not validated here: they may name a method
//! (inline callback) as well as a key. Text references must be keys.

pub mod placeholder;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;
use crate::schema::ParamSpec;
use crate::utils::html::{is_raw_text_element, is_void_element};
use crate::utils::suggest::close_matches;

/// Synthetic attribute name for text-content bindings.
pub const TEXT_ATTR: &str = "children";

/// One attribute (or text) binding on a named node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttrBinding {
    pub attr: String,
    pub refs: Vec<String>,
    pub template: String,
}

/// Result of binding a template against declared keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateBinding {
    pub nodes: Vec<String>,
    pub attrs: BTreeMap<String, Vec<AttrBinding>>,
    /// node → child-slot key
    pub children: BTreeMap<String, String>,
}

impl TemplateBinding {
    pub fn has_node(&self, node: &str) -> bool {
        self.nodes.iter().any(|n| n == node)
    }

    /// Node hosting the child slot for `key`.
    pub fn slot_node(&self, key: &str) -> Option<&str> {
        self.children
            .iter()
            .find(|(_, k)| k.as_str() == key)
            .map(|(node, _)| node.as_str())
    }
}

/// Element enclosing the node being bound.
struct Element {
    tag: String,
    id: Option<String>,
}

pub fn bind_template(template: &str, params: &[ParamSpec]) -> Result<TemplateBinding, SchemaError> {
    let dom = tl::parse(template, tl::ParserOptions::default())
        .map_err(|err| SchemaError::Markup(format!("{err:?}")))?;
    let parser = dom.parser();

    let mut binding = TemplateBinding::default();
    for handle in dom.children() {
        bind_node(&mut binding, *handle, parser, None, params)?;
    }
    Ok(binding)
}

/// Bind one parsed node and its subtree, in document order.
fn bind_node(
    binding: &mut TemplateBinding,
    handle: tl::NodeHandle,
    parser: &tl::Parser,
    parent: Option<&Element>,
    params: &[ParamSpec],
) -> Result<(), SchemaError> {
    let Some(node) = handle.get(parser) else {
        return Ok(());
    };

    match node {
        tl::Node::Tag(tag) => {
            let element = bind_element(binding, tag)?;
            if is_raw_text_element(&element.tag) {
                return Ok(());
            }
            // void elements never own text
            let owner = match is_void_element(&element.tag) {
                true => parent,
                false => Some(&element),
            };
            for child in tag.children().top().iter() {
                bind_node(binding, *child, parser, owner, params)?;
            }
            Ok(())
        }
        tl::Node::Raw(bytes) => bind_text(binding, parent, &bytes.as_utf8_str(), params),
        tl::Node::Comment(_) => Ok(()),
    }
}

/// Register the node id and attribute bindings of one element.
fn bind_element(binding: &mut TemplateBinding, tag: &tl::HTMLTag) -> Result<Element, SchemaError> {
    let name = tag.name().as_utf8_str().to_ascii_lowercase();
    let attributes = tag.attributes();
    let id = attributes.id().map(|id| id.as_utf8_str().into_owned());

    if let Some(id) = &id {
        if binding.has_node(id) {
            return Err(SchemaError::DuplicateNode(id.clone()));
        }
        binding.nodes.push(id.clone());
    }

    let mut bound = Vec::new();
    for (attr, value) in attributes.iter() {
        let Some(value) = value.filter(|_| attr != "id") else {
            continue;
        };
        let refs = placeholder::references(&value);
        if refs.is_empty() {
            continue;
        }
        if id.is_none() {
            return Err(SchemaError::MissingNodeId {
                tag: name,
                attr: attr.into_owned(),
            });
        }
        bound.push(AttrBinding {
            attr: attr.into_owned(),
            refs,
            template: placeholder::normalize(&value),
        });
    }

    if let Some(node) = &id
        && !bound.is_empty()
    {
        bound.sort_by(|a, b| a.attr.cmp(&b.attr));
        binding.attrs.entry(node.clone()).or_default().extend(bound);
    }
    Ok(Element { tag: name, id })
}

fn bind_text(
    binding: &mut TemplateBinding,
    parent: Option<&Element>,
    text: &str,
    params: &[ParamSpec],
) -> Result<(), SchemaError> {
    if !placeholder::contains_placeholder(text) {
        return Ok(());
    }
    let refs = placeholder::references(text);
    if refs.is_empty() {
        return Ok(());
    }

    let Some(node) = parent.and_then(|e| e.id.clone()) else {
        return Err(SchemaError::MissingNodeId {
            tag: parent.map_or_else(|| "#document".to_string(), |e| e.tag.clone()),
            attr: TEXT_ATTR.to_string(),
        });
    };

    if let Some(expr) = placeholder::sole_expression(text)
        && params
            .iter()
            .any(|p| p.name == expr && p.kind.is_collection())
    {
        binding.children.insert(node, expr.to_string());
        return Ok(());
    }

    for name in &refs {
        if !params.iter().any(|p| &p.name == name) {
            return Err(SchemaError::UnknownParameter {
                name: name.clone(),
                suggestions: close_matches(name, params.iter().map(|p| p.name.as_str())),
            });
        }
    }

    binding.attrs.entry(node).or_default().push(AttrBinding {
        attr: TEXT_ATTR.to_string(),
        refs,
        template: placeholder::normalize(text),
    });
    Ok(())
}

/// HTML shipped to the client: node ids suffixed with `-${id}` and child-slot
/// placeholders removed.
pub fn render_template(template: &str, binding: &TemplateBinding) -> String {
    let mut html = template.to_string();
    for name in &binding.nodes {
        html = html
            .replace(&format!("id='{name}'"), &format!("id='{name}-${{id}}'"))
            .replace(&format!("id=\"{name}\""), &format!("id=\"{name}-${{id}}\""));
    }
    for key in binding.children.values() {
        html = html.replace(&format!("${{{key}}}"), "");
    }
    html
}
