// SPDX-FileCopyrightText: 2026 Wacast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message template model and placeholder extraction.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_.]+)\s*\}\}").expect("placeholder pattern is valid")
});

/// Section of a template a component belongs to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Header,
    Body,
    Footer,
    Button,
}

/// One component of an approved template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateComponent {
    pub kind: ComponentKind,
    /// Component text with `{{n}}` or `{{name}}` placeholders.
    #[serde(default)]
    pub text: Option<String>,
    /// Button position; only meaningful for buttons.
    #[serde(default)]
    pub index: Option<u32>,
    /// Button sub type (`url`, `quick_reply`, ...).
    #[serde(default)]
    pub sub_type: Option<String>,
}

/// An approved message template as registered with the vendor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageTemplate {
    pub name: String,
    pub language: String,
    #[serde(default)]
    pub components: Vec<TemplateComponent>,
}

/// Placeholder names in `text`, in order of first appearance.
pub fn placeholders(text: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in PLACEHOLDER.captures_iter(text) {
        let name = caps[1].to_string();
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

/// If `value` is exactly one `{{field}}` reference, the referenced field name.
pub fn field_reference(value: &str) -> Option<&str> {
    let caps = PLACEHOLDER.captures(value.trim())?;
    let whole = caps.get(0)?;
    if whole.as_str().len() != value.trim().len() {
        return None;
    }
    caps.get(1).map(|m| m.as_str())
}

/// Values for template placeholders, positional per component.
///
/// Each value is either a literal or a `{{field}}` reference resolved
/// against the recipient (`name`, `phone`, `email`, or a custom field).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateVariables {
    #[serde(default)]
    pub header: Vec<String>,
    #[serde(default)]
    pub body: Vec<String>,
    /// Button index (as a string key) to its values.
    #[serde(default)]
    pub buttons: BTreeMap<String, Vec<String>>,
}

impl TemplateVariables {
    /// Supplied values for a component, if any.
    pub fn values_for(&self, component: &TemplateComponent) -> &[String] {
        match component.kind {
            ComponentKind::Header => self.header.as_slice(),
            ComponentKind::Body => self.body.as_slice(),
            ComponentKind::Footer => &[],
            ComponentKind::Button => self
                .buttons
                .get(&component.index.unwrap_or(0).to_string())
                .map(Vec::as_slice)
                .unwrap_or(&[]),
        }
    }
}

/// Resolved text parameters for one template component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentParameters {
    pub kind: ComponentKind,
    #[serde(default)]
    pub sub_type: Option<String>,
    #[serde(default)]
    pub index: Option<u32>,
    pub parameters: Vec<String>,
}

/// A fully resolved template message ready for the vendor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateMessage {
    /// Normalized E.164 digits.
    pub to: String,
    pub template_name: String,
    pub language: String,
    pub components: Vec<ComponentParameters>,
}
