// SPDX-FileCopyrightText: 2026 Wacast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Send/skip decision made before any network call.

use std::collections::BTreeMap;

use serde::Serialize;
use wacast_core::template::{field_reference, placeholders};
use wacast_core::{
    CampaignRecipient, ComponentParameters, MessageTemplate, SkipCode, SkipDetail,
    TemplateMessage, TemplateVariables, WacastError, normalize_phone,
};

/// Outcome of checking one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precheck {
    /// Ready to send.
    Send(TemplateMessage),
    Skip(PrecheckSkip),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrecheckSkip {
    pub code: SkipCode,
    pub reason: String,
    /// Placeholders left without a value, as `component.placeholder`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<String>,
}

impl PrecheckSkip {
    pub fn new(code: SkipCode, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
            missing: Vec::new(),
        }
    }

    pub fn detail(&self) -> SkipDetail {
        SkipDetail {
            code: self.code,
            reason: self.reason.clone(),
        }
    }
}

/// One skipped recipient in a dry run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DryRunSkip {
    pub recipient_id: String,
    #[serde(flatten)]
    pub skip: PrecheckSkip,
}

/// Aggregate precheck result over a recipient list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DryRunReport {
    pub total: usize,
    pub sendable: usize,
    pub skipped: usize,
    pub by_code: BTreeMap<SkipCode, usize>,
    pub skips: Vec<DryRunSkip>,
    /// Recipients without a contact identity. These would fail dispatch.
    pub missing_identity: Vec<String>,
}

impl DryRunReport {
    /// Turn a sendable recipient into a skip decided outside the pure
    /// check (suppression, opt-out).
    pub fn demote(&mut self, recipient_id: &str, skip: PrecheckSkip) {
        self.sendable = self.sendable.saturating_sub(1);
        self.add_skip(recipient_id, skip);
    }

    fn add_skip(&mut self, recipient_id: &str, skip: PrecheckSkip) {
        self.skipped += 1;
        *self.by_code.entry(skip.code).or_default() += 1;
        self.skips.push(DryRunSkip {
            recipient_id: recipient_id.to_string(),
            skip,
        });
    }
}

/// Pure recipient validation.
#[derive(Debug, Clone, Default)]
pub struct PrecheckGuard {
    default_country_code: Option<String>,
}

impl PrecheckGuard {
    pub fn new(default_country_code: Option<String>) -> Self {
        Self {
            default_country_code: default_country_code.filter(|cc| !cc.is_empty()),
        }
    }

    /// Decide whether `recipient` can be sent `template`.
    ///
    /// A recipient without a contact identity is an upstream data error
    /// and comes back as `Err(MissingIdentity)`, never as a skip.
    pub fn check(
        &self,
        recipient: &CampaignRecipient,
        template: Option<&MessageTemplate>,
        variables: &TemplateVariables,
    ) -> Result<Precheck, WacastError> {
        if recipient
            .contact_id
            .as_deref()
            .is_none_or(|id| id.trim().is_empty())
        {
            return Err(WacastError::MissingIdentity {
                recipient_id: recipient.id.clone(),
            });
        }
        if recipient.opted_out {
            return Ok(Precheck::Skip(PrecheckSkip::new(
                SkipCode::OptOut,
                "contact opted out",
            )));
        }
        let Some(template) = template else {
            return Ok(Precheck::Skip(PrecheckSkip::new(
                SkipCode::InvalidTemplate,
                "template not found",
            )));
        };
        let Some(to) = normalize_phone(&recipient.phone, self.default_country_code.as_deref())
        else {
            return Ok(Precheck::Skip(PrecheckSkip::new(
                SkipCode::InvalidPhone,
                format!("`{}` is not a dialable number", recipient.phone),
            )));
        };

        let mut components = Vec::new();
        let mut missing = Vec::new();
        for component in &template.components {
            let Some(text) = component.text.as_deref() else {
                continue;
            };
            let names = placeholders(text);
            if names.is_empty() {
                continue;
            }
            let supplied = variables.values_for(component);
            let mut parameters = Vec::with_capacity(names.len());
            for (i, name) in names.iter().enumerate() {
                let value = match supplied.get(i) {
                    Some(raw) => match field_reference(raw) {
                        Some(field) => recipient_field(recipient, field),
                        None => Some(raw.clone()),
                    },
                    // Named placeholders fall back to the recipient's own fields.
                    None if name.parse::<u32>().is_err() => recipient_field(recipient, name),
                    None => None,
                };
                match value.filter(|v| !v.trim().is_empty()) {
                    Some(v) => parameters.push(v),
                    None => missing.push(format!("{}.{name}", component.kind)),
                }
            }
            components.push(ComponentParameters {
                kind: component.kind,
                sub_type: component.sub_type.clone(),
                index: component.index,
                parameters,
            });
        }

        if !missing.is_empty() {
            return Ok(Precheck::Skip(PrecheckSkip {
                code: SkipCode::MissingVariable,
                reason: format!("missing values for {}", missing.join(", ")),
                missing,
            }));
        }

        Ok(Precheck::Send(TemplateMessage {
            to,
            template_name: template.name.clone(),
            language: template.language.clone(),
            components,
        }))
    }

    /// Run [`check`](Self::check) over a whole list without side effects.
    pub fn dry_run(
        &self,
        recipients: &[CampaignRecipient],
        template: Option<&MessageTemplate>,
        variables: &TemplateVariables,
    ) -> DryRunReport {
        let mut report = DryRunReport {
            total: recipients.len(),
            ..DryRunReport::default()
        };
        for recipient in recipients {
            match self.check(recipient, template, variables) {
                Ok(Precheck::Send(_)) => report.sendable += 1,
                Ok(Precheck::Skip(skip)) => report.add_skip(&recipient.id, skip),
                Err(_) => report.missing_identity.push(recipient.id.clone()),
            }
        }
        report
    }
}

fn recipient_field(recipient: &CampaignRecipient, field: &str) -> Option<String> {
    match field {
        "name" | "nome" => recipient.name.clone(),
        "first_name" => recipient
            .name
            .as_deref()
            .and_then(|n| n.split_whitespace().next())
            .map(str::to_string),
        "phone" => Some(recipient.phone.clone()),
        "email" => recipient.email.clone(),
        other => {
            let key = other.strip_prefix("custom.").unwrap_or(other);
            recipient.custom_fields.get(key).cloned()
        }
    }
}
