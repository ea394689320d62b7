// SPDX-FileCopyrightText: 2026 Wacast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request and response types for the Cloud API messages endpoint.

use serde::{Deserialize, Serialize};
use wacast_core::{ComponentParameters, TemplateMessage, VendorError};

/// Body of `POST /{version}/{phone_number_id}/messages` for a template send.
#[derive(Debug, Clone, Serialize)]
pub struct SendRequest {
    pub messaging_product: &'static str,
    pub recipient_type: &'static str,
    pub to: String,
    #[serde(rename = "type")]
    pub type_: &'static str,
    pub template: TemplatePayload,
}

#[derive(Debug, Clone, Serialize)]
pub struct TemplatePayload {
    pub name: String,
    pub language: Language,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<ComponentPayload>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Language {
    pub code: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentPayload {
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_type: Option<String>,
    /// Button position, sent as a string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    pub parameters: Vec<TextParameter>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TextParameter {
    #[serde(rename = "type")]
    pub type_: &'static str,
    pub text: String,
}

impl From<&ComponentParameters> for ComponentPayload {
    fn from(component: &ComponentParameters) -> Self {
        Self {
            type_: component.kind.to_string(),
            sub_type: component.sub_type.clone(),
            index: component.index.map(|i| i.to_string()),
            parameters: component
                .parameters
                .iter()
                .map(|text| TextParameter {
                    type_: "text",
                    text: text.clone(),
                })
                .collect(),
        }
    }
}

impl From<&TemplateMessage> for SendRequest {
    fn from(message: &TemplateMessage) -> Self {
        Self {
            messaging_product: "whatsapp",
            recipient_type: "individual",
            to: message.to.clone(),
            type_: "template",
            template: TemplatePayload {
                name: message.template_name.clone(),
                language: Language {
                    code: message.language.clone(),
                },
                components: message.components.iter().map(ComponentPayload::from).collect(),
            },
        }
    }
}

/// Successful send response.
#[derive(Debug, Clone, Deserialize)]
pub struct SendResponse {
    #[serde(default)]
    pub messages: Vec<SentMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SentMessage {
    pub id: String,
    #[serde(default)]
    pub message_status: Option<String>,
}

/// Error envelope returned on rejection.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    pub error: VendorError,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wacast_core::ComponentKind;

    #[test]
    fn template_body_matches_cloud_api_shape() {
        let message = TemplateMessage {
            to: "5511999990000".into(),
            template_name: "order_update".into(),
            language: "pt_BR".into(),
            components: vec![
                ComponentParameters {
                    kind: ComponentKind::Body,
                    sub_type: None,
                    index: None,
                    parameters: vec!["Ana".into(), "#42".into()],
                },
                ComponentParameters {
                    kind: ComponentKind::Button,
                    sub_type: Some("url".into()),
                    index: Some(0),
                    parameters: vec!["promo".into()],
                },
            ],
        };
        let json = serde_json::to_value(SendRequest::from(&message)).unwrap();
        assert_eq!(json["type"], "template");
        assert_eq!(json["to"], "5511999990000");
        assert_eq!(json["template"]["language"]["code"], "pt_BR");
        assert_eq!(json["template"]["components"][0]["type"], "body");
        assert_eq!(json["template"]["components"][0]["parameters"][1]["text"], "#42");
        assert!(json["template"]["components"][0].get("index").is_none());
        assert_eq!(json["template"]["components"][1]["index"], "0");
        assert_eq!(json["template"]["components"][1]["sub_type"], "url");
    }

    #[test]
    fn templates_without_parameters_omit_components() {
        let message = TemplateMessage {
            to: "14155552671".into(),
            template_name: "hello_world".into(),
            language: "en_US".into(),
            components: Vec::new(),
        };
        let json = serde_json::to_value(SendRequest::from(&message)).unwrap();
        assert!(json["template"].get("components").is_none());
    }
}
