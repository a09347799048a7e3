use crate::domain::Message;
use serde::{Deserialize, Serialize};

const MAX_TOKEN_LENGTH: usize = 4096;

fn validate_message(message: &Message) -> Result<(), String> {
    let Some(notification) = &message.notification else {
        return Err("message.notification is required".into());
    };
    if notification.title.trim().is_empty() {
        return Err("message.notification.title must not be empty".into());
    }
    if notification.body.trim().is_empty() {
        return Err("message.notification.body must not be empty".into());
    }
    Ok(())
}

fn validate_token(token: &str) -> Result<(), String> {
    if token.len() > MAX_TOKEN_LENGTH {
        return Err(format!("Token is too long (max {MAX_TOKEN_LENGTH} characters)"));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushSingleRequest {
    pub device_token: String,
}

impl PushSingleRequest {
    /// # Errors
    /// Returns an error if the token is excessively large.
    pub fn validate(&self) -> Result<(), String> {
        validate_token(&self.device_token)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMultiRequest {
    pub device_tokens: Vec<String>,
}

impl PushMultiRequest {
    /// # Errors
    /// Returns an error if any token is excessively large.
    pub fn validate(&self) -> Result<(), String> {
        self.device_tokens.iter().try_for_each(|t| validate_token(t))
    }
}

#[derive(Debug, Deserialize)]
pub struct PushTokenRequest {
    pub token: String,
    pub message: Message,
}

impl PushTokenRequest {
    /// # Errors
    /// Returns an error if the message has no notification or the token is excessively large.
    pub fn validate(&self) -> Result<(), String> {
        validate_message(&self.message)?;
        validate_token(&self.token)
    }
}

#[derive(Debug, Deserialize)]
pub struct PushTokensRequest {
    pub tokens: Vec<String>,
    pub message: Message,
}

impl PushTokensRequest {
    /// # Errors
    /// Returns an error if the message has no notification or any token is excessively large.
    pub fn validate(&self) -> Result<(), String> {
        validate_message(&self.message)?;
        self.tokens.iter().try_for_each(|t| validate_token(t))
    }
}

#[derive(Debug, Deserialize)]
pub struct PushTopicRequest {
    pub topic: String,
    pub message: Message,
}

impl PushTopicRequest {
    /// # Errors
    /// Returns an error if the message has no notification.
    pub fn validate(&self) -> Result<(), String> {
        validate_message(&self.message)
    }
}

#[derive(Debug, Deserialize)]
pub struct PushConditionRequest {
    pub condition: String,
    pub message: Message,
}

impl PushConditionRequest {
    /// # Errors
    /// Returns an error if the message has no notification.
    pub fn validate(&self) -> Result<(), String> {
        validate_message(&self.message)
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unregistered_tokens: Option<Vec<String>>,
}

impl PushResponse {
    #[must_use]
    pub const fn ok() -> Self {
        Self { success: true, unregistered_tokens: None }
    }

    /// Lists the unregistered tokens only when there are any.
    #[must_use]
    pub fn with_unregistered(tokens: Vec<String>) -> Self {
        Self { success: true, unregistered_tokens: (!tokens.is_empty()).then_some(tokens) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_enhanced_request_parses_platform_blocks() {
        let req: PushTokensRequest = serde_json::from_value(json!({
            "tokens": ["a", "b"],
            "message": {
                "notification": { "title": "Hi", "body": "There" },
                "data": { "k": "v" },
                "android": { "priority": "high", "notification": { "channel_id": "alerts" } },
                "apns": { "payload": { "aps": { "badge": 3, "sound": "default" } } },
                "webpush": { "notification": { "icon": "/icon.png" } }
            }
        }))
        .unwrap();

        assert!(req.validate().is_ok());
        assert_eq!(req.tokens, vec!["a", "b"]);
    }

    #[test]
    fn test_message_without_notification_is_rejected() {
        let req: PushTopicRequest =
            serde_json::from_value(json!({ "topic": "news", "message": { "data": { "k": "v" } } })).unwrap();
        assert_eq!(req.validate().unwrap_err(), "message.notification is required");
    }

    #[test]
    fn test_blank_title_or_body_is_rejected() {
        let req: PushTokenRequest = serde_json::from_value(json!({
            "token": "a",
            "message": { "notification": { "title": " ", "body": "There" } }
        }))
        .unwrap();
        assert_eq!(req.validate().unwrap_err(), "message.notification.title must not be empty");

        let req: PushConditionRequest = serde_json::from_value(json!({
            "condition": "'a' in topics",
            "message": { "notification": { "title": "Hi", "body": "" } }
        }))
        .unwrap();
        assert_eq!(req.validate().unwrap_err(), "message.notification.body must not be empty");
    }

    #[test]
    fn test_oversized_token_is_rejected() {
        let req = PushSingleRequest { device_token: "A".repeat(4097) };
        assert_eq!(req.validate().unwrap_err(), "Token is too long (max 4096 characters)");

        let req = PushMultiRequest { device_tokens: vec!["ok".into(), "A".repeat(4097)] };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_response_omits_empty_unregistered_list() {
        let body = serde_json::to_value(PushResponse::with_unregistered(Vec::new())).unwrap();
        assert_eq!(body, json!({ "success": true }));

        let body = serde_json::to_value(PushResponse::with_unregistered(vec!["stale".into()])).unwrap();
        assert_eq!(body, json!({ "success": true, "unregisteredTokens": ["stale"] }));
    }
}
