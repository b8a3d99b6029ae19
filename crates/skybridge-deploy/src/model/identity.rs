//! Identity provider (user pool) shapes

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct UserPool {
    pub id: String,
    pub arn: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub lambda_config: LambdaConfig,
}

/// Trigger functions attached to a user pool
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct LambdaConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pre_sign_up: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_confirmation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pre_authentication: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_authentication: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub define_auth_challenge: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_auth_challenge: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify_auth_challenge_response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pre_token_generation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_migration: Option<String>,
}

impl LambdaConfig {
    /// Point the trigger called `name` (e.g. `PreSignUp`) at `arn`
    ///
    /// Returns false when no trigger has that name.
    pub fn set_trigger(&mut self, name: &str, arn: &str) -> bool {
        let slot = match name.to_ascii_lowercase().as_str() {
            "presignup" => &mut self.pre_sign_up,
            "custommessage" => &mut self.custom_message,
            "postconfirmation" => &mut self.post_confirmation,
            "preauthentication" => &mut self.pre_authentication,
            "postauthentication" => &mut self.post_authentication,
            "defineauthchallenge" => &mut self.define_auth_challenge,
            "createauthchallenge" => &mut self.create_auth_challenge,
            "verifyauthchallengeresponse" => &mut self.verify_auth_challenge_response,
            "pretokengeneration" => &mut self.pre_token_generation,
            "usermigration" => &mut self.user_migration,
            _ => return false,
        };
        *slot = Some(arn.to_string());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_trigger_by_name() {
        let mut config = LambdaConfig::default();
        assert!(config.set_trigger("PreSignUp", "arn:alias"));
        assert!(config.set_trigger("postconfirmation", "arn:alias"));
        assert!(!config.set_trigger("OnBirthday", "arn:alias"));
        assert_eq!(config.pre_sign_up.as_deref(), Some("arn:alias"));
        assert_eq!(config.post_confirmation.as_deref(), Some("arn:alias"));
        assert!(config.custom_message.is_none());
    }
}
