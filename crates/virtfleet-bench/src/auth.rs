//! Authentication descriptor for the benchmark host set.
//!
//! One shared credential covers every host. Validation happens before any
//! connection is attempted; a malformed descriptor never reaches the
//! transport.

use serde_json::Value;

use virtfleet_common::{Error, Result};

/// Supported authentication methods with their method-specific details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMethod {
    Password { password: String },
}

/// Validated authentication descriptor.
#[derive(Debug, Clone)]
pub struct AuthSpec {
    /// Login user, shared by every host
    pub user: String,
    pub method: AuthMethod,
}

impl AuthSpec {
    /// Parse and validate a JSON descriptor.
    pub fn parse(input: &str) -> Result<AuthSpec> {
        let raw: Value = serde_json::from_str(input)?;
        AuthSpec::from_value(&raw)
    }

    /// Validate a raw descriptor.
    ///
    /// Requires `user`, `method` and `details`; `method` must be
    /// `"password"` and `details` must then carry a `password` field.
    pub fn from_value(raw: &Value) -> Result<AuthSpec> {
        for key in ["user", "method", "details"] {
            if raw.get(key).is_none() {
                return Err(Error::validation(format!(
                    "malformed auth, missing key: {}",
                    key
                )));
            }
        }

        let user = raw
            .get("user")
            .and_then(Value::as_str)
            .filter(|user| !user.is_empty())
            .ok_or_else(|| Error::validation("auth user must be a non-empty string"))?
            .to_string();

        let method = raw
            .get("method")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::validation("auth method must be a string"))?;

        match method {
            "password" => {
                let password = raw
                    .pointer("/details/password")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        Error::validation("password auth set, but password field missing")
                    })?
                    .to_string();
                Ok(AuthSpec {
                    user,
                    method: AuthMethod::Password { password },
                })
            }
            other => Err(Error::validation(format!(
                "unsupported auth method: {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn well_formed_password_descriptor_passes() {
        let auth = AuthSpec::from_value(&json!({
            "user": "root",
            "method": "password",
            "details": {"password": "unsafe"},
        }))
        .expect("descriptor should validate");

        assert_eq!(auth.user, "root");
        assert_eq!(
            auth.method,
            AuthMethod::Password {
                password: "unsafe".to_string()
            }
        );
    }

    #[test]
    fn missing_top_level_keys_fail_validation() {
        let cases = [
            json!({}),
            json!({"user": "root"}),
            json!({"user": "root", "method": "password"}),
        ];
        for raw in &cases {
            let err = AuthSpec::from_value(raw).expect_err("descriptor must be rejected");
            assert!(matches!(&err, Error::Validation { .. }), "got: {}", err);
        }
    }

    #[test]
    fn password_method_requires_password_detail() {
        let cases = [
            json!({"user": "root", "method": "password", "details": {}}),
            json!({"user": "root", "method": "password", "details": {"foo": "bar"}}),
        ];
        for raw in &cases {
            let err = AuthSpec::from_value(raw).expect_err("descriptor must be rejected");
            assert!(err.to_string().contains("password field missing"));
        }
    }

    #[test]
    fn unknown_methods_are_rejected() {
        let err = AuthSpec::from_value(&json!({
            "user": "root",
            "method": "agent",
            "details": {},
        }))
        .expect_err("unknown method must be rejected");
        assert!(err.to_string().contains("unsupported auth method"));
    }

    #[test]
    fn parse_rejects_invalid_json() {
        assert!(AuthSpec::parse("{not json").is_err());
    }
}
