use std::{collections::HashSet, net::SocketAddr};

use http::HeaderName;
use regex::Regex;

use crate::config::models::{
    AppConfig, DownstreamAuthorizerConfig, HealthcheckConfig, RuleConfig, ServerConfig,
    TcpProxyConfig, UpstreamAuthorizerConfig, UserProviderConfig,
};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone)]
#[non_exhaustive]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Unknown reference in {field}: '{id}' is not defined")]
    UnknownReference { field: String, id: String },

    #[error("Duplicate identifier in {field}: '{id}'")]
    DuplicateId { field: String, id: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

const HOSTNAME_PATTERN: &str = r"^[a-zA-Z0-9]([a-zA-Z0-9\-]{0,61}[a-zA-Z0-9])?(\.[a-zA-Z0-9]([a-zA-Z0-9\-]{0,61}[a-zA-Z0-9])?)*$";

/// Whole-document configuration validator.
///
/// Every check runs and all problems are reported together, so a broken file can be fixed
/// in one pass.
pub struct AppConfigValidator;

impl AppConfigValidator {
    /// Validate the entire application configuration
    pub fn validate(config: &AppConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        Self::validate_healthcheck(&config.healthcheck, &mut errors);

        if let Some(provider) = &config.user_provider {
            Self::validate_user_provider(provider, &mut errors);
        } else if config.requires_user_provider() {
            errors.push(ValidationError::MissingField {
                field: "user_provider (required by downstream authorizers)".to_string(),
            });
        }

        if config.servers.is_empty() && config.tcp_proxies.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "servers or tcp_proxies".to_string(),
            });
        }

        for (index, server) in config.servers.iter().enumerate() {
            Self::validate_server(index, server, &mut errors);
        }

        for (index, route) in config.tcp_proxies.iter().enumerate() {
            Self::validate_tcp_proxy(index, route, &mut errors);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    fn validate_healthcheck(config: &HealthcheckConfig, errors: &mut Vec<ValidationError>) {
        if let Err(e) = Self::validate_listen_address(&config.address) {
            errors.push(e);
        }
        if !config.path.starts_with('/') {
            errors.push(ValidationError::InvalidField {
                field: "healthcheck.path".to_string(),
                message: "Path must start with '/'".to_string(),
            });
        }
        if let Err(e) = Self::validate_duration(&config.request_timeout, "healthcheck.request_timeout")
        {
            errors.push(e);
        }
    }

    fn validate_user_provider(config: &UserProviderConfig, errors: &mut Vec<ValidationError>) {
        match config {
            UserProviderConfig::Static { users } => {
                let mut tokens = HashSet::new();
                for user in users {
                    if !tokens.insert(user.token) {
                        errors.push(ValidationError::DuplicateId {
                            field: "user_provider.users token".to_string(),
                            id: user.token.to_string(),
                        });
                    }
                    if user.username.is_empty() {
                        errors.push(ValidationError::InvalidField {
                            field: format!("user_provider.users[{}].username", user.token),
                            message: "Username cannot be empty".to_string(),
                        });
                    }
                }
            }
            UserProviderConfig::Http { address, timeout } => {
                if let Err(e) = Self::validate_url(address, "user_provider.address") {
                    errors.push(e);
                }
                if let Err(e) = Self::validate_duration(timeout, "user_provider.timeout") {
                    errors.push(e);
                }
            }
        }
    }

    fn validate_server(index: usize, server: &ServerConfig, errors: &mut Vec<ValidationError>) {
        let scope = format!("servers[{index}]");

        if let Err(e) = Self::validate_listen_address(&server.address) {
            errors.push(e);
        }
        if let Err(e) =
            Self::validate_duration(&server.upstream_timeout, &format!("{scope}.upstream_timeout"))
        {
            errors.push(e);
        }
        if let Err(e) =
            Self::validate_duration(&server.request_timeout, &format!("{scope}.request_timeout"))
        {
            errors.push(e);
        }

        let mut upstream_ids = HashSet::new();
        for upstream in &server.upstreams {
            if !upstream_ids.insert(upstream.id.as_str()) {
                errors.push(ValidationError::DuplicateId {
                    field: format!("{scope}.upstreams"),
                    id: upstream.id.clone(),
                });
            }
            if let Err(e) = Self::validate_url(
                &upstream.address,
                &format!("{scope} upstream '{}' address", upstream.id),
            ) {
                errors.push(e);
            }
            if let Some(UpstreamAuthorizerConfig::Header { user_id, username }) =
                &upstream.authorizer
            {
                for (name, value) in [("user_id", user_id), ("username", username)] {
                    if let Err(e) = Self::validate_header_name(
                        value,
                        &format!("{scope} upstream '{}' authorizer.{name}", upstream.id),
                    ) {
                        errors.push(e);
                    }
                }
            }
        }

        let mut downstream_ids = HashSet::new();
        for downstream in &server.downstreams {
            let field = format!("{scope} downstream '{}'", downstream.id);
            if !downstream_ids.insert(downstream.id.as_str()) {
                errors.push(ValidationError::DuplicateId {
                    field: format!("{scope}.downstreams"),
                    id: downstream.id.clone(),
                });
            }
            if !upstream_ids.contains(downstream.upstream.as_str()) {
                errors.push(ValidationError::UnknownReference {
                    field: format!("{field} upstream"),
                    id: downstream.upstream.clone(),
                });
            }
            for rule in &downstream.rules {
                if let Err(e) = Self::validate_rule(rule, &field) {
                    errors.push(e);
                }
            }
            if let Some(DownstreamAuthorizerConfig::Cookie { key }) = &downstream.authorizer {
                if key.trim().is_empty() {
                    errors.push(ValidationError::InvalidField {
                        field: format!("{field} authorizer.key"),
                        message: "Cookie name cannot be empty".to_string(),
                    });
                }
            }
        }
    }

    fn validate_rule(rule: &RuleConfig, field: &str) -> ValidationResult<()> {
        match rule {
            RuleConfig::Host { host } => Self::validate_host(host, field),
            RuleConfig::PathPrefix { path } if !path.starts_with('/') => {
                Err(ValidationError::InvalidField {
                    field: format!("{field} path_prefix rule"),
                    message: format!("Path prefix '{path}' must start with '/'"),
                })
            }
            RuleConfig::PathPrefix { .. } => Ok(()),
        }
    }

    fn validate_tcp_proxy(index: usize, route: &TcpProxyConfig, errors: &mut Vec<ValidationError>) {
        if let Err(e) = Self::validate_listen_address(&route.src_address) {
            errors.push(e);
        }
        if route.dst_address.trim().is_empty() || !route.dst_address.contains(':') {
            errors.push(ValidationError::InvalidField {
                field: format!("tcp_proxies[{index}].dst_address"),
                message: "Destination must be in format 'HOST:PORT'".to_string(),
            });
        }
    }

    /// Validate listen address format
    fn validate_listen_address(address: &str) -> ValidationResult<()> {
        if address.parse::<SocketAddr>().is_err() {
            return Err(ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: "Must be in format 'IP:PORT' (e.g., '127.0.0.1:3000' or '0.0.0.0:8080')"
                    .to_string(),
            });
        }
        Ok(())
    }

    fn validate_url(url_str: &str, context: &str) -> ValidationResult<()> {
        match url::Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: format!(
                            "URL scheme must be 'http' or 'https', got '{}'",
                            url.scheme()
                        ),
                    });
                }

                if url.host().is_none() {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: "URL must have a valid host".to_string(),
                    });
                }

                Ok(())
            }
            Err(e) => Err(ValidationError::InvalidField {
                field: context.to_string(),
                message: format!("Invalid URL format: {e}"),
            }),
        }
    }

    fn validate_duration(value: &str, context: &str) -> ValidationResult<()> {
        match humantime::parse_duration(value) {
            Ok(duration) if duration.is_zero() => Err(ValidationError::InvalidField {
                field: context.to_string(),
                message: "Duration must be greater than zero".to_string(),
            }),
            Ok(_) => Ok(()),
            Err(e) => Err(ValidationError::InvalidField {
                field: context.to_string(),
                message: format!("Invalid duration '{value}': {e}"),
            }),
        }
    }

    fn validate_header_name(name: &str, context: &str) -> ValidationResult<()> {
        HeaderName::from_bytes(name.as_bytes())
            .map(|_| ())
            .map_err(|e| ValidationError::InvalidField {
                field: context.to_string(),
                message: format!("Invalid header name '{name}': {e}"),
            })
    }

    /// Host rules compare against the Host header, so an explicit port is allowed.
    fn validate_host(host: &str, context: &str) -> ValidationResult<()> {
        if host.is_empty() {
            return Err(ValidationError::InvalidField {
                field: format!("{context} host rule"),
                message: "Host cannot be empty".to_string(),
            });
        }

        if host.contains("://") {
            return Err(ValidationError::InvalidField {
                field: format!("{context} host rule"),
                message: "Host should not contain protocol (e.g., use 'example.com' not 'http://example.com')".to_string(),
            });
        }

        let name = match host.rsplit_once(':') {
            Some((name, port)) if port.parse::<u16>().is_ok() => name,
            _ => host,
        };

        let hostname_regex =
            Regex::new(HOSTNAME_PATTERN).map_err(|e| ValidationError::ValidationFailed {
                message: format!("hostname pattern: {e}"),
            })?;

        if !hostname_regex.is_match(name) {
            return Err(ValidationError::InvalidField {
                field: format!("{context} host rule"),
                message: format!("Invalid hostname format: '{host}'"),
            });
        }

        Ok(())
    }

    /// Format multiple validation errors into a single message
    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        if errors.is_empty() {
            return "No errors".to_string();
        }

        if errors.len() == 1 {
            return errors[0].to_string();
        }

        let mut message = format!("Found {} validation errors:\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}
