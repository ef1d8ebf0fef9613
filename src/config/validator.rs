use crate::config::{parse_duration, Config};
use crate::dom::Selector;
use crate::error::{Result, ToxwatchError, ValidationError};
use crate::highlight::Rgb;

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_page(config, &mut errors);
        Self::validate_normalize(config, &mut errors);
        Self::validate_batching(config, &mut errors);
        Self::validate_highlight(config, &mut errors);
        Self::validate_classifier(config, &mut errors);

        Self::check_nonzero_duration(
            "coordinator.progress_interval",
            &config.coordinator.progress_interval,
            &mut errors,
        );

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ToxwatchError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_page(config: &Config, errors: &mut Vec<ValidationError>) {
        let selectors = [
            ("page.container_selector", &config.page.container_selector),
            ("page.post_selector", &config.page.post_selector),
            ("page.detail_selector", &config.page.detail_selector),
        ];
        for (path, value) in selectors {
            if let Err(e) = Selector::parse(value) {
                errors.push(ValidationError::new(path, e.to_string()));
            }
        }

        Self::check_nonzero_duration("page.wait_interval", &config.page.wait_interval, errors);

        if config.page.wait_max_attempts == 0 {
            errors.push(ValidationError::new(
                "page.wait_max_attempts",
                "Wait attempts must be greater than 0",
            ));
        }
    }

    fn validate_normalize(config: &Config, errors: &mut Vec<ValidationError>) {
        // Tokens are compared after case folding, so they must already be folded
        for (path, token) in [
            ("normalize.mention_token", &config.normalize.mention_token),
            ("normalize.url_token", &config.normalize.url_token),
        ] {
            if token.trim().is_empty() {
                errors.push(ValidationError::new(path, "Token cannot be empty"));
            } else if token.to_lowercase() != *token {
                errors.push(ValidationError::new(path, "Token must be lower-case"));
            }
        }
    }

    fn validate_batching(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.batching.min_batch_size == 0 {
            errors.push(ValidationError::new(
                "batching.min_batch_size",
                "Batch size must be greater than 0",
            ));
        }

        Self::check_duration(
            "batching.min_flush_interval",
            &config.batching.min_flush_interval,
            errors,
        );
        Self::check_nonzero_duration("batching.poll_interval", &config.batching.poll_interval, errors);
    }

    fn validate_highlight(config: &Config, errors: &mut Vec<ValidationError>) {
        let threshold = config.highlight.threshold;
        if !(0.0..=1.0).contains(&threshold) {
            errors.push(ValidationError::new(
                "highlight.threshold",
                format!("Threshold must be between 0.0 and 1.0, got {}", threshold),
            ));
        }

        Self::check_nonzero_duration("highlight.interval", &config.highlight.interval, errors);

        for (path, color) in [
            ("highlight.low_color", &config.highlight.low_color),
            ("highlight.high_color", &config.highlight.high_color),
        ] {
            if Rgb::parse_hex(color).is_none() {
                errors.push(ValidationError::new(
                    path,
                    format!("Expected a #rrggbb color, got '{}'", color),
                ));
            }
        }
    }

    fn validate_classifier(config: &Config, errors: &mut Vec<ValidationError>) {
        let mode = &config.classifier.mode;
        if mode != "mock" && mode != "http" {
            errors.push(ValidationError::new(
                "classifier.mode",
                format!("Mode must be 'mock' or 'http', got '{}'", mode),
            ));
        }

        if mode == "http" && config.classifier.base_url.is_empty() {
            errors.push(ValidationError::new(
                "classifier.base_url",
                "Base URL cannot be empty in http mode",
            ));
        }

        for (path, p) in [
            ("classifier.batch_path", &config.classifier.batch_path),
            ("classifier.single_path", &config.classifier.single_path),
        ] {
            if !p.starts_with('/') {
                errors.push(ValidationError::new(path, "Endpoint path must start with '/'"));
            }
        }

        Self::check_duration("classifier.timeout", &config.classifier.timeout, errors);
        Self::check_duration("classifier.mock_latency", &config.classifier.mock_latency, errors);
    }

    fn check_duration(path: &str, value: &str, errors: &mut Vec<ValidationError>) {
        if parse_duration(value).is_err() {
            errors.push(ValidationError::new(
                path,
                format!("Invalid duration format: {}", value),
            ));
        }
    }

    // tokio intervals panic on a zero period
    fn check_nonzero_duration(path: &str, value: &str, errors: &mut Vec<ValidationError>) {
        match parse_duration(value) {
            Ok(d) if d.is_zero() => {
                errors.push(ValidationError::new(path, "Interval must be greater than 0"))
            }
            Ok(_) => {}
            Err(_) => errors.push(ValidationError::new(
                path,
                format!("Invalid duration format: {}", value),
            )),
        }
    }
}
