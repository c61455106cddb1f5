//! Assembles a [`Pipeline`] from a [`BulwarkConfig`].

use std::sync::Arc;
use std::time::Duration;

use bulwark_config::{
    BulwarkConfig, ConfigError, CorsConfig, EnvelopeConfig, LogDestination, LoggingConfig,
};
use bulwark_core::{CaptureLimits, EnvelopeSerializer};
use bulwark_middleware::cors::{CorsPolicy, CorsRegistry};
use bulwark_middleware::stages::{
    BodyRedactor, CorsMiddleware, LoggingMiddleware, SecurityHeaders, SecurityHeadersMiddleware,
    SqlInjectionMiddleware, TraceIdMiddleware, XssMiddleware,
};
use bulwark_middleware::{LogSink, NullSink, Pipeline, TracingSink};
use tracing::info;

use crate::error::{BuildError, BuildResult};

/// Builds the pipeline described by `config`, shipping access logs to `sink`.
///
/// The configuration is validated first. Disabled filters are left out of
/// the pipeline; the trace id stage is always present.
///
/// # Errors
///
/// Returns [`BuildError`] if validation fails or a component cannot be
/// constructed.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use bulwark::{build_pipeline, BulwarkConfig, NullSink};
///
/// let pipeline = build_pipeline(&BulwarkConfig::default(), Arc::new(NullSink)).unwrap();
/// assert_eq!(
///     pipeline.stage_names(),
///     ["trace_id", "cors", "logging", "xss", "sql_injection", "security_headers"],
/// );
/// ```
pub fn build_pipeline(config: &BulwarkConfig, sink: Arc<dyn LogSink>) -> BuildResult<Pipeline> {
    config.validate()?;

    let serializer = Arc::new(envelope_serializer(&config.envelope)?);
    let capture_limits = config
        .capture
        .max_body_bytes
        .map_or_else(CaptureLimits::unlimited, CaptureLimits::with_max_body_bytes);

    let mut builder = Pipeline::builder()
        .serializer(Arc::clone(&serializer))
        .capture_limits(capture_limits)
        .stage(
            TraceIdMiddleware::new()
                .with_header(&config.trace.header)?
                .trust_incoming(config.trace.trust_incoming),
        );

    if config.cors.enabled {
        builder = builder.stage(CorsMiddleware::with_serializer(
            cors_registry(&config.cors),
            Arc::clone(&serializer),
        ));
    }

    let redactor = BodyRedactor::new(
        config.logging.max_size,
        config.logging.sensitive_fields.iter().cloned(),
    );

    if config.logging.enabled {
        let logging = &config.logging;
        builder = builder.stage(
            LoggingMiddleware::builder(sink)
                .redactor(redactor.clone())
                .log_request_body(logging.log_request_body)
                .log_response_body(logging.log_response_body)
                .skip_prefixes(logging.skip_path_prefixes.iter().cloned())
                .skip_suffixes(logging.skip_path_suffixes.iter().cloned())
                .build(),
        );
    }

    if config.xss.enabled {
        let matcher = config
            .xss
            .signatures
            .compile(config.xss.empty_policy)
            .map_err(|source| BuildError::Pattern { filter: "xss", source })?;
        builder = builder.stage(
            XssMiddleware::with_serializer(matcher, Arc::clone(&serializer))
                .with_redactor(redactor.clone()),
        );
    }

    if config.sql_injection.enabled {
        let matcher = config
            .sql_injection
            .signatures
            .compile(config.sql_injection.empty_policy)
            .map_err(|source| BuildError::Pattern {
                filter: "sql_injection",
                source,
            })?;
        builder = builder.stage(
            SqlInjectionMiddleware::with_serializer(matcher, Arc::clone(&serializer))
                .with_redactor(redactor),
        );
    }

    if config.security_headers.enabled {
        let headers = &config.security_headers;
        builder = builder.stage(SecurityHeadersMiddleware::new(&SecurityHeaders {
            frame_options: headers.frame_options.clone(),
            xss_protection: headers.xss_protection.clone(),
            content_type_options: headers.content_type_options.clone(),
        })?);
    }

    let pipeline = builder.build();
    info!(stages = ?pipeline.stage_names(), "pipeline assembled");
    Ok(pipeline)
}

/// Builds the pipeline and its log sink from `config` alone.
///
/// # Errors
///
/// Returns [`BuildError`] if the sink or the pipeline cannot be built.
pub fn pipeline_from_config(config: &BulwarkConfig) -> BuildResult<Pipeline> {
    let sink = sink_from_config(&config.logging)?;
    build_pipeline(config, sink)
}

/// Creates the access-log sink selected by `config.destination`.
///
/// # Errors
///
/// Returns [`BuildError`] if the `http` destination has no URL, the HTTP
/// client cannot be created, or the crate was built without HTTP support.
pub fn sink_from_config(config: &LoggingConfig) -> BuildResult<Arc<dyn LogSink>> {
    match config.destination {
        LogDestination::Tracing => Ok(Arc::new(TracingSink)),
        LogDestination::None => Ok(Arc::new(NullSink)),
        LogDestination::Http => http_sink(config),
    }
}

#[cfg(feature = "http-sink")]
fn http_sink(config: &LoggingConfig) -> BuildResult<Arc<dyn LogSink>> {
    let url = config.http_url.as_deref().ok_or_else(|| {
        ConfigError::validation_error("logging.http_url must be set when destination is 'http'")
    })?;
    let sink = bulwark_middleware::HttpSink::with_timeout(
        url,
        Duration::from_millis(config.http_timeout_ms),
    )?;
    Ok(Arc::new(sink))
}

#[cfg(not(feature = "http-sink"))]
fn http_sink(_config: &LoggingConfig) -> BuildResult<Arc<dyn LogSink>> {
    Err(ConfigError::validation_error(
        "logging.destination 'http' requires the 'http-sink' feature",
    )
    .into())
}

/// Creates the envelope serializer for `config`.
///
/// # Errors
///
/// Returns [`BuildError::Envelope`] if the timestamp format is invalid.
pub fn envelope_serializer(config: &EnvelopeConfig) -> BuildResult<EnvelopeSerializer> {
    Ok(EnvelopeSerializer::new()
        .with_code_format(config.result_code_format)
        .with_timestamp(config.include_timestamp)
        .with_timestamp_format(&config.timestamp_format)?
        .with_pretty(config.pretty))
}

/// Maps every configured path pattern to the same policy.
#[must_use]
pub fn cors_registry(config: &CorsConfig) -> CorsRegistry {
    let mut policy = CorsPolicy::builder()
        .allow_origins(config.allowed_origins.iter().cloned())
        .allow_methods(config.allowed_methods.iter().cloned())
        .allow_headers(config.allowed_headers.iter().cloned())
        .expose_headers(config.exposed_headers.iter().cloned())
        .allow_credentials(config.allow_credentials);
    policy = match config.max_age_secs {
        Some(secs) => policy.max_age(Duration::from_secs(secs)),
        None => policy.no_max_age(),
    };
    let policy = policy.build();

    config
        .path_patterns
        .iter()
        .fold(CorsRegistry::new(), |registry, pattern| {
            registry.register(pattern, policy.clone())
        })
}
