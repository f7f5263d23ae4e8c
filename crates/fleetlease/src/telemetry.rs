//! Logging and trace export setup for fleetlease nodes.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type InitError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Configuration for the telemetry subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    service_name: String,
    otlp_endpoint: Option<String>,
    log_level: String,
    ansi: bool,
}

impl TelemetryConfig {
    /// Creates a new configuration builder with default settings.
    pub fn builder() -> TelemetryConfigBuilder {
        TelemetryConfigBuilder::default()
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn otlp_endpoint(&self) -> Option<&str> {
        self.otlp_endpoint.as_deref()
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    /// Installs the global subscriber: an `EnvFilter`, a fmt layer, and the
    /// OTLP exporter when an endpoint is configured.
    ///
    /// The OTLP batch exporter needs a running tokio runtime.
    pub fn init(self) -> Result<(), InitError> {
        let filter = tracing_subscriber::EnvFilter::try_new(&self.log_level)?;
        let fmt = tracing_subscriber::fmt::layer()
            .with_ansi(self.ansi)
            .with_target(true);

        tracing_subscriber::registry()
            .with(self.otlp_layer::<tracing_subscriber::Registry>()?)
            .with(filter)
            .with(fmt)
            .try_init()?;

        tracing::info!(
            service = %self.service_name,
            otlp = self.otlp_endpoint.is_some(),
            "telemetry initialized"
        );
        Ok(())
    }

    #[cfg(feature = "otlp")]
    fn otlp_layer<S>(&self) -> Result<Option<impl tracing_subscriber::Layer<S> + use<S>>, InitError>
    where
        S: tracing::Subscriber + for<'span> tracing_subscriber::registry::LookupSpan<'span>,
    {
        use opentelemetry_otlp::WithExportConfig;
        use opentelemetry_sdk::propagation::TraceContextPropagator;

        let Some(endpoint) = self.otlp_endpoint.clone() else {
            return Ok(None);
        };

        opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());

        let exporter = opentelemetry_otlp::new_exporter()
            .tonic()
            .with_endpoint(endpoint);

        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(exporter)
            .with_trace_config(opentelemetry_sdk::trace::config().with_resource(
                opentelemetry_sdk::Resource::new(vec![opentelemetry::KeyValue::new(
                    "service.name",
                    self.service_name.clone(),
                )]),
            ))
            .install_batch(opentelemetry_sdk::runtime::Tokio)?;

        Ok(Some(tracing_opentelemetry::layer().with_tracer(tracer)))
    }

    #[cfg(not(feature = "otlp"))]
    fn otlp_layer<S>(&self) -> Result<Option<tracing_subscriber::layer::Identity>, InitError>
    where
        S: tracing::Subscriber,
    {
        if self.otlp_endpoint.is_some() {
            return Err("OTLP export requested but the `otlp` feature is disabled".into());
        }
        Ok(None)
    }
}

/// Builder for `TelemetryConfig`.
#[derive(Default)]
pub struct TelemetryConfigBuilder {
    service_name: Option<String>,
    otlp_endpoint: Option<String>,
    log_level: Option<String>,
    ansi: Option<bool>,
}

impl TelemetryConfigBuilder {
    /// Sets the service name (default: "fleetlease-node").
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Sets the OTLP endpoint URL. Without one, spans are only logged.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.otlp_endpoint = Some(endpoint.into());
        self
    }

    /// Sets the filter directive (default: "info").
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = Some(level.into());
        self
    }

    /// Colored output (default: true).
    pub fn ansi(mut self, ansi: bool) -> Self {
        self.ansi = Some(ansi);
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> TelemetryConfig {
        TelemetryConfig {
            service_name: self
                .service_name
                .unwrap_or_else(|| "fleetlease-node".to_string()),
            otlp_endpoint: self.otlp_endpoint,
            log_level: self.log_level.unwrap_or_else(|| "info".to_string()),
            ansi: self.ansi.unwrap_or(true),
        }
    }
}

/// Shuts down the telemetry subsystem, flushing pending spans.
pub fn shutdown_tracing() {
    #[cfg(feature = "otlp")]
    opentelemetry::global::shutdown_tracer_provider();
}
