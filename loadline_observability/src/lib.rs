use std::borrow::Cow;
use std::time::Duration;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{InstrumentationScope, global};
use opentelemetry_otlp::{ExporterBuildError, MetricExporter, SpanExporter};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::trace::SdkTracerProvider;
use snafu::{ResultExt, Snafu};
use tracing::Subscriber;
use tracing_opentelemetry::MetricsLayer;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, Layer};
use tracing_subscriber::{prelude::*, registry::LookupSpan};

pub use opentelemetry::{
    KeyValue,
    metrics::{Counter, Histogram, Meter, UpDownCounter},
};

use crate::format::ConsoleFormat;

mod format;

const OTEL_SDK_DISABLED: &str = "OTEL_SDK_DISABLED";
const RUST_LOG_FORMAT: &str = "RUST_LOG_FORMAT";

pub type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync>;

#[derive(Debug, Snafu)]
pub enum ObservabilityError {
    #[snafu(display("Failed to build exporter"))]
    Exporter { source: ExporterBuildError },
    #[snafu(display("Failed to install tracing subscriber"))]
    Subscriber { source: TryInitError },
}

/// Returns a meter from the global meter provider.
///
/// Instruments are no-ops until [`init_observability`] installs an exporting provider.
pub fn meter(name: &'static str) -> Meter {
    global::meter(name)
}

/// Install the global tracing subscriber.
///
/// Logs go to stdout, either with the console format or as JSON lines if
/// `RUST_LOG_FORMAT=json`. The filter comes from `RUST_LOG` and defaults to `info`.
///
/// OpenTelemetry export over OTLP is only enabled if `OTEL_SDK_DISABLED=false`.
pub fn init_observability(
    package_name: impl Into<Cow<'static, str>>,
    package_version: impl Into<Cow<'static, str>>,
) -> Result<(), ObservabilityError> {
    // Unlike the otel convention, export is disabled unless explicitly turned on.
    let sdk_enabled = std::env::var(OTEL_SDK_DISABLED)
        .map(|v| v == "false")
        .unwrap_or(false);

    let mut layers = vec![stdout()];

    if sdk_enabled {
        layers.push(otel(package_name, package_version)?);
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .context(SubscriberSnafu {})
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn stdout<S>() -> BoxedLayer<S>
where
    S: Subscriber,
    for<'a> S: LookupSpan<'a>,
{
    let json_fmt = std::env::var(RUST_LOG_FORMAT)
        .map(|val| val == "json")
        .unwrap_or(false);

    if json_fmt {
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .json()
            .with_filter(env_filter())
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_ansi(true)
            .event_format(ConsoleFormat::default())
            .with_filter(env_filter())
            .boxed()
    }
}

fn otel<S>(
    package_name: impl Into<Cow<'static, str>>,
    version: impl Into<Cow<'static, str>>,
) -> Result<BoxedLayer<S>, ObservabilityError>
where
    S: Subscriber + Send + Sync,
    for<'a> S: LookupSpan<'a>,
{
    let package_name = package_name.into();

    let resource = Resource::builder()
        .with_service_name(package_name.to_string())
        .build();

    let scope = InstrumentationScope::builder(package_name)
        .with_version(version.into())
        .build();

    let span_exporter = SpanExporter::builder()
        .with_tonic()
        .build()
        .context(ExporterSnafu {})?;

    let trace_provider = SdkTracerProvider::builder()
        .with_resource(resource.clone())
        .with_batch_exporter(span_exporter)
        .build();
    let tracer = trace_provider.tracer_with_scope(scope);

    let metrics_exporter = MetricExporter::builder()
        .with_tonic()
        .build()
        .context(ExporterSnafu {})?;

    let metrics_reader = PeriodicReader::builder(metrics_exporter)
        .with_interval(Duration::from_secs(10))
        .build();

    let meter_provider = SdkMeterProvider::builder()
        .with_resource(resource)
        .with_reader(metrics_reader)
        .build();

    global::set_meter_provider(meter_provider.clone());

    let otel_layer = env_filter()
        .and_then(MetricsLayer::new(meter_provider))
        .and_then(tracing_opentelemetry::layer().with_tracer(tracer))
        .boxed();

    Ok(otel_layer)
}
