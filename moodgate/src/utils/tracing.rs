use std::fmt;
use std::sync::OnceLock;

use opentelemetry::global;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::{Sampler, SdkTracerProvider};
use opentelemetry_sdk::{propagation::TraceContextPropagator, Resource};
use time::macros::format_description;
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::{
    format, time::FormatTime, FmtContext, FormatEvent, FormatFields, FormattedFields,
};
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

use common::configuration::Tracing;

const SERVICE_NAME: &str = "moodgate";
const REQUEST_ID_FIELD: &str = "request_id=";

struct BracketedTime;

impl FormatTime for BracketedTime {
    fn format_time(&self, w: &mut format::Writer<'_>) -> fmt::Result {
        let now = time::OffsetDateTime::now_utc();
        let formatted = now
            .format(&format_description!(
                "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]"
            ))
            .map_err(|_| fmt::Error)?;
        write!(w, "[{}]", formatted)
    }
}

/// `[timestamp][level] request_id=… fields`, one line per event.
struct BracketedFormatter;

impl<S, N> FormatEvent<S, N> for BracketedFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        BracketedTime.format_time(&mut writer)?;

        write!(
            writer,
            "[{}]",
            event.metadata().level().to_string().to_lowercase()
        )?;

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                let extensions = span.extensions();
                let Some(fields) = extensions.get::<FormattedFields<N>>() else {
                    continue;
                };
                if let Some(start) = fields.fields.find(REQUEST_ID_FIELD) {
                    let rest = &fields.fields[start + REQUEST_ID_FIELD.len()..];
                    let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
                    write!(writer, " request_id={}", &rest[..end])?;
                    break;
                }
            }
        }

        write!(writer, " ")?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

static INIT_LOGGER: OnceLock<SdkTracerProvider> = OnceLock::new();

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn fmt_layer<S>() -> impl Layer<S> + Send + Sync
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    tracing_subscriber::fmt::layer()
        .event_format(BracketedFormatter)
        .fmt_fields(format::DefaultFields::new())
        .with_ansi(false)
}

fn otlp_provider(endpoint: &str, random_sampling: u32) -> Option<SdkTracerProvider> {
    let exporter = match opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
    {
        Ok(exporter) => exporter,
        Err(err) => {
            eprintln!("failed to build otlp exporter for {}: {}", endpoint, err);
            return None;
        }
    };

    let ratio = f64::from(random_sampling.min(100)) / 100.0;
    Some(
        SdkTracerProvider::builder()
            .with_resource(Resource::builder().with_service_name(SERVICE_NAME).build())
            .with_sampler(Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(ratio))))
            .with_batch_exporter(exporter)
            .build(),
    )
}

/// Installs the global subscriber once. Spans are exported over OTLP only
/// when an endpoint is configured and `random_sampling` is above zero.
pub fn init_tracer(tracing_config: Option<&Tracing>) -> &'static SdkTracerProvider {
    INIT_LOGGER.get_or_init(|| {
        global::set_text_map_propagator(TraceContextPropagator::new());

        let otel_endpoint = tracing_config.and_then(|t| t.opentracing_grpc_endpoint.clone());
        let random_sampling = tracing_config.and_then(|t| t.random_sampling).unwrap_or(0);

        let exported = match (&otel_endpoint, random_sampling) {
            (Some(endpoint), sampling) if sampling > 0 => otlp_provider(endpoint, sampling),
            _ => None,
        };
        eprintln!(
            "initializing tracing: tracing_enabled={}, otel_endpoint={:?}, random_sampling={}",
            exported.is_some(),
            otel_endpoint,
            random_sampling
        );

        let (provider, installed) = match exported {
            Some(provider) => {
                let telemetry_layer =
                    tracing_opentelemetry::layer().with_tracer(provider.tracer(SERVICE_NAME));
                let subscriber = tracing_subscriber::registry()
                    .with(telemetry_layer)
                    .with(env_filter())
                    .with(fmt_layer());
                (provider, tracing::subscriber::set_global_default(subscriber))
            }
            None => {
                let subscriber = tracing_subscriber::registry()
                    .with(env_filter())
                    .with(fmt_layer());
                (
                    SdkTracerProvider::builder().build(),
                    tracing::subscriber::set_global_default(subscriber),
                )
            }
        };

        if let Err(err) = installed {
            eprintln!("failed to set tracing subscriber: {}", err);
        }
        global::set_tracer_provider(provider.clone());
        provider
    })
}
