use prometheus::{register_int_counter_vec, Encoder, IntCounterVec, TextEncoder};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use lazy_static::lazy_static;

lazy_static! {
    pub static ref ANSWERS_GRADED_CNTR: IntCounterVec = register_int_counter_vec!(
        "answers_graded_total",
        "Number of graded answer submissions",
        &["outcome"]
    )
    .unwrap();
}

pub fn record_grade(correct: bool) {
    let outcome = if correct { "correct" } else { "incorrect" };
    ANSWERS_GRADED_CNTR.with_label_values(&[outcome]).inc();
}

/// Current metrics in the Prometheus text exposition format.
pub fn render_metrics() -> String {
    let encoder = TextEncoder::new();
    let mut buf = vec![];
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buf) {
        tracing::warn!("Cannot encode metrics: {e}");
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Logs go to stderr so command output on stdout stays machine readable.
pub fn init_tracing() {
    let mut fmt_layer = fmt::layer().with_writer(std::io::stderr);
    if std::env::var("INCLUDE_SPAN_EVENTS").is_ok_and(|value| value.eq_ignore_ascii_case("true")) {
        fmt_layer = fmt_layer.with_span_events(FmtSpan::ENTER | FmtSpan::EXIT);
    }
    let filter_layer = EnvFilter::try_from_env("LOG_LEVEL")
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}
