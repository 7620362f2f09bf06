//! Prometheus metrics exposition
//!
//! - `auth_flows_started_total` (counter)
//! - `auth_flows_completed_total` (counter): label `outcome` (`issued` or an
//!   error kind)
//! - `auth_revocations_total` (counter): label `source` (`logout`, `revoke`)
//! - `auth_upstream_exchange_seconds` (histogram): label `outcome`

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

/// Upstream exchange latency buckets, 10ms up to the 60s timeout ceiling.
const EXCHANGE_BUCKETS: &[f64] = &[
    0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

fn builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new().set_buckets_for_metric(
        Matcher::Full("auth_upstream_exchange_seconds".to_string()),
        EXCHANGE_BUCKETS,
    )
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// `auth_upstream_exchange_seconds` gets explicit buckets so it renders as a
/// histogram with `_bucket` lines rather than a summary.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    builder()?.install_recorder()
}

pub fn record_flow_started() {
    metrics::counter!("auth_flows_started_total").increment(1);
}

/// Record the end of a callback. `outcome` is `issued` or an error kind label.
pub fn record_flow_completed(outcome: &'static str) {
    metrics::counter!("auth_flows_completed_total", "outcome" => outcome).increment(1);
}

pub fn record_exchange_duration(outcome: &'static str, duration_secs: f64) {
    metrics::histogram!("auth_upstream_exchange_seconds", "outcome" => outcome)
        .record(duration_secs);
}

pub fn record_revocation(source: &'static str) {
    metrics::counter!("auth_revocations_total", "source" => source).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusRecorder;

    #[test]
    fn record_functions_do_not_panic_without_recorder() {
        record_flow_started();
        record_flow_completed("issued");
        record_exchange_duration("issued", 0.2);
        record_revocation("logout");
    }

    /// Isolated recorder so tests don't fight over the global one.
    fn isolated_recorder() -> (PrometheusRecorder, PrometheusHandle) {
        let recorder = builder().unwrap().build_recorder();
        let handle = recorder.handle();
        (recorder, handle)
    }

    #[test]
    fn flow_counters_carry_outcome_label() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_flow_started();
        record_flow_started();
        record_flow_completed("issued");
        record_flow_completed("not_found");

        let output = handle.render();
        assert!(output.contains("auth_flows_started_total 2"), "{output}");
        assert!(output.contains("outcome=\"issued\""));
        assert!(output.contains("outcome=\"not_found\""));
    }

    #[test]
    fn revocations_counted_by_source() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_revocation("logout");
        record_revocation("revoke");

        let output = handle.render();
        assert!(output.contains("auth_revocations_total"));
        assert!(output.contains("source=\"logout\""));
        assert!(output.contains("source=\"revoke\""));
    }

    #[test]
    fn exchange_histogram_renders_buckets() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_exchange_duration("issued", 0.003);

        let output = handle.render();
        assert!(output.contains("auth_upstream_exchange_seconds_bucket"));
        assert!(output.contains("le=\"0.01\""));
        assert!(output.contains("le=\"60\""));
        assert!(output.contains("le=\"+Inf\""));
    }
}
