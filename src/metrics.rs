//! Process wide diagnostics counters.
use anyhow::Result;
use lazy_static::lazy_static;
use prometheus::{
    register_int_counter_vec, register_int_gauge_vec, Encoder, IntCounterVec, IntGaugeVec,
    TextEncoder,
};

lazy_static! {
    pub static ref STEPS: IntCounterVec = register_int_counter_vec!(
        "rotenc_steps_total",
        "Steps decoded per encoder and direction",
        &["encoder", "direction"]
    )
    .expect("could not register rotenc_steps_total");
    pub static ref DROPPED_EDGES: IntCounterVec = register_int_counter_vec!(
        "rotenc_dropped_edges_total",
        "Edges rejected because a decode was already running",
        &["encoder"]
    )
    .expect("could not register rotenc_dropped_edges_total");
    pub static ref POSITION: IntGaugeVec = register_int_gauge_vec!(
        "rotenc_position",
        "Last published encoder position",
        &["encoder"]
    )
    .expect("could not register rotenc_position");
}

/// Render every registered metric in the Prometheus text format.
pub fn render() -> Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendered_output_contains_counters() {
        STEPS.with_label_values(&["metrics-test", "clockwise"]).inc();
        DROPPED_EDGES.with_label_values(&["metrics-test"]).inc();
        let text = render().unwrap();
        assert!(text.contains("rotenc_steps_total"));
        assert!(text.contains("rotenc_dropped_edges_total"));
    }
}
