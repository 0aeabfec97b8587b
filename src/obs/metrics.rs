// self
use crate::obs::{FlowKind, FlowOutcome};

/// Records a flow outcome via the global metrics recorder (when enabled).
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"gateway_auth_flow_total",
			"flow" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

/// Records a gate verdict (`continue`, `abort`) via the global metrics recorder (when enabled).
pub fn record_gate_outcome(gate: &'static str, outcome: &'static str) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("gateway_auth_gate_total", "gate" => gate, "outcome" => outcome)
			.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (gate, outcome);
	}
}
