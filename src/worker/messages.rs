//! Messages exchanged between callers, computation workers and coordinators.
//!
//! Requests travel from the caller's thread to a worker thread, so they carry
//! the caller's tracing context along. Events are broadcast after every
//! computation so read-model caches can be invalidated.

use crate::domain::{ComputationState, LayerParameters, LayerPriors, PointId, Quantile};
use serde::{Deserialize, Serialize};

/// Distributed tracing context for cross-thread span propagation.
///
/// Captures the current trace and span IDs from OpenTelemetry so spans opened
/// on the worker thread hang under the span that submitted the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContext {
    /// OpenTelemetry trace ID as a hex string.
    pub trace_id: String,

    /// Parent span ID for linking spans across threads.
    pub parent_span_id: String,
}

impl TraceContext {
    /// Creates a trace context from the current tracing span.
    ///
    /// Returns `None` if no OpenTelemetry layer is installed or the current
    /// span context is invalid.
    pub fn from_current() -> Option<Self> {
        use opentelemetry::trace::TraceContextExt;
        use tracing_opentelemetry::OpenTelemetrySpanExt;

        let otel_context = tracing::Span::current().context();
        let span_ref = otel_context.span();
        let span_context = span_ref.span_context();

        if !span_context.is_valid() {
            return None;
        }

        let context = Self {
            trace_id: format!("{:032x}", span_context.trace_id()),
            parent_span_id: format!("{:016x}", span_context.span_id()),
        };
        tracing::trace!(trace_id = %context.trace_id, "capturing trace context");
        Some(context)
    }

    /// Re-attaches this context on the current thread.
    ///
    /// The returned guard must be held while the worker runs.
    pub fn attach(&self) -> Option<opentelemetry::ContextGuard> {
        use opentelemetry::trace::{
            SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState,
        };

        let trace_id = TraceId::from_hex(&self.trace_id).ok()?;
        let span_id = SpanId::from_hex(&self.parent_span_id).ok()?;
        let span_context = SpanContext::new(
            trace_id,
            span_id,
            TraceFlags::SAMPLED,
            true,
            TraceState::default(),
        );

        Some(
            opentelemetry::Context::current()
                .with_remote_span_context(span_context)
                .attach(),
        )
    }
}

/// Generates constructors for `ComputationRequest` variants that attach the
/// current trace context.
macro_rules! computation_request_builders {
    (
        $(
            $builder_name:ident($variant:ident { $($field:ident: $ty:ty),* $(,)? })
        ),* $(,)?
    ) => {
        impl ComputationRequest {
            $(
                #[doc = concat!("Create a ", stringify!($variant), " request with the current trace context")]
                #[must_use]
                pub fn $builder_name($($field: $ty),*) -> Self {
                    Self::$variant {
                        $($field,)*
                        trace_context: TraceContext::from_current(),
                    }
                }
            )*
        }
    };
}

computation_request_builders! {
    direct(Direct {
        point: PointId,
        boundaries: Vec<f64>,
        parameters: Vec<LayerParameters>,
        cell_count: usize,
    }),
    calibration(Calibration {
        point: PointId,
        boundaries: Vec<f64>,
        priors: Vec<LayerPriors>,
        cell_count: usize,
        iterations: usize,
        quantiles: Vec<Quantile>,
    }),
}

/// A computation submitted to the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ComputationRequest {
    /// One forward run with fixed parameters, persisted as quantile 0.
    Direct {
        point: PointId,
        /// Layer boundaries `[0, b1, …, H]` below the river bed (m).
        boundaries: Vec<f64>,
        /// Parameters of each layer, top to bottom.
        parameters: Vec<LayerParameters>,
        cell_count: usize,

        /// Trace context for linking spans across threads.
        #[serde(skip_serializing_if = "Option::is_none")]
        trace_context: Option<TraceContext>,
    },

    /// A Monte-Carlo calibration followed by forward runs per quantile.
    Calibration {
        point: PointId,
        /// Layer boundaries `[0, b1, …, H]` below the river bed (m).
        boundaries: Vec<f64>,
        /// Prior ranges of each layer, top to bottom.
        priors: Vec<LayerPriors>,
        cell_count: usize,
        iterations: usize,
        /// Requested quantiles, sorted, quantile 0 excluded.
        quantiles: Vec<Quantile>,

        /// Trace context for linking spans across threads.
        #[serde(skip_serializing_if = "Option::is_none")]
        trace_context: Option<TraceContext>,
    },
}

impl ComputationRequest {
    #[must_use]
    pub const fn point(&self) -> PointId {
        match self {
            Self::Direct { point, .. } | Self::Calibration { point, .. } => *point,
        }
    }

    #[must_use]
    pub fn boundaries(&self) -> &[f64] {
        match self {
            Self::Direct { boundaries, .. } | Self::Calibration { boundaries, .. } => boundaries,
        }
    }

    #[must_use]
    pub const fn cell_count(&self) -> usize {
        match self {
            Self::Direct { cell_count, .. } | Self::Calibration { cell_count, .. } => *cell_count,
        }
    }

    #[must_use]
    pub const fn trace_context(&self) -> Option<&TraceContext> {
        match self {
            Self::Direct { trace_context, .. } | Self::Calibration { trace_context, .. } => {
                trace_context.as_ref()
            }
        }
    }

    /// Short name used in spans and logs.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Direct { .. } => "direct",
            Self::Calibration { .. } => "calibration",
        }
    }
}

/// Result of a finished computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ComputationOutcome {
    /// The generation was fully written.
    Completed(ComputationSummary),

    /// The point's inputs were deleted or replaced while computing; nothing was kept.
    Discarded {
        point: PointId,
    },
}

/// Summary of a completed generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputationSummary {
    pub point: PointId,
    /// State of the point right after the generation was completed.
    pub state: ComputationState,
    /// Stored quantiles, quantile 0 first.
    pub quantiles: Vec<Quantile>,
    /// Total RMSE of quantile 0.
    pub total_rmse: f64,
}

/// Notification broadcast after every computation and every reset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ComputationEvent {
    Completed {
        point: PointId,
        state: ComputationState,
    },
    Failed {
        point: PointId,
        cause: String,
    },
    Discarded {
        point: PointId,
    },
    /// The point's generation was deleted.
    Reset {
        point: PointId,
    },
}

impl ComputationEvent {
    #[must_use]
    pub const fn point(&self) -> PointId {
        match self {
            Self::Completed { point, .. }
            | Self::Failed { point, .. }
            | Self::Discarded { point }
            | Self::Reset { point } => *point,
        }
    }
}
