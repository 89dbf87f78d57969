use std::any::Any;

/// Crate-wide result type for reply delivery.
pub type Result<T> = std::result::Result<T, DispatchError>;

/// Terminal failure of one fragment.
///
/// Cloneable so the same outcome can reach both the receipt and the
/// `on_error` callback.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// The deliverer failed; the queue moved on to the next fragment.
    #[error("delivery to {target_id} failed: {message}")]
    Delivery { target_id: String, message: String },

    /// The deliverer panicked; the worker recovered and moved on.
    #[error("delivery to {target_id} panicked: {message}")]
    Panicked { target_id: String, message: String },

    /// The dispatcher shut down before the fragment was sent.
    #[error("reply dispatcher is closed")]
    Closed,
}

impl DispatchError {
    #[must_use]
    pub fn delivery(target_id: impl Into<String>, source: &anyhow::Error) -> Self {
        Self::Delivery {
            target_id: target_id.into(),
            message: format!("{source:#}"),
        }
    }

    /// Build from a caught panic payload.
    #[must_use]
    pub fn panicked(target_id: impl Into<String>, payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self::Panicked {
            target_id: target_id.into(),
            message,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Self::Delivery { .. } => "delivery",
            Self::Panicked { .. } => "panicked",
            Self::Closed => "closed",
        }
    }
}
