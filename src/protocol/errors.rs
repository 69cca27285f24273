use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("message {payload} is missing api-console-data")]
    MissingData { payload: String },
    #[error("message {payload} carries malformed data: {reason}")]
    MalformedData { payload: String, reason: String },
    #[error("event {event} carries malformed detail: {reason}")]
    MalformedDetail { event: String, reason: String },
}

impl ProtocolError {
    pub(crate) fn malformed_data(payload: &str, error: impl ToString) -> Self {
        Self::MalformedData {
            payload: payload.to_owned(),
            reason: error.to_string(),
        }
    }

    pub(crate) fn malformed_detail(event: &str, error: impl ToString) -> Self {
        Self::MalformedDetail {
            event: event.to_owned(),
            reason: error.to_string(),
        }
    }
}
