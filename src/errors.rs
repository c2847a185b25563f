use thiserror::Error;

/// Errors from the job and reference store adapters.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A live (non-completed) job with the same natural key already exists.
    ///
    /// The ensure-primitive checks before inserting; this is the safety net for
    /// two invokers racing through that check at the same time.
    #[error("a live job with key `{job_key}` already exists")]
    Conflict {
        /// The natural key that collided.
        job_key: String,
    },

    /// The backing database rejected or failed an operation.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A payload could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from the outbound cast and notification transports.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The client was constructed without the named credential.
    #[error("missing credentials: {0}")]
    MissingCredentials(&'static str),

    /// A required text field was empty.
    #[error("{field} must not be empty")]
    EmptyField {
        /// Which field was empty.
        field: &'static str,
    },

    /// The cast text exceeds the hard character limit.
    #[error("cast text is {len} characters, limit is {max}")]
    Oversized {
        /// Characters in the rejected text.
        len: usize,
        /// The enforced limit.
        max: usize,
    },

    /// The HTTP request itself failed (connect, timeout, decode).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A request body could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The API answered with a non-success status.
    #[error("API error (status {status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body, verbatim.
        body: String,
    },
}

/// Errors from resolving template arguments and rendering cast payloads.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The referenced race does not exist.
    #[error("race `{0}` not found")]
    RaceNotFound(String),

    /// The race has no lock time to announce.
    #[error("race `{0}` has no lock time")]
    MissingLockTime(String),

    /// A job's `payload_args` did not match its template's expected shape.
    #[error("invalid payload args for template `{template}`")]
    InvalidArgs {
        /// The template tag the args were validated against.
        template: &'static str,
        /// The underlying deserialization failure.
        source: serde_json::Error,
    },
}

/// A text column held a value outside the expected enum.
#[derive(Debug, Error)]
#[error("unrecognized {what}: `{value}`")]
pub struct UnknownVariant {
    /// What kind of value was being parsed.
    pub what: &'static str,
    /// The offending value.
    pub value: String,
}
