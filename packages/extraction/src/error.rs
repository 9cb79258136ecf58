//! Typed errors for the extraction core.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling.
//!
//! Transport, render, and empty-extraction failures are recovered locally
//! by advancing the per-source strategy chain; they only become visible to
//! callers once an entire chain is exhausted.

use thiserror::Error;

/// Errors from the static-fetch collaborator.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Non-2xx response from the source
    #[error("HTTP status {code}")]
    Status { code: u16 },

    /// Connection-level failure (DNS, TLS, refused, reset)
    #[error("connection failed: {0}")]
    Connection(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Request exceeded its per-tier timeout
    #[error("fetch timed out")]
    Timeout,

    /// URL could not be parsed or expanded
    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },

    /// Security validation failed
    #[error("security error: {0}")]
    Security(#[from] SecurityError),
}

impl FetchError {
    /// Wrap an arbitrary transport error.
    pub fn connection(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Connection(Box::new(err))
    }
}

/// Errors from the render collaborator.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Rendering engine failure (crash, navigation error, protocol error)
    #[error("render engine error: {0}")]
    Engine(String),

    /// Engine returned no markup for the page
    #[error("render produced empty output")]
    EmptyOutput,

    /// Render exceeded its per-tier timeout
    #[error("render timed out")]
    Timeout,
}

/// Errors from the remote AI-extraction collaborator.
#[derive(Debug, Error)]
pub enum EscalationError {
    /// Remote service failure
    #[error("AI extraction service error: {0}")]
    Service(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Escalation call exceeded its timeout
    #[error("escalation timed out")]
    Timeout,

    /// Service responded, but the payload could not be interpreted
    #[error("malformed escalation response: {reason}")]
    MalformedResponse { reason: String },
}

impl EscalationError {
    /// Wrap an arbitrary service error.
    pub fn service(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Service(Box::new(err))
    }
}

/// Security-related errors, primarily for SSRF protection.
#[derive(Debug, Error)]
pub enum SecurityError {
    /// URL scheme not allowed (e.g., file://, ftp://)
    #[error("disallowed URL scheme: {0}")]
    DisallowedScheme(String),

    /// Host is blocked (e.g., localhost, internal IPs)
    #[error("blocked host: {0}")]
    BlockedHost(String),

    /// IP in blocked CIDR range (e.g., 10.0.0.0/8)
    #[error("blocked IP range: {0}")]
    BlockedCidr(String),

    /// URL has no host
    #[error("URL has no host")]
    NoHost,

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

/// Errors from the cache and health-store collaborators.
///
/// Backends are external; their failures are opaque to the core and are
/// logged, never propagated into a source's pipeline.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    /// Wrap an arbitrary backend error.
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Box::new(err))
    }
}

/// Why a single strategy tier failed.
///
/// Tier failures fall through to the next tier; the last one stands as the
/// source's failure reason when the whole chain is exhausted.
#[derive(Debug, Error)]
pub enum TierError {
    #[error("transport: {0}")]
    Transport(#[from] FetchError),

    #[error("render: {0}")]
    Render(#[from] RenderError),

    /// A tier ran but produced no candidates. Not inherently an error.
    #[error("extraction produced no candidates")]
    ExtractionEmpty,

    #[error("escalation: {0}")]
    Escalation(#[from] EscalationError),

    /// Native API reported an explicit failure
    #[error("native API: {0}")]
    Api(String),
}

/// Result type alias for fetch operations.
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Result type alias for render operations.
pub type RenderResult<T> = std::result::Result<T, RenderError>;

/// Result type alias for escalation operations.
pub type EscalationResult<T> = std::result::Result<T, EscalationError>;

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type alias for security validation.
pub type SecurityResult<T> = std::result::Result<T, SecurityError>;
