/// OpenAPI documentation generation.
pub mod documentation;
/// Builds, announces and persists match results.
pub mod finalizer;
/// Health check service.
pub mod health_service;
/// Room operations driven by client events and timers.
pub mod match_service;
/// Queue operations and the stale-entry sweeper.
pub mod matchmaking_service;
/// Per-room timer tasks.
pub mod phase_timers;
/// Public service for read-only match information.
pub mod public_service;
/// Question content service client with built-in fallback.
pub mod question_source;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
/// Storage connection supervisor with backoff and degraded mode.
pub mod storage_supervisor;
/// Rating and league progression.
pub mod trophy;
/// WebSocket connection and message handling service.
pub mod websocket_service;
