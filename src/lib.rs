//! PPE Monitor Library
//!
//! Real-time protective equipment compliance monitoring for network cameras
//!
//! ## Architecture
//!
//! 1. CameraSession - Camera endpoint and per-session settings
//! 2. FrameSource / ConnectionSupervisor - Stream connection lifecycle
//! 3. Frame - Captured image and frame validation
//! 4. Detector - Detection model adapter
//! 5. Compliance - Required equipment evaluation
//! 6. Debounce - Sustained violation state machine
//! 7. AlertRecorder - Cooldown-gated alert persistence
//! 8. AlertStore / ImageStore - Persistence collaborators
//! 9. MonitorSession - Per-camera pipeline
//! 10. SessionManager - Running sessions
//! 11. WebAPI - REST API and live view
//!
//! ## Design Principles
//!
//! - One sequential pipeline per camera, no shared mutable state
//! - Typed failure results, never swallowed errors
//! - Every blocking operation is time bounded

pub mod alert_recorder;
pub mod alert_store;
pub mod camera_session;
pub mod compliance;
pub mod connection_supervisor;
pub mod debounce;
pub mod detector;
pub mod frame;
pub mod frame_source;
pub mod image_store;
pub mod monitor_session;
pub mod session_manager;
pub mod web_api;
pub mod models;
pub mod error;
pub mod state;

pub use error::{Error, Result};
pub use state::AppState;
