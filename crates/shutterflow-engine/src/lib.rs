//! Shutterflow Engine
//!
//! Analyzes a reference photo, recommends camera parameters, refines them
//! from free-text feedback and drives a camera to capture a matching photo,
//! one session at a time.

pub mod actuator;
pub mod analysis;
pub mod api;
pub mod config;
pub mod error;
pub mod files;
pub mod model;
pub mod refinement;
pub mod session;
pub mod store;
pub mod workflow;

pub use actuator::{supported_parameters, to_device_params, DeviceActuator};
pub use analysis::{classify_scene, classify_temperature, FeatureExtractor, Recommendation};
pub use api::{
    create_router, AppState, DeleteResponse, ErrorResponse, HealthResponse, RefineRequest,
    SessionsResponse, UploadQuery, UploadResponse, MAX_UPLOAD_BYTES,
};
pub use config::{
    Config, DeviceConfig, RefinementConfig, SessionConfig, SimulationConfig, ISO_MAX, ISO_MIN,
};
pub use error::{Result, ShutterflowError};
pub use files::{FileStore, LocalFileStore};
pub use model::{
    CameraParameters, ColorSummary, ColorTemperature, CompositionSummary, FocusMode, GridRegion,
    ImageAnalysis, ParameterDelta, RefinementRecord, SceneMode, SceneType, WhiteBalance,
    EXPOSURE_MAX, EXPOSURE_MIN,
};
pub use refinement::{Refinement, RefinementInterpreter};
pub use session::{SessionState, Step, WorkflowStage};
pub use store::{InMemorySessionStore, SessionHandle, SessionStore};
pub use workflow::{route_after_refine, supported_steps, SessionSummary, WorkflowEngine};
