pub mod session_api;
pub mod video_api;
