mod formats_integration;
mod pipeline_integration;
mod session_integration;
