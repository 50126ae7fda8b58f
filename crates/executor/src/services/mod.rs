pub mod pipeline_service;
pub mod shutdown_service;
pub mod trade_service;
