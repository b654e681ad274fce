pub mod ip_filter;
pub mod request_logger;
