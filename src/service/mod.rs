pub mod access;
pub mod alert_eval;
pub mod analysis;
pub mod api_keys;
pub mod dashboard;
pub mod link_checker;
pub mod page_cache;
pub mod pages;
pub mod payments;
