use lazy_static::lazy_static;
use prometheus::{register_int_counter_vec, register_int_gauge_vec, IntCounterVec, IntGaugeVec};

lazy_static! {
    pub static ref CONNECTS: IntCounterVec = register_int_counter_vec!(
        "plccache_connects_total",
        "Background connection attempts started per target address",
        &["address"]
    )
    .expect("register plccache_connects_total counter vec");
    pub static ref BORROWS: IntCounterVec = register_int_counter_vec!(
        "plccache_borrows_total",
        "Connections handed out to borrowers per target address",
        &["address"]
    )
    .expect("register plccache_borrows_total counter vec");
    pub static ref REJECTIONS: IntCounterVec = register_int_counter_vec!(
        "plccache_rejections_total",
        "Internal acquisition attempts rejected per target address and reason",
        &["address", "reason"]
    )
    .expect("register plccache_rejections_total counter vec");
    pub static ref WATCHDOG_FIRES: IntCounterVec = register_int_counter_vec!(
        "plccache_watchdog_fires_total",
        "Borrows reclaimed by the lease watchdog per target address",
        &["address"]
    )
    .expect("register plccache_watchdog_fires_total counter vec");
    pub static ref BREAKS: IntCounterVec = register_int_counter_vec!(
        "plccache_broken_connections_total",
        "Connections discarded as broken per target address",
        &["address"]
    )
    .expect("register plccache_broken_connections_total counter vec");
    pub static ref QUEUE_LENGTH: IntGaugeVec = register_int_gauge_vec!(
        "plccache_queue_length",
        "Callers currently waiting for a connection per target address",
        &["address"]
    )
    .expect("register plccache_queue_length gauge vec");
}

#[derive(Debug, Clone, Copy)]
pub struct CacheMetrics;

impl CacheMetrics {
    #[inline]
    pub fn record_connect(address: &str) {
        CONNECTS.with_label_values(&[address]).inc();
    }

    #[inline]
    pub fn record_borrow(address: &str) {
        BORROWS.with_label_values(&[address]).inc();
    }

    #[inline]
    pub fn record_rejection(address: &str, reason: &str) {
        REJECTIONS.with_label_values(&[address, reason]).inc();
    }

    #[inline]
    pub fn record_watchdog_fire(address: &str) {
        WATCHDOG_FIRES.with_label_values(&[address]).inc();
    }

    #[inline]
    pub fn record_break(address: &str) {
        BREAKS.with_label_values(&[address]).inc();
    }

    #[inline]
    pub fn set_queue_length(address: &str, len: usize) {
        QUEUE_LENGTH.with_label_values(&[address]).set(len as i64);
    }
}

#[inline]
pub fn init() {
    lazy_static::initialize(&CONNECTS);
    lazy_static::initialize(&BORROWS);
    lazy_static::initialize(&REJECTIONS);
    lazy_static::initialize(&WATCHDOG_FIRES);
    lazy_static::initialize(&BREAKS);
    lazy_static::initialize(&QUEUE_LENGTH);
}
