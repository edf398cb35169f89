//! Per-section validators: backend, realtime, session.

use crate::schema::FreightdeskConfig;

use super::helpers::{validate_range, validate_scheme};

pub(crate) fn validate_backend(errors: &mut Vec<String>, config: &FreightdeskConfig) {
    validate_scheme(
        errors,
        "backend.base_url",
        &config.backend.base_url,
        &["http", "https"],
    );
    validate_range(
        errors,
        "backend.request_timeout",
        config.backend.request_timeout,
        1,
        120,
    );
    validate_range(
        errors,
        "backend.connect_timeout",
        config.backend.connect_timeout,
        1,
        60,
    );
}

pub(crate) fn validate_realtime(errors: &mut Vec<String>, config: &FreightdeskConfig) {
    let rt = &config.realtime;
    validate_scheme(errors, "realtime.url", &rt.url, &["ws", "wss"]);
    validate_range(
        errors,
        "realtime.heartbeat_interval",
        rt.heartbeat_interval,
        5,
        60,
    );
    validate_range(errors, "realtime.reconnect_delay", rt.reconnect_delay, 1, 60);
    if rt.max_reconnect_delay < rt.reconnect_delay {
        errors.push(format!(
            "realtime.max_reconnect_delay = {} is below realtime.reconnect_delay = {}",
            rt.max_reconnect_delay, rt.reconnect_delay
        ));
    }
    validate_range(errors, "realtime.connect_timeout", rt.connect_timeout, 1, 120);
    validate_range(errors, "realtime.reply_timeout", rt.reply_timeout, 1, 120);
}

pub(crate) fn validate_session(errors: &mut Vec<String>, config: &FreightdeskConfig) {
    let s = &config.session;
    validate_range(errors, "session.refresh_buffer", s.refresh_buffer, 10, 600);
    validate_range(
        errors,
        "session.history_page_size",
        s.history_page_size,
        1,
        500,
    );
    validate_range(errors, "session.join_timeout", s.join_timeout, 1, 120);
    validate_range(errors, "session.event_capacity", s.event_capacity, 1, 65536);
}
