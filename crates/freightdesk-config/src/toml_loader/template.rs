//! Default TOML config template with inline documentation comments.

/// Generate the default TOML config content with comments.
pub(crate) fn default_config_toml() -> &'static str {
    r##"# freightdesk chat configuration
# Schema version 1
# Only override what you want to change -- missing fields use defaults.

[backend]
# base_url = "http://localhost:54321/functions/v1"
# request_timeout = 15     # 1-120 seconds
# connect_timeout = 10     # 1-60 seconds

[realtime]
# url = "wss://realtime.freightdesk.app/socket/websocket"
# api_key = ""
# heartbeat_interval = 25  # 5-60 seconds
# reconnect_delay = 1      # 1-60 seconds
# max_reconnect_delay = 30 # >= reconnect_delay
# connect_timeout = 15
# reply_timeout = 10

[session]
# refresh_buffer = 60      # 10-600 seconds
# history_page_size = 50   # 1-500
# join_timeout = 20        # 1-120 seconds
# proactive_refresh = true
# event_capacity = 256

[logging]
# level = "info"           # trace, debug, info, warn, error
# directives = []
"##
}
