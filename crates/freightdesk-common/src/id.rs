/// Random v4 UUID rendered as a hyphenated string.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Short (8 hex chars) id used to tie log lines of one request together.
pub fn new_correlation_id() -> String {
    let uuid = uuid::Uuid::new_v4();
    let bytes = uuid.as_bytes();
    format!(
        "{:02x}{:02x}{:02x}{:02x}",
        bytes[0], bytes[1], bytes[2], bytes[3]
    )
}
