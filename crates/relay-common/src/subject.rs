//! Subject naming contract
//!
//! RPC calls travel on `{service}.{method}`; storage change events on
//! `{service}.$storage.{operation}.{id}`.

/// Subject segment reserved for storage change broadcasts
pub const STORAGE_SEGMENT: &str = "$storage";

/// Subject prefix used by the broker for generated reply inboxes
pub const INBOX_PREFIX: &str = "_INBOX";

/// Subject for invoking `method` on `service`
pub fn rpc_subject(service: &str, method: &str) -> String {
    format!("{}.{}", service, method)
}

/// Prefix every storage event of `service` starts with
pub fn storage_prefix(service: &str) -> String {
    format!("{}.{}", service, STORAGE_SEGMENT)
}

/// Subject for a change event of `operation` on record `id`
pub fn storage_subject(service: &str, operation: &str, id: &str) -> String {
    format!("{}.{}.{}", storage_prefix(service), operation, id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_subject() {
        assert_eq!(rpc_subject("echo", "ping"), "echo.ping");
    }

    #[test]
    fn test_storage_subject() {
        assert_eq!(
            storage_subject("user-service", "put", "abc123"),
            "user-service.$storage.put.abc123"
        );
        assert_eq!(storage_prefix("user-service"), "user-service.$storage");
    }
}
