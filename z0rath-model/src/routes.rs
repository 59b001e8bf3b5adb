//! Versioned route table of the hosted authorization service.

/// Default REST base, including the version prefix.
pub const DEFAULT_BASE_URL: &str = "https://z0rath-api.zonezero.dev/api/v1";

/// Header carrying the API key on every request.
pub const API_KEY_HEADER: &str = "x-api-key";

pub mod v1 {
    /// Authorization checks
    pub mod authorization {
        /// Ask whether `user` holds `slug` (query parameters)
        pub const HAS_PERMISSION: &str = "/authorization/has_permission";
    }

    /// Push channel endpoints
    pub mod websockets {
        /// Exchange credentials for a one-time connection ticket
        pub const ISSUE_TICKET: &str = "/websockets/issue-ticket";
        /// Push channel upgrade (requires `ticket` query parameter)
        pub const CONNECT: &str = "/websockets/ws";
    }
}
