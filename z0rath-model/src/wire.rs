//! Request and response bodies of the authorization service.

/// Body of `GET /authorization/has_permission`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HasPermissionResponse {
    #[cfg_attr(feature = "serde", serde(rename = "hasPermission"))]
    pub has_permission: bool,
}

/// Body of `POST /websockets/issue-ticket`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IssueTicketRequest {
    pub user: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IssueTicketResponse {
    pub ticket: crate::Ticket,
}

#[cfg(all(test, feature = "serde"))]
mod tests {
    use super::*;

    #[test]
    fn permission_body_uses_camel_case_field() {
        let body: HasPermissionResponse =
            serde_json::from_str(r#"{"hasPermission":true}"#).unwrap();
        assert!(body.has_permission);
    }

    #[test]
    fn ticket_response_is_a_bare_string() {
        let body: IssueTicketResponse =
            serde_json::from_str(r#"{"ticket":"abc"}"#).unwrap();
        assert_eq!(body.ticket.as_str(), "abc");
    }
}
