/// Tri-state answer for one slug: `None` until the service has answered.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Verdict {
    pub slug: String,
    pub granted: Option<bool>,
}

impl Verdict {
    pub fn unknown(slug: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            granted: None,
        }
    }

    pub fn resolved(slug: impl Into<String>, granted: bool) -> Self {
        Self {
            slug: slug.into(),
            granted: Some(granted),
        }
    }

    pub fn is_granted(&self) -> bool {
        self.granted == Some(true)
    }

    pub fn is_resolved(&self) -> bool {
        self.granted.is_some()
    }
}
