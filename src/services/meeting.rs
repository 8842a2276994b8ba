//! Meeting links for accepted sessions

use serde::Serialize;
use uuid::Uuid;

/// A generated meeting room
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MeetingLink {
    pub id: String,
    pub url: String,
}

/// Builds `{base_url}/{uuid}` rooms on a video service such as Jitsi.
#[derive(Debug, Clone)]
pub struct MeetingLinkGenerator {
    base_url: String,
}

impl MeetingLinkGenerator {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn generate(&self) -> MeetingLink {
        let id = Uuid::new_v4().to_string();
        let url = format!("{}/{}", self.base_url, id);
        MeetingLink { id, url }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generate_joins_base_url() {
        let link = MeetingLinkGenerator::new("https://meet.jit.si/").generate();
        assert_eq!(link.url, format!("https://meet.jit.si/{}", link.id));
        assert!(Uuid::parse_str(&link.id).is_ok());
    }

    #[test]
    fn test_ids_are_unique() {
        let generator = MeetingLinkGenerator::new("https://meet.jit.si");
        let ids: HashSet<String> = (0..100).map(|_| generator.generate().id).collect();
        assert_eq!(ids.len(), 100);
    }
}
