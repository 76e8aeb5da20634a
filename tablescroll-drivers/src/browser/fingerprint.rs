use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// User agent, viewport, and locale presented by the browser session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAgentProfile {
    pub user_agent: String,
    pub viewport: (u32, u32),
    pub platform: String,
    pub languages: Vec<String>,
}

fn windows_profile() -> UserAgentProfile {
    UserAgentProfile {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36".to_string(),
        viewport: (1920, 1080),
        platform: "Win32".to_string(),
        languages: vec!["en-US".to_string(), "en".to_string()],
    }
}

fn builtin_profiles() -> Vec<UserAgentProfile> {
    vec![
        windows_profile(),
        UserAgentProfile {
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36".to_string(),
            viewport: (1440, 900),
            platform: "MacIntel".to_string(),
            languages: vec!["en-US".to_string(), "en".to_string()],
        },
    ]
}

/// Picks one desktop profile per session and keeps it stable.
#[derive(Debug, Clone)]
pub struct UserAgentManager {
    session: UserAgentProfile,
}

impl UserAgentManager {
    pub fn new() -> Self {
        let profiles = builtin_profiles();
        let mut rng = rand::thread_rng();
        let session = profiles
            .choose(&mut rng)
            .cloned()
            .unwrap_or_else(windows_profile);
        Self { session }
    }

    pub fn session_profile(&self) -> &UserAgentProfile {
        &self.session
    }

    /// Viewport centre, the default spot to park the pointer over content.
    pub fn viewport_centre(&self) -> (i32, i32) {
        let (w, h) = self.session.viewport;
        ((w / 2) as i32, (h / 2) as i32)
    }
}

impl Default for UserAgentManager {
    fn default() -> Self {
        Self::new()
    }
}
