use super::fingerprint::UserAgentProfile;
use tablescroll_common::StealthLevel;

/// Chrome command-line arguments for a stealth level and fingerprint.
pub fn build_stealth_arguments(
    level: StealthLevel,
    profile: &UserAgentProfile,
    headless: bool,
) -> Vec<String> {
    let mut args = vec![
        "--disable-blink-features=AutomationControlled".to_string(),
        "--disable-infobars".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--no-sandbox".to_string(),
        format!("--user-agent={}", profile.user_agent),
        format!("--window-size={},{}", profile.viewport.0, profile.viewport.1),
        format!("--lang={}", profile.languages.join(",")),
    ];
    if level != StealthLevel::Lightweight {
        args.push("--disable-extensions".to_string());
        args.push("--disable-plugins-discovery".to_string());
    }
    if level == StealthLevel::Maximum {
        args.push("--disable-features=IsolateOrigins,site-per-process".to_string());
    }
    if headless {
        args.push("--headless=new".to_string());
        args.push("--disable-gpu".to_string());
        args.push("--hide-scrollbars=false".to_string());
    }
    args
}

/// JavaScript evasions applied after navigation.
pub struct StealthScripts;

impl StealthScripts {
    pub fn core_evasions() -> &'static str {
        r#"
            Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
            Object.defineProperty(navigator, 'plugins', { get: () => [1,2,3] });
            if (!window.chrome) window.chrome = { runtime: {} };
        "#
    }

    pub fn webgl_evasions() -> &'static str {
        r#"
            const getParameter = WebGLRenderingContext.prototype.getParameter;
            WebGLRenderingContext.prototype.getParameter = function(parameter) {
                if (parameter === 37445) return 'Intel Inc.';
                if (parameter === 37446) return 'Intel Iris OpenGL Engine';
                return getParameter.call(this, parameter);
            };
        "#
    }

    /// Pin `navigator.platform` and `navigator.languages` to the session profile.
    pub fn profile_overrides(profile: &UserAgentProfile) -> String {
        let languages = serde_json::to_string(&profile.languages).unwrap_or_else(|_| "[]".into());
        format!(
            "Object.defineProperty(navigator, 'platform', {{ get: () => {platform} }});\
             Object.defineProperty(navigator, 'languages', {{ get: () => {languages} }});",
            platform = serde_json::Value::String(profile.platform.clone()),
        )
    }

    /// Scripts to run for a level, in order.
    pub fn for_level(level: StealthLevel, profile: &UserAgentProfile) -> Vec<String> {
        let mut scripts = vec![Self::core_evasions().to_string()];
        match level {
            StealthLevel::Lightweight => {}
            StealthLevel::Balanced => scripts.push(Self::profile_overrides(profile)),
            StealthLevel::Maximum => {
                scripts.push(Self::profile_overrides(profile));
                scripts.push(Self::webgl_evasions().to_string());
            }
        }
        scripts
    }
}
