//! User-agent classification via ordered pattern rules.
//!
//! Rules are evaluated top-to-bottom, first match wins, and the order is
//! load-bearing: specific tokens (iPad, CriOS) come before broader ones
//! (Mobile, Chrome). All matching is case-insensitive substring search on
//! the raw user-agent string.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    Desktop,
    Mobile,
    Tablet,
    Unknown,
}

impl DeviceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceClass::Desktop => "desktop",
            DeviceClass::Mobile => "mobile",
            DeviceClass::Tablet => "tablet",
            DeviceClass::Unknown => "unknown",
        }
    }
}

/// One classification rule: every token in `all` must be present, at
/// least one of `any` (when non-empty), and none of `none`.
struct UaRule<T> {
    all: &'static [&'static str],
    any: &'static [&'static str],
    none: &'static [&'static str],
    label: T,
}

impl<T: Copy> UaRule<T> {
    fn matches(&self, ua: &str) -> bool {
        self.all.iter().all(|t| ua.contains(t))
            && (self.any.is_empty() || self.any.iter().any(|t| ua.contains(t)))
            && self.none.iter().all(|t| !ua.contains(t))
    }
}

const DEVICE_RULES: &[UaRule<DeviceClass>] = &[
    UaRule { all: &["ipad"], any: &[], none: &[], label: DeviceClass::Tablet },
    UaRule { all: &["iphone"], any: &[], none: &[], label: DeviceClass::Mobile },
    UaRule { all: &["android", "mobile"], any: &[], none: &[], label: DeviceClass::Mobile },
    UaRule { all: &["android"], any: &[], none: &[], label: DeviceClass::Tablet },
    UaRule { all: &["mobile"], any: &[], none: &[], label: DeviceClass::Mobile },
    UaRule {
        all: &[],
        any: &["windows", "macintosh", "x11"],
        none: &[],
        label: DeviceClass::Desktop,
    },
];

const OS_RULES: &[UaRule<&str>] = &[
    UaRule { all: &[], any: &["iphone", "ipad"], none: &[], label: "iOS" },
    UaRule { all: &["android"], any: &[], none: &[], label: "Android" },
    UaRule { all: &["windows nt"], any: &[], none: &[], label: "Windows" },
    UaRule { all: &["mac os x"], any: &[], none: &["iphone"], label: "MacOS" },
    UaRule { all: &["linux"], any: &[], none: &[], label: "Linux" },
];

const BROWSER_RULES: &[UaRule<&str>] = &[
    UaRule { all: &["crios"], any: &[], none: &[], label: "Chrome (iOS)" },
    UaRule { all: &["fxios"], any: &[], none: &[], label: "Firefox (iOS)" },
    UaRule { all: &["edgios"], any: &[], none: &[], label: "Edge (iOS)" },
    UaRule { all: &["chrome"], any: &[], none: &["edg"], label: "Chrome" },
    UaRule { all: &["safari"], any: &[], none: &["chrome"], label: "Safari" },
    UaRule { all: &["firefox"], any: &[], none: &[], label: "Firefox" },
    UaRule { all: &["edg"], any: &[], none: &[], label: "Edge" },
];

/// Desktop / mobile / tablet / unknown.
pub fn classify_device(user_agent: Option<&str>) -> DeviceClass {
    match user_agent {
        Some(ua) => {
            let ua = ua.to_lowercase();
            DEVICE_RULES
                .iter()
                .find(|r| r.matches(&ua))
                .map(|r| r.label)
                .unwrap_or(DeviceClass::Unknown)
        }
        None => DeviceClass::Unknown,
    }
}

/// Operating system family, "Other" when no rule matches.
pub fn classify_os(user_agent: Option<&str>) -> &'static str {
    classify_label(user_agent, OS_RULES)
}

/// Browser family, "Other" when no rule matches.
pub fn classify_browser(user_agent: Option<&str>) -> &'static str {
    classify_label(user_agent, BROWSER_RULES)
}

fn classify_label(user_agent: Option<&str>, rules: &[UaRule<&'static str>]) -> &'static str {
    match user_agent {
        Some(ua) => {
            let ua = ua.to_lowercase();
            rules
                .iter()
                .find(|r| r.matches(&ua))
                .map(|r| r.label)
                .unwrap_or("Other")
        }
        None => "Other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IPAD: &str =
        "Mozilla/5.0 (iPad; CPU OS 16_0 like Mac OS X) AppleWebKit/605.1.15 Mobile/15E148";
    const IPHONE: &str =
        "Mozilla/5.0 (iPhone; CPU iPhone OS 16_0 like Mac OS X) AppleWebKit/605.1.15";
    const ANDROID_PHONE: &str =
        "Mozilla/5.0 (Linux; Android 13; Pixel 7) AppleWebKit/537.36 Chrome/110.0 Mobile Safari/537.36";
    const ANDROID_TABLET: &str =
        "Mozilla/5.0 (Linux; Android 13; SM-X700) AppleWebKit/537.36 Chrome/110.0 Safari/537.36";
    const MAC_DESKTOP: &str =
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 Safari/605.1.15";
    const WINDOWS_CHROME: &str =
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 Chrome/110.0 Safari/537.36";

    #[test]
    fn ipad_wins_over_mobile_token() {
        // iPad UAs carry "Mobile"; the iPad rule must fire first.
        assert_eq!(classify_device(Some(IPAD)), DeviceClass::Tablet);
    }

    #[test]
    fn android_without_mobile_is_tablet() {
        assert_eq!(classify_device(Some(ANDROID_PHONE)), DeviceClass::Mobile);
        assert_eq!(classify_device(Some(ANDROID_TABLET)), DeviceClass::Tablet);
    }

    #[test]
    fn desktop_and_unknown() {
        assert_eq!(classify_device(Some(MAC_DESKTOP)), DeviceClass::Desktop);
        assert_eq!(classify_device(Some(WINDOWS_CHROME)), DeviceClass::Desktop);
        assert_eq!(classify_device(Some("curl/8.0")), DeviceClass::Unknown);
        assert_eq!(classify_device(None), DeviceClass::Unknown);
    }

    #[test]
    fn os_rules() {
        assert_eq!(classify_os(Some(IPHONE)), "iOS");
        assert_eq!(classify_os(Some(ANDROID_TABLET)), "Android");
        assert_eq!(classify_os(Some(WINDOWS_CHROME)), "Windows");
        assert_eq!(classify_os(Some(MAC_DESKTOP)), "MacOS");
        assert_eq!(classify_os(Some("curl/8.0")), "Other");
    }

    #[test]
    fn browser_rules_specific_before_general() {
        assert_eq!(
            classify_browser(Some("Mozilla/5.0 (iPhone) CriOS/110.0 Mobile Safari")),
            "Chrome (iOS)"
        );
        assert_eq!(classify_browser(Some(WINDOWS_CHROME)), "Chrome");
        assert_eq!(classify_browser(Some(MAC_DESKTOP)), "Safari");
        assert_eq!(
            classify_browser(Some(
                "Mozilla/5.0 (Windows NT 10.0) AppleWebKit/537.36 Chrome/110.0 Safari/537.36 Edg/110.0"
            )),
            "Edge"
        );
    }
}
