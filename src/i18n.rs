//! Display language and the few messages the client localizes itself.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    #[default]
    Bn,
}

/// Keys for localized messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    CameraFailed,
    NoActivePackage,
    Active,
    Warning,
    Expired,
    BrowsePackages,
    RenewLink,
    Dashboard,
    Extend,
}

impl Language {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "en" | "english" => Some(Self::En),
            "bn" | "bangla" | "bengali" => Some(Self::Bn),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Bn => "bn",
        }
    }

    pub fn toggle(self) -> Self {
        match self {
            Self::En => Self::Bn,
            Self::Bn => Self::En,
        }
    }

    pub fn text(&self, message: Message) -> &'static str {
        match (self, message) {
            (Self::En, Message::CameraFailed) => "Camera access failed.",
            (Self::Bn, Message::CameraFailed) => "ক্যামেরা চালু করা যাচ্ছে না।",
            (Self::En, Message::NoActivePackage) => "No Active Link",
            (Self::Bn, Message::NoActivePackage) => "সক্রিয় প্যাকেজ নেই",
            (Self::En, Message::Active) => "Active",
            (Self::Bn, Message::Active) => "সক্রিয়",
            (Self::En, Message::Warning) => "Expiring",
            (Self::Bn, Message::Warning) => "মেয়াদ শেষ হচ্ছে",
            (Self::En, Message::Expired) => "Expired",
            (Self::Bn, Message::Expired) => "মেয়াদ শেষ",
            (Self::En, Message::BrowsePackages) => "Browse Packages",
            (Self::Bn, Message::BrowsePackages) => "প্যাকেজ দেখুন",
            (Self::En, Message::RenewLink) => "Renew Link",
            (Self::Bn, Message::RenewLink) => "নতুন প্যাক কিনুন",
            (Self::En, Message::Dashboard) => "Dashboard",
            (Self::Bn, Message::Dashboard) => "ড্যাশবোর্ড",
            (Self::En, Message::Extend) => "Extend",
            (Self::Bn, Message::Extend) => "টপ-আপ",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_parse_and_toggle() {
        assert_eq!(Language::from_str("EN"), Some(Language::En));
        assert_eq!(Language::from_str("bangla"), Some(Language::Bn));
        assert!(Language::from_str("fr").is_none());
        assert_eq!(Language::En.toggle(), Language::Bn);
        assert_eq!(Language::Bn.toggle().toggle(), Language::Bn);
    }

    #[test]
    fn test_camera_failure_is_localized() {
        assert_eq!(
            Language::En.text(Message::CameraFailed),
            "Camera access failed."
        );
        assert_ne!(
            Language::Bn.text(Message::CameraFailed),
            Language::En.text(Message::CameraFailed)
        );
    }
}
